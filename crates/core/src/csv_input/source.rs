use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Where CSV content comes from.
pub enum CsvSource {
    /// A file on disk, subject to path validation.
    Path(PathBuf),
    /// Content already in memory, e.g. an uploaded file.
    Buffer { name: String, data: Vec<u8> },
    /// A named reader, consumed up to the size limit.
    Stream {
        name: String,
        reader: Box<dyn Read + Send>,
    },
}

impl CsvSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn buffer(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Buffer {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn stream(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self::Stream {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Display name used in logs and error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Buffer { name, .. } | Self::Stream { name, .. } => name.clone(),
        }
    }

    /// File extension of the path or name, if any.
    pub(crate) fn extension(&self) -> Option<String> {
        let name = match self {
            Self::Path(path) => path.as_path(),
            Self::Buffer { name, .. } | Self::Stream { name, .. } => Path::new(name.as_str()),
        };
        name.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Buffer { name, data } => f
                .debug_struct("Buffer")
                .field("name", name)
                .field("len", &data.len())
                .finish(),
            Self::Stream { name, .. } => f.debug_struct("Stream").field("name", name).finish(),
        }
    }
}
