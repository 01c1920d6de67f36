use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::source::CsvSource;
use crate::config::CsvConfig;
use crate::error::BatchError;
use crate::model::JobParams;
use crate::paths;

/// Parsed CSV content: header plus one params map per non-empty row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    /// Header columns in file order.
    pub columns: Vec<String>,
    /// Data rows in file order, keyed by column.
    pub rows: Vec<JobParams>,
    /// Resolved path for file inputs.
    pub source_path: Option<PathBuf>,
}

/// Validating CSV reader.
#[derive(Debug, Clone)]
pub struct CsvParser {
    config: CsvConfig,
}

/// Parses `source` with the given limits.
pub fn parse_csv(source: CsvSource, config: &CsvConfig) -> Result<CsvTable, BatchError> {
    CsvParser::new(config.clone()).parse(source)
}

impl CsvParser {
    pub fn new(config: CsvConfig) -> Self {
        Self { config }
    }

    /// Reads, validates and parses `source`.
    pub fn parse(&self, source: CsvSource) -> Result<CsvTable, BatchError> {
        let name = source.name();
        self.check_extension(&source)?;

        let (bytes, source_path) = match source {
            CsvSource::Path(path) => {
                let resolved = self.resolve_path(&path)?;
                (self.read_file(&resolved)?, Some(resolved))
            }
            CsvSource::Buffer { data, .. } => {
                self.check_size(data.len() as u64, &name)?;
                (data, None)
            }
            CsvSource::Stream { reader, .. } => (self.read_bounded(reader, &name)?, None),
        };

        let mut table = self.parse_bytes(&bytes, &name)?;
        table.source_path = source_path;

        info!(
            source = %name,
            columns = table.columns.len(),
            rows = table.rows.len(),
            "Parsed CSV input"
        );
        Ok(table)
    }

    fn check_extension(&self, source: &CsvSource) -> Result<(), BatchError> {
        let allowed = |ext: &str| {
            self.config
                .allowed_extensions
                .iter()
                .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
        };

        match (source, source.extension()) {
            (_, Some(ext)) if allowed(&ext) => Ok(()),
            // In-memory content may be unnamed; its bytes are still checked.
            (CsvSource::Buffer { .. } | CsvSource::Stream { .. }, None) => Ok(()),
            (_, ext) => Err(BatchError::Configuration(format!(
                "{} is not a CSV input (extension {:?}, expected one of {:?})",
                source.name(),
                ext.unwrap_or_default(),
                self.config.allowed_extensions
            ))),
        }
    }

    /// Applies the allow-list and existence checks, returning the path to read.
    fn resolve_path(&self, path: &Path) -> Result<PathBuf, BatchError> {
        let candidate = match &self.config.allowed_root {
            Some(root) => paths::ensure_within(root, path)?,
            None => path.to_path_buf(),
        };

        if !candidate.exists() {
            return Err(BatchError::Configuration(format!(
                "CSV file not found: {}",
                path.display()
            )));
        }

        // Symlinks may still point outside the root.
        if let Some(root) = &self.config.allowed_root {
            let real_root = root
                .canonicalize()
                .map_err(|e| BatchError::Configuration(format!("allowed root unreadable: {}", e)))?;
            let real_path = candidate
                .canonicalize()
                .map_err(|e| BatchError::Configuration(format!("CSV file unreadable: {}", e)))?;
            if !real_path.starts_with(&real_root) {
                return Err(BatchError::Security(format!(
                    "{} resolves outside allowed root",
                    path.display()
                )));
            }
        }

        let metadata = candidate
            .metadata()
            .map_err(|e| BatchError::Configuration(format!("CSV file unreadable: {}", e)))?;
        if !metadata.is_file() {
            return Err(BatchError::Configuration(format!(
                "CSV path is not a file: {}",
                path.display()
            )));
        }
        self.check_size(metadata.len(), &path.display().to_string())?;

        Ok(candidate)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>, BatchError> {
        let file = File::open(path).map_err(|e| {
            BatchError::Configuration(format!("cannot open {}: {}", path.display(), e))
        })?;
        self.read_bounded(Box::new(file), &path.display().to_string())
    }

    /// Reads at most the configured size limit plus one byte to detect overflow.
    fn read_bounded(&self, reader: Box<dyn Read + Send>, name: &str) -> Result<Vec<u8>, BatchError> {
        let mut bytes = Vec::new();
        reader
            .take(self.config.max_file_size_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| BatchError::Configuration(format!("cannot read {}: {}", name, e)))?;
        self.check_size(bytes.len() as u64, name)?;
        Ok(bytes)
    }

    fn check_size(&self, len: u64, name: &str) -> Result<(), BatchError> {
        if len > self.config.max_file_size_bytes {
            return Err(BatchError::Security(format!(
                "{} exceeds maximum size of {} bytes",
                name, self.config.max_file_size_bytes
            )));
        }
        Ok(())
    }

    fn parse_bytes(&self, bytes: &[u8], name: &str) -> Result<CsvTable, BatchError> {
        if bytes.contains(&0) {
            return Err(BatchError::FileProcessing(format!(
                "{} contains binary data, expected CSV text",
                name
            )));
        }
        if std::str::from_utf8(bytes).is_err() {
            return Err(BatchError::FileProcessing(format!(
                "{} is not valid UTF-8",
                name
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| BatchError::FileProcessing(format!("{}: invalid header: {}", name, e)))?
            .clone();

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        if columns.iter().all(|c| c.is_empty()) {
            return Err(BatchError::FileProcessing(format!(
                "{}: header row is missing",
                name
            )));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(BatchError::FileProcessing(format!(
                    "{}: header column {} is empty",
                    name,
                    idx + 1
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(BatchError::FileProcessing(format!(
                    "{}: duplicate column name {:?}",
                    name, column
                )));
            }
        }

        let mut rows: Vec<JobParams> = Vec::new();
        for result in reader.records() {
            let record = result
                .map_err(|e| BatchError::FileProcessing(format!("{}: {}", name, e)))?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();

            if record.iter().all(|field| field.trim().is_empty()) {
                debug!(source = %name, line, "Skipping empty row");
                continue;
            }

            if record.len() != columns.len() {
                return Err(BatchError::FileProcessing(format!(
                    "{}: line {} has {} fields, expected {}",
                    name,
                    line,
                    record.len(),
                    columns.len()
                )));
            }

            rows.push(
                columns
                    .iter()
                    .zip(record.iter())
                    .map(|(column, value)| (column.as_str(), value))
                    .collect(),
            );
        }

        if rows.is_empty() {
            return Err(BatchError::FileProcessing(format!(
                "{}: no data rows",
                name
            )));
        }

        Ok(CsvTable {
            columns,
            rows,
            source_path: None,
        })
    }
}
