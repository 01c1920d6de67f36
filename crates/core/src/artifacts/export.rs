//! CSV exports of failed jobs.

use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::BatchError;
use crate::model::{Job, JobStatus, Manifest};

const REPORT_COLUMNS: [&str; 4] = ["job_id", "row_index", "attempts", "error_message"];

/// Writes the params of every failed job to `destination` as CSV.
///
/// The header is the batch's original column order, so the file can be
/// submitted as a new batch. A batch without failures still gets a header.
/// Returns the number of rows written.
pub fn export_failed_rows(manifest: &Manifest, destination: &Path) -> Result<usize, BatchError> {
    let columns = export_columns(manifest);
    let failed = failed_jobs(manifest);

    write_atomically(destination, |writer| {
        writer.write_record(&columns)?;
        for job in &failed {
            writer.write_record(columns.iter().map(|c| job.params.get(c).unwrap_or("")))?;
        }
        Ok(())
    })?;

    info!(
        "Exported {} failed row(s) of batch {} to {}",
        failed.len(),
        manifest.batch_id,
        destination.display()
    );
    Ok(failed.len())
}

/// Writes an inspection report of failed jobs to `destination`.
///
/// Columns: `job_id,row_index,attempts,error_message`, then the original
/// columns. Returns the number of rows written.
pub fn export_failure_report(
    manifest: &Manifest,
    destination: &Path,
) -> Result<usize, BatchError> {
    let columns = export_columns(manifest);
    let failed = failed_jobs(manifest);

    write_atomically(destination, |writer| {
        let header = REPORT_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(columns.iter().cloned());
        writer.write_record(header)?;

        for job in &failed {
            let mut record = vec![
                job.job_id.clone(),
                job.row_index.to_string(),
                job.attempts.to_string(),
                job.error_message.clone().unwrap_or_default(),
            ];
            record.extend(
                columns
                    .iter()
                    .map(|c| job.params.get(c).unwrap_or("").to_string()),
            );
            writer.write_record(&record)?;
        }
        Ok(())
    })?;

    info!(
        "Wrote failure report for batch {} ({} row(s)) to {}",
        manifest.batch_id,
        failed.len(),
        destination.display()
    );
    Ok(failed.len())
}

/// The manifest's header, or the first job's keys for manifests without one.
fn export_columns(manifest: &Manifest) -> Vec<String> {
    if !manifest.columns.is_empty() {
        return manifest.columns.clone();
    }
    manifest
        .jobs
        .first()
        .map(|j| j.params.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

fn failed_jobs(manifest: &Manifest) -> Vec<&Job> {
    manifest
        .jobs
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .collect()
}

/// Writes CSV to a temp file beside `destination`, then renames it into place.
fn write_atomically<F>(destination: &Path, write: F) -> Result<(), BatchError>
where
    F: FnOnce(&mut csv::Writer<&mut NamedTempFile>) -> Result<(), csv::Error>,
{
    let unwritable = |reason: String| {
        BatchError::FileProcessing(format!(
            "cannot write export to {}: {}",
            destination.display(),
            reason
        ))
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        return Err(unwritable(format!("{} is not a directory", dir.display())));
    }

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| unwritable(e.to_string()))?;
    {
        let mut writer = csv::Writer::from_writer(&mut temp);
        write(&mut writer).map_err(|e| unwritable(e.to_string()))?;
        writer.flush().map_err(|e| unwritable(e.to_string()))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| unwritable(e.to_string()))?;
    temp.persist(destination)
        .map_err(|e| unwritable(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{create_batch_jobs, JobParams};
    use tempfile::TempDir;

    fn manifest_with_failures(failed_rows: &[usize]) -> Manifest {
        let rows: Vec<JobParams> = (0..3)
            .map(|i| {
                [
                    ("name", format!("item {}", i)),
                    ("note", format!("has, comma \"{}\"", i)),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        let mut manifest = create_batch_jobs(rows, "b", "r").unwrap();
        for job in &mut manifest.jobs {
            job.mark_running().unwrap();
            if failed_rows.contains(&job.row_index) {
                job.mark_failed(format!("row {} broke", job.row_index)).unwrap();
            } else {
                job.mark_succeeded(Vec::new()).unwrap();
            }
        }
        manifest
    }

    fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let header = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn test_export_failed_rows_round_trips_params() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("failed.csv");
        let manifest = manifest_with_failures(&[1]);

        assert_eq!(export_failed_rows(&manifest, &dest).unwrap(), 1);

        let (header, rows) = read_rows(&dest);
        assert_eq!(header, vec!["name", "note"]);
        assert_eq!(rows, vec![vec!["item 1", "has, comma \"1\""]]);
    }

    #[test]
    fn test_export_without_failures_keeps_header() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("failed.csv");
        let manifest = manifest_with_failures(&[]);

        assert_eq!(export_failed_rows(&manifest, &dest).unwrap(), 0);
        let (header, rows) = read_rows(&dest);
        assert_eq!(header, vec!["name", "note"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_export_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_with_failures(&[0]);

        let missing_dir = dir.path().join("nope").join("failed.csv");
        assert!(matches!(
            export_failed_rows(&manifest, &missing_dir),
            Err(BatchError::FileProcessing(_))
        ));

        // A directory in the way of the rename.
        let occupied = dir.path().join("taken");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("child"), "x").unwrap();
        assert!(matches!(
            export_failed_rows(&manifest, &occupied),
            Err(BatchError::FileProcessing(_))
        ));
    }

    #[test]
    fn test_failure_report_columns() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("report.csv");
        let manifest = manifest_with_failures(&[0, 2]);

        assert_eq!(export_failure_report(&manifest, &dest).unwrap(), 2);

        let (header, rows) = read_rows(&dest);
        assert_eq!(
            header,
            vec!["job_id", "row_index", "attempts", "error_message", "name", "note"]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "b-0000");
        assert_eq!(rows[0][2], "1");
        assert_eq!(rows[0][3], "row 0 broke");
        assert_eq!(rows[1][4], "item 2");
    }
}
