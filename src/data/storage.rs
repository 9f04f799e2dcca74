//! Spreadsheet storage writers.

use crate::core::SpreadsheetRenderer;
use crate::error::ScanError;
use async_trait::async_trait;
use std::path::PathBuf;

/// A writer producing the companion spreadsheet as a CSV file.
#[cfg(feature = "storage_csv")]
pub struct CsvSpreadsheet {
    path: PathBuf,
}

#[cfg(feature = "storage_csv")]
impl CsvSpreadsheet {
    /// Write to the given path; parent directories are created on demand.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[cfg(not(feature = "storage_csv"))]
pub struct CsvSpreadsheet;

#[cfg(not(feature = "storage_csv"))]
impl CsvSpreadsheet {
    pub fn new(_path: PathBuf) -> Self {
        Self
    }
}

#[async_trait]
impl SpreadsheetRenderer for CsvSpreadsheet {
    async fn render_spreadsheet(
        &mut self,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), ScanError> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = (headers, rows);
            return Err(ScanError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| ScanError::Export(e.to_string()))?;
                }
            }
            let mut writer = csv::Writer::from_path(&self.path)
                .map_err(|e| ScanError::Export(e.to_string()))?;
            writer
                .write_record(headers)
                .map_err(|e| ScanError::Export(e.to_string()))?;
            for row in rows {
                writer
                    .write_record(row)
                    .map_err(|e| ScanError::Export(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| ScanError::Export(e.to_string()))?;
            tracing::info!(path = %self.path.display(), rows = rows.len(), "spreadsheet written");
            Ok(())
        }
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut sheet = CsvSpreadsheet::new(path.clone());

        let headers = vec!["Date".to_string(), "Time (s)".to_string(), "Channel 1".to_string()];
        let rows = vec![
            vec!["2024-01-01 10:00:00".to_string(), "0.00".to_string(), "20.1000".to_string()],
            vec!["2024-01-01 10:00:01".to_string(), "1.00".to_string(), String::new()],
        ];
        sheet.render_spreadsheet(&headers, &rows).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "Date,Time (s),Channel 1");
        assert!(contents.contains("20.1000"));
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("data.csv");
        let mut sheet = CsvSpreadsheet::new(path.clone());
        sheet
            .render_spreadsheet(&["A".to_string()], &[vec!["1".to_string()]])
            .await
            .unwrap();
        assert!(path.exists());
    }
}
