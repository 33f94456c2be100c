use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::Document;

/// Reads knowledge-base documents exported by the ingestion pipeline as
/// JSON lines. Malformed lines are logged and skipped so one bad record
/// never blocks a reload.
#[derive(Default)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files: usize,
    pub skipped: usize,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    /// Load a single `.jsonl` file or every `.jsonl` file below a directory.
    pub fn load(&self, path: &Path) -> Result<LoadReport> {
        let files = if path.is_dir() { self.list_jsonl_files(path) } else { vec![path.to_path_buf()] };
        if files.is_empty() {
            warn!("No .jsonl files found under {}", path.display());
            return Ok(LoadReport::default());
        }
        let mut report = LoadReport::default();
        for file in &files {
            let content = self.read_file_content(file)?;
            report.files += 1;
            for (line_no, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() { continue; }
                match serde_json::from_str::<Document>(line) {
                    Ok(doc) if doc.id.trim().is_empty() => {
                        warn!(file = %file.display(), line = line_no + 1, "skipping document without id");
                        report.skipped += 1;
                    }
                    Ok(doc) => report.documents.push(doc),
                    Err(e) => {
                        warn!(file = %file.display(), line = line_no + 1, error = %e, "skipping malformed document");
                        report.skipped += 1;
                    }
                }
                if self.limit.is_some_and(|l| report.documents.len() >= l) {
                    info!("Limited to first {} documents", report.documents.len());
                    return Ok(report);
                }
            }
        }
        info!("Loaded {} documents from {} files ({} skipped)", report.documents.len(), report.files, report.skipped);
        Ok(report)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn list_jsonl_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
            .collect();
        files.sort();
        files
    }
}
