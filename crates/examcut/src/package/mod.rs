//! Manifest construction and (behind the `package` feature) ZIP assembly.
//! ZIP packaging itself is treated as a collaborator: given a directory of
//! files, emit an archive.

use crate::types::JobStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestProblem {
    pub number: u32,
    pub file: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestColumn {
    pub column: u32,
    pub problems: Vec<ManifestProblem>,
    pub missing: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestPage {
    pub page: u32,
    pub columns: Vec<ManifestColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestError {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub job_id: String,
    pub pages: Vec<ManifestPage>,
    pub status: JobStatus,
    pub errors: Vec<ManifestError>,
}

impl Manifest {
    pub fn write_to_dir(&self, dir: &Path) -> crate::error::Result<PathBuf> {
        let path = dir.join("manifest.json");
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(&path, body).map_err(|e| crate::error::ExamCutError::Io { path: path.clone(), source: e })?;
        Ok(path)
    }
}

pub trait ZipPackager: Send + Sync {
    fn package(&self, dir: &Path, archive_path: &Path) -> crate::error::Result<PathBuf>;
}

#[cfg(feature = "package")]
pub use zip_backend::DefaultZipPackager;

#[cfg(feature = "package")]
mod zip_backend {
    use super::*;
    use crate::error::ExamCutError;
    use std::fs::File;
    use std::io::Write;
    use walkdir::WalkDir;
    use zip::write::SimpleFileOptions;

    #[derive(Default)]
    pub struct DefaultZipPackager;

    impl ZipPackager for DefaultZipPackager {
        fn package(&self, dir: &Path, archive_path: &Path) -> crate::error::Result<PathBuf> {
            let file = File::create(archive_path)
                .map_err(|e| ExamCutError::Io { path: archive_path.to_path_buf(), source: e })?;
            let mut writer = zip::ZipWriter::new(file);
            let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

            let mut entries: Vec<PathBuf> = WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            entries.sort();

            for entry in entries {
                let relative = entry.strip_prefix(dir).unwrap_or(&entry);
                let name = relative.to_string_lossy().replace('\\', "/");
                writer.start_file(name, options).map_err(|e| ExamCutError::Packaging {
                    message: "failed to start zip entry".into(),
                    source: Some(Box::new(e)),
                })?;
                let bytes = std::fs::read(&entry).map_err(|e| ExamCutError::Io { path: entry.clone(), source: e })?;
                writer.write_all(&bytes).map_err(|e| ExamCutError::Io { path: entry.clone(), source: e })?;
            }

            writer.finish().map_err(|e| ExamCutError::Packaging {
                message: "failed to finalize zip archive".into(),
                source: Some(Box::new(e)),
            })?;
            Ok(archive_path.to_path_buf())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = Manifest {
            job_id: "job-1".into(),
            pages: vec![ManifestPage {
                page: 0,
                columns: vec![ManifestColumn {
                    column: 0,
                    problems: vec![ManifestProblem { number: 1, file: "p.png".into(), source: "local".into() }],
                    missing: vec![],
                }],
            }],
            status: JobStatus::Ok,
            errors: vec![],
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.job_id, "job-1");
    }

    #[cfg(feature = "package")]
    #[test]
    fn write_to_dir_creates_manifest_json() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = Manifest { job_id: "job-2".into(), pages: vec![], status: JobStatus::Partial, errors: vec![] };
        let path = manifest.write_to_dir(tmp.path()).unwrap();
        assert!(path.exists());
    }
}
