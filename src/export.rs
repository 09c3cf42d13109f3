use crate::error::BackupError;
use crate::model::Bundle;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

/// `backup_{year without "-"}_{term without " "}_{timestamp}.json`
pub fn export_file_name(bundle: &Bundle) -> String {
    format!(
        "backup_{}_{}_{}.json",
        bundle.academic_year.replace('-', ""),
        bundle.term.as_str().replace(' ', ""),
        bundle.timestamp
    )
}

/// Pretty-prints the payload only; envelope fields stay out of the body.
pub fn render_artifact(bundle: &Bundle) -> Result<ExportArtifact, BackupError> {
    let Some(data) = bundle.data.as_ref() else {
        return Err(BackupError::NoData(bundle.id.clone()));
    };
    let body = serde_json::to_string_pretty(data).unwrap_or_default();
    Ok(ExportArtifact {
        file_name: export_file_name(bundle),
        body,
    })
}

/// Staging file that is removed unless explicitly persisted.
struct StagedFile {
    path: PathBuf,
    persisted: bool,
}

impl StagedFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!(".{}.staging", Uuid::new_v4())),
            persisted: false,
        }
    }

    fn persist(mut self, dst: &Path) -> anyhow::Result<()> {
        std::fs::rename(&self.path, dst).with_context(|| {
            format!(
                "failed to move staged export to {}",
                dst.to_string_lossy()
            )
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Writes the artifact into `out_dir` under its own file name.
///
/// The body is staged to a hidden file in the same directory and renamed
/// into place once flushed; the staging file is removed on every failure.
pub fn write_artifact(out_dir: &Path, artifact: &ExportArtifact) -> anyhow::Result<ExportSummary> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.to_string_lossy()))?;

    let dst = out_dir.join(&artifact.file_name);
    let staged = StagedFile::new(out_dir);
    {
        let mut f = File::create(&staged.path).with_context(|| {
            format!(
                "failed to create staging file {}",
                staged.path.to_string_lossy()
            )
        })?;
        f.write_all(artifact.body.as_bytes())
            .context("failed to write export body")?;
        f.flush().context("failed to flush export body")?;
    }
    staged.persist(&dst)?;

    let digest = Sha256::digest(artifact.body.as_bytes());
    Ok(ExportSummary {
        path: dst,
        bytes: artifact.body.len(),
        sha256: format!("{digest:x}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn bundle(data: Option<serde_json::Value>) -> Bundle {
        Bundle {
            id: "b1".to_string(),
            school_id: "s1".to_string(),
            term: Term::Term1,
            academic_year: "2023-2024".to_string(),
            timestamp: 1_700_000_000_000,
            data,
        }
    }

    #[test]
    fn file_name_strips_separators() {
        assert_eq!(
            export_file_name(&bundle(None)),
            "backup_20232024_Term1_1700000000000.json"
        );
    }

    #[test]
    fn body_is_the_pretty_printed_payload_only() {
        let artifact = render_artifact(&bundle(Some(json!({
            "students": [{ "id": "s1" }],
            "notices": []
        }))))
        .expect("render");
        assert_eq!(
            artifact.body,
            "{\n  \"students\": [\n    {\n      \"id\": \"s1\"\n    }\n  ],\n  \"notices\": []\n}"
        );
        assert!(!artifact.body.contains("academicYear"));
        assert!(!artifact.body.contains("schoolId"));
    }

    #[test]
    fn missing_payload_is_no_data() {
        assert_eq!(
            render_artifact(&bundle(None)),
            Err(BackupError::NoData("b1".to_string()))
        );
    }

    #[test]
    fn write_leaves_only_the_named_artifact() {
        let dir = temp_dir("snapshotd-export");
        let artifact = render_artifact(&bundle(Some(json!({ "students": [] })))).expect("render");
        let summary = write_artifact(&dir, &artifact).expect("write");

        assert_eq!(summary.path, dir.join("backup_20232024_Term1_1700000000000.json"));
        assert_eq!(std::fs::read_to_string(&summary.path).expect("read"), artifact.body);
        assert_eq!(summary.bytes, artifact.body.len());
        assert_eq!(summary.sha256.len(), 64);

        let entries: Vec<_> = std::fs::read_dir(&dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec![artifact.file_name.clone()]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_write_removes_the_staging_file() {
        let dir = temp_dir("snapshotd-export-fail");
        let artifact = render_artifact(&bundle(Some(json!({})))).expect("render");
        // A directory in the way makes the final rename fail.
        std::fs::create_dir_all(dir.join(&artifact.file_name).join("occupied")).expect("blocker");

        assert!(write_artifact(&dir, &artifact).is_err());
        let staging_left = std::fs::read_dir(&dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(".staging"));
        assert!(!staging_left);

        let _ = std::fs::remove_dir_all(dir);
    }
}
