//! Results storage and retrieval
//!
//! Persists the result tree of a run as a JSON snapshot that the `rerun`
//! command reads back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{Outcome, SuiteResult};
use crate::output::flatten;

/// Stored run containing the full result tree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    /// Unique run ID
    pub id: String,

    /// Timestamp when the run started
    pub started_at: DateTime<Utc>,

    /// Timestamp when the run completed
    pub completed_at: DateTime<Utc>,

    /// Directory tests were discovered from
    pub root_dir: PathBuf,

    /// Environment info
    pub environment: EnvironmentInfo,

    /// Result tree
    pub result: SuiteResult,
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Tool version
    pub tool_version: String,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    /// Wrap a finished result tree
    pub fn new(root_dir: impl Into<PathBuf>, started_at: DateTime<Utc>, result: SuiteResult) -> Self {
        Self {
            id: generate_run_id(),
            started_at,
            completed_at: Utc::now(),
            root_dir: root_dir.into(),
            environment: EnvironmentInfo::default(),
            result,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.result.outcome()
    }

    /// UIDs of flattened suites whose outcome was FAIL or ERROR
    pub fn failed_suite_uids(&self) -> Vec<String> {
        flatten(&self.result)
            .into_iter()
            .filter(|suite| matches!(suite.outcome(), Outcome::Fail | Outcome::Error))
            .map(|suite| suite.uid.to_string())
            .collect()
    }

    /// UIDs of the direct tests of every failed flattened suite.
    ///
    /// Nested suites of a failed suite are not included; they are targets
    /// only when they failed themselves.
    pub fn rerun_targets(&self) -> Vec<String> {
        flatten(&self.result)
            .into_iter()
            .filter(|suite| matches!(suite.outcome(), Outcome::Fail | Outcome::Error))
            .flat_map(|suite| suite.tests.into_iter().map(|test| test.uid.clone()))
            .collect()
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Snapshot file
    path: PathBuf,
}

impl ResultsStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Save a run, replacing the previous snapshot
    pub fn save(&self, run: &StoredRun) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = File::create(&self.path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved test results to {}", self.path.display());
        Ok(())
    }

    /// Load the last saved run
    pub fn load(&self) -> Result<StoredRun> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open results file: {}", self.path.display()))?;
        let reader = BufReader::new(file);

        let run: StoredRun = serde_json::from_reader(reader).context("Failed to parse results")?;

        debug!("Loaded test results from {}", self.path.display());
        Ok(run)
    }

    /// Export run to a file
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record(["uid", "name", "outcome", "elapsed_ms", "reason"])?;

                for test in run.result.iter_tests() {
                    writer.write_record([
                        test.uid.clone(),
                        test.name.clone(),
                        test.outcome().to_string(),
                        test.elapsed.as_millis().to_string(),
                        test.reason.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Export format
#[derive(Clone, Copy, Debug)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResultNode, TestResult};

    fn test(name: &str, parent: &str, outcome: Outcome) -> ResultNode {
        let mut result = TestResult::new(name, format!("{parent}/{name}"));
        result.set_outcome(outcome);
        ResultNode::Test(result)
    }

    fn sample() -> SuiteResult {
        let mut good = SuiteResult::new("good", "root/good");
        good.push(test("a", "root/good", Outcome::Pass));
        let mut bad = SuiteResult::new("bad", "root/group/bad");
        bad.push(test("b", "root/group/bad", Outcome::Pass));
        bad.push(test("c", "root/group/bad", Outcome::Fail));
        let mut broken = SuiteResult::new("broken", "root/group/broken");
        broken.push(test("d", "root/group/broken", Outcome::Error));
        let mut group = SuiteResult::new("group", "root/group");
        group.push(ResultNode::Suite(bad));
        group.push(ResultNode::Suite(broken));

        let mut root = SuiteResult::new("root", "root");
        root.push(ResultNode::Suite(good));
        root.push(ResultNode::Suite(group));
        root
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert_eq!(id.len(), "20240101_120000_0000".len());
    }

    #[test]
    fn test_failed_suite_uids() {
        let run = StoredRun::new(".", Utc::now(), sample());
        assert_eq!(
            run.failed_suite_uids(),
            vec!["root/group/bad".to_string(), "root/group/broken".to_string()]
        );
        assert_eq!(run.outcome(), Outcome::Error);
    }

    #[test]
    fn test_rerun_targets_exclude_nested_suites() {
        let mut nested = SuiteResult::new("slow", "root/bad/slow");
        nested.push(test("s", "root/bad/slow", Outcome::Pass));
        let mut bad = SuiteResult::new("bad", "root/bad");
        bad.push(test("a", "root/bad", Outcome::Pass));
        bad.push(ResultNode::Suite(nested));
        bad.push(test("b", "root/bad", Outcome::Fail));
        let mut root = SuiteResult::new("root", "root");
        root.push(ResultNode::Suite(bad));

        let run = StoredRun::new(".", Utc::now(), root);
        assert_eq!(
            run.rerun_targets(),
            vec!["root/bad/a".to_string(), "root/bad/b".to_string()]
        );

        let run = StoredRun::new(".", Utc::now(), sample());
        assert_eq!(
            run.rerun_targets(),
            vec![
                "root/group/bad/b".to_string(),
                "root/group/bad/c".to_string(),
                "root/group/broken/d".to_string(),
            ]
        );
    }

    #[test]
    fn test_save_and_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path().join("out/results.json"));
        assert!(!storage.exists());

        let run = StoredRun::new(dir.path(), Utc::now(), sample());
        storage.save(&run).unwrap();
        let loaded = storage.load().unwrap();

        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.result.iter_tests().len(), 4);
        assert_eq!(loaded.failed_suite_uids(), run.failed_suite_uids());
    }

    #[test]
    fn test_load_missing_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path().join("results.json"));
        assert!(storage.load().is_err());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let storage = ResultsStorage::new(dir.path().join("results.json"));
        let run = StoredRun::new(".", Utc::now(), sample());

        storage.export(&run, &path, ExportFormat::Csv).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("uid,name,outcome,elapsed_ms,reason"));
        assert_eq!(lines.next(), Some("root/good/a,a,PASS,0,"));
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn test_export_format() {
        assert!(matches!(
            ExportFormat::from_extension(Path::new("out.CSV")),
            Some(ExportFormat::Csv)
        ));
        assert!(ExportFormat::from_str("xml").is_none());
    }
}
