//! Test discovery
//!
//! Walks the root directory for manifest files and assembles the suite tree:
//! one suite per subdirectory holding manifests, all children of a root
//! collection named after the root directory. Files directly in the root
//! contribute to the collection itself.

mod manifest;

pub use manifest::Manifest;

use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::models::{SuiteItem, SuiteNode, TreeError};

/// File names picked up as manifests
pub const TEST_FILE_PATTERN: &str = r"(([^.]+[-_]tests?)|(tests?[-_].+))\.(ya?ml)$";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid manifest {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("{path}: {source}")]
    Tree { path: PathBuf, source: TreeError },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

impl LoadError {
    /// Malformed trees stop the run; anything else only drops the file
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Tree { .. } | LoadError::Walk { .. })
    }
}

/// Manifest files under `root`, grouped by directory relative to `root`.
///
/// Directories come in sorted walk order, hidden directories are skipped.
pub fn discover_files(root: &Path) -> Result<Vec<(PathBuf, Vec<PathBuf>)>, LoadError> {
    let pattern = Regex::new(TEST_FILE_PATTERN).map_err(|err| LoadError::Invalid {
        path: root.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut groups: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if !pattern.is_match(file_name) {
            continue;
        }

        let path = entry.into_path();
        let dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        match groups.iter_mut().find(|(d, _)| *d == dir) {
            Some((_, files)) => files.push(path),
            None => groups.push((dir, vec![path])),
        }
    }

    debug!(
        "Discovered {} manifest(s) in {} director(ies)",
        groups.iter().map(|(_, files)| files.len()).sum::<usize>(),
        groups.len()
    );
    Ok(groups)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Top-level items declared by one manifest file
pub fn load_file(path: &Path) -> Result<Vec<SuiteItem>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Manifest::parse(path, &content)?.into_items(path)
}

/// Build the whole tree under `root`.
///
/// Files that fail to load are logged and dropped; only tree construction
/// errors are returned.
pub fn load_root(root: &Path) -> Result<SuiteNode, LoadError> {
    let mut collection = SuiteNode::new(collection_name(root));

    for (dir, files) in discover_files(root)? {
        let mut items = Vec::new();
        for file in &files {
            match load_file(file) {
                Ok(loaded) if loaded.is_empty() => {
                    warn!("No tests discovered in {}", file.display());
                }
                Ok(loaded) => {
                    debug!("Loaded {} item(s) from {}", loaded.len(), file.display());
                    items.push((file, loaded));
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!("Skipping {}: {}", file.display(), err),
            }
        }
        if items.is_empty() {
            continue;
        }

        if dir.as_os_str().is_empty() {
            for (file, loaded) in items {
                add_items(&mut collection, file, loaded)?;
            }
        } else {
            let mut suite = SuiteNode::new(suite_name(&dir));
            for (file, loaded) in items {
                add_items(&mut suite, file, loaded)?;
            }
            let first = files.first().map(PathBuf::as_path).unwrap_or(root);
            add_items(&mut collection, first, vec![suite.into()])?;
        }
    }

    info!(
        "Loaded {} test(s) from {}",
        collection.test_count(),
        root.display()
    );
    Ok(collection)
}

fn add_items(suite: &mut SuiteNode, file: &Path, items: Vec<SuiteItem>) -> Result<(), LoadError> {
    suite.add_items(items).map_err(|source| LoadError::Tree {
        path: file.to_path_buf(),
        source,
    })
}

/// Root collection name: the root directory's own name
fn collection_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(root)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("root")
        .to_string()
}

/// Directory suites are named by their `/`-separated relative path
fn suite_name(dir: &Path) -> String {
    dir.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::executor::Runner;
    use crate::models::Outcome;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const PASSING: &str = "tests:\n  - name: ok\n    command: [\"true\"]\n";

    #[test]
    fn test_file_pattern() {
        let pattern = Regex::new(TEST_FILE_PATTERN).unwrap();
        for name in ["build-tests.yaml", "unit_test.yml", "test_io.yaml", "tests-net.yml"] {
            assert!(pattern.is_match(name), "{name}");
        }
        for name in ["tests.yaml", "build-tests.json", "config.yaml", "testing.yaml"] {
            assert!(!pattern.is_match(name), "{name}");
        }
    }

    #[test]
    fn test_discover_groups_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "top-test.yaml", PASSING);
        write(dir.path(), "b/test_two.yaml", PASSING);
        write(dir.path(), "a/one-tests.yml", PASSING);
        write(dir.path(), "a/notes.yaml", PASSING);
        write(dir.path(), ".hidden/x-test.yaml", PASSING);

        let groups = discover_files(dir.path()).unwrap();
        let dirs: Vec<_> = groups.iter().map(|(d, f)| (d.clone(), f.len())).collect();
        assert_eq!(
            dirs,
            vec![
                (PathBuf::from("a"), 1),
                (PathBuf::from("b"), 1),
                (PathBuf::new(), 1),
            ]
        );
    }

    #[test]
    fn test_load_root_builds_directory_suites() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "top-test.yaml", PASSING);
        write(
            dir.path(),
            "net/http/api-test.yaml",
            "tests:\n  - name: get\n    command: [\"true\"]\n  - name: post\n    command: [\"true\"]\n",
        );

        let root = load_root(dir.path()).unwrap();
        let name = root.name.clone();
        let uids: Vec<String> = root.tests().map(|(uid, _)| uid).collect();
        assert_eq!(
            uids,
            vec![
                format!("{name}/net/http/get"),
                format!("{name}/net/http/post"),
                format!("{name}/ok"),
            ]
        );
        assert!(!root.failfast);
    }

    #[test]
    fn test_broken_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good-test.yaml", PASSING);
        write(dir.path(), "bad-test.yaml", "tests: [not, a, test\n");
        write(dir.path(), "empty-test.yaml", "");

        let root = load_root(dir.path()).unwrap();
        assert_eq!(root.test_count(), 1);
    }

    #[test]
    fn test_duplicate_names_across_files_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a-test.yaml", PASSING);
        write(dir.path(), "b-test.yaml", PASSING);

        let err = load_root(dir.path()).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            LoadError::Tree {
                source: TreeError::DuplicateName { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_loaded_tree_runs() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "suite-test.yaml",
            r#"
fixtures:
  - name: greeting
    kind: variable
    value: hello
tests:
  - name: check
    command: ["sh", "-c", "test \"$ARBORTEST_FIXTURE_GREETING\" = hello"]
    fixtures: [greeting]
  - name: broken
    command: ["false"]
  - name: after
    command: ["true"]
suites:
  - name: main
    items: [check, broken, after]
"#,
        );

        let root = load_root(dir.path()).unwrap();
        let config = RunConfig::new(dir.path());
        let result = Runner::new(&config).run(&root);
        let outcomes: Vec<Outcome> = result.iter_tests().iter().map(|t| t.outcome()).collect();
        assert_eq!(outcomes, vec![Outcome::Pass, Outcome::Fail, Outcome::Skip]);
        assert_eq!(result.outcome(), Outcome::Fail);
    }
}
