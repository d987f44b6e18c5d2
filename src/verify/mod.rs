//! Output verifiers
//!
//! Compare what a command printed against a reference file, ignoring lines
//! that match any of a set of patterns.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Matches captured stdout against a reference file
#[derive(Clone, Debug)]
pub struct StdoutMatcher {
    reference: PathBuf,
    ignore: Vec<Regex>,
}

impl StdoutMatcher {
    pub fn new(reference: impl Into<PathBuf>, ignore: &[String]) -> Result<Self> {
        let ignore = ignore
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("Invalid ignore pattern: {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            reference: reference.into(),
            ignore,
        })
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    /// `None` when the output matches, otherwise a line diff
    pub fn check(&self, actual: &str) -> Result<Option<String>> {
        let expected = std::fs::read_to_string(&self.reference).with_context(|| {
            format!("Reference file {} does not exist", self.reference.display())
        })?;

        let expected = self.filter(&expected);
        let actual = self.filter(actual);
        if expected == actual {
            return Ok(None);
        }
        Ok(Some(line_diff(&expected, &actual)))
    }

    /// Lines that do not start with a match of an ignore pattern
    fn filter<'t>(&self, text: &'t str) -> Vec<&'t str> {
        text.lines()
            .filter(|line| {
                !self
                    .ignore
                    .iter()
                    .any(|re| re.find(line).is_some_and(|m| m.start() == 0))
            })
            .collect()
    }
}

/// Render a minimal diff: `-` for expected-only lines, `+` for actual-only
pub fn line_diff(expected: &[&str], actual: &[&str]) -> String {
    let (n, m) = (expected.len(), actual.len());
    // lcs[i][j] = length of the longest common subsequence of expected[i..], actual[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if expected[i] == actual[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::new();
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && expected[i] == actual[j] {
            out.push_str(&format!(" {}\n", expected[i]));
            i += 1;
            j += 1;
        } else if j < m && (i == n || lcs[i][j + 1] >= lcs[i + 1][j]) {
            out.push_str(&format!("+{}\n", actual[j]));
            j += 1;
        } else {
            out.push_str(&format!("-{}\n", expected[i]));
            i += 1;
        }
    }
    out
}
