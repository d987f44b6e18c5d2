//! Console formatters for test results
//!
//! Provides table, JSON and summary renderings of a result tree.

use crate::models::{Outcome, SuiteResult};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

const FALLBACK_WIDTH: usize = 80;

/// Width of the attached terminal, or 80 columns
pub fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => FALLBACK_WIDTH,
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
    verbose: u8,
    width: Option<usize>,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
            verbose: 0,
            width: None,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Show failure reasons from verbosity 1 upwards
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Fix the separator width instead of asking the terminal
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    fn width(&self) -> usize {
        self.width.unwrap_or_else(terminal_width)
    }

    /// Format a result tree
    pub fn format(&self, result: &SuiteResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Summary => self.format_brief(result),
        }
    }

    fn paint(&self, outcome: Outcome, text: &str) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let code = match outcome {
            Outcome::Pass => "32",
            Outcome::Xfail => "36",
            Outcome::Skip => "33",
            Outcome::Error | Outcome::Fail => "31",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn separator(&self, fill: char) -> String {
        fill.to_string().repeat(self.width())
    }

    fn format_table(&self, result: &SuiteResult) -> String {
        let mut output = String::new();
        let label_width = Outcome::ALL
            .iter()
            .map(|o| o.label().len())
            .max()
            .unwrap_or(0);

        for test in result.iter_tests() {
            let outcome = test.outcome();
            let label = format!("{} {:<label_width$}", outcome.symbol(), outcome.label());
            output.push_str(&format!(
                "{} {} [{}ms]\n",
                self.paint(outcome, &label),
                test.uid,
                test.elapsed.as_millis()
            ));
            if self.verbose >= 1 {
                if let Some(reason) = &test.reason {
                    for line in reason.lines() {
                        output.push_str(&format!("      {line}\n"));
                    }
                }
            }
        }

        output.push_str(&self.separator('='));
        output.push('\n');

        let counts = result.counts();
        let count_width = counts
            .iter()
            .map(|(_, n)| n.to_string().len())
            .max()
            .unwrap_or(1);
        for (outcome, count) in counts {
            let row = format!("{:<label_width$}  {:>count_width$}", outcome.label(), count);
            if count > 0 {
                output.push_str(&self.paint(outcome, &row));
            } else {
                output.push_str(&row);
            }
            output.push('\n');
        }

        output.push_str(&self.separator('-'));
        output.push('\n');
        let outcome = result.outcome();
        output.push_str(&format!(
            "{} {} in {:.2}s\n",
            result.name,
            self.paint(outcome, outcome.label()),
            result.elapsed.as_secs_f64()
        ));

        output
    }

    fn format_brief(&self, result: &SuiteResult) -> String {
        let counts: Vec<String> = result
            .counts()
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(o, n)| format!("{} {}", n, o.label().to_lowercase()))
            .collect();
        format!(
            "{}: {} - {} tests ({}) in {}ms",
            result.name,
            result.outcome(),
            result.iter_tests().len(),
            counts.join(", "),
            result.elapsed.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResultNode, TestResult};

    fn sample() -> SuiteResult {
        let mut root = SuiteResult::new("root", "root");
        let mut passed = TestResult::new("a", "root/a");
        passed.set_outcome(Outcome::Pass);
        let mut failed = TestResult::new("b", "root/b");
        failed.fail("expected 1, got 2");
        root.push(ResultNode::Test(passed));
        root.push(ResultNode::Test(failed));
        root
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("JSON-PRETTY"), Some(OutputFormat::JsonPretty));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn test_table_lines_and_counts() {
        let formatter = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .with_width(20);
        let output = formatter.format(&sample());
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines[0], "✓ PASS  root/a [0ms]");
        assert_eq!(lines[1], "✗ FAIL  root/b [0ms]");
        assert_eq!(lines[2], "=".repeat(20));
        assert_eq!(
            &lines[3..8],
            &["PASS   1", "XFAIL  0", "SKIP   0", "ERROR  0", "FAIL   1"]
        );
        assert_eq!(lines[8], "-".repeat(20));
        assert!(lines[9].starts_with("root FAIL"));
        assert!(!output.contains("expected 1"));
    }

    #[test]
    fn test_reasons_shown_when_verbose() {
        let formatter = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .with_verbose(1)
            .with_width(10);
        let output = formatter.format(&sample());
        assert!(output.contains("      expected 1, got 2\n"));
    }

    #[test]
    fn test_colorized_labels() {
        let formatter = ResultFormatter::new(OutputFormat::Table).with_width(10);
        let output = formatter.format(&sample());
        assert!(output.contains("\x1b[31m✗ FAIL \x1b[0m"));
    }

    #[test]
    fn test_summary_and_json() {
        let summary = ResultFormatter::new(OutputFormat::Summary).format(&sample());
        assert_eq!(summary, "root: FAIL - 2 tests (1 pass, 1 fail) in 0ms");

        let json = ResultFormatter::new(OutputFormat::Json).format(&sample());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["children"][1]["outcome"], "FAIL");
        assert_eq!(value["children"][1]["kind"], "test");
    }
}
