#![forbid(unsafe_code)]

//! Operator-facing summary printed after every batch.

use crate::model::BatchResult;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Error lines shown verbatim before the rest are collapsed into a count.
pub const SHOWN_ERRORS: usize = 5;
const RULE_WIDTH: usize = 50;

/// `subject` names what was downloaded, e.g. `@alice` or a list file name.
pub fn render_summary(result: &BatchResult, subject: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Download Summary for {subject}");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Successfully downloaded: {}", result.succeeded_count);
    let _ = writeln!(out, "Failed downloads: {}", result.failed_count);
    if let Some(aborted) = &result.aborted {
        let _ = writeln!(out, "Batch stopped early: {aborted}");
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors encountered:");
        for error in result.errors.iter().take(SHOWN_ERRORS) {
            let _ = writeln!(out, "  - {error}");
        }
        let hidden = result.errors.len().saturating_sub(SHOWN_ERRORS);
        if hidden > 0 {
            let _ = writeln!(out, "  ... and {hidden} more errors");
        }
    }
    let _ = writeln!(out, "{rule}");
    out
}

pub fn write_summary(out: &mut impl Write, result: &BatchResult, subject: &str) -> io::Result<()> {
    out.write_all(render_summary(result, subject).as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BatchAbort;

    #[test]
    fn summary_lists_counts_without_errors() {
        let result = BatchResult {
            succeeded_count: 3,
            ..BatchResult::default()
        };
        let text = render_summary(&result, "@alice");
        assert!(text.contains("Download Summary for @alice"));
        assert!(text.contains("Successfully downloaded: 3"));
        assert!(text.contains("Failed downloads: 0"));
        assert!(!text.contains("Errors encountered"));
        assert!(text.starts_with(&"=".repeat(50)));
    }

    #[test]
    fn summary_truncates_after_five_errors() {
        let result = BatchResult {
            succeeded_count: 1,
            failed_count: 7,
            errors: (1..=7).map(|n| format!("error {n}")).collect(),
            aborted: None,
        };
        let text = render_summary(&result, "@alice");
        assert!(text.contains("  - error 5"));
        assert!(!text.contains("error 6"));
        assert!(text.contains("  ... and 2 more errors"));
    }

    #[test]
    fn summary_mentions_abort() {
        let result = BatchResult {
            succeeded_count: 2,
            aborted: Some(BatchAbort::EngineUnavailable("yt-dlp missing".into())),
            ..BatchResult::default()
        };
        let mut buffer = Vec::new();
        write_summary(&mut buffer, &result, "urls.txt").unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("Batch stopped early: engine unavailable: yt-dlp missing"));
    }
}
