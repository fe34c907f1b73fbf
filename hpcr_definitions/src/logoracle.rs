//! Console-log token parsing (C6): decides whether a guest has started,
//! failed, or is still booting.
//!
//! Token grammar is defined directly by spec §4.6; the real token parser
//! lives in the `terraform-provider-hpcr` dependency, not present in this
//! retrieval pack, so this is a from-scratch implementation against the
//! documented regexes.

use regex::Regex;

const STARTED_LITERAL: &str = "VSI has started successfully";
const STARTED_TOKEN: &str = "HPL10001I";

/// Classification produced by scanning a console log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOutcome {
    pub started: bool,
    pub failed: bool,
}

impl LogOutcome {
    /// Scans `log` line by line (trimmed) for success/error tokens.
    pub fn scan(log: &str) -> LogOutcome {
        let success_re = Regex::new(r"HPL\d+I").expect("valid regex");
        let error_re = Regex::new(r"HPL\d+E").expect("valid regex");

        let mut started = false;
        let mut failed = false;

        for raw_line in log.lines() {
            let line = raw_line.trim();
            if error_re.is_match(line) {
                failed = true;
            }
            if success_re.is_match(line) && (line.contains(STARTED_TOKEN) || line.contains(STARTED_LITERAL)) {
                started = true;
            }
            if line.contains(STARTED_LITERAL) {
                started = true;
            }
        }

        LogOutcome { started, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESSFUL_LOG: &str = include_str!("../tests/fixtures/successful_log.txt");
    const FAILURE_LOG: &str = include_str!("../tests/fixtures/failure_log.txt");

    #[test]
    fn successful_log_reports_started_only() {
        let outcome = LogOutcome::scan(SUCCESSFUL_LOG);
        assert!(outcome.started);
        assert!(!outcome.failed);
    }

    #[test]
    fn failure_log_reports_failed_and_not_started() {
        let outcome = LogOutcome::scan(FAILURE_LOG);
        assert!(outcome.failed);
        assert!(!outcome.started);
    }
}
