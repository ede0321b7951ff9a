//! Build-output classification.
//!
//! The build gate has a deliberately simple contract with the external build
//! tool: a literal marker substring in the captured pane text signals success
//! or failure. The matcher keeps that contract pluggable so a different build
//! tool only means different markers, never controller changes.

use anyhow::{Context, Result};
use regex::Regex;
use strip_ansi_escapes::strip;

/// Classification of one pane's captured text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Neither marker seen yet.
    Pending,
    /// Success marker present (and no failure marker).
    Success,
    /// Failure marker present; takes precedence over success.
    Failure,
}

/// Success/failure predicate over captured pane text.
#[derive(Debug, Clone)]
pub struct OutputMatcher {
    success: Regex,
    failure: Regex,
}

impl OutputMatcher {
    /// Matcher for literal marker substrings (the common case).
    pub fn literal(success: &str, failure: &str) -> Result<Self> {
        Self::pattern(&regex::escape(success), &regex::escape(failure))
    }

    /// Matcher for arbitrary regex patterns.
    pub fn pattern(success: &str, failure: &str) -> Result<Self> {
        Ok(Self {
            success: Regex::new(success)
                .with_context(|| format!("invalid success pattern: {success}"))?,
            failure: Regex::new(failure)
                .with_context(|| format!("invalid failure pattern: {failure}"))?,
        })
    }

    /// Classify captured text. ANSI escapes are stripped first so colorized
    /// build output still matches.
    pub fn classify(&self, captured: &str) -> Verdict {
        let stripped = strip(captured.as_bytes());
        let text = String::from_utf8_lossy(&stripped);
        if self.failure.is_match(&text) {
            Verdict::Failure
        } else if self.success.is_match(&text) {
            Verdict::Success
        } else {
            Verdict::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maven_matcher() -> OutputMatcher {
        OutputMatcher::literal("BUILD SUCCESS", "ERROR").unwrap()
    }

    #[test]
    fn no_marker_is_pending() {
        let m = maven_matcher();
        assert_eq!(m.classify("[INFO] Compiling 42 sources"), Verdict::Pending);
        assert_eq!(m.classify(""), Verdict::Pending);
    }

    #[test]
    fn success_marker_is_success() {
        let m = maven_matcher();
        assert_eq!(
            m.classify("[INFO] ------\n[INFO] BUILD SUCCESS\n[INFO] ------"),
            Verdict::Success
        );
    }

    #[test]
    fn failure_marker_wins_over_success() {
        let m = maven_matcher();
        assert_eq!(
            m.classify("[ERROR] compilation failed\nBUILD SUCCESS"),
            Verdict::Failure
        );
    }

    #[test]
    fn colorized_output_still_matches() {
        let m = maven_matcher();
        let colored = "\u{1b}[1;32mBUILD\u{1b}[0m \u{1b}[1;32mSUCCESS\u{1b}[0m";
        assert_eq!(m.classify(colored), Verdict::Success);
    }

    #[test]
    fn literal_markers_are_escaped() {
        let m = OutputMatcher::literal("done (ok)", "fail [hard]").unwrap();
        assert_eq!(m.classify("done (ok)"), Verdict::Success);
        assert_eq!(m.classify("fail [hard]"), Verdict::Failure);
        assert_eq!(m.classify("done ok"), Verdict::Pending);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(OutputMatcher::pattern("(unclosed", "x").is_err());
    }
}
