use anyhow::{Context, Result};
use regex::Regex;

use crate::errors::PipelineError;

/// Sentinel recorded when a scraped field carries no base identifier.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Extracts the `mvp_<version>_<sequence>` key that joins files, UUIDs and
/// spreadsheet rows. Every component derives identifiers through this type.
#[derive(Debug, Clone)]
pub struct IdentifierMatcher {
    pattern: Regex,
}

impl IdentifierMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"mvp_[\d.]+_\d+")
                .context("failed to compile base identifier regex")?,
        })
    }

    pub fn extract<'a>(&self, input: &'a str) -> Result<&'a str, PipelineError> {
        self.pattern
            .find(input)
            .map(|m| m.as_str())
            .ok_or_else(|| PipelineError::NotFound {
                input: input.to_string(),
            })
    }

    pub fn extract_or_unknown<'a>(&self, input: &'a str) -> &'a str {
        self.extract(input).unwrap_or(UNKNOWN_IDENTIFIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> IdentifierMatcher {
        IdentifierMatcher::new().expect("identifier regex should compile")
    }

    #[test]
    fn extracts_identifier_embedded_in_filenames() {
        let matcher = matcher();
        assert_eq!(matcher.extract("mvp_1.2_003").ok(), Some("mvp_1.2_003"));
        assert_eq!(
            matcher.extract("scan_mvp_1.2_003_transcript").ok(),
            Some("mvp_1.2_003")
        );
        assert_eq!(
            matcher.extract("box4-mvp_10.25_117.final").ok(),
            Some("mvp_10.25_117")
        );
    }

    #[test]
    fn extracts_first_identifier_from_scraped_text() {
        let matcher = matcher();
        let field = "Identifier: mvp_2.1_044, legacy mvp_2.1_045";
        assert_eq!(matcher.extract(field).ok(), Some("mvp_2.1_044"));
    }

    #[test]
    fn signals_not_found_for_non_matching_input() {
        let matcher = matcher();
        for input in ["", "mvp__001", "mvp_1.2_", "MVP_1.2_003", "transcript.pdf"] {
            let err = matcher.extract(input).expect_err("no identifier expected");
            assert!(matches!(err, PipelineError::NotFound { .. }), "{input}");
        }
    }

    #[test]
    fn extract_or_unknown_substitutes_sentinel() {
        let matcher = matcher();
        assert_eq!(matcher.extract_or_unknown("no id here"), UNKNOWN_IDENTIFIER);
        assert_eq!(matcher.extract_or_unknown("x mvp_3_9 y"), "mvp_3_9");
    }
}
