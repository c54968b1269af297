use super::{Extractor, RawResult};
use crate::error::EvaluationError;
use regex::Regex;

/// Reads a named scalar output.
#[derive(Clone, Debug)]
pub struct OutputKey {
    key: String,
}

impl OutputKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Extractor for OutputKey {
    fn extract(&self, raw: &RawResult) -> Result<f64, EvaluationError> {
        raw.output(&self.key).ok_or_else(|| {
            EvaluationError::Extraction(format!(
                "output `{}` missing from result {}",
                self.key, raw.reference
            ))
        })
    }
}

/// Parses a scalar out of the textual log with a regular expression.
///
/// The first capture group of the *last* match is parsed, so a value
/// reported repeatedly (e.g. per SCF cycle) yields the final one.
#[derive(Clone, Debug)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Match `name = <number>` lines, case-insensitively.
    pub fn for_metric(name: &str) -> Result<Self, regex::Error> {
        Self::new(&format!(
            r"(?im)^\s*{}\s*=\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)",
            regex::escape(name)
        ))
    }
}

impl Extractor for Pattern {
    fn extract(&self, raw: &RawResult) -> Result<f64, EvaluationError> {
        let captured = self
            .regex
            .captures_iter(&raw.log)
            .last()
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| {
                EvaluationError::Extraction(format!(
                    "pattern `{}` not found in result {}",
                    self.regex.as_str(),
                    raw.reference
                ))
            })?;

        captured.as_str().parse::<f64>().map_err(|e| {
            EvaluationError::Extraction(format!("cannot parse `{}`: {e}", captured.as_str()))
        })
    }
}
