use std::borrow::Cow;

use thiserror::Error;

/// Top-level error type returned by the reconciliation engine.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// One or more definition sources could not be parsed.
    #[error("definition parsing failed")]
    Parse(#[from] ParseErrors),

    /// Loaded definitions are internally inconsistent.
    #[error("definition validation failed")]
    Validation(#[from] ValidationError),

    /// The target database could not be reached at all.
    #[error("database connection failed: {message}")]
    Connection { message: String },

    /// Catch-all for conditions that have no dedicated variant.
    #[error("{message}")]
    Other { message: Cow<'static, str> },
}

impl SchemaError {
    /// True when the error occurred before any database mutation could
    /// have been attempted (bad input rather than a bad run).
    pub fn is_input_error(&self) -> bool {
        matches!(self, SchemaError::Parse(_) | SchemaError::Validation(_))
    }
}

/// Parse failures aggregated across every definition source, so a single
/// pass surfaces every defect instead of stopping at the first bad file.
#[derive(Debug, Error)]
#[error("{count} parse error(s) across definition sources", count = .errors.len())]
pub struct ParseErrors {
    pub errors: Vec<ParseIssue>,
}

impl ParseErrors {
    pub fn new<I>(errors: I) -> Self
    where
        I: IntoIterator<Item = ParseIssue>,
    {
        Self {
            errors: errors.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single malformed definition source.
#[derive(Debug, Clone)]
pub struct ParseIssue {
    /// Where the bad input came from (file path, possibly with an array index).
    pub location: String,
    pub detail: String,
}

impl ParseIssue {
    pub fn new(location: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            detail: detail.into(),
        }
    }
}

/// Collection of validation issues found while building a registry.
#[derive(Debug, Error)]
#[error("{count} validation issue(s) in definitions", count = .issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    /// Convenience helper for a single-issue error.
    pub fn single(path: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new([ValidationIssue::new(path, code, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Detailed validation failure for one definition path.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted path to the offending element, e.g. `files.workstation.id`.
    pub path: String,
    /// Stable machine-readable code, e.g. `duplicate_collection`.
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_classified() {
        let parse = SchemaError::from(ParseErrors::new([ParseIssue::new("a.json", "bad")]));
        let validation = SchemaError::from(ValidationError::single("x", "dup", "duplicate"));
        let conn = SchemaError::Connection {
            message: "refused".into(),
        };

        assert!(parse.is_input_error());
        assert!(validation.is_input_error());
        assert!(!conn.is_input_error());
    }

    #[test]
    fn parse_errors_display_counts() {
        let err = ParseErrors::new([
            ParseIssue::new("a.json", "unexpected eof"),
            ParseIssue::new("b.json", "not an object"),
        ]);
        assert_eq!(err.to_string(), "2 parse error(s) across definition sources");
    }
}
