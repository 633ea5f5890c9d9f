//! `terraform validate -json` report model.

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
}

/// Parsed result of a validate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, alias = "error_count")]
    pub error_count: usize,
    #[serde(default, alias = "warning_count")]
    pub warning_count: usize,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Parse the stdout of `terraform validate -json`.
    pub fn parse(stdout: &str) -> IacResult<Self> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return Err(IacError::malformed("validate", "empty output"));
        }
        serde_json::from_str(trimmed).map_err(|e| IacError::malformed("validate", e))
    }

    /// An invalid report holding a single error, for runs that never
    /// produced a JSON report.
    pub fn failed(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_count: 1,
            warning_count: 0,
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                summary: summary.into(),
                detail: detail.into(),
            }],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    /// One line per diagnostic, for logs and stderr of failure outcomes.
    pub fn summary(&self) -> String {
        self.diagnostics
            .iter()
            .map(|d| {
                let level = match d.severity {
                    Severity::Error => "Error",
                    Severity::Warning => "Warning",
                };
                if d.detail.is_empty() {
                    format!("{}: {}", level, d.summary)
                } else {
                    format!("{}: {}: {}", level, d.summary, d.detail)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVALID: &str = r#"{
      "format_version": "1.0",
      "valid": false,
      "error_count": 1,
      "warning_count": 1,
      "diagnostics": [
        {
          "severity": "error",
          "summary": "Unsupported argument",
          "detail": "An argument named \"foo\" is not expected here.",
          "range": {"filename": "main.tf", "start": {"line": 3}}
        },
        {"severity": "warning", "summary": "Deprecated attribute"}
      ]
    }"#;

    #[test]
    fn test_parse_terraform_report() {
        let report = ValidationReport::parse(INVALID).unwrap();

        assert!(!report.valid);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(report.diagnostics[1].detail, "");
    }

    #[test]
    fn test_parse_valid_report() {
        let report = ValidationReport::parse(
            r#"{"format_version":"1.0","valid":true,"error_count":0,"warning_count":0,"diagnostics":[]}"#,
        )
        .unwrap();
        assert!(report.valid);
        assert!(report.summary().is_empty());
    }

    #[test]
    fn test_summary_lines() {
        let report = ValidationReport::parse(INVALID).unwrap();
        let summary = report.summary();

        assert!(summary.starts_with("Error: Unsupported argument: An argument"));
        assert!(summary.ends_with("Warning: Deprecated attribute"));
    }

    #[test]
    fn test_failed_report() {
        let report = ValidationReport::failed("Initialization failed", "Error: no such module");

        assert!(!report.valid);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors().count(), 1);
        assert_eq!(
            report.summary(),
            "Error: Initialization failed: Error: no such module"
        );
    }

    #[test]
    fn test_malformed_output() {
        assert!(matches!(
            ValidationReport::parse("Success! The configuration is valid."),
            Err(IacError::MalformedOutput { .. })
        ));
        assert!(ValidationReport::parse("   ").is_err());
    }
}
