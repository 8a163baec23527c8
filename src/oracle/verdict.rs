use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleFinding {
    pub severity: FindingSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl OracleFinding {
    pub fn new(severity: FindingSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub passed: bool,
    pub confidence: Confidence,
    pub findings: Vec<OracleFinding>,
    pub summary: String,
}

impl OracleVerdict {
    /// Low-confidence passes are treated as failed for gating purposes, even
    /// though the verdict itself is recorded verbatim.
    pub fn gates_as_passed(&self) -> bool {
        self.passed && self.confidence != Confidence::Low
    }

    pub fn timed_out(scope: &str) -> Self {
        Self {
            passed: false,
            confidence: Confidence::Low,
            findings: vec![OracleFinding::new(
                FindingSeverity::Error,
                format!("verification of '{scope}' did not complete within the allotted time"),
            )],
            summary: "oracle timed out".to_string(),
        }
    }

    pub fn unparseable(scope: &str, raw: &str) -> Self {
        Self {
            passed: false,
            confidence: Confidence::Low,
            findings: vec![OracleFinding::new(
                FindingSeverity::Error,
                format!(
                    "could not parse a verdict for '{scope}' from the oracle's output: {}",
                    raw.chars().take(200).collect::<String>()
                ),
            )],
            summary: "oracle response was not valid JSON".to_string(),
        }
    }
}
