//! Structured learning report output.

use paimon_core::{Error, ResponseFormat, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A structured report produced from one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Report {
    /// Report title or subject name.
    pub name: String,
    /// Ordered suggestions.
    #[serde(rename = "suggestionList")]
    pub suggestion_list: Vec<String>,
}

impl Report {
    /// JSON schema of the report.
    #[must_use]
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "suggestionList": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": ["name", "suggestionList"],
            "additionalProperties": false
        })
    }

    /// Response format requesting schema-conforming output.
    #[must_use]
    pub fn response_format() -> ResponseFormat {
        ResponseFormat::JsonSchema {
            name: "Report".to_string(),
            schema: Self::schema(),
            strict: true,
        }
    }

    /// Instruction appended to the user message so backends without schema
    /// enforcement still answer in the right shape.
    #[must_use]
    pub fn format_instruction() -> String {
        format!(
            "You must answer strictly in the following JSON format: {}",
            Self::schema()
        )
    }

    /// Parses model output into a report.
    ///
    /// A single surrounding markdown code fence is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutputParsing`] if the text is not a conforming report.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| Error::OutputParsing {
            target: "Report".to_string(),
            message: e.to_string(),
            raw: raw.to_string(),
        })
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json` on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let report =
            Report::parse(r#"{"name":"Java roadmap","suggestionList":["Learn syntax","Build a project"]}"#)
                .unwrap();
        assert_eq!(report.name, "Java roadmap");
        assert_eq!(report.suggestion_list.len(), 2);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"name\":\"Plan\",\"suggestionList\":[\"a\"]}\n```";
        assert_eq!(
            Report::parse(raw).unwrap(),
            Report {
                name: "Plan".into(),
                suggestion_list: vec!["a".into()],
            }
        );

        let bare = "```\n{\"name\":\"Plan\",\"suggestionList\":[]}\n```";
        assert!(Report::parse(bare).is_ok());
    }

    #[test]
    fn test_parse_failure() {
        let err = Report::parse("Here is your report: be consistent.").unwrap_err();
        match err {
            Error::OutputParsing { target, raw, .. } => {
                assert_eq!(target, "Report");
                assert_eq!(raw, "Here is your report: be consistent.");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(Report::parse(r#"{"name":"missing list"}"#).is_err());
        assert!(Report::parse(r#"{"name":"x","suggestionList":[],"extra":1}"#).is_err());
    }

    #[test]
    fn test_serializes_wire_names() {
        let report = Report {
            name: "n".into(),
            suggestion_list: vec!["s".into()],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["suggestionList"][0], "s");
        assert!(Report::format_instruction().contains("suggestionList"));
    }
}
