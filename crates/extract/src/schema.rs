use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A course record decoded from model output.
///
/// The decoded JSON object is kept verbatim; the accessors read the
/// conventional keys leniently since the model is free to pick the value
/// shape (`"credits": "3"` vs `3`, a single gen-ed string vs a list).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredCourse(Map<String, Value>);

impl StructuredCourse {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    pub fn code(&self) -> Option<&str> {
        self.text("code")
    }

    pub fn description(&self) -> Option<&str> {
        self.text("description")
    }

    /// Credit hours; numeric strings like `"3"` or `"3.0"` are accepted.
    pub fn credits(&self) -> Option<f64> {
        match self.0.get("credits")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Prerequisites in whatever shape the model produced them.
    pub fn prerequisites(&self) -> Option<&Value> {
        self.0.get("prerequisites").filter(|v| !v.is_null())
    }

    pub fn gen_ed(&self) -> Vec<String> {
        match self.0.get("gen_ed") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Why a block produced no structured course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The block lacked a title or description fragment.
    #[error("malformed input")]
    MalformedInput,
    #[error("timeout")]
    Timeout,
    #[error("model error")]
    ModelError,
    /// The model answered but no JSON object could be recovered.
    #[error("sanitize failure")]
    SanitizeFailure,
}

impl FailureKind {
    /// Failures worth another model call.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::ModelError)
    }
}

/// Outcome of one bounded model call.
///
/// `raw_response` is the verbatim model output whenever the model returned,
/// even if nothing could be parsed from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub course: Option<StructuredCourse>,
    pub raw_response: Option<String>,
    pub failure: Option<FailureKind>,
}

impl Extraction {
    pub fn success(course: StructuredCourse, raw_response: String) -> Self {
        Self {
            course: Some(course),
            raw_response: Some(raw_response),
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, raw_response: Option<String>) -> Self {
        Self {
            course: None,
            raw_response,
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.course.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(value: Value) -> StructuredCourse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accessors_read_conventional_keys() {
        let c = course(json!({
            "title": "Intro Computing",
            "code": "CS 101",
            "credits": 3,
            "description": "Basic concepts.",
            "prerequisites": "CS 100",
            "gen_ed": ["Quantitative Reasoning I"]
        }));

        assert_eq!(c.title(), Some("Intro Computing"));
        assert_eq!(c.code(), Some("CS 101"));
        assert_eq!(c.credits(), Some(3.0));
        assert_eq!(c.prerequisites(), Some(&json!("CS 100")));
        assert_eq!(c.gen_ed(), vec!["Quantitative Reasoning I".to_string()]);
    }

    #[test]
    fn test_lenient_shapes() {
        let c = course(json!({
            "credits": " 4 ",
            "gen_ed": "Advanced Composition",
            "prerequisites": null,
            "title": ""
        }));

        assert_eq!(c.credits(), Some(4.0));
        assert_eq!(c.gen_ed(), vec!["Advanced Composition".to_string()]);
        assert!(c.prerequisites().is_none());
        assert!(c.title().is_none());
        assert!(c.code().is_none());
    }

    #[test]
    fn test_unparseable_credits_is_none() {
        let c = course(json!({"credits": "3 to 4"}));
        assert!(c.credits().is_none());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let c = course(json!({"code": "CS 101", "extra": true}));
        let text = serde_json::to_string(&c).unwrap();
        assert_eq!(text, r#"{"code":"CS 101","extra":true}"#);
    }

    #[test]
    fn test_failure_kind_wire_names() {
        let text = serde_json::to_string(&FailureKind::SanitizeFailure).unwrap();
        assert_eq!(text, r#""sanitize_failure""#);
        assert!(FailureKind::Timeout.is_transient());
        assert!(!FailureKind::SanitizeFailure.is_transient());
        assert!(!FailureKind::MalformedInput.is_transient());
    }
}
