use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

use crate::schema::StructuredCourse;

/// Recover a course object from free-form model output.
///
/// Only the span from the first `{` to the last `}` is considered; text
/// around it (prose, echoed examples) is ignored. Trailing commas are
/// repaired before a strict parse. Anything else that fails to parse
/// yields `None`.
pub fn sanitize(text: &str) -> Option<StructuredCourse> {
    let candidate = extract_json_candidate(text)?;
    let repaired = strip_trailing_commas(candidate);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(fields)) => Some(StructuredCourse::new(fields)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Candidate JSON did not parse after repair");
            None
        }
    }
}

/// Largest brace-delimited substring: first `{` through last `}`.
pub fn extract_json_candidate(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Drop every comma that is followed, after optional whitespace, by `}` or
/// `]`. Commas inside string literals are left alone.
pub fn strip_trailing_commas(json: &str) -> Cow<'_, str> {
    let bytes = json.as_bytes();
    let mut dropped = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b',' => {
                let next = bytes[i + 1..]
                    .iter()
                    .find(|c| !c.is_ascii_whitespace());
                if matches!(next, Some(b'}') | Some(b']')) {
                    dropped.push(i);
                }
            }
            _ => {}
        }
    }

    if dropped.is_empty() {
        return Cow::Borrowed(json);
    }

    // Commas are single-byte, so slicing around them stays on char boundaries.
    let mut out = String::with_capacity(json.len());
    let mut last = 0;
    for i in dropped {
        out.push_str(&json[last..i]);
        last = i + 1;
    }
    out.push_str(&json[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_valid_object() {
        let value = json!({
            "title": "Data Structures",
            "code": "CS 225",
            "credits": 4,
            "description": "Data abstractions: elementary data structures.",
            "prerequisites": {"courses": ["CS 128"], "raw_text": "CS 128, or CS 124."},
            "gen_ed": []
        });
        let text = serde_json::to_string_pretty(&value).unwrap();

        let course = sanitize(&text).unwrap();
        assert_eq!(serde_json::to_value(&course).unwrap(), value);
    }

    #[test]
    fn test_trailing_comma_before_brace() {
        let course = sanitize(r#"{"code": "CS 101", "credits": 3,}"#).unwrap();
        assert_eq!(course.code(), Some("CS 101"));
        assert_eq!(course.credits(), Some(3.0));
    }

    #[test]
    fn test_trailing_comma_before_bracket() {
        let course = sanitize(r#"{"gen_ed": ["Humanities", "Western",  ]}"#).unwrap();
        assert_eq!(course.gen_ed(), vec!["Humanities", "Western"]);
    }

    #[test]
    fn test_prose_around_object_is_ignored() {
        let text = "Sure! Here is the JSON:\n{\"code\": \"CS 173\"}\nLet me know if you need more.";
        let course = sanitize(text).unwrap();
        assert_eq!(course.code(), Some("CS 173"));
    }

    #[test]
    fn test_no_braces_is_none() {
        assert!(sanitize("I could not find any course information.").is_none());
        assert!(sanitize("").is_none());
        assert!(sanitize("} backwards {").is_none());
    }

    #[test]
    fn test_multiple_objects_only_largest_span_tried() {
        // first `{` to last `}` covers both objects, which is not valid JSON
        let text = r#"Example: {"code": "XX 000"} Answer: {"code": "CS 101"}"#;
        assert!(sanitize(text).is_none());
    }

    #[test]
    fn test_unbalanced_braces_is_none() {
        assert!(sanitize(r#"{"code": "CS 101", "title": {"#).is_none());
        assert!(sanitize(r#"{"code": "CS 101""#).is_none());
    }

    #[test]
    fn test_commas_inside_strings_untouched() {
        let text = r#"{"description": "Topics: graphs, }trees,] and sorting.",}"#;
        let course = sanitize(text).unwrap();
        assert_eq!(
            course.description(),
            Some("Topics: graphs, }trees,] and sorting.")
        );
    }

    #[test]
    fn test_escaped_quote_keeps_string_state() {
        let repaired = strip_trailing_commas(r#"{"a": "say \"hi\", }", "b": [1,],}"#);
        assert_eq!(repaired, r#"{"a": "say \"hi\", }", "b": [1]}"#);
    }

    #[test]
    fn test_clean_input_is_borrowed() {
        assert!(matches!(strip_trailing_commas(r#"{"a": 1}"#), Cow::Borrowed(_)));
    }

    #[test]
    fn test_non_object_candidate_is_none() {
        assert!(extract_json_candidate("no json").is_none());
        assert_eq!(extract_json_candidate("x {} y"), Some("{}"));
    }
}
