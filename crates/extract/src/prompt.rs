use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").unwrap());

/// Rough token estimate: ~1.3 tokens per word.
const TOKENS_PER_WORD: f64 = 1.3;

const EXTRACTION_INSTRUCTIONS: &str = r#"You are an assistant that extracts structured data from course descriptions.
Given a course title block and a course description block, extract the following information and output it in JSON format:

- title: The course title.
- code: The course code (e.g., 'CS 101').
- credits: The number of credit hours (as a number).
- description: The course description.
- prerequisites: Any prerequisites for the course.
- gen_ed: A list of general education requirements satisfied by the course.

Ensure that the JSON output is valid and properly formatted. If a field is missing, you can leave it empty or null. Do not include any additional text or explanation."#;

/// Per-block prompt: title fragment, then description fragment.
pub fn build_course_prompt(title: &str, description: &str) -> String {
    format!("{}\n{}", title, description)
}

/// Full model input: fixed instructions followed by the block prompt.
pub fn build_extraction_prompt(course_prompt: &str) -> String {
    format!(
        "{}\n\nCourse Title Block: {}\n\nOutput:",
        EXTRACTION_INSTRUCTIONS, course_prompt
    )
}

pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f64 * TOKENS_PER_WORD) as usize
}

/// Cut `text` after the last word that fits in `max_tokens`.
///
/// Original spacing is kept up to the cut point.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> Cow<'_, str> {
    if estimate_tokens(text) <= max_tokens {
        return Cow::Borrowed(text);
    }

    let max_words = (max_tokens as f64 / TOKENS_PER_WORD) as usize;
    let end = WORD_RE
        .find_iter(text)
        .take(max_words)
        .last()
        .map(|m| m.end())
        .unwrap_or(0);

    Cow::Owned(text[..end].to_string())
}
