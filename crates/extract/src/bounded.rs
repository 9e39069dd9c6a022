use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::llm::TextGenerator;
use crate::prompt;
use crate::sanitizer::sanitize;
use crate::schema::{Extraction, FailureKind};

/// Default input budget, in estimated tokens.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 2048;

/// Runs one model call per course prompt under a hard deadline.
#[derive(Clone)]
pub struct BoundedExtractor {
    generator: Arc<dyn TextGenerator>,
    max_input_tokens: usize,
}

impl BoundedExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        }
    }

    pub fn with_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.max_input_tokens = max_input_tokens;
        self
    }

    /// Prompt the model once and sanitize its answer.
    ///
    /// If the model has not answered when `deadline` elapses, the in-flight
    /// call is dropped and `(None, None)` is returned tagged as a timeout.
    /// Model errors likewise carry no raw text; a sanitize failure keeps the
    /// raw text for auditing.
    pub async fn call_with_deadline(&self, course_prompt: &str, deadline: Duration) -> Extraction {
        let full_prompt = prompt::build_extraction_prompt(course_prompt);
        let input = prompt::truncate_to_tokens(&full_prompt, self.max_input_tokens);
        if input.len() < full_prompt.len() {
            debug!(
                max_tokens = self.max_input_tokens,
                estimated_tokens = prompt::estimate_tokens(&full_prompt),
                "Prompt truncated to token budget"
            );
        }

        // The timer lives inside this future and is dropped with it on every path.
        let raw = match tokio::time::timeout(deadline, self.generator.generate(&input)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(error = %e, "Model invocation failed");
                return Extraction::failed(FailureKind::ModelError, None);
            }
            Err(_) => {
                warn!(deadline_secs = deadline.as_secs_f64(), "Model call timed out");
                return Extraction::failed(FailureKind::Timeout, None);
            }
        };

        match sanitize(&raw) {
            Some(course) => Extraction::success(course, raw),
            None => {
                let preview: String = raw.chars().take(200).collect();
                warn!(response = %preview, "No valid JSON found in response");
                Extraction::failed(FailureKind::SanitizeFailure, Some(raw))
            }
        }
    }

    /// Forward a memory release request to the model.
    pub async fn release_memory(&self) {
        if let Err(e) = self.generator.release_memory().await {
            warn!(error = %e, "Failed to release model memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Answers with a fixed reply after a delay, recording every prompt.
    struct SlowModel {
        delay: Duration,
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl SlowModel {
        fn new(delay: Duration, reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for SlowModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test]
    async fn test_success_keeps_raw_text() {
        let raw = r#"Here you go: {"code": "CS 101", "credits": 3,}"#;
        let model = SlowModel::new(Duration::ZERO, Ok(raw));
        let extractor = BoundedExtractor::new(model.clone());

        let result = extractor
            .call_with_deadline("CS 101 Intro\nBasics.", Duration::from_secs(5))
            .await;

        assert!(result.is_success());
        assert_eq!(result.course.unwrap().code(), Some("CS 101"));
        assert_eq!(result.raw_response.as_deref(), Some(raw));
        assert!(result.failure.is_none());

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Course Title Block: CS 101 Intro\nBasics."));
    }

    #[tokio::test]
    async fn test_timeout_returns_nothing_promptly() {
        let model = SlowModel::new(Duration::from_secs(10), Ok(r#"{"code": "CS 101"}"#));
        let extractor = BoundedExtractor::new(model);

        let started = Instant::now();
        let result = extractor
            .call_with_deadline("CS 101", Duration::from_millis(50))
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result, Extraction::failed(FailureKind::Timeout, None));
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_next_call() {
        let slow = BoundedExtractor::new(SlowModel::new(Duration::from_secs(10), Ok("{}")));
        let fast = BoundedExtractor::new(SlowModel::new(
            Duration::from_millis(100),
            Ok(r#"{"code": "CS 225"}"#),
        ));

        let first = slow.call_with_deadline("a", Duration::from_millis(20)).await;
        assert_eq!(first.failure, Some(FailureKind::Timeout));

        // deadline of the first call has long passed by the time this one finishes
        let second = fast.call_with_deadline("b", Duration::from_secs(5)).await;
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn test_model_error_has_no_raw_text() {
        let model = SlowModel::new(Duration::ZERO, Err("out of memory"));
        let extractor = BoundedExtractor::new(model);

        let result = extractor.call_with_deadline("CS 101", Duration::from_secs(5)).await;

        assert_eq!(result, Extraction::failed(FailureKind::ModelError, None));
    }

    #[tokio::test]
    async fn test_sanitize_failure_preserves_raw_text() {
        let model = SlowModel::new(Duration::ZERO, Ok("I am not sure what this course is."));
        let extractor = BoundedExtractor::new(model);

        let result = extractor.call_with_deadline("CS 101", Duration::from_secs(5)).await;

        assert_eq!(result.failure, Some(FailureKind::SanitizeFailure));
        assert!(result.course.is_none());
        assert_eq!(
            result.raw_response.as_deref(),
            Some("I am not sure what this course is.")
        );
    }

    #[tokio::test]
    async fn test_input_is_truncated_silently() {
        let model = SlowModel::new(Duration::ZERO, Ok(r#"{"code": "CS 101"}"#));
        let extractor = BoundedExtractor::new(model.clone()).with_max_input_tokens(50);

        let long_description = "word ".repeat(5000);
        let result = extractor
            .call_with_deadline(&long_description, Duration::from_secs(5))
            .await;

        assert!(result.is_success());
        let prompts = model.prompts.lock().unwrap();
        assert!(prompt::estimate_tokens(&prompts[0]) <= 50);
    }
}
