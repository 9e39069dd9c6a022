pub mod bounded;
pub mod llm;
pub mod prompt;
pub mod sanitizer;
pub mod schema;

pub use bounded::{BoundedExtractor, DEFAULT_MAX_INPUT_TOKENS};
pub use llm::{GenerationOptions, OllamaClient, TextGenerator};
pub use sanitizer::sanitize;
pub use schema::{Extraction, FailureKind, StructuredCourse};
