use anyhow::{Context, Result};
use pipeline::Checkpoint;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Line written after every raw response in the transcript.
const TRANSCRIPT_SEPARATOR: &str = "================================================================================";

/// Write successful courses as a pretty JSON array, in catalog order.
pub async fn write_courses(checkpoint: &Checkpoint, path: &Path) -> Result<usize> {
    let courses: Vec<_> = checkpoint.results().map(|r| r.course).collect();
    let json = serde_json::to_string_pretty(&courses)?;

    fs::write(path, json)
        .await
        .context(format!("Failed to write courses: {:?}", path))?;

    info!(path = ?path, courses = courses.len(), "Wrote courses to JSON file");
    Ok(courses.len())
}

/// Write every preserved raw model response, separated by a rule line.
pub async fn write_transcript(checkpoint: &Checkpoint, path: &Path) -> Result<usize> {
    let transcript = render_transcript(checkpoint.raw_responses());
    let count = checkpoint.raw_responses().count();

    fs::write(path, transcript)
        .await
        .context(format!("Failed to write transcript: {:?}", path))?;

    info!(path = ?path, responses = count, "Wrote raw responses to text file");
    Ok(count)
}

fn render_transcript<'a>(responses: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for response in responses {
        out.push_str(response);
        out.push_str("\n\n");
        out.push_str(TRANSCRIPT_SEPARATOR);
        out.push_str("\n\n");
    }
    out
}
