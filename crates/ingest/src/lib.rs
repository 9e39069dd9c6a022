pub mod block;
pub mod catalog;
pub mod reader;

pub use block::CourseBlock;
pub use catalog::{CatalogParser, CatalogSelectors};
pub use reader::read_catalog;

use anyhow::Result;
use std::path::Path;

/// Read a catalog file and split it into course blocks.
pub async fn ingest_catalog(path: &Path, selectors: &CatalogSelectors) -> Result<Vec<CourseBlock>> {
    let parser = CatalogParser::new(selectors)?;
    let content = read_catalog(path).await?;

    Ok(parser.parse(&content))
}
