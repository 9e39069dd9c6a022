use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::block::CourseBlock;

/// CSS selectors locating course blocks and their text fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSelectors {
    pub block: String,
    pub title: String,
    pub description: String,
}

impl Default for CatalogSelectors {
    fn default() -> Self {
        Self {
            block: "div.courseblock".to_string(),
            title: "p.courseblocktitle".to_string(),
            description: "p.courseblockdesc".to_string(),
        }
    }
}

pub struct CatalogParser {
    block: Selector,
    title: Selector,
    description: Selector,
}

impl CatalogParser {
    pub fn new(selectors: &CatalogSelectors) -> Result<Self> {
        Ok(Self {
            block: parse_selector(&selectors.block)?,
            title: parse_selector(&selectors.title)?,
            description: parse_selector(&selectors.description)?,
        })
    }

    /// Split a catalog document into course blocks, in document order.
    pub fn parse(&self, html: &str) -> Vec<CourseBlock> {
        let document = Html::parse_document(html);
        let mut occurrences: HashMap<String, usize> = HashMap::new();

        let blocks: Vec<CourseBlock> = document
            .select(&self.block)
            .enumerate()
            .map(|(position, element)| {
                let title = first_text(element, &self.title);
                let description = first_text(element, &self.description);

                let fingerprint = CourseBlock::fingerprint(title.as_deref(), description.as_deref());
                let seen = occurrences.entry(fingerprint).or_insert(0);
                let occurrence = *seen;
                *seen += 1;

                CourseBlock::new(position, occurrence, title, description)
            })
            .collect();

        debug!(blocks = blocks.len(), "Parsed catalog");
        blocks
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {:?}: {}", css, e))
}

/// Text of the first match, with each text node trimmed and joined by a space.
fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let fragment = element.select(selector).next()?;
    let text = fragment
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(text)
}
