//! Data structures passed between the paginator, the item harvester, and the
//! orchestrator.

use serde::{Deserialize, Serialize};

use crate::external_deps::browser::ElementHandle;

/// Literal `href` of the next-page control on the last listing page.
pub const NEXT_PAGE_SENTINEL: &str = "#";

/// Extension appended to delete identifiers in dry-run mode.
pub const DRY_RUN_EXTENSION: &str = ".pdf";

/// Sub-elements of one listing row, captured when the page is read so the
/// harvester never re-queries the page for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    pub row: ElementHandle,
    pub download: Option<ElementHandle>,
    pub delete: Option<ElementHandle>,
}

/// One uploaded document as listed. Valid only until the paginator advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub title: String,
    pub handle: RowHandle,
}

/// What the next-page control says about the rest of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    Link(String),
    Terminal,
}

impl NextPage {
    /// Classifies the `href` read from the next-page control.
    ///
    /// Only the sentinel, an absent target, or an empty one end the listing.
    /// Row counts play no part.
    pub fn from_href(href: Option<&str>) -> Self {
        match href.map(str::trim) {
            Some(NEXT_PAGE_SENTINEL) | Some("") | None => NextPage::Terminal,
            Some(link) => NextPage::Link(link.to_string()),
        }
    }

    pub fn has_more(&self) -> bool {
        matches!(self, NextPage::Link(_))
    }
}

/// Rows of one listing page plus the pointer to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// 1-based position in the walk.
    pub number: usize,
    pub rows: Vec<ItemRow>,
    pub next: NextPage,
}

/// Harvested item, in listing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub title: String,
    pub filename: String,
}

impl HarvestRecord {
    pub fn new(title: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            filename: filename.into(),
        }
    }
}
