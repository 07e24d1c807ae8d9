//! HTML extraction engine.
//!
//! Turns the raw markup of a trending page into rank-ordered
//! [`TrendingEntity`] values. Extraction is pure: no I/O, no clock, and
//! no failure mode for the page as a whole. Items without a usable
//! primary anchor are dropped and counted as parse misses; unparsable
//! optional fields are logged and left as `None`.
//!
//! Two stages:
//! 1. [`region::isolate_items`] cuts the page down to the item region.
//! 2. The region is parsed with `scraper` and every `article.Box-row`
//!    is handed to the kind-specific item extractor.

pub mod developer;
pub mod region;
pub mod repository;

use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::types::{EntityKind, TrendingEntity};

/// Absolute URLs are built from hrefs relative to this origin.
pub const SITE_ORIGIN: &str = "https://github.com";

static ITEM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| css("article.Box-row"));

/// Compile a selector literal. Only called on static strings.
pub(crate) fn css(selector: &'static str) -> Selector {
    Selector::parse(selector).expect("static CSS selector must be valid")
}

// ---------------------------------------------------------------------------
// Per-item results
// ---------------------------------------------------------------------------

/// Why an item could not be turned into an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The item has no primary anchor with an `href`.
    MissingAnchor,
    /// The anchor exists but its path does not yield an identity.
    MalformedAnchor(String),
}

/// Outcome of extracting a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Extracted {
        entity: TrendingEntity,
        /// Optional fields that were present in the markup but unparsable.
        degraded_fields: usize,
    },
    Miss(MissReason),
}

/// Aggregated result of extracting one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub kind: EntityKind,
    /// Rank-ascending, `rank == position + 1`.
    pub entities: Vec<TrendingEntity>,
    pub parse_misses: usize,
    /// Document position (1-based, counting every item) and reason of
    /// each skipped item.
    pub misses: Vec<(usize, MissReason)>,
    pub field_degrades: usize,
}

impl Extraction {
    fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: Vec::new(),
            parse_misses: 0,
            misses: Vec::new(),
            field_degrades: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Extract all items of the given listing kind from a raw page.
pub fn extract(kind: EntityKind, raw_markup: &str) -> Extraction {
    let region = region::isolate_items(raw_markup, region::ITEM_TAG);
    let mut extraction = Extraction::empty(kind);
    if region.is_empty() {
        debug!(kind = %kind, "No item region found in markup");
        return extraction;
    }

    let doc = Html::parse_fragment(region);
    for (position, item) in doc.select(&ITEM_SELECTOR).enumerate() {
        let rank = extraction.entities.len() as u32 + 1;
        let outcome = match kind {
            EntityKind::Repository => repository::extract_item(item, rank),
            EntityKind::Developer => developer::extract_item(item, rank),
        };

        match outcome {
            ItemOutcome::Extracted { entity, degraded_fields } => {
                extraction.field_degrades += degraded_fields;
                extraction.entities.push(entity);
            }
            ItemOutcome::Miss(reason) => {
                debug!(kind = %kind, position = position + 1, reason = ?reason, "Skipping unextractable item");
                extraction.parse_misses += 1;
                extraction.misses.push((position + 1, reason));
            }
        }
    }

    debug!(
        kind = %kind,
        entities = extraction.entities.len(),
        misses = extraction.parse_misses,
        degrades = extraction.field_degrades,
        "Extraction complete"
    );
    extraction
}

/// Extract trending repositories.
pub fn extract_repositories(raw_markup: &str) -> Extraction {
    extract(EntityKind::Repository, raw_markup)
}

/// Extract trending developers.
pub fn extract_developers(raw_markup: &str) -> Extraction {
    extract(EntityKind::Developer, raw_markup)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Element text with runs of whitespace collapsed. `None` when blank.
pub(crate) fn collapsed_text(el: ElementRef<'_>) -> Option<String> {
    let raw: String = el.text().collect();
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Text of the first descendant matching `selector`.
pub(crate) fn first_text(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector).next().and_then(collapsed_text)
}

/// Direct element children of `el` with the given tag name.
pub(crate) fn child_elements<'a>(el: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// Resolve an href against [`SITE_ORIGIN`].
pub(crate) fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{SITE_ORIGIN}{href}")
    } else {
        format!("{SITE_ORIGIN}/{href}")
    }
}

/// Parse a count such as `"12,345"` with thousands separators removed.
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    digits.parse().ok()
}

/// Parse an optional numeric field, counting a degrade when text was
/// present but not a number.
pub(crate) fn metric(
    raw: Option<String>,
    field: &'static str,
    identity: &str,
    degrades: &mut usize,
) -> Option<u64> {
    let raw = raw?;
    match parse_count(&raw) {
        Some(n) => Some(n),
        None => {
            warn!(identity, field, raw = %raw, "Unparsable numeric field, leaving it empty");
            *degrades += 1;
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
