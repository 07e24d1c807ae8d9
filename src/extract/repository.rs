//! Trending repository items.
//!
//! | field          | source                                                 |
//! |----------------|--------------------------------------------------------|
//! | identity / url | `h2 a[href]`, last two path segments (required)        |
//! | description    | first `p`                                              |
//! | language/color | `span[itemprop=programmingLanguage]` + color swatch    |
//! | stars / forks  | 1st / 2nd direct `a` of the item's second `div`        |
//! | stars in window| `span.d-inline-block.float-sm-right`, first token      |
//! | built by       | `span.d-inline-block.mr-3 a`                           |

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;
use tracing::warn;

use super::{absolute_url, child_elements, collapsed_text, css, first_text, metric, ItemOutcome, MissReason};
use crate::types::{Contributor, EntityKind, TrendingEntity};

struct RepoSelectors {
    anchor: Selector,
    description: Selector,
    language: Selector,
    language_color: Selector,
    window_delta: Selector,
    built_by: Selector,
    image: Selector,
}

static SELECTORS: LazyLock<RepoSelectors> = LazyLock::new(|| RepoSelectors {
    anchor: css("h2 a[href]"),
    description: css("p"),
    language: css(r#"span[itemprop="programmingLanguage"]"#),
    language_color: css("span.repo-language-color"),
    window_delta: css("span.d-inline-block.float-sm-right"),
    built_by: css("span.d-inline-block.mr-3 a[href]"),
    image: css("img[src]"),
});

/// Extract one `article.Box-row` of the repositories page.
pub fn extract_item(item: ElementRef<'_>, rank: u32) -> ItemOutcome {
    let sel = &*SELECTORS;

    let Some(href) = item
        .select(&sel.anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
    else {
        return ItemOutcome::Miss(MissReason::MissingAnchor);
    };

    let segments: Vec<&str> = href.split('/').filter(|s| !s.is_empty()).collect();
    let (owner, name) = match segments.as_slice() {
        [.., owner, name] => (owner.to_string(), name.to_string()),
        _ => return ItemOutcome::Miss(MissReason::MalformedAnchor(href.to_string())),
    };

    let identity = format!("{owner}/{name}");
    let mut degraded = 0usize;
    let mut entity = TrendingEntity::new(EntityKind::Repository, rank, identity.clone(), absolute_url(href));
    entity.owner = Some(owner);
    entity.name = Some(name);
    entity.description = first_text(item, &sel.description);

    let (language, color) = language_and_color(item, sel, &identity, &mut degraded);
    entity.language = language;
    entity.language_color = color;

    // Stars and forks are the first two direct anchors of the stats row.
    let stats = child_elements(item, "div").nth(1);
    if let Some(stats) = stats {
        let mut anchors = child_elements(stats, "a");
        entity.total_count = metric(anchors.next().and_then(collapsed_text), "total_count", &identity, &mut degraded);
        entity.secondary_count =
            metric(anchors.next().and_then(collapsed_text), "secondary_count", &identity, &mut degraded);
    }

    let delta_text = first_text(item, &sel.window_delta)
        .and_then(|t| t.split_whitespace().next().map(str::to_string));
    entity.window_delta = metric(delta_text, "window_delta", &identity, &mut degraded);

    entity.contributors = item
        .select(&sel.built_by)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let username = href.trim_matches('/');
            if username.is_empty() {
                return None;
            }
            Some(Contributor {
                username: username.to_string(),
                url: absolute_url(href),
                avatar_url: a
                    .select(&sel.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .map(str::to_string),
            })
        })
        .collect();

    ItemOutcome::Extracted {
        entity,
        degraded_fields: degraded,
    }
}

/// Language and swatch color are set together or not at all.
fn language_and_color(
    item: ElementRef<'_>,
    sel: &RepoSelectors,
    identity: &str,
    degraded: &mut usize,
) -> (Option<String>, Option<String>) {
    let Some(language) = first_text(item, &sel.language) else {
        return (None, None);
    };

    let color = item
        .select(&sel.language_color)
        .next()
        .and_then(|swatch| swatch.value().attr("style"))
        .and_then(|style| style.split_whitespace().last())
        .map(|c| c.trim_end_matches(';').to_string());

    match color {
        Some(color) => (Some(language), Some(color)),
        None => {
            warn!(identity, language = %language, "Language marker without color swatch, dropping both");
            *degraded += 1;
            (None, None)
        }
    }
}
