//! Trending developer items.
//!
//! The identity anchor is the first link inside the item's first `div`
//! (the avatar link). The leading rank link (`href="#pa-..."`) sits
//! outside that `div` and is ignored.

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use super::{absolute_url, collapsed_text, css, first_text, ItemOutcome, MissReason};
use crate::types::{EntityKind, PopularRepo, TrendingEntity};

struct DevSelectors {
    first_div: Selector,
    anchor: Selector,
    display_name: Selector,
    avatar: Selector,
    popular: Selector,
    popular_anchor: Selector,
    popular_description: Selector,
}

static SELECTORS: LazyLock<DevSelectors> = LazyLock::new(|| DevSelectors {
    first_div: css("div"),
    anchor: css("a[href]"),
    display_name: css("h1 a"),
    avatar: css("img[src]"),
    popular: css("article"),
    popular_anchor: css("h1 a[href]"),
    popular_description: css("div.f6.color-text-secondary.mt-1, div.f6.color-fg-muted.mt-1"),
});

/// Extract one `article.Box-row` of the developers page.
pub fn extract_item(item: ElementRef<'_>, rank: u32) -> ItemOutcome {
    let sel = &*SELECTORS;

    let Some(href) = item
        .select(&sel.first_div)
        .next()
        .and_then(|div| div.select(&sel.anchor).next())
        .and_then(|a| a.value().attr("href"))
    else {
        return ItemOutcome::Miss(MissReason::MissingAnchor);
    };

    let username = href.trim_matches('/');
    if username.is_empty() || username.contains('/') {
        return ItemOutcome::Miss(MissReason::MalformedAnchor(href.to_string()));
    }

    let mut entity = TrendingEntity::new(EntityKind::Developer, rank, username, absolute_url(href));
    entity.display_name = first_text(item, &sel.display_name);
    entity.avatar_url = item
        .select(&sel.avatar)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    entity.popular_repo = item.select(&sel.popular).next().and_then(|article| popular_repo(article, sel));

    ItemOutcome::Extracted {
        entity,
        degraded_fields: 0,
    }
}

fn popular_repo(article: ElementRef<'_>, sel: &DevSelectors) -> Option<PopularRepo> {
    let anchor = article.select(&sel.popular_anchor).next()?;
    let href = anchor.value().attr("href")?;
    let name = collapsed_text(anchor)
        .or_else(|| href.rsplit('/').find(|s| !s.is_empty()).map(str::to_string))?;

    Some(PopularRepo {
        name,
        url: absolute_url(href),
        description: first_text(article, &sel.popular_description),
    })
}
