//! Region isolation.
//!
//! Trending pages are large and almost all of the markup is chrome.
//! Before building a DOM we cut the raw text down to the line range
//! that spans the first through the last item delimiter tag. Parsing
//! only that slice keeps the tree small and stops selectors from
//! matching anything outside the listing.

/// The repeating item element on trending pages.
pub const ITEM_TAG: &str = "article";

/// Return the byte range of `raw` from the start of the first line that
/// opens or closes a `tag` element to the end of the last such line.
///
/// Returns an empty slice when no line carries the tag.
pub fn isolate_items<'a>(raw: &'a str, tag: &str) -> &'a str {
    let opener = format!("<{tag}");
    let closer = format!("</{tag}");

    let mut first: Option<usize> = None;
    let mut last_end = 0usize;
    let mut offset = 0usize;

    for line in raw.split_inclusive('\n') {
        if has_tag(line, &opener) || has_tag(line, &closer) {
            if first.is_none() {
                first = Some(offset);
            }
            last_end = offset + line.len();
        }
        offset += line.len();
    }

    match first {
        Some(start) => &raw[start..last_end],
        None => "",
    }
}

/// Whether `line` contains `prefix` followed by a tag-name boundary
/// (whitespace, `>`, `/` or the end of the line).
fn has_tag(line: &str, prefix: &str) -> bool {
    line.match_indices(prefix).any(|(idx, _)| {
        line[idx + prefix.len()..]
            .chars()
            .next()
            .map_or(true, |c| c.is_whitespace() || c == '>' || c == '/')
    })
}
