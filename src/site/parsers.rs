//! Markup extraction for myinstants pages. Pure functions, no I/O.
//!
//! Every function tolerates missing elements: absent markup yields an empty
//! `Vec` or `None`, never an error.

use crate::models::SearchResult;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// `play('/media/sounds/x.mp3', ...)` with either quote style. The site has
/// moved this handler between `onmousedown` and `onclick` over time, so both
/// attributes are tried.
static PLAY_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bplay\(\s*(?:'([^']*)'|"([^"]*)")"#).expect("play handler pattern")
});

const HANDLER_ATTRS: [&str; 2] = ["onclick", "onmousedown"];

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Search page ───────────────────────────────────────────────────────────────

/// Pull the relative media path out of a play handler attribute value.
pub fn extract_play_path(handler: &str) -> Option<String> {
    let caps = PLAY_HANDLER.captures(handler)?;
    let path = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    if path.is_empty() { None } else { Some(path.to_string()) }
}

/// All `.instant` entries in document order. Entries missing either a name
/// or a playable path are skipped.
pub fn extract_search_entries(html: &str, base: &Url) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);

    let (Some(item_sel), Some(name_sel), Some(button_sel)) = (
        selector(".instant"),
        selector(".instant-link"),
        selector(".small-button"),
    ) else {
        return vec![];
    };

    let mut results = Vec::new();
    for item in doc.select(&item_sel) {
        let Some(display_name) = item
            .select(&name_sel)
            .map(text_of)
            .find(|t| !t.is_empty())
        else {
            continue;
        };

        let path = item.select(&button_sel).find_map(|button| {
            HANDLER_ATTRS
                .iter()
                .filter_map(|attr| button.value().attr(attr))
                .find_map(extract_play_path)
        });

        let Some(path) = path else {
            debug!("No play handler for {:?}", display_name);
            continue;
        };

        match base.join(&path) {
            Ok(url) => results.push(SearchResult {
                display_name,
                media_url: url.to_string(),
            }),
            Err(e) => debug!("Unresolvable media path {:?}: {}", path, e),
        }
    }

    results
}

// ── Forms ─────────────────────────────────────────────────────────────────────

/// Value of the `<input name=field>` (anti-forgery token and the like).
pub fn extract_token(html: &str, field: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector(&format!(r#"input[name="{}"]"#, field))?;

    doc.select(&sel)
        .filter_map(|input| input.value().attr("value"))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Messages of every `ul.errorlist`, one per `li` (or the whole list when it
/// has no items).
pub fn extract_error_messages(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let (Some(list_sel), Some(li_sel)) = (selector("ul.errorlist"), selector("li")) else {
        return vec![];
    };

    let mut messages = Vec::new();
    for list in doc.select(&list_sel) {
        let items: Vec<String> = list.select(&li_sel).map(text_of).collect();
        if items.is_empty() {
            messages.push(text_of(list));
        } else {
            messages.extend(items);
        }
    }
    messages.retain(|m| !m.is_empty());
    messages
}

/// `href` of the first instant link whose text is exactly `text`.
pub fn extract_link_by_exact_text(html: &str, text: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = selector("a.instant-link")?;
    let wanted = text.trim();

    doc.select(&sel)
        .find(|a| text_of(*a) == wanted)
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}
