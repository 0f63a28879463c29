//! Resolution of free-text player names against the upstream user index.
//!
//! The upstream search matches fragments of single tokens, so a query is tried
//! as given first and then relaxed one token at a time until something matches.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::SearchError;

/// Queries shorter than this are too noisy to send upstream.
pub const MIN_QUERY_LEN: usize = 4;

/// How many token-drop steps may be stacked on top of the original query.
const MAX_FALLBACK_DEPTH: usize = 2;

static STATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.+\)\s*$").expect("state suffix pattern"));

/// Source of raw name entries for a search text.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search_names(&self, text: &str) -> Result<Vec<String>, SearchError>;
}

/// Removes a trailing parenthesised state/region, e.g. `"Jane Doe (PA)"` -> `"Jane Doe"`.
pub fn strip_state_suffix(name: &str) -> String {
    STATE_SUFFIX.replace(name, "").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    DropLastToken,
    DropFirstToken,
}

impl Fallback {
    const ORDER: [Fallback; 2] = [Fallback::DropLastToken, Fallback::DropFirstToken];

    fn apply(self, query: &str) -> Option<String> {
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.len() < 2 {
            return None;
        }
        let kept = match self {
            Fallback::DropLastToken => &tokens[..tokens.len() - 1],
            Fallback::DropFirstToken => &tokens[1..],
        };
        Some(kept.join(" "))
    }
}

/// Every query to try for `query`, in order. The first one that yields a
/// candidate wins.
///
/// The original text comes first. When it has two or three tokens it is
/// followed by the cascade of its last-token-dropped form and then its
/// first-token-dropped form, each expanded the same way.
pub fn query_cascade(query: &str) -> Vec<String> {
    let mut queries = Vec::new();
    push_cascade(query.trim(), 0, &mut queries);
    queries
}

fn push_cascade(query: &str, depth: usize, queries: &mut Vec<String>) {
    if query.chars().count() < MIN_QUERY_LEN || queries.iter().any(|q| q == query) {
        return;
    }
    queries.push(query.to_string());

    let token_count = query.split_whitespace().count();
    if depth >= MAX_FALLBACK_DEPTH || !(2..=3).contains(&token_count) {
        return;
    }
    for fallback in Fallback::ORDER {
        if let Some(relaxed) = fallback.apply(query) {
            push_cascade(&relaxed, depth + 1, queries);
        }
    }
}

/// Picks the entries of `items` that match `query`, state suffixes removed and
/// duplicates dropped in encounter order. An entry equal to the query wins
/// outright.
pub fn match_candidates(query: &str, items: &[String]) -> Vec<String> {
    let cleaned = strip_state_suffix(query);
    let Some(pattern) = query_pattern(&cleaned) else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    for item in items.iter().filter(|item| pattern.is_match(item)) {
        let name = strip_state_suffix(item);
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let wanted = cleaned.to_lowercase();
    if let Some(exact) = names.iter().find(|name| name.to_lowercase() == wanted) {
        return vec![exact.clone()];
    }
    names
}

/// Case-insensitive pattern for the query with any run of whitespace between tokens.
fn query_pattern(cleaned: &str) -> Option<Regex> {
    let tokens: Vec<String> = cleaned.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return None;
    }
    RegexBuilder::new(&tokens.join(r"\s+"))
        .case_insensitive(true)
        .build()
        .ok()
}

#[derive(Clone)]
pub struct NameMatcher {
    provider: Arc<dyn SearchProvider>,
}

impl NameMatcher {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    /// Canonical names for `query`: empty when nothing matched, one name for a
    /// confident match, several for the caller to disambiguate.
    pub async fn search(&self, query: &str) -> Result<Vec<String>, SearchError> {
        for attempt in query_cascade(query) {
            let items = self
                .provider
                .search_names(&strip_state_suffix(&attempt))
                .await?;
            let names = match_candidates(&attempt, &items);
            if !names.is_empty() {
                debug!("Search '{}' matched via '{}': {:?}", query, attempt, names);
                return Ok(names);
            }
        }
        debug!("Search '{}' matched nothing", query);
        Ok(Vec::new())
    }
}
