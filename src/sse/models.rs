use crate::live::LiveUpdate;
use axum::response::sse::Event;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;

#[derive(Debug, Default, Deserialize)]
pub struct LiveParams {
    /// Comma-separated collection names, e.g. `votes,comments`.
    #[serde(default)]
    pub collections: String,
}

impl LiveParams {
    pub fn collection_set(&self) -> BTreeSet<String> {
        self.collections
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub fn status_event(connected: bool) -> Event {
    Event::default()
        .event("status")
        .data(json!({ "connected": connected }).to_string())
}

pub fn update_event(update: &LiveUpdate) -> Event {
    Event::default()
        .event("update")
        .data(json!(update).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_are_split_trimmed_and_deduplicated() {
        let params = LiveParams {
            collections: " votes, comments,,votes ".to_string(),
        };
        let set: Vec<_> = params.collection_set().into_iter().collect();
        assert_eq!(set, vec!["comments".to_string(), "votes".to_string()]);
    }

    #[test]
    fn missing_collections_means_nothing_watched() {
        assert!(LiveParams::default().collection_set().is_empty());
    }
}
