use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Error;

/// A relay query filter, serialized exactly as it goes over the wire in a
/// `REQ`. Single-letter tag queries live in `tags` keyed by `"#<letter>"`.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>, // unix timestamp seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>, // unix timestamp seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> FilterBuilder {
        FilterBuilder::default()
    }

    pub fn json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Values queried for a single-letter tag, eg. `tag('d')`
    pub fn tag(&self, letter: char) -> Option<&[String]> {
        self.tags.get(&tag_key(letter)).map(|v| v.as_slice())
    }
}

#[derive(Default, Debug)]
pub struct FilterBuilder {
    filter: Filter,
}

impl FilterBuilder {
    pub fn ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.filter.ids = Some(ids.into_iter().collect());
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = String>) -> Self {
        self.filter.authors = Some(authors.into_iter().collect());
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u64>) -> Self {
        self.filter.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.filter.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.filter.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.filter.limit = Some(limit);
        self
    }

    pub fn tags(mut self, letter: char, values: impl IntoIterator<Item = String>) -> Self {
        self.filter
            .tags
            .insert(tag_key(letter), values.into_iter().collect());
        self
    }

    pub fn build(self) -> Filter {
        self.filter
    }
}

fn tag_key(letter: char) -> String {
    format!("#{letter}")
}
