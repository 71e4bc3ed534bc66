use std::fmt;
use std::str::FromStr;

use enostr::Filter;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The kinds of lookups a worker knows how to batch, plus the queue that
/// holds ad-hoc subscriptions requested before the connection was open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Profile,
    Contacts,
    Event,
    Article,
    BadgeDefinition,
    AdHocSubscription,
}

impl Category {
    /// Every category, in the order queues are drained once the
    /// connection opens.
    pub const DRAIN_ORDER: [Category; 6] = [
        Category::AdHocSubscription,
        Category::Profile,
        Category::Contacts,
        Category::Event,
        Category::Article,
        Category::BadgeDefinition,
    ];

    pub const COUNT: usize = Self::DRAIN_ORDER.len();

    pub fn index(self) -> usize {
        match self {
            Category::Profile => 0,
            Category::Contacts => 1,
            Category::Event => 2,
            Category::Article => 3,
            Category::BadgeDefinition => 4,
            Category::AdHocSubscription => 5,
        }
    }

    /// Whether jobs of this category are batched into scheduled cycles.
    /// Ad-hoc subscriptions are opened one by one instead.
    pub fn is_batched(self) -> bool {
        !matches!(self, Category::AdHocSubscription)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Profile => "Profile",
            Category::Contacts => "Contacts",
            Category::Event => "Event",
            Category::Article => "Article",
            Category::BadgeDefinition => "BadgeDefinition",
            Category::AdHocSubscription => "AdHocSubscription",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Profile" => Ok(Category::Profile),
            "Contacts" => Ok(Category::Contacts),
            "Event" => Ok(Category::Event),
            "Article" => Ok(Category::Article),
            "BadgeDefinition" => Ok(Category::BadgeDefinition),
            "AdHocSubscription" => Ok(Category::AdHocSubscription),
            other => Err(Error::unsupported(other)),
        }
    }
}

/// A unit of queued work. `filters` is only carried by ad-hoc
/// subscriptions waiting for the connection to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "type")]
    pub category: Category,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
}

impl Job {
    pub fn new(category: Category, identifier: impl Into<String>) -> Self {
        Self {
            category,
            identifier: identifier.into(),
            filters: None,
        }
    }

    pub fn profile(pubkey: impl Into<String>) -> Self {
        Self::new(Category::Profile, pubkey)
    }

    pub fn contacts(pubkey: impl Into<String>) -> Self {
        Self::new(Category::Contacts, pubkey)
    }

    pub fn event(id: impl Into<String>) -> Self {
        Self::new(Category::Event, id)
    }

    /// Articles are looked up by author
    pub fn article(author: impl Into<String>) -> Self {
        Self::new(Category::Article, author)
    }

    /// `coordinate` is `"<kind>:<author>:<d-tag>"`
    pub fn badge_definition(coordinate: impl Into<String>) -> Self {
        Self::new(Category::BadgeDefinition, coordinate)
    }

    pub fn subscription(id: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            category: Category::AdHocSubscription,
            identifier: id.into(),
            filters: Some(filters),
        }
    }

    /// Parse a host supplied job, eg. `{"type":"Profile","identifier":"..."}`.
    /// Unknown types surface as [`Error::UnsupportedJobType`].
    pub fn from_json(json: &str) -> Result<Self, Error> {
        #[derive(Deserialize)]
        struct RawJob {
            #[serde(rename = "type")]
            category: String,
            identifier: String,
            #[serde(default)]
            filters: Option<Vec<Filter>>,
        }

        let raw: RawJob = serde_json::from_str(json)?;
        Ok(Job {
            category: raw.category.parse()?,
            identifier: raw.identifier,
            filters: raw.filters,
        })
    }
}
