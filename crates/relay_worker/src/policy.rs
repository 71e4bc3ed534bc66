//! How each batched category turns a batch of identifiers into filters, how
//! many identifiers it takes at once and when its cycle gives up.

use std::time::Duration;

use enostr::{kinds, Filter};
use tracing::warn;

use crate::{job::Category, WorkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Up to [`WorkerConfig::max_batch_size`] identifiers per cycle
    Batched,
    /// One identifier per cycle
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// `batch len * WorkerConfig::secs_per_identifier`
    PerIdentifier,
    /// [`WorkerConfig::contacts_timeout`]
    Contacts,
}

/// What ends a cycle besides its timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    EndOfStoredEvents,
    /// The first matching event. `EOSE` is ignored.
    FirstEvent,
}

pub struct CategoryPolicy {
    pub batch: BatchMode,
    pub filters: fn(&[String]) -> Vec<Filter>,
    pub timeout: TimeoutPolicy,
    pub completion: Completion,
}

impl CategoryPolicy {
    pub fn batch_size(&self, config: &WorkerConfig) -> usize {
        match self.batch {
            BatchMode::Batched => config.max_batch_size,
            BatchMode::Single => 1,
        }
    }

    pub fn timeout(&self, batch_len: usize, config: &WorkerConfig) -> Duration {
        match self.timeout {
            TimeoutPolicy::PerIdentifier => {
                let secs = (batch_len as u64).saturating_mul(config.secs_per_identifier);
                Duration::from_secs(secs)
            }
            TimeoutPolicy::Contacts => config.contacts_timeout,
        }
    }
}

static PROFILE: CategoryPolicy = CategoryPolicy {
    batch: BatchMode::Batched,
    filters: profile_filters,
    timeout: TimeoutPolicy::PerIdentifier,
    completion: Completion::EndOfStoredEvents,
};

static CONTACTS: CategoryPolicy = CategoryPolicy {
    batch: BatchMode::Single,
    filters: contacts_filters,
    timeout: TimeoutPolicy::Contacts,
    completion: Completion::FirstEvent,
};

static EVENT: CategoryPolicy = CategoryPolicy {
    batch: BatchMode::Batched,
    filters: event_filters,
    timeout: TimeoutPolicy::PerIdentifier,
    completion: Completion::EndOfStoredEvents,
};

static ARTICLE: CategoryPolicy = CategoryPolicy {
    batch: BatchMode::Batched,
    filters: article_filters,
    timeout: TimeoutPolicy::PerIdentifier,
    completion: Completion::EndOfStoredEvents,
};

static BADGE_DEFINITION: CategoryPolicy = CategoryPolicy {
    batch: BatchMode::Batched,
    filters: badge_definition_filters,
    timeout: TimeoutPolicy::PerIdentifier,
    completion: Completion::EndOfStoredEvents,
};

impl Category {
    /// `None` for ad-hoc subscriptions, which are not scheduled in cycles
    pub fn policy(self) -> Option<&'static CategoryPolicy> {
        match self {
            Category::Profile => Some(&PROFILE),
            Category::Contacts => Some(&CONTACTS),
            Category::Event => Some(&EVENT),
            Category::Article => Some(&ARTICLE),
            Category::BadgeDefinition => Some(&BADGE_DEFINITION),
            Category::AdHocSubscription => None,
        }
    }
}

fn profile_filters(batch: &[String]) -> Vec<Filter> {
    vec![Filter::new()
        .kinds([kinds::METADATA])
        .authors(batch.iter().cloned())
        .build()]
}

fn contacts_filters(batch: &[String]) -> Vec<Filter> {
    vec![Filter::new()
        .kinds([kinds::CONTACTS])
        .authors(batch.iter().cloned())
        .build()]
}

fn event_filters(batch: &[String]) -> Vec<Filter> {
    vec![Filter::new()
        .kinds([kinds::TEXT_NOTE])
        .ids(batch.iter().cloned())
        .build()]
}

fn article_filters(batch: &[String]) -> Vec<Filter> {
    vec![Filter::new()
        .kinds([kinds::LONG_FORM])
        .authors(batch.iter().cloned())
        .build()]
}

fn badge_definition_filters(batch: &[String]) -> Vec<Filter> {
    batch
        .iter()
        .filter_map(|identifier| {
            let coordinate = BadgeCoordinate::parse(identifier);
            if coordinate.is_none() {
                warn!("dropping malformed badge identifier '{identifier}'");
            }
            coordinate
        })
        .map(|coordinate| {
            Filter::new()
                .kinds([kinds::BADGE_DEFINITION])
                .authors([coordinate.author.to_owned()])
                .tags('d', [coordinate.d_tag.to_owned()])
                .build()
        })
        .collect()
}

/// `"<kind>:<author>:<d-tag>"`. The d-tag may itself contain colons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeCoordinate<'a> {
    pub kind: &'a str,
    pub author: &'a str,
    pub d_tag: &'a str,
}

impl<'a> BadgeCoordinate<'a> {
    pub fn parse(identifier: &'a str) -> Option<Self> {
        let mut parts = identifier.splitn(3, ':');
        let kind = parts.next()?;
        let author = parts.next()?;
        let d_tag = parts.next()?;

        if author.is_empty() {
            return None;
        }

        Some(Self {
            kind,
            author,
            d_tag,
        })
    }
}
