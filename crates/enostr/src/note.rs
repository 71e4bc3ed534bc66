use crate::Error;

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Event kinds the relay worker queries or publishes
pub mod kinds {
    pub const METADATA: u64 = 0;
    pub const TEXT_NOTE: u64 = 1;
    pub const CONTACTS: u64 = 3;
    pub const PROFILE_BADGES: u64 = 30008;
    pub const BADGE_DEFINITION: u64 = 30009;
    pub const LONG_FORM: u64 = 30023;
}

/// Event is the struct used to represent a Nostr event
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Note {
    /// 32-bytes sha256 of the the serialized event data
    pub id: String,
    /// 32-bytes hex-encoded public key of the event creator
    pub pubkey: String,
    /// unix timestamp in seconds
    pub created_at: u64,
    /// integer
    /// 0: NostrEvent
    pub kind: u64,
    /// Tags
    pub tags: Vec<Vec<String>>,
    /// arbitrary string
    pub content: String,
    /// 64-bytes signature of the sha256 hash of the serialized event data, which is the same as the "id" field
    pub sig: String,
}

// Implement Hash trait
impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Note {}

impl Note {
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(Into::into)
    }

    pub fn json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }

    /// First value of the first tag named `name`, eg. the `d` identifier of
    /// a parameterized replaceable event.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }
}

impl std::str::FromStr for Note {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Note::from_json(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_json() {
        let json = r#"{"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5","pubkey":"379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe","created_at":1612809991,"kind":30009,"tags":[["d","bravery"],["name","Medal of Bravery"]],"content":"","sig":"273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502"}"#;

        let note: Note = json.parse().expect("note");
        assert_eq!(note.kind, kinds::BADGE_DEFINITION);
        assert_eq!(note.created_at, 1612809991);
        assert_eq!(note.tag_value("d"), Some("bravery"));
        assert_eq!(note.tag_value("image"), None);
    }

    #[test]
    fn missing_fields_fail() {
        let json = r#"{"id":"70b10f70","pubkey":"379e863e"}"#;
        assert!(matches!(Note::from_json(json), Err(Error::Json(_))));
    }
}
