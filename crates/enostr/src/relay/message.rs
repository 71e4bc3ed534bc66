use crate::{Error, Note, Result};
use serde_json::Value;

#[derive(Debug, Eq, PartialEq, Clone)]
pub struct CommandResult {
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Messages sent by relays, received by clients
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum RelayMessage {
    Ok(CommandResult),
    Eose(String),
    Event(String, Note),
    Notice(String),
    Closed(String, String),
}

impl RelayMessage {
    pub fn eose(subid: impl Into<String>) -> Self {
        RelayMessage::Eose(subid.into())
    }

    pub fn notice(msg: impl Into<String>) -> Self {
        RelayMessage::Notice(msg.into())
    }

    pub fn ok(event_id: impl Into<String>, accepted: bool, message: impl Into<String>) -> Self {
        RelayMessage::Ok(CommandResult {
            event_id: event_id.into(),
            accepted,
            message: message.into(),
        })
    }

    pub fn event(sub_id: impl Into<String>, note: Note) -> Self {
        RelayMessage::Event(sub_id.into(), note)
    }

    pub fn closed(sub_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayMessage::Closed(sub_id.into(), reason.into())
    }

    #[profiling::function]
    pub fn from_json(msg: &str) -> Result<RelayMessage> {
        if msg.is_empty() {
            return Err(Error::Empty);
        }

        let value: Value = serde_json::from_str(msg)
            .map_err(|e| Error::DecodeFailed(format!("invalid json: {e}")))?;

        let Some(parts) = value.as_array() else {
            return Err(Error::DecodeFailed("message is not an array".into()));
        };

        let Some(label) = parts.first().and_then(Value::as_str) else {
            return Err(Error::DecodeFailed("missing message type".into()));
        };

        match label {
            // ["EVENT", <subscription id>, <event JSON>]
            "EVENT" => {
                let subid = string_at(parts, 1, "Invalid EVENT format")?;
                let Some(raw) = parts.get(2) else {
                    return Err(Error::DecodeFailed("Invalid EVENT format".into()));
                };
                let note: Note = serde_json::from_value(raw.clone())
                    .map_err(|e| Error::DecodeFailed(format!("invalid event: {e}")))?;
                Ok(Self::event(subid, note))
            }

            // ["EOSE", <subscription_id>] (NIP-15)
            "EOSE" => Ok(Self::eose(string_at(
                parts,
                1,
                "Invalid subscription ID or format",
            )?)),

            // ["NOTICE", <message>]
            "NOTICE" => Ok(Self::notice(string_at(parts, 1, "Invalid NOTICE format")?)),

            // ["OK", <event_id>, <true|false>, <message>] (NIP-20)
            "OK" => {
                let event_id = string_at(parts, 1, "Invalid OK format")?;
                let Some(accepted) = parts.get(2).and_then(Value::as_bool) else {
                    return Err(Error::DecodeFailed("bad boolean value".into()));
                };
                let message = parts.get(3).and_then(Value::as_str).unwrap_or_default();
                Ok(Self::ok(event_id, accepted, message))
            }

            // ["CLOSED", <subscription_id>, <message>] (NIP-01)
            "CLOSED" => {
                let subid = string_at(parts, 1, "Invalid CLOSED format")?;
                let reason = parts.get(2).and_then(Value::as_str).unwrap_or_default();
                Ok(Self::closed(subid, reason))
            }

            _ => Err(Error::DecodeFailed(format!(
                "unrecognized message type: '{msg}'"
            ))),
        }
    }
}

fn string_at(parts: &[Value], index: usize, err: &str) -> Result<String> {
    parts
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::DecodeFailed(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_json() -> &'static str {
        r#"{"id":"70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5","pubkey":"379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe","created_at":1612809991,"kind":1,"tags":[],"content":"test","sig":"273a9cd5d11455590f4359500bccb7a89428262b96b3ea87a756b770964472f8c3e87f5d5e64d8d2e859a71462a3f477b554565c4f2f326cb01dd7620db71502"}"#
    }

    #[test]
    fn test_handle_various_messages() -> Result<()> {
        let note = Note::from_json(note_json())?;
        let event_msg = format!(r#"["EVENT", "random_string", {}]"#, note_json());

        let tests = vec![
            // Valid cases
            (r#"["EOSE","x"]"#.to_string(), Ok(RelayMessage::eose("x"))),
            (r#"["NOTICE",""]"#.to_string(), Ok(RelayMessage::notice(""))),
            (
                r#"["NOTICE","Invalid event format!"]"#.to_string(),
                Ok(RelayMessage::notice("Invalid event format!")),
            ),
            (
                event_msg,
                Ok(RelayMessage::event("random_string", note.clone())),
            ),
            (
                r#"["EOSE", "random-subscription-id" ]"#.to_string(),
                Ok(RelayMessage::eose("random-subscription-id")),
            ),
            (
                r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",true,"pow: difficulty 25>=24"]"#.to_string(),
                Ok(RelayMessage::ok(
                    "b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",
                    true,
                    "pow: difficulty 25>=24",
                )),
            ),
            (
                r#"["OK","abc",false,"blocked: not on allow list"]"#.to_string(),
                Ok(RelayMessage::ok("abc", false, "blocked: not on allow list")),
            ),
            (
                r#"["CLOSED","sub1","auth-required: login first"]"#.to_string(),
                Ok(RelayMessage::closed("sub1", "auth-required: login first")),
            ),
            // Invalid cases
            (
                r#"["EVENT","random_string"]"#.to_string(),
                Err(Error::DecodeFailed("Invalid EVENT format".into())),
            ),
            (
                r#"["EOSE"]"#.to_string(),
                Err(Error::DecodeFailed("Invalid subscription ID or format".into())),
            ),
            (
                r#"["OK","b1a649eb","yes",""]"#.to_string(),
                Err(Error::DecodeFailed("bad boolean value".into())),
            ),
            (
                r#"["AUTH","challenge"]"#.to_string(),
                Err(Error::DecodeFailed(
                    "unrecognized message type: '[\"AUTH\",\"challenge\"]'".into(),
                )),
            ),
        ];

        for (input, expected) in tests {
            let result = RelayMessage::from_json(&input);
            match expected {
                Ok(expected_msg) => {
                    assert_eq!(
                        result?, expected_msg,
                        "Expected {:?} for input: {}",
                        expected_msg, input
                    );
                }
                Err(expected_err) => {
                    assert!(
                        matches!(result, Err(ref e) if *e.to_string() == expected_err.to_string()),
                        "Expected error {:?} for input: {}, but got: {:?}",
                        expected_err,
                        input,
                        result
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_handle_empty_and_non_array() {
        assert!(matches!(RelayMessage::from_json(""), Err(Error::Empty)));
        assert!(matches!(
            RelayMessage::from_json(r#"{"EOSE":"x"}"#),
            Err(Error::DecodeFailed(_))
        ));
        assert!(matches!(
            RelayMessage::from_json(r#"["OK","b1a649eb",hello,""]"#),
            Err(Error::DecodeFailed(_))
        ));
    }
}
