use crate::{Error, Filter, Note, RelayReqId};
use serde_json::json;

/// Messages sent by clients, received by relays
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Event(Note),
    Req {
        sub_id: RelayReqId,
        filters: Vec<Filter>,
    },
    Close {
        sub_id: RelayReqId,
    },
}

impl ClientMessage {
    pub fn event(note: Note) -> Self {
        ClientMessage::Event(note)
    }

    pub fn req(sub_id: RelayReqId, filters: Vec<Filter>) -> Self {
        ClientMessage::Req { sub_id, filters }
    }

    pub fn close(sub_id: RelayReqId) -> Self {
        ClientMessage::Close { sub_id }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(match self {
            Self::Event(note) => serde_json::to_string(&("EVENT", note))?,
            Self::Req { sub_id, filters } => {
                if filters.is_empty() {
                    format!("[\"REQ\",\"{}\",{{}}]", sub_id)
                } else {
                    let filters_json_str: Result<Vec<String>, Error> =
                        filters.iter().map(|f| f.json()).collect();
                    format!("[\"REQ\",\"{}\",{}]", sub_id, filters_json_str?.join(","))
                }
            }
            Self::Close { sub_id } => json!(["CLOSE", sub_id.0]).to_string(),
        })
    }
}
