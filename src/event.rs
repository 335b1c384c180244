//! Events received from Redis and forwarded to clients.
//!
//! Every message published to a timeline channel has the shape
//! `{"event": <name>, "payload": <kind-specific>, ...}`.  The set of event names is closed;
//! each name maps to one variant with its own payload type.  Names this server does not know
//! are preserved as [`Event::Dynamic`] and forwarded without inspection.
mod err;
mod id;
mod status;

pub use err::EventErr;
pub use id::Id;
pub use status::{Account, Attachment, Mention, Poll, PollOption, Status};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Update(Status),
    StatusUpdate(Status),
    Delete(String),
    Notification(Value),
    Conversation(Value),
    Announcement(Value),
    AnnouncementReaction(Value),
    AnnouncementDelete(String),
    EncryptedMessage(Value),
    FiltersChanged,
    Kill,
    Dynamic { event: String, payload: Value },
}

#[derive(Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Serialize)]
struct WsMessage<'a> {
    stream: &'a [String],
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

impl Event {
    pub fn event_name(&self) -> &str {
        use Event::*;
        match self {
            Update(_) => "update",
            StatusUpdate(_) => "status.update",
            Delete(_) => "delete",
            Notification(_) => "notification",
            Conversation(_) => "conversation",
            Announcement(_) => "announcement",
            AnnouncementReaction(_) => "announcement.reaction",
            AnnouncementDelete(_) => "announcement.delete",
            EncryptedMessage(_) => "encrypted_message",
            FiltersChanged => "filters_changed",
            Kill => "kill",
            Dynamic { event, .. } => event,
        }
    }

    /// The payload as it is written to the wire.  String payloads (ids) are sent bare; every
    /// other payload is sent as JSON text.
    pub fn payload(&self) -> Option<String> {
        use Event::*;
        match self {
            Update(status) | StatusUpdate(status) => Some(escaped(status)),
            Delete(id) | AnnouncementDelete(id) => Some(id.clone()),
            Notification(v) | Conversation(v) | Announcement(v) | AnnouncementReaction(v)
            | EncryptedMessage(v) => Some(v.to_string()),
            Dynamic { payload, .. } => match payload {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            },
            FiltersChanged | Kill => None,
        }
    }

    /// The Status carried by `update` and `status.update` events
    pub fn update_payload(&self) -> Option<&Status> {
        match self {
            Event::Update(status) | Event::StatusUpdate(status) => Some(status),
            _ => None,
        }
    }

    /// Returns a copy of this event with `filtered` set on its Status, or `None` if this is
    /// not an update-class event.
    pub fn with_filter_results(&self, results: Value) -> Option<Self> {
        match self {
            Event::Update(status) => Some(Event::Update(status.with_filter_results(results))),
            Event::StatusUpdate(status) => {
                Some(Event::StatusUpdate(status.with_filter_results(results)))
            }
            _ => None,
        }
    }

    /// Encode the event for a multiplexed (WebSocket) connection
    pub fn to_ws_json(&self, stream: &[String]) -> String {
        let msg = WsMessage {
            stream,
            event: self.event_name(),
            payload: self.payload(),
        };
        escaped(&msg)
    }

    /// Encode the event for a Server Sent Events connection
    pub fn to_sse(&self) -> warp::sse::Event {
        warp::sse::Event::default()
            .event(self.event_name())
            .data(self.payload().unwrap_or_default())
    }
}

impl TryFrom<&str> for Event {
    type Error = EventErr;

    fn try_from(event_txt: &str) -> Result<Event, Self::Error> {
        let RawEvent { event, payload } = serde_json::from_str(event_txt)?;
        Ok(match event.as_str() {
            "update" => Event::Update(serde_json::from_value(payload)?),
            "status.update" => Event::StatusUpdate(serde_json::from_value(payload)?),
            "delete" => Event::Delete(id_text(payload)?),
            "announcement.delete" => Event::AnnouncementDelete(id_text(payload)?),
            "notification" => Event::Notification(payload),
            "conversation" => Event::Conversation(payload),
            "announcement" => Event::Announcement(payload),
            "announcement.reaction" => Event::AnnouncementReaction(payload),
            "encrypted_message" => Event::EncryptedMessage(payload),
            "filters_changed" => Event::FiltersChanged,
            "kill" => Event::Kill,
            _ => {
                log::debug!("Forwarding unrecognized event `{}` without type checking", event);
                Event::Dynamic { event, payload }
            }
        })
    }
}

fn id_text(payload: Value) -> Result<String, EventErr> {
    match payload {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        _ => Err(EventErr::MissingId),
    }
}

fn escaped<T: Serialize>(content: &T) -> String {
    serde_json::to_string(content).expect("Guaranteed by Serialize trait bound")
}
