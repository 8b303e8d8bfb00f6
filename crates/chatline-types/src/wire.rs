//! Records exchanged with the chat server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::{Attachment, Category, ErrorBlock, Icon, Message, MessageId, MessageMeta, Sender};

/// Chat message as delivered by the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatRecord {
    pub id: Option<String>,
    #[serde(rename = "isSend")]
    pub is_send: bool,
    /// Free text, or an object holding the structured template payload.
    pub message: Value,
    pub sender_name: Option<String>,
    pub thought: Option<String>,
    pub files: Vec<Attachment>,
    pub stream_url: Option<String>,
    pub template: Option<String>,
    pub edit: bool,
    pub category: Option<String>,
    pub content_blocks: Vec<Value>,
    pub meta_data: Option<MetaRecord>,
    pub session: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetaRecord {
    pub icon: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub source: Option<String>,
}

impl From<MetaRecord> for MessageMeta {
    fn from(record: MetaRecord) -> Self {
        Self {
            icon: record
                .icon
                .filter(|icon| !icon.is_empty())
                .map(|icon| Icon::classify(&icon)),
            background_color: record.background_color,
            text_color: record.text_color,
            source: record.source,
        }
    }
}

impl From<ChatRecord> for Message {
    fn from(record: ChatRecord) -> Self {
        let (text, variables) = match record.message {
            Value::Null => (String::new(), Map::new()),
            Value::String(text) => (text, Map::new()),
            Value::Object(map) => (String::new(), map),
            other => (other.to_string(), Map::new()),
        };

        let category = if record.category.as_deref() == Some("error") {
            let block = record
                .content_blocks
                .into_iter()
                .next()
                .and_then(|value| serde_json::from_value::<ErrorBlock>(value).ok())
                .unwrap_or_default();
            Category::Error(block)
        } else {
            Category::Normal
        };

        Message {
            id: record.id.map_or_else(MessageId::new, MessageId),
            sender: if record.is_send {
                Sender::User
            } else {
                Sender::Machine
            },
            sender_name: record.sender_name,
            text,
            stream_url: record.stream_url.filter(|url| !url.is_empty()),
            thought: record.thought,
            files: record.files,
            category,
            edited: record.edit,
            meta: record.meta_data.map(MessageMeta::from),
            template: record.template.filter(|t| !t.is_empty()),
            variables,
            session_id: record.session,
            timestamp: record.timestamp,
        }
    }
}

/// Body of the "update message" persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessagePayload {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub sender_name: String,
    /// Bare attachment paths; type/name metadata is not round-tripped.
    pub files: Vec<String>,
    pub flow_id: String,
    pub session_id: String,
    pub edit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub category: String,
}

impl UpdateMessagePayload {
    /// Builds the payload that replaces `message`'s text with `text`.
    ///
    /// A missing sender name is sent as "AI" regardless of the sender.
    /// The message's own session id wins over `session_id`; an absent session
    /// is sent as the empty string.
    pub fn for_edit(message: &Message, text: &str, flow_id: &str, session_id: Option<&str>) -> Self {
        Self {
            id: message.id.0.clone(),
            text: text.to_string(),
            sender: message.sender,
            sender_name: message
                .sender_name
                .clone()
                .unwrap_or_else(|| "AI".to_string()),
            files: message.files.iter().map(|f| f.path().to_string()).collect(),
            flow_id: flow_id.to_string(),
            session_id: message
                .session_id
                .as_deref()
                .or(session_id)
                .unwrap_or_default()
                .to_string(),
            edit: true,
            thought: message.thought.clone(),
            category: "message".to_string(),
        }
    }
}

/// Options accompanying a persistence call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    /// Ask observers to reload the conversation after a successful update.
    pub refetch: bool,
}
