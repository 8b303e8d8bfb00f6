//! Message data model.
//!
//! A `Message` has a fixed identity (`id`, `sender`, `files`, `category`) and a
//! mutable content region (`text`, `edited`). Streaming grows `text`; an edit
//! commit replaces it wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable message identifier, assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Who produced the message. Serialized as the wire enum `"User" | "Machine"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    User,
    Machine,
}

/// Structured diagnostic carried by an error message instead of free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBlock {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

/// Message category. Error messages are terminal: never streamed, never edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    Normal,
    Error(ErrorBlock),
}

/// Closed view of a message's rendering variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant<'a> {
    User,
    Machine,
    Error(&'a ErrorBlock),
}

/// Attachment reference. The server sends either a bare path or a described file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    Path(String),
    Described {
        path: String,
        #[serde(rename = "type")]
        kind: String,
        name: String,
    },
}

impl Attachment {
    pub fn path(&self) -> &str {
        match self {
            Attachment::Path(path) | Attachment::Described { path, .. } => path,
        }
    }

    /// Declared file type, if the server described it.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Attachment::Path(_) => None,
            Attachment::Described { kind, .. } => Some(kind),
        }
    }

    /// Display name: the declared name, or the last path component.
    pub fn display_name(&self) -> &str {
        match self {
            Attachment::Described { name, .. } if !name.is_empty() => name,
            _ => {
                let path = self.path();
                path.rsplit(['/', '\\']).next().unwrap_or(path)
            }
        }
    }
}

/// Avatar icon: either a literal glyph (emoji) or the name of an icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Icon {
    Glyph(String),
    Named(String),
}

impl Icon {
    /// Classifies a raw icon string.
    ///
    /// Anything containing a dingbat/misc-symbol character (U+2600..=U+27BF)
    /// or an astral-plane character is treated as a glyph.
    pub fn classify(raw: &str) -> Self {
        let is_glyph = raw
            .chars()
            .any(|c| ('\u{2600}'..='\u{27BF}').contains(&c) || u32::from(c) > 0xFFFF);
        if is_glyph {
            Icon::Glyph(raw.to_string())
        } else {
            Icon::Named(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Icon::Glyph(s) | Icon::Named(s) => s,
        }
    }
}

/// Cosmetic display hints. Carry no semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub icon: Option<Icon>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub source: Option<String>,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub sender_name: Option<String>,
    /// Accumulated raw text (may contain percent-encoded sequences).
    pub text: String,
    /// Server-issued event-stream URL while the content is still being produced.
    pub stream_url: Option<String>,
    pub thought: Option<String>,
    pub files: Vec<Attachment>,
    pub category: Category,
    pub edited: bool,
    pub meta: Option<MessageMeta>,
    /// Prompt template with `{name}` placeholders (user messages only).
    pub template: Option<String>,
    /// Structured payload the template placeholders are resolved against.
    pub variables: Map<String, Value>,
    pub session_id: Option<String>,
    /// Server-formatted creation time, shown verbatim.
    pub timestamp: Option<String>,
}

impl Message {
    fn base(sender: Sender, text: String) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            sender_name: None,
            text,
            stream_url: None,
            thought: None,
            files: Vec::new(),
            category: Category::Normal,
            edited: false,
            meta: None,
            template: None,
            variables: Map::new(),
            session_id: None,
            timestamp: None,
        }
    }

    /// A message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::base(Sender::User, text.into())
    }

    /// A fully materialized machine message.
    pub fn machine(text: impl Into<String>) -> Self {
        Self::base(Sender::Machine, text.into())
    }

    /// An empty machine placeholder whose content arrives over `stream_url`.
    pub fn machine_streaming(stream_url: impl Into<String>) -> Self {
        let mut message = Self::base(Sender::Machine, String::new());
        message.stream_url = Some(stream_url.into());
        message
    }

    /// A structured flow error.
    pub fn error(block: ErrorBlock) -> Self {
        let mut message = Self::base(Sender::Machine, String::new());
        message.category = Category::Error(block);
        message
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files;
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>, variables: Map<String, Value>) -> Self {
        self.template = Some(template.into());
        self.variables = variables;
        self
    }

    pub fn variant(&self) -> Variant<'_> {
        match (&self.category, self.sender) {
            (Category::Error(block), _) => Variant::Error(block),
            (Category::Normal, Sender::User) => Variant::User,
            (Category::Normal, Sender::Machine) => Variant::Machine,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.category, Category::Error(_))
    }

    /// Thought text, if present and non-empty.
    pub fn thought(&self) -> Option<&str> {
        self.thought.as_deref().filter(|t| !t.is_empty())
    }

    /// Sender name shown in the header; machines default to "AI".
    pub fn display_sender_name(&self) -> &str {
        match (&self.sender_name, self.sender) {
            (Some(name), _) => name,
            (None, Sender::Machine) => "AI",
            (None, Sender::User) => "User",
        }
    }
}
