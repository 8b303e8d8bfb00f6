//! Render segments: the only contract between the pipeline and the view layer.

use chatline_types::Icon;
use serde::Serialize;

/// One typed unit of renderable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Sender line shown above the content.
    Header(Header),
    /// Formatted markdown prose.
    Prose { blocks: Vec<Block> },
    /// Verbatim text (user input is not parsed as markup).
    Plain { text: String },
    /// Fenced code, shown in the code viewer and never inline.
    Code(CodeBlock),
    /// Secondary "thought" channel.
    Thought(Thought),
    /// "Display prompt" toggle shown on templated user messages.
    PromptToggle { open: bool },
    /// Template lines with placeholders resolved.
    Template { lines: Vec<TemplateLine> },
    /// Fixed-format diagnostic for structured flow errors.
    ErrorPanel(ErrorPanel),
    /// Canonical text shown instead of an empty message.
    Placeholder { text: String },
    /// Content is still on its way.
    Working,
    /// The message was changed by an edit.
    Edited,
    Attachment {
        path: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
    /// The message is being edited; seeded with the pre-edit text.
    Editor { text: String },
}

/// Sender name plus the cosmetic hints from the message metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

impl CodeBlock {
    /// Tab label for the code viewer.
    pub fn label(&self) -> &str {
        self.language.as_deref().unwrap_or("text")
    }
}

/// Thought region. The HTML is only produced once expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thought {
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateLine {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum TemplatePart {
    Literal(String),
    /// A resolved placeholder, rendered highlighted.
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPanel {
    pub headline: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Steps to fix; empty unless the error carries a solution.
    pub steps: Vec<String>,
}

/// A block of prose (paragraph, heading, list item, table cell, rule).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Blockquote nesting level (0 outside quotes).
    pub quote_depth: usize,
    pub spans: Vec<Span>,
}

impl Block {
    /// Concatenated span text.
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    ListItem { depth: usize, marker: ListMarker },
    TableCell { row: usize, column: usize, header: bool },
    Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListMarker {
    Bullet,
    Ordered(u64),
    Task { checked: bool },
    /// A later block inside the same list item.
    Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub text: String,
    pub kind: SpanKind,
    #[serde(skip_serializing_if = "Marks::is_plain")]
    pub marks: Marks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Span {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: SpanKind::Text,
            marks: Marks::default(),
            link: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Text,
    Code,
    Math,
    DisplayMath,
    Break,
    /// Streaming cursor: an empty placeholder, not content.
    Cursor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Marks {
    pub emphasis: bool,
    pub strong: bool,
    pub strikethrough: bool,
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }
}
