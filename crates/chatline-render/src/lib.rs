//! Content pipeline: message text → ordered render segments.
//!
//! Everything here is a pure function of its inputs.

pub mod markdown;
pub mod segment;
pub mod template;
pub mod thought;

use chatline_types::{Attachment, ErrorBlock, Variant};
use serde_json::{Map, Value};

pub use markdown::{CURSOR, render_markdown};
pub use segment::{
    Block, BlockKind, CodeBlock, ErrorPanel, Header, ListMarker, Marks, Segment, Span, SpanKind,
    TemplateLine, TemplatePart, Thought,
};
pub use template::render_template;
pub use thought::{ansi_to_html, render_thought};

pub const ERROR_HEADLINE: &str = "An error stopped your flow.";

/// Shown when the error carries a solution.
pub const FIX_STEPS: [&str; 3] = [
    "Check the component settings",
    "Ensure all required fields are filled",
    "Re-run your flow",
];

/// Inputs to [`render`].
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub text: &'a str,
    pub variant: Variant<'a>,
    pub template: Option<&'a str>,
    pub variables: &'a Map<String, Value>,
    pub attachments: &'a [Attachment],
}

impl<'a> RenderInput<'a> {
    pub fn new(text: &'a str, variant: Variant<'a>, variables: &'a Map<String, Value>) -> Self {
        Self {
            text,
            variant,
            template: None,
            variables,
            attachments: &[],
        }
    }

    #[must_use]
    pub fn with_template(mut self, template: Option<&'a str>) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: &'a [Attachment]) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Renders content for one message variant.
///
/// Machine text is parsed as markdown. User text is never parsed: it becomes
/// template lines when a template is given, plain text otherwise, followed
/// by the attachments.
pub fn render(input: &RenderInput<'_>) -> Vec<Segment> {
    match input.variant {
        Variant::Error(block) => vec![Segment::ErrorPanel(error_panel(block))],
        Variant::Machine => render_markdown(input.text),
        Variant::User => match input.template {
            Some(template) => vec![Segment::Template {
                lines: render_template(template, input.variables),
            }],
            None => {
                let mut segments = Vec::with_capacity(1 + input.attachments.len());
                if !input.text.is_empty() {
                    segments.push(Segment::Plain {
                        text: input.text.to_string(),
                    });
                }
                segments.extend(input.attachments.iter().map(attachment_segment));
                segments
            }
        },
    }
}

/// Fixed-format diagnostic for a structured flow error.
pub fn error_panel(block: &ErrorBlock) -> ErrorPanel {
    ErrorPanel {
        headline: ERROR_HEADLINE.to_string(),
        component: block.component.clone(),
        field: block.field.clone(),
        reason: block.reason.clone(),
        steps: if block.solution.is_some() {
            FIX_STEPS.iter().map(ToString::to_string).collect()
        } else {
            Vec::new()
        },
    }
}

pub fn attachment_segment(attachment: &Attachment) -> Segment {
    Segment::Attachment {
        path: attachment.path().to_string(),
        name: attachment.display_name().to_string(),
        kind: attachment.kind().map(ToString::to_string),
    }
}
