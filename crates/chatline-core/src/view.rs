//! Presentation: message + phase + view toggles → segments.

use chatline_render::{Header, RenderInput, Segment, error_panel, render, render_thought};
use chatline_types::{Message, Variant};

use crate::decode::{decode_display_text, is_empty_text};
use crate::machine::MessagePhase;

pub const EMPTY_INPUT_MESSAGE: &str = "No input message provided.";
pub const EMPTY_OUTPUT_MESSAGE: &str = "Message empty.";

/// Viewer-owned toggles. Flipping them never touches the message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewState {
    pub thought_expanded: bool,
    pub prompt_open: bool,
}

/// Segments to show for `message` in `phase`: the header, then the body.
pub fn present(message: &Message, phase: MessagePhase, view: ViewState) -> Vec<Segment> {
    let mut segments = vec![header(message)];
    segments.extend(present_body(message, phase, view));
    segments
}

/// Sender line for `message`. Metadata is passed through as-is.
pub fn header(message: &Message) -> Segment {
    let meta = message.meta.clone().unwrap_or_default();
    Segment::Header(Header {
        sender: message.display_sender_name().to_string(),
        icon: meta.icon,
        source: meta.source,
        background_color: meta.background_color,
        text_color: meta.text_color,
        timestamp: message.timestamp.clone(),
    })
}

fn present_body(message: &Message, phase: MessagePhase, view: ViewState) -> Vec<Segment> {
    let text = decode_display_text(&message.text);

    match message.variant() {
        Variant::Error(block) => vec![Segment::ErrorPanel(error_panel(block))],
        _ if phase == MessagePhase::Editing => vec![Segment::Editor {
            text: text.into_owned(),
        }],
        variant @ Variant::Machine => {
            let mut segments = Vec::new();
            if let Some(thought) = message.thought() {
                segments.push(render_thought(thought, view.thought_expanded));
            }
            if is_empty_text(&text) {
                if matches!(phase, MessagePhase::Pending | MessagePhase::Streaming) {
                    segments.push(Segment::Working);
                } else {
                    segments.push(placeholder(EMPTY_OUTPUT_MESSAGE));
                }
            } else {
                segments.extend(render(&RenderInput::new(&text, variant, &message.variables)));
            }
            if message.edited {
                segments.push(Segment::Edited);
            }
            segments
        }
        variant @ Variant::User => {
            let mut segments = Vec::new();
            if message.template.is_some() {
                segments.push(Segment::PromptToggle {
                    open: view.prompt_open,
                });
            }
            let template = message.template.as_deref().filter(|_| view.prompt_open);
            let attachments = if template.is_some() {
                &[][..]
            } else {
                message.files.as_slice()
            };

            if template.is_none() && is_empty_text(&text) {
                segments.push(placeholder(EMPTY_INPUT_MESSAGE));
                if message.edited {
                    segments.push(Segment::Edited);
                }
                segments.extend(attachments.iter().map(chatline_render::attachment_segment));
                return segments;
            }

            let input = RenderInput::new(&text, variant, &message.variables)
                .with_template(template)
                .with_attachments(attachments);
            let rendered = render(&input);
            let split = rendered
                .iter()
                .position(|s| matches!(s, Segment::Attachment { .. }))
                .unwrap_or(rendered.len());
            let mut rendered = rendered.into_iter();
            segments.extend(rendered.by_ref().take(split));
            if message.edited {
                segments.push(Segment::Edited);
            }
            segments.extend(rendered);
            segments
        }
    }
}

fn placeholder(text: &str) -> Segment {
    Segment::Placeholder {
        text: text.to_string(),
    }
}
