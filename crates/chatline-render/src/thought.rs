//! Thought channel: ANSI-escaped plain text → HTML-safe markup.
//!
//! The output only ever contains escaped text plus the `<span>` and `<br/>`
//! tags produced here.

use std::fmt::Write;

use ansi_to_tui::IntoText;
use ratatui::style::{Color, Modifier, Style};

use crate::segment::{Segment, Thought};

/// Thought segment; the HTML is produced only when expanded.
pub fn render_thought(thought: &str, expanded: bool) -> Segment {
    Segment::Thought(Thought {
        expanded,
        html: expanded.then(|| ansi_to_html(thought)),
    })
}

/// Converts ANSI-escaped text to HTML, newlines become `<br/>`.
pub fn ansi_to_html(input: &str) -> String {
    let text = match input.into_text() {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!("ANSI parse failed, escaping raw text: {err}");
            return escape_html(input).replace('\n', "<br/>");
        }
    };

    let mut html = String::new();
    for (index, line) in text.lines.iter().enumerate() {
        if index > 0 {
            html.push_str("<br/>");
        }
        for span in &line.spans {
            let style = line.style.patch(span.style);
            push_span(&mut html, &span.content, style);
        }
    }
    html
}

fn push_span(html: &mut String, content: &str, style: Style) {
    if content.is_empty() {
        return;
    }
    let css = style_css(style);
    if css.is_empty() {
        html.push_str(&escape_html(content));
    } else {
        let _ = write!(html, "<span style=\"{css}\">{}</span>", escape_html(content));
    }
}

fn style_css(style: Style) -> String {
    let mut rules = Vec::new();
    let reversed = style.add_modifier.contains(Modifier::REVERSED);
    let (fg, bg) = if reversed {
        (style.bg, style.fg)
    } else {
        (style.fg, style.bg)
    };

    if let Some(color) = fg.and_then(color_hex) {
        rules.push(format!("color:{color}"));
    }
    if let Some(color) = bg.and_then(color_hex) {
        rules.push(format!("background-color:{color}"));
    }
    if style.add_modifier.contains(Modifier::BOLD) {
        rules.push("font-weight:bold".to_string());
    }
    if style.add_modifier.contains(Modifier::DIM) {
        rules.push("opacity:0.5".to_string());
    }
    if style.add_modifier.contains(Modifier::ITALIC) {
        rules.push("font-style:italic".to_string());
    }
    if style.add_modifier.contains(Modifier::UNDERLINED) {
        rules.push("text-decoration:underline".to_string());
    }
    if style.add_modifier.contains(Modifier::CROSSED_OUT) {
        rules.push("text-decoration:line-through".to_string());
    }
    if style.add_modifier.contains(Modifier::HIDDEN) {
        rules.push("visibility:hidden".to_string());
    }
    rules.join(";")
}

/// The classic 16-color palette.
const BASE_COLORS: [&str; 16] = [
    "#000", "#A00", "#0A0", "#A50", "#00A", "#A0A", "#0AA", "#AAA", "#555", "#F55", "#5F5",
    "#FF5", "#55F", "#F5F", "#5FF", "#FFF",
];

fn color_hex(color: Color) -> Option<String> {
    let hex = match color {
        Color::Reset => return None,
        Color::Black => BASE_COLORS[0].to_string(),
        Color::Red => BASE_COLORS[1].to_string(),
        Color::Green => BASE_COLORS[2].to_string(),
        Color::Yellow => BASE_COLORS[3].to_string(),
        Color::Blue => BASE_COLORS[4].to_string(),
        Color::Magenta => BASE_COLORS[5].to_string(),
        Color::Cyan => BASE_COLORS[6].to_string(),
        Color::Gray => BASE_COLORS[7].to_string(),
        Color::DarkGray => BASE_COLORS[8].to_string(),
        Color::LightRed => BASE_COLORS[9].to_string(),
        Color::LightGreen => BASE_COLORS[10].to_string(),
        Color::LightYellow => BASE_COLORS[11].to_string(),
        Color::LightBlue => BASE_COLORS[12].to_string(),
        Color::LightMagenta => BASE_COLORS[13].to_string(),
        Color::LightCyan => BASE_COLORS[14].to_string(),
        Color::White => BASE_COLORS[15].to_string(),
        Color::Rgb(r, g, b) => format!("#{r:02x}{g:02x}{b:02x}"),
        Color::Indexed(index) => indexed_hex(index),
    };
    Some(hex)
}

/// xterm 256-color palette.
fn indexed_hex(index: u8) -> String {
    match index {
        0..=15 => BASE_COLORS[usize::from(index)].to_string(),
        16..=231 => {
            const LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];
            let i = index - 16;
            let r = LEVELS[usize::from(i / 36)];
            let g = LEVELS[usize::from((i / 6) % 6)];
            let b = LEVELS[usize::from(i % 6)];
            format!("#{r:02x}{g:02x}{b:02x}")
        }
        232..=255 => {
            let level = 8 + (index - 232) * 10;
            format!("#{level:02x}{level:02x}{level:02x}")
        }
    }
}

/// Escapes the characters significant in HTML text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
