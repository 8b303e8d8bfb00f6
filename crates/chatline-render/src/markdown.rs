//! Markdown → segments.
//!
//! Parses machine text with pulldown-cmark and splits it into prose segments
//! and code-block segments. Raw HTML in the text is kept as literal text so
//! untrusted input never turns into markup.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::segment::{Block, BlockKind, CodeBlock, ListMarker, Marks, Segment, Span, SpanKind};

/// Streaming cursor glyph appended by the server while content is pending.
pub const CURSOR: char = '▍';

/// Renders markdown text into an ordered list of segments.
pub fn render_markdown(text: &str) -> Vec<Segment> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_MATH);

    let mut renderer = MarkdownRenderer::default();
    for event in Parser::new_ext(text, options) {
        renderer.process_event(event);
    }
    renderer.finish()
}

/// Language tag from a fence annotation: the leading word characters of its
/// first token (`"python {x}"` → `python`, `"c++"` → `c`).
pub fn parse_language(info: &str) -> Option<String> {
    let lang: String = info
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!lang.is_empty()).then_some(lang)
}

/// Strips exactly one trailing newline.
fn strip_one_newline(code: &str) -> &str {
    code.strip_suffix('\n').unwrap_or(code)
}

#[derive(Debug, Clone)]
struct ListState {
    /// Next number for ordered lists, None for bullets.
    next: Option<u64>,
}

#[derive(Debug, Clone)]
struct CodeBuffer {
    language: Option<String>,
    text: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct TableState {
    row: usize,
    column: usize,
    in_head: bool,
}

/// Internal state for markdown rendering.
#[derive(Debug, Default)]
struct MarkdownRenderer {
    segments: Vec<Segment>,
    /// Prose blocks not yet emitted as a segment.
    blocks: Vec<Block>,
    current: Option<Block>,
    emphasis: usize,
    strong: usize,
    strikethrough: usize,
    links: Vec<String>,
    list_stack: Vec<ListState>,
    pending_marker: Option<ListMarker>,
    quote_depth: usize,
    heading: Option<u8>,
    code: Option<CodeBuffer>,
    table: Option<TableState>,
}

impl MarkdownRenderer {
    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.add_text(&text),
            Event::Code(code) => self.add_inline_code(&code),
            Event::InlineMath(math) => self.push_span(&math, SpanKind::Math),
            Event::DisplayMath(math) => self.push_span(&math, SpanKind::DisplayMath),
            Event::Html(html) => {
                // Raw HTML block lines stay literal
                self.push_span(html.trim_end_matches('\n'), SpanKind::Text);
            }
            Event::InlineHtml(html) => self.push_span(&html, SpanKind::Text),
            Event::FootnoteReference(label) => {
                self.push_span(&format!("[^{label}]"), SpanKind::Text);
            }
            Event::SoftBreak => self.push_span(" ", SpanKind::Text),
            Event::HardBreak => self.push_span("\n", SpanKind::Break),
            Event::Rule => {
                self.close_block();
                self.blocks.push(Block {
                    kind: BlockKind::Rule,
                    quote_depth: self.quote_depth,
                    spans: Vec::new(),
                });
            }
            Event::TaskListMarker(checked) => self.set_task_marker(checked),
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph | Tag::HtmlBlock => self.close_block(),
            Tag::Heading { level, .. } => {
                self.close_block();
                self.heading = Some(heading_number(level));
            }
            Tag::CodeBlock(kind) => {
                self.close_block();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => parse_language(&info),
                    CodeBlockKind::Indented => None,
                };
                self.code = Some(CodeBuffer {
                    language,
                    text: String::new(),
                });
            }
            Tag::List(start) => {
                self.close_block();
                self.list_stack.push(ListState { next: start });
            }
            Tag::Item => {
                self.close_block();
                let marker = match self.list_stack.last_mut() {
                    Some(ListState { next: Some(n) }) => {
                        let marker = ListMarker::Ordered(*n);
                        *n += 1;
                        marker
                    }
                    _ => ListMarker::Bullet,
                };
                self.pending_marker = Some(marker);
            }
            Tag::BlockQuote(_) => {
                self.close_block();
                self.quote_depth += 1;
            }
            Tag::Emphasis => self.emphasis += 1,
            Tag::Strong => self.strong += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link { dest_url, .. } | Tag::Image { dest_url, .. } => {
                self.links.push(dest_url.to_string());
            }
            Tag::Table(_) => {
                self.close_block();
                self.table = Some(TableState::default());
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.column = 0;
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.column = 0;
                }
            }
            Tag::TableCell => {
                self.close_block();
                if let Some(table) = self.table {
                    self.current = Some(Block {
                        kind: BlockKind::TableCell {
                            row: table.row,
                            column: table.column,
                            header: table.in_head,
                        },
                        quote_depth: self.quote_depth,
                        spans: Vec::new(),
                    });
                }
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::HtmlBlock | TagEnd::Item => self.close_block(),
            TagEnd::Heading(_) => {
                self.close_block();
                self.heading = None;
            }
            TagEnd::CodeBlock => self.finish_code_block(),
            TagEnd::List(_) => {
                self.close_block();
                self.list_stack.pop();
            }
            TagEnd::BlockQuote(_) => {
                self.close_block();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::Emphasis => self.emphasis = self.emphasis.saturating_sub(1),
            TagEnd::Strong => self.strong = self.strong.saturating_sub(1),
            TagEnd::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            TagEnd::Link | TagEnd::Image => {
                self.links.pop();
            }
            TagEnd::TableCell => {
                // Cells are kept even when empty so the grid stays aligned
                if let Some(block) = self.current.take() {
                    self.blocks.push(block);
                }
                if let Some(table) = self.table.as_mut() {
                    table.column += 1;
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = false;
                    table.row += 1;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row += 1;
                }
            }
            TagEnd::Table => {
                self.close_block();
                self.table = None;
            }
            _ => {}
        }
    }

    fn add_text(&mut self, text: &str) {
        if let Some(code) = self.code.as_mut() {
            code.text.push_str(text);
            return;
        }
        if let Some(rest) = text.strip_prefix(CURSOR) {
            self.push_cursor();
            self.push_span(rest, SpanKind::Text);
            return;
        }
        self.push_span(text, SpanKind::Text);
    }

    fn add_inline_code(&mut self, code: &str) {
        if code.starts_with(CURSOR) {
            self.push_cursor();
        } else {
            self.push_span(code, SpanKind::Code);
        }
    }

    fn marks(&self) -> Marks {
        Marks {
            emphasis: self.emphasis > 0,
            strong: self.strong > 0,
            strikethrough: self.strikethrough > 0,
        }
    }

    /// Kind for a block opened at the current nesting.
    fn context_kind(&mut self) -> BlockKind {
        if let Some(level) = self.heading {
            BlockKind::Heading { level }
        } else if self.list_stack.is_empty() {
            BlockKind::Paragraph
        } else {
            BlockKind::ListItem {
                depth: self.list_stack.len(),
                marker: self.pending_marker.take().unwrap_or(ListMarker::Continuation),
            }
        }
    }

    fn current_block(&mut self) -> &mut Block {
        let block = match self.current.take() {
            Some(block) => block,
            None => Block {
                kind: self.context_kind(),
                quote_depth: self.quote_depth,
                spans: Vec::new(),
            },
        };
        self.current.insert(block)
    }

    fn push_span(&mut self, text: &str, kind: SpanKind) {
        if text.is_empty() {
            return;
        }
        let marks = self.marks();
        let link = self.links.last().cloned();
        let block = self.current_block();

        // Merge adjacent plain text runs with identical formatting
        if kind == SpanKind::Text
            && let Some(last) = block.spans.last_mut()
            && last.kind == SpanKind::Text
            && last.marks == marks
            && last.link == link
        {
            last.text.push_str(text);
            return;
        }

        block.spans.push(Span {
            text: text.to_string(),
            kind,
            marks,
            link,
        });
    }

    fn push_cursor(&mut self) {
        let marks = self.marks();
        self.current_block().spans.push(Span {
            text: String::new(),
            kind: SpanKind::Cursor,
            marks,
            link: None,
        });
    }

    fn set_task_marker(&mut self, checked: bool) {
        let marker = ListMarker::Task { checked };
        match self.current.as_mut() {
            Some(Block {
                kind: BlockKind::ListItem { marker: current, .. },
                spans,
                ..
            }) if spans.is_empty() => *current = marker,
            _ => self.pending_marker = Some(marker),
        }
    }

    fn close_block(&mut self) {
        if let Some(block) = self.current.take()
            && !block.spans.is_empty()
        {
            self.blocks.push(block);
        }
    }

    fn flush_prose(&mut self) {
        self.close_block();
        if !self.blocks.is_empty() {
            let blocks = std::mem::take(&mut self.blocks);
            self.segments.push(Segment::Prose { blocks });
        }
    }

    fn finish_code_block(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };

        if code.text.starts_with(CURSOR) {
            // A cursor-only fence collapses into an empty placeholder
            self.close_block();
            self.push_cursor();
            self.close_block();
            return;
        }

        self.flush_prose();
        self.segments.push(Segment::Code(CodeBlock {
            language: code.language,
            code: strip_one_newline(&code.text).to_string(),
        }));
    }

    fn finish(mut self) -> Vec<Segment> {
        // Unterminated fences still yield their code
        if self.code.is_some() {
            self.finish_code_block();
        }
        self.flush_prose();
        self.segments
    }
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
