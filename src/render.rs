//! Terminal presentation of store state
//!
//! Everything here is derived from snapshots; nothing feeds back into the
//! stores.

use crate::api::Role;
use crate::chat::Message;
use chrono::{DateTime, NaiveDateTime};
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use std::fmt::Write;

/// A run of message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(String),
    Code {
        language: Option<String>,
        code: String,
    },
}

/// Split markdown into prose and code blocks, in order
pub fn split_blocks(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    let mut open: Option<(Option<String>, String)> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                push_text(&mut blocks, content.get(cursor..range.start));
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                open = Some((language, String::new()));
                cursor = range.end;
            }
            Event::Text(text) => {
                if let Some((_, code)) = open.as_mut() {
                    code.push_str(&text);
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, code)) = open.take() {
                    blocks.push(Block::Code { language, code });
                }
            }
            _ => {}
        }
    }

    push_text(&mut blocks, content.get(cursor..));
    blocks
}

fn push_text(blocks: &mut Vec<Block>, text: Option<&str>) {
    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        blocks.push(Block::Text(text.to_string()));
    }
}

/// Short human form, e.g. `May 1, 2:05 PM`
///
/// Accepts RFC 3339 and zone-less ISO timestamps; anything else is
/// returned unchanged.
pub fn format_timestamp(timestamp: &str) -> String {
    const FORMAT: &str = "%b %-d, %-I:%M %p";
    if timestamp.is_empty() {
        return String::new();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return parsed.format(FORMAT).to_string();
    }
    match NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(parsed) => parsed.format(FORMAT).to_string(),
        Err(_) => timestamp.to_string(),
    }
}

/// One message as printed in the REPL, numbered by position
pub fn render_message(position: usize, message: &Message, pending: bool) -> String {
    let mut out = String::new();
    let author = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    let _ = write!(out, "[{position}] {author}");
    let when = format_timestamp(&message.timestamp);
    if !when.is_empty() {
        let _ = write!(out, " · {when}");
    }
    if let Some(strategy) = message.metadata.as_ref().and_then(|m| m.strategy.as_deref()) {
        let _ = write!(out, " · {strategy}");
    }
    if pending {
        out.push_str(" (waiting for answer)");
    }
    out.push('\n');

    for block in split_blocks(&message.content) {
        match block {
            Block::Text(text) => {
                for line in text.lines() {
                    let _ = writeln!(out, "  {line}");
                }
            }
            Block::Code { language, code } => {
                let _ = writeln!(out, "  ```{}", language.unwrap_or_default());
                for line in code.lines() {
                    let _ = writeln!(out, "  {line}");
                }
                out.push_str("  ```\n");
            }
        }
    }

    if !message.sources.is_empty() {
        out.push_str("  Sources:\n");
        for source in &message.sources {
            let title = source.title.as_deref().unwrap_or("Untitled");
            match source.relevance {
                Some(relevance) => {
                    let _ = writeln!(out, "    - {title} ({:.0}%)", relevance * 100.0);
                }
                None => {
                    let _ = writeln!(out, "    - {title}");
                }
            }
        }
    }
    out
}
