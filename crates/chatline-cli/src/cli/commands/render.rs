//! Render command handler.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chatline_core::{MessageMachine, ViewState, present};
use chatline_types::{ChatRecord, Message};

pub fn run(file: Option<&Path>, expand_thought: bool, open_prompt: bool) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read record from {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read record from stdin")?;
            buf
        }
    };

    let record: ChatRecord = serde_json::from_str(&raw).context("parse chat record")?;
    let machine = MessageMachine::new(Message::from(record));
    let view = ViewState {
        thought_expanded: expand_thought,
        prompt_open: open_prompt,
    };

    let segments = present(machine.message(), machine.phase(), view);
    println!(
        "{}",
        serde_json::to_string_pretty(&segments).context("serialize segments")?
    );
    Ok(())
}
