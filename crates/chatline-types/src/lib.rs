//! Shared chat message types (no I/O).

pub mod message;
pub mod wire;

pub use message::{
    Attachment, Category, ErrorBlock, Icon, Message, MessageId, MessageMeta, Sender, Variant,
};
pub use wire::{ChatRecord, UpdateMessagePayload, UpdateOptions};
