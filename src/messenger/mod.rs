//! Messaging-platform adapter interface.
//!
//! The bot logic talks to chats only through [`Messenger`]. Large files the
//! bot interface refuses are fetched through a [`LocatorFetcher`].

mod bot_api;
mod fetch;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use bot_api::BotApiMessenger;
pub use fetch::{download_by_locator, LocatorFetcher, FETCH_CHUNK_SIZE};

pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("file of {size} bytes exceeds the {limit} byte transfer limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("bot API error {code}: {description}")]
    Api { code: u16, description: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// A message the bot sent or received, addressable for edits and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// File attached to an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Bot-interface file identifier.
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message: MessageRef,
    pub sender_id: Option<i64>,
    /// Message text, or the caption for media messages.
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub reply_to: Option<Box<IncomingMessage>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Message(IncomingMessage),
    Callback {
        id: String,
        data: String,
        message: Option<MessageRef>,
    },
}

/// Inline button attached to a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// How an uploaded file is presented in the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Video,
    Document,
}

#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wait for the next batch of updates.
    async fn next_updates(&self) -> Result<Vec<Update>, MessengerError>;

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: &[Button],
    ) -> Result<MessageRef, MessengerError>;

    async fn edit_message(&self, message: MessageRef, text: &str) -> Result<(), MessengerError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), MessengerError>;

    async fn answer_callback(&self, callback_id: &str) -> Result<(), MessengerError>;

    /// Download through the bot interface. Fails with
    /// [`MessengerError::TooLarge`] above the interface's download ceiling.
    async fn download_file(
        &self,
        attachment: &Attachment,
        dest: &Path,
    ) -> Result<u64, MessengerError>;

    /// Fails with [`MessengerError::TooLarge`] when the platform rejects
    /// the file for its size.
    async fn upload_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        kind: UploadKind,
        caption: &str,
    ) -> Result<(), MessengerError>;
}
