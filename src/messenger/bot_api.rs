use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{
    Attachment, Button, ChatId, IncomingMessage, MessageId, MessageRef, Messenger, MessengerError,
    Update, UploadKind,
};
use crate::config::{BotConfig, LimitsConfig};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    message_id: i64,
    chat: WireChat,
    from: Option<WireUser>,
    text: Option<String>,
    caption: Option<String>,
    document: Option<WireAttachment>,
    video: Option<WireAttachment>,
    reply_to_message: Option<Box<WireMessage>>,
}

#[derive(Debug, Deserialize)]
struct WireMessageRef {
    message_id: i64,
    chat: WireChat,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    file_id: String,
    file_name: Option<String>,
    file_size: Option<u64>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<WireMessageRef>,
}

#[derive(Debug, Deserialize)]
struct WireFileInfo {
    file_path: Option<String>,
}

impl From<WireAttachment> for Attachment {
    fn from(wire: WireAttachment) -> Self {
        Self {
            file_id: wire.file_id,
            file_name: wire.file_name,
            file_size: wire.file_size,
            mime_type: wire.mime_type,
        }
    }
}

impl From<WireMessageRef> for MessageRef {
    fn from(wire: WireMessageRef) -> Self {
        Self {
            chat_id: wire.chat.id,
            message_id: wire.message_id,
        }
    }
}

impl From<WireMessage> for IncomingMessage {
    fn from(wire: WireMessage) -> Self {
        Self {
            message: MessageRef {
                chat_id: wire.chat.id,
                message_id: wire.message_id,
            },
            sender_id: wire.from.map(|user| user.id),
            text: wire.text.or(wire.caption),
            attachment: wire.document.or(wire.video).map(Attachment::from),
            reply_to: wire
                .reply_to_message
                .map(|reply| Box::new(IncomingMessage::from(*reply))),
        }
    }
}

fn convert_update(wire: WireUpdate) -> Option<Update> {
    if let Some(message) = wire.message {
        return Some(Update::Message(message.into()));
    }
    wire.callback_query.map(|query| Update::Callback {
        id: query.id,
        data: query.data.unwrap_or_default(),
        message: query.message.map(MessageRef::from),
    })
}

// reqwest errors embed the request URL, which carries the bot token.
fn transport(err: reqwest::Error) -> MessengerError {
    MessengerError::Transport(err.without_url())
}

fn into_result<T>(response: ApiResponse<T>, http_status: u16) -> Result<T, MessengerError> {
    if response.ok {
        return response
            .result
            .ok_or_else(|| MessengerError::Protocol("response without result".to_string()));
    }
    Err(MessengerError::Api {
        code: response.error_code.unwrap_or(http_status),
        description: response.description.unwrap_or_default(),
    })
}

fn is_too_big(code: u16, description: &str) -> bool {
    let description = description.to_lowercase();
    code == StatusCode::PAYLOAD_TOO_LARGE.as_u16()
        || description.contains("too big")
        || description.contains("too large")
}

fn inline_keyboard(buttons: &[Button]) -> Value {
    let row: Vec<Value> = buttons
        .iter()
        .map(|b| json!({ "text": b.label, "callback_data": b.data }))
        .collect();
    json!({ "inline_keyboard": [row] })
}

/// [`Messenger`] over the HTTP bot API, using long polling.
pub struct BotApiMessenger {
    client: reqwest::Client,
    api_url: String,
    token: String,
    poll_timeout_seconds: u64,
    download_limit: u64,
    upload_limit: u64,
    offset: AtomicI64,
}

impl BotApiMessenger {
    pub fn new(bot: &BotConfig, limits: &LimitsConfig) -> Self {
        info!("Initialized bot API messenger with endpoint: {}", bot.api_url);

        Self {
            client: reqwest::Client::new(),
            api_url: bot.api_url.trim_end_matches('/').to_string(),
            token: bot.token.clone(),
            poll_timeout_seconds: bot.poll_timeout_seconds,
            download_limit: limits.bot_download_limit_bytes(),
            upload_limit: limits.max_upload_bytes(),
            offset: AtomicI64::new(0),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
    ) -> Result<T, MessengerError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        parse_response(method, response).await
    }
}

async fn parse_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, MessengerError> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    let parsed: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
        MessengerError::Protocol(format!("{} returned HTTP {}: {}", method, status, e))
    })?;
    into_result(parsed, status.as_u16())
}

#[async_trait]
impl Messenger for BotApiMessenger {
    fn name(&self) -> &'static str {
        "bot-api"
    }

    async fn next_updates(&self) -> Result<Vec<Update>, MessengerError> {
        let offset = self.offset.load(Ordering::SeqCst);
        let updates: Vec<WireUpdate> = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": self.poll_timeout_seconds,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }
        debug!("Received {} updates", updates.len());

        Ok(updates.into_iter().filter_map(convert_update).collect())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        buttons: &[Button],
    ) -> Result<MessageRef, MessengerError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(message_id) = reply_to {
            body["reply_to_message_id"] = json!(message_id);
            body["allow_sending_without_reply"] = json!(true);
        }
        if !buttons.is_empty() {
            body["reply_markup"] = inline_keyboard(buttons);
        }

        let sent: WireMessageRef = self.call("sendMessage", body).await?;
        Ok(sent.into())
    }

    async fn edit_message(&self, message: MessageRef, text: &str) -> Result<(), MessengerError> {
        let _: Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": message.chat_id,
                    "message_id": message.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), MessengerError> {
        let _: Value = self
            .call(
                "deleteMessage",
                json!({ "chat_id": message.chat_id, "message_id": message.message_id }),
            )
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), MessengerError> {
        let _: Value = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn download_file(
        &self,
        attachment: &Attachment,
        dest: &Path,
    ) -> Result<u64, MessengerError> {
        if let Some(size) = attachment.file_size {
            if size > self.download_limit {
                return Err(MessengerError::TooLarge {
                    size,
                    limit: self.download_limit,
                });
            }
        }

        let info: WireFileInfo = self
            .call("getFile", json!({ "file_id": attachment.file_id }))
            .await?;
        let file_path = info
            .file_path
            .ok_or_else(|| MessengerError::Protocol("getFile returned no file_path".to_string()))?;

        // A self-hosted server in local mode hands out paths on its own disk
        if Path::new(&file_path).is_absolute() {
            let written = tokio::fs::copy(&file_path, dest).await?;
            info!("Copied local file to {:?} ({} bytes)", dest, written);
            return Ok(written);
        }

        let mut response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(MessengerError::Api {
                code: response.status().as_u16(),
                description: "file download failed".to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Downloaded file: {:?} ({} bytes)", dest, written);
        Ok(written)
    }

    async fn upload_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        kind: UploadKind,
        caption: &str,
    ) -> Result<(), MessengerError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.upload_limit {
            return Err(MessengerError::TooLarge {
                size,
                limit: self.upload_limit,
            });
        }

        let (method, field) = match kind {
            UploadKind::Video => ("sendVideo", "video"),
            UploadKind::Document => ("sendDocument", "document"),
        };
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video.mp4")
            .to_string();

        let file = tokio::fs::File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(transport)?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part(field, part);
        if kind == UploadKind::Video {
            form = form.text("supports_streaming", "true");
        }

        info!("Uploading {:?} ({} bytes) via {}", path, size, method);
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(MessengerError::TooLarge {
                size,
                limit: self.upload_limit,
            });
        }

        match parse_response::<Value>(method, response).await {
            Err(MessengerError::Api { code, description }) if is_too_big(code, &description) => {
                Err(MessengerError::TooLarge {
                    size,
                    limit: self.upload_limit,
                })
            }
            other => other.map(|_| ()),
        }
    }
}
