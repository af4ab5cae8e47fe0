//! Chat-facing conversion flow.
//!
//! [`VideoBot`] turns messenger updates into replies: menu commands,
//! identifier diagnostics, and the download/convert/deliver pipeline for
//! video documents. It only sees the [`Messenger`] and [`Transcoder`]
//! traits, so tests drive it with in-memory fakes.

mod messages;


use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LimitsConfig;
use crate::file_id::{analyze, synthesize};
use crate::messenger::{
    download_by_locator, Attachment, Button, ChatId, IncomingMessage, LocatorFetcher, MessageId,
    MessageRef, Messenger, MessengerError, Update, UploadKind,
};
use crate::transcode::{CompressionTier, ConversionLimiter, TranscodeOutcome, Transcoder};
use crate::workspace::RequestWorkspace;

pub const CONVERT_CALLBACK: &str = "convert_video";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v"];
const DEFAULT_INPUT_NAME: &str = "video.mp4";
const PART_UPLOAD_PAUSE: Duration = Duration::from_secs(1);

/// Whether an attachment looks like a video. The file name decides when
/// present; the mime type is only consulted for unnamed files.
pub fn is_video_file(file_name: Option<&str>, mime_type: Option<&str>) -> bool {
    match file_name {
        Some(name) => Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false),
        None => mime_type.is_some_and(|mime| mime.starts_with("video/")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Help,
    /// `/fileid`, with the identifier argument if one was given.
    FileId(Option<&'a str>),
}

/// Parse a leading bot command, accepting the `/cmd@botname` form.
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;

    let (head, rest) = match body.find(char::is_whitespace) {
        Some(pos) => (&body[..pos], body[pos..].trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head);

    match name.to_lowercase().as_str() {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        "fileid" => Some(Command::FileId(
            rest.split_whitespace().next().filter(|arg| !arg.is_empty()),
        )),
        _ => None,
    }
}

/// Analysis of `identifier`, followed by the locator it maps to.
pub fn describe_identifier(identifier: &str) -> String {
    let report = analyze(identifier);
    if !report.is_valid() {
        return report.to_string();
    }

    match synthesize(identifier) {
        Ok(locator) => format!("{}\nLocator: {}", report, locator),
        Err(e) => format!("{}\nLocator: unavailable ({})", report, e),
    }
}

struct ConvertedPart {
    /// Number in the split plan, kept so gaps stay visible.
    index: usize,
    outcome: TranscodeOutcome,
}

pub struct VideoBot {
    messenger: Arc<dyn Messenger>,
    transcoder: Arc<dyn Transcoder>,
    fetcher: Option<Arc<dyn LocatorFetcher>>,
    limiter: ConversionLimiter,
    limits: LimitsConfig,
    work_root: PathBuf,
    timeout_seconds: u64,
    part_pause: Duration,
}

impl VideoBot {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        transcoder: Arc<dyn Transcoder>,
        limiter: ConversionLimiter,
        limits: LimitsConfig,
        work_root: PathBuf,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            messenger,
            transcoder,
            fetcher: None,
            limiter,
            limits,
            work_root,
            timeout_seconds,
            part_pause: PART_UPLOAD_PAUSE,
        }
    }

    /// Enable downloads above the bot interface ceiling.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn LocatorFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_part_pause(mut self, pause: Duration) -> Self {
        self.part_pause = pause;
        self
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        match update {
            Update::Callback { id, data, message } => {
                self.handle_callback(&id, &data, message).await
            }
            Update::Message(message) => self.handle_message(&message).await,
        }
    }

    async fn handle_callback(
        &self,
        id: &str,
        data: &str,
        message: Option<MessageRef>,
    ) -> Result<()> {
        self.messenger
            .answer_callback(id)
            .await
            .context("Failed to answer callback")?;

        match (data, message) {
            (CONVERT_CALLBACK, Some(message)) => {
                self.messenger
                    .edit_message(message, &messages::send_video_prompt())
                    .await
                    .context("Failed to show the upload prompt")?;
            }
            _ => debug!("Ignoring callback with data {:?}", data),
        }
        Ok(())
    }

    async fn handle_message(&self, message: &IncomingMessage) -> Result<()> {
        let chat_id = message.message.chat_id;
        let reply_to = Some(message.message.message_id);

        if let Some(command) = message.text.as_deref().and_then(parse_command) {
            match command {
                Command::Start => {
                    let buttons = [Button::new(messages::CONVERT_BUTTON, CONVERT_CALLBACK)];
                    self.messenger
                        .send_message(chat_id, &messages::welcome(), reply_to, &buttons)
                        .await?;
                }
                Command::Help => {
                    let text = messages::help(&self.limits, self.timeout_seconds);
                    self.messenger
                        .send_message(chat_id, &text, reply_to, &[])
                        .await?;
                }
                Command::FileId(argument) => self.handle_file_id(message, argument).await?,
            }
            return Ok(());
        }

        match &message.attachment {
            Some(attachment) => self.handle_document(message, attachment).await,
            None => {
                debug!("Ignoring text message in chat {}", chat_id);
                Ok(())
            }
        }
    }

    async fn handle_file_id(
        &self,
        message: &IncomingMessage,
        argument: Option<&str>,
    ) -> Result<()> {
        let replied = message
            .reply_to
            .as_ref()
            .and_then(|reply| reply.attachment.as_ref());
        let identifier = argument.or_else(|| {
            replied
                .or(message.attachment.as_ref())
                .map(|attachment| attachment.file_id.as_str())
        });

        let text = match identifier {
            Some(identifier) => describe_identifier(identifier),
            None => messages::file_id_usage(),
        };
        self.messenger
            .send_message(
                message.message.chat_id,
                &text,
                Some(message.message.message_id),
                &[],
            )
            .await?;
        Ok(())
    }

    async fn handle_document(
        &self,
        message: &IncomingMessage,
        attachment: &Attachment,
    ) -> Result<()> {
        let chat_id = message.message.chat_id;
        let reply_to = Some(message.message.message_id);

        if !is_video_file(
            attachment.file_name.as_deref(),
            attachment.mime_type.as_deref(),
        ) {
            self.messenger
                .send_message(chat_id, &messages::unsupported_format(), reply_to, &[])
                .await?;
            return Ok(());
        }

        let size = attachment.file_size.unwrap_or(0);
        if size > self.limits.max_input_bytes() {
            let text = messages::input_too_large(size, self.limits.max_input_mb);
            self.messenger
                .send_message(chat_id, &text, reply_to, &[])
                .await?;
            return Ok(());
        }

        let progress = self
            .messenger
            .send_message(chat_id, &messages::processing(size), reply_to, &[])
            .await?;

        let label = format!(
            "user_{}_{}",
            message.sender_id.unwrap_or(chat_id),
            message.message.message_id
        );
        let workspace = match RequestWorkspace::create(&self.work_root, &label) {
            Ok(workspace) => workspace,
            Err(e) => {
                self.report_failure(progress, &e).await;
                return Err(e);
            }
        };

        info!(
            "Request {} started: {:?} ({} bytes)",
            workspace.request_id(),
            attachment.file_name,
            size
        );

        let result = self
            .process_document(&workspace, attachment, progress, reply_to)
            .await;
        let request_id = workspace.request_id();
        workspace.close();

        match result {
            Ok(()) => info!("Request {} finished", request_id),
            Err(e) => {
                error!("Request {} failed: {:#}", request_id, e);
                self.report_failure(progress, &e).await;
            }
        }
        Ok(())
    }

    async fn process_document(
        &self,
        workspace: &RequestWorkspace,
        attachment: &Attachment,
        progress: MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<()> {
        let input = workspace.file_path(
            attachment
                .file_name
                .as_deref()
                .unwrap_or(DEFAULT_INPUT_NAME),
        );
        self.download(attachment, &input).await?;

        let size = tokio::fs::metadata(&input)
            .await
            .context("Downloaded file is missing")?
            .len();
        let threshold = self.limits.split_threshold_bytes();

        if size > threshold {
            self.set_progress(progress, &messages::splitting(size)).await;
            let split = self
                .transcoder
                .split(&input, threshold, &self.limiter)
                .await
                .context("Failed to split the video")?;
            let planned = split.planned as usize;
            let missing = split.missing();
            if !missing.is_empty() {
                warn!("Parts {:?} of {} could not be created", missing, planned);
            }
            self.set_progress(progress, &messages::parts_ready(split.parts.len()))
                .await;

            let mut converted = Vec::with_capacity(split.parts.len());
            for part in &split.parts {
                let index = part.index as usize;
                self.set_progress(progress, &messages::converting_part(index, planned))
                    .await;
                let outcome = self
                    .transcoder
                    .convert(&part.path, &self.limiter)
                    .await
                    .with_context(|| format!("Failed to convert part {}", index))?;
                converted.push(ConvertedPart { index, outcome });
            }

            self.deliver_parts(progress, reply_to, planned, &converted, &missing)
                .await
        } else {
            let tier = CompressionTier::for_size(size);
            self.set_progress(progress, &messages::converting(size, tier))
                .await;
            let outcome = self
                .transcoder
                .convert(&input, &self.limiter)
                .await
                .context("Conversion failed")?;
            info!(
                "Converted {:?}: {} -> {} bytes ({:.1}%)",
                input,
                outcome.input_bytes,
                outcome.output_bytes,
                outcome.compression_ratio()
            );
            self.set_progress(progress, &messages::conversion_summary(&outcome))
                .await;

            self.deliver(progress, reply_to, &outcome).await
        }
    }

    async fn download(&self, attachment: &Attachment, dest: &Path) -> Result<u64> {
        let size = attachment.file_size.unwrap_or(0);
        let ceiling = self.limits.bot_download_limit_bytes();

        if size <= ceiling {
            return self
                .messenger
                .download_file(attachment, dest)
                .await
                .context("Failed to download the file");
        }

        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            anyhow!(messages::large_download_unavailable(
                size,
                self.limits.bot_download_limit_mb
            ))
        })?;
        let locator = synthesize(&attachment.file_id)
            .context("Could not derive a download locator from the file identifier")?;

        info!(
            "Downloading {} bytes through a {} locator",
            size,
            locator.variant_name()
        );
        download_by_locator(fetcher.as_ref(), &locator, dest, attachment.file_size)
            .await
            .context("Failed to download the file")
    }

    async fn deliver(
        &self,
        progress: MessageRef,
        reply_to: Option<MessageId>,
        outcome: &TranscodeOutcome,
    ) -> Result<()> {
        let chat_id = progress.chat_id;
        self.remove_progress(progress).await;

        let size = outcome.output_bytes;
        if size > self.limits.max_upload_bytes() {
            let text = messages::output_too_large(size, self.limits.max_upload_mb);
            self.messenger
                .send_message(chat_id, &text, reply_to, &[])
                .await?;
            return Ok(());
        }

        match self
            .messenger
            .upload_file(
                chat_id,
                &outcome.output,
                UploadKind::Video,
                &messages::video_caption(size),
            )
            .await
        {
            Ok(()) => {
                info!("Sent converted video {:?}", outcome.output);
                Ok(())
            }
            Err(MessengerError::TooLarge { .. }) => {
                self.messenger
                    .send_message(chat_id, &messages::sending_as_document(size), reply_to, &[])
                    .await?;
                self.messenger
                    .upload_file(
                        chat_id,
                        &outcome.output,
                        UploadKind::Document,
                        &messages::document_caption(size),
                    )
                    .await
                    .context("Failed to send the video as a document")?;
                info!("Sent converted video {:?} as document", outcome.output);
                Ok(())
            }
            Err(e) => Err(e).context("Failed to send the video"),
        }
    }

    /// Send converted parts under their planned numbers. Parts that could
    /// not be cut are named in the closing message.
    async fn deliver_parts(
        &self,
        progress: MessageRef,
        reply_to: Option<MessageId>,
        planned: usize,
        parts: &[ConvertedPart],
        missing: &[u32],
    ) -> Result<()> {
        let chat_id = progress.chat_id;
        self.remove_progress(progress).await;

        let total: u64 = parts.iter().map(|part| part.outcome.output_bytes).sum();
        let summary = messages::parts_summary(parts.len(), total);
        self.messenger
            .send_message(chat_id, &summary, reply_to, &[])
            .await?;

        for (i, part) in parts.iter().enumerate() {
            self.send_part(chat_id, part.index, planned, &part.outcome)
                .await?;
            if i + 1 < parts.len() {
                tokio::time::sleep(self.part_pause).await;
            }
        }

        let closing = if missing.is_empty() {
            messages::all_parts_sent()
        } else {
            messages::parts_missing(missing, planned)
        };
        self.messenger
            .send_message(chat_id, &closing, reply_to, &[])
            .await?;
        Ok(())
    }

    async fn send_part(
        &self,
        chat_id: ChatId,
        index: usize,
        count: usize,
        part: &TranscodeOutcome,
    ) -> Result<()> {
        let size = part.output_bytes;
        if size > self.limits.max_upload_bytes() {
            warn!("Part {} is too large to send ({} bytes)", index, size);
            let text = messages::part_too_large(index, count, size, self.limits.max_upload_mb);
            self.messenger.send_message(chat_id, &text, None, &[]).await?;
            return Ok(());
        }

        let caption = messages::part_caption(index, count, size);
        match self
            .messenger
            .upload_file(chat_id, &part.output, UploadKind::Video, &caption)
            .await
        {
            Ok(()) => info!("Sent part {} of {}", index, count),
            Err(MessengerError::TooLarge { .. }) => {
                let caption = messages::part_document_caption(index, count, size);
                self.messenger
                    .upload_file(chat_id, &part.output, UploadKind::Document, &caption)
                    .await
                    .with_context(|| format!("Failed to send part {}", index))?;
                info!("Sent part {} of {} as document", index, count);
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to send part {}", index)),
        }
        Ok(())
    }

    async fn set_progress(&self, progress: MessageRef, text: &str) {
        if let Err(e) = self.messenger.edit_message(progress, text).await {
            warn!("Failed to update progress message: {}", e);
        }
    }

    async fn remove_progress(&self, progress: MessageRef) {
        if let Err(e) = self.messenger.delete_message(progress).await {
            warn!("Failed to delete progress message: {}", e);
        }
    }

    /// Show `err` to the user. The progress message may already be gone
    /// once delivery started, so a failed edit falls back to a new message.
    async fn report_failure(&self, progress: MessageRef, err: &anyhow::Error) {
        let text = messages::failure(err);
        if self.messenger.edit_message(progress, &text).await.is_ok() {
            return;
        }
        if let Err(e) = self
            .messenger
            .send_message(progress.chat_id, &text, None, &[])
            .await
        {
            warn!("Failed to report error to chat {}: {}", progress.chat_id, e);
        }
    }
}
