use crate::bot::VideoBot;
use crate::config::Config;
use crate::messenger::{BotApiMessenger, Messenger};
use crate::transcode::{ConversionLimiter, DockerSettings, DockerTranscoder};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting Recast service");

    config.validate()?;

    let settings = DockerSettings::from(&config.transcode);
    let transcoder = DockerTranscoder::new(settings);
    if !transcoder.is_available() {
        warn!(
            "{} not found in PATH; conversions will fail until it is installed",
            config.transcode.docker_program
        );
    }

    let messenger: Arc<dyn Messenger> =
        Arc::new(BotApiMessenger::new(&config.bot, &config.limits));
    let limiter = ConversionLimiter::new(config.limits.max_concurrent_conversions);
    let work_root = config.transcode.work_root();

    let bot = Arc::new(VideoBot::new(
        messenger.clone(),
        Arc::new(transcoder),
        limiter,
        config.limits.clone(),
        work_root.clone(),
        config.transcode.timeout_seconds,
    ));

    info!(
        "Recast is ready (messenger: {}, work dir: {:?}, concurrent conversions: {})",
        messenger.name(),
        work_root,
        config.limits.max_concurrent_conversions
    );

    loop {
        let updates = match messenger.next_updates().await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Polling for updates failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            let bot = bot.clone();
            tokio::spawn(async move {
                if let Err(e) = bot.handle_update(update).await {
                    error!("Failed to handle update: {:#}", e);
                }
            });
        }
    }
}
