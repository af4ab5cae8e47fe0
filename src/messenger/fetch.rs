use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::MessengerError;
use crate::file_id::Locator;

/// Chunk size for locator downloads. Offsets stay multiples of it, as the
/// full protocol's fetch call requires.
pub const FETCH_CHUNK_SIZE: u32 = 512 * 1024;

/// Full client protocol primitive: read `limit` bytes at `offset` of the
/// file addressed by `locator`.
#[async_trait]
pub trait LocatorFetcher: Send + Sync {
    async fn fetch_chunk(
        &self,
        locator: &Locator,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<u8>, MessengerError>;
}

/// Download a whole file through `fetcher` into `dest`.
///
/// Stops at the first short chunk or once `expected_size` bytes arrived.
/// A size mismatch is an error rather than a truncated file.
pub async fn download_by_locator(
    fetcher: &dyn LocatorFetcher,
    locator: &Locator,
    dest: &Path,
    expected_size: Option<u64>,
) -> Result<u64, MessengerError> {
    info!(
        "Downloading {} locator to {:?} ({:?} bytes expected)",
        locator.variant_name(),
        dest,
        expected_size
    );

    let mut file = tokio::fs::File::create(dest).await?;
    let mut offset = 0u64;

    loop {
        let chunk = fetcher.fetch_chunk(locator, offset, FETCH_CHUNK_SIZE).await?;
        if chunk.len() > FETCH_CHUNK_SIZE as usize {
            return Err(MessengerError::Protocol(format!(
                "fetch returned {} bytes for a {} byte request",
                chunk.len(),
                FETCH_CHUNK_SIZE
            )));
        }

        file.write_all(&chunk).await?;
        offset += chunk.len() as u64;
        debug!("Fetched {} bytes (total {})", chunk.len(), offset);

        let short = chunk.len() < FETCH_CHUNK_SIZE as usize;
        let complete = expected_size.is_some_and(|size| offset >= size);
        if short || complete {
            break;
        }
    }

    file.flush().await?;

    if let Some(size) = expected_size {
        if offset != size {
            return Err(MessengerError::Protocol(format!(
                "received {} of {} expected bytes",
                offset, size
            )));
        }
    }

    Ok(offset)
}
