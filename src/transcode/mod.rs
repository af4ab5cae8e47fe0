//! Video re-encoding through ffmpeg running in a container.
//!
//! Inputs are sorted into compression tiers by size, converted under a
//! timeout, and (when very large) split into stream-copied parts first.
//! Concurrency is bounded by a [`ConversionLimiter`] owned by the caller.

mod docker;
mod split;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::MB;

pub use docker::{run_command, DockerSettings, DockerTranscoder};
pub use split::{parse_duration, Segment, SplitPlan};

const REDUCED_TIER_BYTES: u64 = 100 * MB;
const AGGRESSIVE_TIER_BYTES: u64 = 500 * MB;
const STDERR_TAIL_CHARS: usize = 1500;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("conversion took too long (limit: {0} seconds)")]
    Timeout(u64),
    #[error("transcoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("transcoder did not produce {0:?}")]
    MissingOutput(PathBuf),
    #[error("could not determine the video duration")]
    DurationUnavailable,
    #[error("none of the video parts could be created")]
    NoParts,
    #[error("conversion queue is closed")]
    QueueClosed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder settings bucket chosen from the input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionTier {
    /// Up to 100 MB: full HD, moderate quality.
    Standard,
    /// 100–500 MB: 900p with a bitrate cap.
    Reduced,
    /// Over 500 MB: 720p, lower frame rate and tighter caps.
    Aggressive,
}

impl CompressionTier {
    pub fn for_size(bytes: u64) -> Self {
        if bytes > AGGRESSIVE_TIER_BYTES {
            CompressionTier::Aggressive
        } else if bytes > REDUCED_TIER_BYTES {
            CompressionTier::Reduced
        } else {
            CompressionTier::Standard
        }
    }

    #[rustfmt::skip]
    pub fn video_args(&self) -> &'static [&'static str] {
        match self {
            CompressionTier::Standard => &[
                "-vf", "fps=10,format=yuv420p",
                "-c:v", "h264_nvenc",
                "-preset", "p7",
                "-cq", "26",
                "-s", "1920x1080",
            ],
            CompressionTier::Reduced => &[
                "-vf", "fps=10,format=yuv420p,scale=1600:900",
                "-c:v", "h264_nvenc",
                "-preset", "p7",
                "-cq", "26",
                "-maxrate", "3M",
                "-bufsize", "6M",
            ],
            CompressionTier::Aggressive => &[
                "-vf", "fps=8,format=yuv420p,scale=1280:720",
                "-c:v", "h264_nvenc",
                "-preset", "p7",
                "-cq", "28",
                "-maxrate", "2M",
                "-bufsize", "4M",
            ],
        }
    }

    pub fn audio_args(&self) -> &'static [&'static str] {
        match self {
            CompressionTier::Standard => &["-c:a", "aac", "-b:a", "64k", "-ac", "1"],
            CompressionTier::Reduced => &["-c:a", "aac", "-b:a", "48k", "-ac", "1"],
            CompressionTier::Aggressive => &["-c:a", "aac", "-b:a", "32k", "-ac", "1"],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompressionTier::Standard => "standard compression",
            CompressionTier::Reduced => "reduced resolution",
            CompressionTier::Aggressive => "aggressive compression",
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOutcome {
    pub output: PathBuf,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub tier: CompressionTier,
}

impl TranscodeOutcome {
    /// Size reduction in percent; negative when the output grew.
    pub fn compression_ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.output_bytes as f64 / self.input_bytes as f64) * 100.0
    }
}

/// Counting semaphore bounding simultaneous container runs.
#[derive(Clone)]
pub struct ConversionLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConversionLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, TranscodeError> {
        self.semaphore
            .acquire()
            .await
            .map_err(|_| TranscodeError::QueueClosed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// One stream-copied piece of a split input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPart {
    /// 1-based position in the split plan.
    pub index: u32,
    pub path: PathBuf,
}

/// Parts produced by [`Transcoder::split`]. Parts that failed to render are
/// absent from `parts` but still counted in `planned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutput {
    pub planned: u32,
    pub parts: Vec<VideoPart>,
}

impl SplitOutput {
    /// The input itself, as the only part.
    pub fn whole(input: &Path) -> Self {
        Self {
            planned: 1,
            parts: vec![VideoPart {
                index: 1,
                path: input.to_path_buf(),
            }],
        }
    }

    /// Planned part numbers that were not produced.
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.planned)
            .filter(|index| !self.parts.iter().any(|part| part.index == *index))
            .collect()
    }
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Re-encode `input` into a new file next to it.
    async fn convert(
        &self,
        input: &Path,
        limiter: &ConversionLimiter,
    ) -> Result<TranscodeOutcome, TranscodeError>;

    /// Split `input` into parts of roughly `max_part_bytes` each. Returns
    /// the input itself when it is already small enough.
    async fn split(
        &self,
        input: &Path,
        max_part_bytes: u64,
        limiter: &ConversionLimiter,
    ) -> Result<SplitOutput, TranscodeError>;
}

/// Last part of a process's stderr, where ffmpeg puts the actual error.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL_CHARS).collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(CompressionTier::for_size(0), CompressionTier::Standard);
        assert_eq!(CompressionTier::for_size(100 * MB), CompressionTier::Standard);
        assert_eq!(CompressionTier::for_size(100 * MB + 1), CompressionTier::Reduced);
        assert_eq!(CompressionTier::for_size(500 * MB), CompressionTier::Reduced);
        assert_eq!(CompressionTier::for_size(500 * MB + 1), CompressionTier::Aggressive);
    }

    #[test]
    fn test_tier_args() {
        let standard = CompressionTier::Standard.video_args();
        assert!(standard.windows(2).any(|w| w == ["-s", "1920x1080"]));

        let aggressive = CompressionTier::Aggressive.video_args();
        assert!(aggressive.windows(2).any(|w| w == ["-cq", "28"]));
        assert!(aggressive.contains(&"fps=8,format=yuv420p,scale=1280:720"));

        assert!(CompressionTier::Reduced.audio_args().contains(&"48k"));
    }

    #[test]
    fn test_compression_ratio() {
        let outcome = TranscodeOutcome {
            output: PathBuf::from("out.mp4"),
            input_bytes: 200,
            output_bytes: 50,
            tier: CompressionTier::Standard,
        };
        assert!((outcome.compression_ratio() - 75.0).abs() < f64::EPSILON);

        let empty = TranscodeOutcome {
            input_bytes: 0,
            ..outcome
        };
        assert_eq!(empty.compression_ratio(), 0.0);
    }

    #[tokio::test]
    async fn test_limiter_bounds_permits() {
        let limiter = ConversionLimiter::new(2);
        assert_eq!(limiter.capacity(), 2);

        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        drop(first);
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_limiter_has_at_least_one_permit() {
        assert_eq!(ConversionLimiter::new(0).capacity(), 1);
    }

    #[test]
    fn test_split_output_missing_parts() {
        let output = SplitOutput {
            planned: 4,
            parts: vec![
                VideoPart {
                    index: 1,
                    path: PathBuf::from("part_1_a.mp4"),
                },
                VideoPart {
                    index: 3,
                    path: PathBuf::from("part_3_a.mp4"),
                },
            ],
        };
        assert_eq!(output.missing(), vec![2, 4]);
        assert!(SplitOutput::whole(Path::new("a.mp4")).missing().is_empty());
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = format!("{}error: boom", "x".repeat(4000));
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.ends_with("error: boom"));
        assert_eq!(stderr_tail(b"  short  "), "short");
    }
}
