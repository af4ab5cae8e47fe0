use crate::config::{LimitsConfig, MB};
use crate::transcode::{CompressionTier, TranscodeOutcome};

pub const CONVERT_BUTTON: &str = "🎬 Convert video";

fn mb(bytes: u64) -> f64 {
    bytes as f64 / MB as f64
}

pub fn welcome() -> String {
    "🎥 Welcome to the video converter bot!\n\nChoose an action below:".to_string()
}

pub fn help(limits: &LimitsConfig, timeout_seconds: u64) -> String {
    format!(
        "🤖 What this bot can do:\n\n\
         • /start - open the main menu\n\
         • /help - show this help\n\
         • /fileid <id> - inspect a file identifier (or reply to a file)\n\
         • 🎬 Convert video - send a video file to re-encode it\n\n\
         📋 Formats:\n\
         • Input: MP4, AVI, MOV, MKV, WMV, FLV, WEBM, M4V\n\
         • Output: MP4 (H.264 NVENC, AAC audio)\n\n\
         ⚙️ Conversion:\n\
         • Compression adapts to the file size\n\
         • Timeout: {} seconds\n\n\
         📏 Limits:\n\
         • Largest input: {} MB\n\
         • Files over {} MB are split into parts\n\
         • Results over {} MB cannot be sent back\n\n\
         💡 Press the convert button, then send a video file.",
        timeout_seconds,
        limits.max_input_mb,
        limits.split_threshold_mb,
        limits.max_upload_mb,
    )
}

pub fn send_video_prompt() -> String {
    "📁 Please send a video file to convert.\n\nSupported formats: MP4, AVI, MOV, MKV and more."
        .to_string()
}

pub fn unsupported_format() -> String {
    "❌ Please send a video file (MP4, AVI, MOV, MKV, etc.)".to_string()
}

pub fn input_too_large(size: u64, limit_mb: u64) -> String {
    format!(
        "❌ The file is too large ({:.1} MB). The maximum is {} MB.\n\n\
         💡 Compress or split the video before sending it.",
        mb(size),
        limit_mb
    )
}

pub fn processing(size: u64) -> String {
    format!(
        "⏳ Processing video ({:.1} MB)...\nLarge files can take a while.",
        mb(size)
    )
}

pub fn large_download_unavailable(size: u64, limit_mb: u64) -> String {
    format!(
        "the file is {:.1} MB, the bot interface only serves files up to {} MB, \
         and no full-protocol fetcher is configured for larger ones",
        mb(size),
        limit_mb
    )
}

pub fn converting(size: u64, tier: CompressionTier) -> String {
    format!(
        "🔄 Converting video ({:.1} MB)...\nSettings: {}",
        mb(size),
        tier.label()
    )
}

pub fn splitting(size: u64) -> String {
    format!(
        "📂 The file is very large ({:.1} MB). Splitting it into parts...",
        mb(size)
    )
}

pub fn parts_ready(count: usize) -> String {
    format!("🔄 Split into {} parts. Converting each part...", count)
}

pub fn converting_part(index: usize, count: usize) -> String {
    format!("🔄 Converting part {} of {}...", index, count)
}

pub fn conversion_summary(outcome: &TranscodeOutcome) -> String {
    format!(
        "✅ Conversion finished!\n\
         📊 Original size: {:.1} MB\n\
         📊 Output size: {:.1} MB\n\
         📊 Compression: {:.1}%\n\
         📤 Sending the result...",
        mb(outcome.input_bytes),
        mb(outcome.output_bytes),
        outcome.compression_ratio()
    )
}

pub fn output_too_large(size: u64, limit_mb: u64) -> String {
    format!(
        "❌ Even after compression the file is too large \
         ({:.1} MB, the upload limit is {} MB).\n\n\
         💡 Try a shorter video or compress it before sending.",
        mb(size),
        limit_mb
    )
}

pub fn video_caption(size: u64) -> String {
    format!(
        "✅ Video converted!\n\n📊 Size: {:.1} MB\n• Codec: H.264 (NVENC)\n• Audio: AAC",
        mb(size)
    )
}

pub fn sending_as_document(size: u64) -> String {
    format!(
        "⚠️ The video is too large to send as a video ({:.1} MB).\n\n\
         📁 Sending it as a document...",
        mb(size)
    )
}

pub fn document_caption(size: u64) -> String {
    format!(
        "✅ Video converted and sent as a document!\n\n📊 Size: {:.1} MB\n\
         💡 Download the file to play it",
        mb(size)
    )
}

pub fn parts_summary(count: usize, total_bytes: u64) -> String {
    format!(
        "✅ Video split and converted!\n\n\
         📊 Parts: {}\n\
         📊 Total size: {:.1} MB\n\n\
         📤 Sending the parts...",
        count,
        mb(total_bytes)
    )
}

pub fn part_caption(index: usize, count: usize, size: u64) -> String {
    format!("📹 Part {} of {}\n📊 Size: {:.1} MB", index, count, mb(size))
}

pub fn part_document_caption(index: usize, count: usize, size: u64) -> String {
    format!(
        "📄 Part {} of {} (as a document)\n📊 Size: {:.1} MB",
        index,
        count,
        mb(size)
    )
}

pub fn part_too_large(index: usize, count: usize, size: u64, limit_mb: u64) -> String {
    format!(
        "❌ Part {} of {} is too large to send ({:.1} MB, the limit is {} MB).",
        index,
        count,
        mb(size),
        limit_mb
    )
}

pub fn all_parts_sent() -> String {
    "🎉 All parts sent!\n\n💡 Download the parts and play them in order.".to_string()
}

pub fn parts_missing(missing: &[u32], planned: usize) -> String {
    let numbers: Vec<String> = missing.iter().map(|index| index.to_string()).collect();
    format!(
        "⚠️ Sent the remaining parts, but part(s) {} of {} could not be cut. \
         The video is incomplete.",
        numbers.join(", "),
        planned
    )
}

pub fn failure(err: &anyhow::Error) -> String {
    format!("❌ Failed to process the video: {:#}", err)
}

pub fn file_id_usage() -> String {
    "Usage: /fileid <file identifier>, or reply /fileid to a message with a file.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_sizes_are_reported_in_megabytes() {
        assert!(processing(15 * MB / 10).contains("1.5 MB"));
        assert!(input_too_large(2500 * MB, 2000).contains("2500.0 MB"));
    }

    #[test]
    fn test_summary_reports_ratio() {
        let outcome = TranscodeOutcome {
            output: PathBuf::from("converted_a.mp4"),
            input_bytes: 40 * MB,
            output_bytes: 10 * MB,
            tier: CompressionTier::Standard,
        };
        let text = conversion_summary(&outcome);
        assert!(text.contains("40.0 MB"));
        assert!(text.contains("10.0 MB"));
        assert!(text.contains("75.0%"));
    }

    #[test]
    fn test_help_reflects_limits() {
        let limits = LimitsConfig {
            max_upload_mb: 2000,
            ..LimitsConfig::default()
        };
        let text = help(&limits, 900);
        assert!(text.contains("900 seconds"));
        assert!(text.contains("over 2000 MB cannot"));
    }

    #[test]
    fn test_parts_missing_lists_numbers() {
        let text = parts_missing(&[2, 4], 4);
        assert!(text.contains("part(s) 2, 4 of 4"));
        assert!(text.contains("incomplete"));
    }

    #[test]
    fn test_failure_includes_context_chain() {
        let err = anyhow::anyhow!("docker exited").context("Conversion failed");
        assert!(failure(&err).contains("Conversion failed: docker exited"));
    }
}
