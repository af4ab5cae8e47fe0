use regex::Regex;
use std::sync::OnceLock;

fn duration_regex() -> Option<&'static Regex> {
    static DURATION: OnceLock<Option<Regex>> = OnceLock::new();
    // Matches ffmpeg's banner line, e.g. "Duration: 01:02:03.45, start: ..."
    DURATION
        .get_or_init(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok())
        .as_ref()
}

/// Total duration in seconds from ffmpeg's stderr banner.
pub fn parse_duration(ffmpeg_stderr: &str) -> Option<f64> {
    let caps = duration_regex()?.captures(ffmpeg_stderr)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// One time range of a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// 1-based part number.
    pub index: u32,
    pub start_seconds: f64,
    pub length_seconds: f64,
}

/// Equal-duration split of a file that is too large to convert whole.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPlan {
    pub parts: u32,
    pub part_seconds: f64,
}

impl SplitPlan {
    /// Plan `size / max + 1` parts (a single part when the file already
    /// fits), each covering an equal share of `total_seconds`.
    pub fn new(file_bytes: u64, max_part_bytes: u64, total_seconds: f64) -> Self {
        let max_part_bytes = max_part_bytes.max(1);
        let parts = if file_bytes <= max_part_bytes {
            1
        } else {
            u32::try_from(file_bytes / max_part_bytes + 1).unwrap_or(u32::MAX)
        };

        Self {
            parts,
            part_seconds: total_seconds / f64::from(parts),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        (0..self.parts).map(move |i| Segment {
            index: i + 1,
            start_seconds: f64::from(i) * self.part_seconds,
            length_seconds: self.part_seconds,
        })
    }

    pub fn part_name(index: u32, stem: &str) -> String {
        format!("part_{}_{}.mp4", index, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MB;

    const BANNER: &str = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':\n  \
        Metadata:\n    major_brand     : isom\n  \
        Duration: 01:02:03.50, start: 0.000000, bitrate: 5012 kb/s\n  \
        Stream #0:0(und): Video: h264";

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(BANNER), Some(3723.5));
        assert_eq!(parse_duration("Duration: 00:00:07, start"), Some(7.0));
    }

    #[test]
    fn test_parse_duration_missing() {
        assert_eq!(parse_duration("Duration: N/A, bitrate: N/A"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_plan_single_part_when_small() {
        let plan = SplitPlan::new(100 * MB, 1500 * MB, 60.0);
        assert_eq!(plan.parts, 1);
        assert_eq!(plan.part_seconds, 60.0);
    }

    #[test]
    fn test_plan_part_count() {
        assert_eq!(SplitPlan::new(1600 * MB, 1500 * MB, 100.0).parts, 2);
        assert_eq!(SplitPlan::new(3000 * MB, 1500 * MB, 100.0).parts, 3);
        assert_eq!(SplitPlan::new(3001 * MB, 1500 * MB, 100.0).parts, 3);
    }

    #[test]
    fn test_segments_cover_duration() {
        let plan = SplitPlan::new(1600 * MB, 1500 * MB, 90.0);
        let segments: Vec<Segment> = plan.segments().collect();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[0].start_seconds, 0.0);
        assert_eq!(segments[1].index, 2);
        assert_eq!(segments[1].start_seconds, 45.0);
        assert_eq!(segments[1].length_seconds, 45.0);
    }

    #[test]
    fn test_part_name() {
        assert_eq!(SplitPlan::part_name(2, "holiday"), "part_2_holiday.mp4");
    }
}
