use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::split::{parse_duration, SplitPlan};
use super::{
    stderr_tail, CompressionTier, ConversionLimiter, SplitOutput, TranscodeError,
    TranscodeOutcome, Transcoder, VideoPart,
};
use crate::config::TranscodeConfig;

const CONTAINER_WORKDIR: &str = "/workdir";
const CONTAINER_PREFIX: &str = "recast";
const REMOVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct DockerSettings {
    pub program: String,
    pub image: String,
    pub use_gpu: bool,
    pub timeout: Duration,
}

impl From<&TranscodeConfig> for DockerSettings {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            program: config.docker_program.clone(),
            image: config.image.clone(),
            use_gpu: config.use_gpu,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// Runs ffmpeg from a container image, mounting the request workspace.
pub struct DockerTranscoder {
    settings: DockerSettings,
}

impl DockerTranscoder {
    pub fn new(settings: DockerSettings) -> Self {
        Self { settings }
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.settings.program).is_ok()
    }

    /// Fresh name for one container run, so a timed-out run can be removed.
    pub fn container_name() -> String {
        format!("{}-{}", CONTAINER_PREFIX, Uuid::new_v4().simple())
    }

    fn container_args(&self, name: &str, workdir: &Path, gpu: bool) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if gpu {
            args.extend(["--gpus".to_string(), "all".to_string()]);
        }
        args.extend([
            "-v".to_string(),
            format!("{}:{}", workdir.display(), CONTAINER_WORKDIR),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
            self.settings.image.clone(),
        ]);
        args
    }

    pub fn conversion_args(
        &self,
        name: &str,
        workdir: &Path,
        input_name: &str,
        output_name: &str,
        tier: CompressionTier,
    ) -> Vec<String> {
        let mut args = self.container_args(name, workdir, self.settings.use_gpu);
        args.extend(["-threads", "0", "-i", input_name].map(String::from));
        args.extend(tier.video_args().iter().map(|a| a.to_string()));
        args.extend(tier.audio_args().iter().map(|a| a.to_string()));
        args.extend(["-y".to_string(), output_name.to_string()]);
        args
    }

    /// ffmpeg with only an input prints the stream banner (including the
    /// duration) and exits without decoding anything.
    pub fn probe_args(&self, name: &str, workdir: &Path, input_name: &str) -> Vec<String> {
        let mut args = self.container_args(name, workdir, false);
        args.extend(["-hide_banner", "-i", input_name].map(String::from));
        args
    }

    pub fn split_args(
        &self,
        name: &str,
        workdir: &Path,
        input_name: &str,
        part_name: &str,
        start_seconds: f64,
        length_seconds: f64,
    ) -> Vec<String> {
        let mut args = self.container_args(name, workdir, false);
        args.extend([
            "-i".to_string(),
            input_name.to_string(),
            "-ss".to_string(),
            format!("{:.3}", start_seconds),
            "-t".to_string(),
            format!("{:.3}", length_seconds),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            part_name.to_string(),
        ]);
        args
    }

    /// Run one container. Killing the docker client on timeout leaves the
    /// container itself running, so it is removed by name before returning.
    async fn run(&self, name: &str, args: &[String]) -> Result<Output, TranscodeError> {
        let result = run_command(&self.settings.program, args, self.settings.timeout).await;
        if let Err(TranscodeError::Timeout(_)) = &result {
            self.remove_container(name).await;
        }
        result
    }

    async fn remove_container(&self, name: &str) {
        let args = ["rm", "-f", name].map(String::from);
        match run_command(&self.settings.program, &args, REMOVE_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                info!("Removed timed-out container {}", name)
            }
            Ok(output) => warn!(
                "Failed to remove container {}: {}",
                name,
                stderr_tail(&output.stderr)
            ),
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
        }
    }
}

/// Resolve the absolute directory to mount and the file name inside it.
async fn locate(input: &Path) -> Result<(PathBuf, String), TranscodeError> {
    let absolute = tokio::fs::canonicalize(input).await?;
    match (absolute.parent(), absolute.file_name().and_then(|n| n.to_str())) {
        (Some(dir), Some(name)) => Ok((dir.to_path_buf(), name.to_string())),
        _ => Err(TranscodeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{:?} is not a file inside a directory", absolute),
        ))),
    }
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video")
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// A non-zero exit is not an error here; callers decide what it means.
pub async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<Output, TranscodeError> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscodeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // On timeout the child future is dropped, which kills the process.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(TranscodeError::Timeout(timeout.as_secs())),
    }
}

#[async_trait]
impl Transcoder for DockerTranscoder {
    fn name(&self) -> &'static str {
        "docker-ffmpeg"
    }

    async fn convert(
        &self,
        input: &Path,
        limiter: &ConversionLimiter,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let (workdir, input_name) = locate(input).await?;
        let input_bytes = tokio::fs::metadata(input).await?.len();
        let tier = CompressionTier::for_size(input_bytes);

        let output_name = format!("converted_{}.mp4", file_stem(&input_name));
        let output = workdir.join(&output_name);
        let name = Self::container_name();
        let args = self.conversion_args(&name, &workdir, &input_name, &output_name, tier);

        let _permit = limiter.acquire().await?;
        info!(
            "Converting {:?} ({} bytes) with {}",
            input,
            input_bytes,
            tier.label()
        );

        let result = self.run(&name, &args).await?;
        if !result.status.success() {
            let stderr = stderr_tail(&result.stderr);
            error!("Conversion of {:?} failed: {}", input, stderr);
            return Err(TranscodeError::Failed {
                status: result.status.to_string(),
                stderr,
            });
        }

        let output_bytes = match tokio::fs::metadata(&output).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(TranscodeError::MissingOutput(output)),
        };

        let outcome = TranscodeOutcome {
            output,
            input_bytes,
            output_bytes,
            tier,
        };
        info!(
            "Video converted successfully: {:?} (compression: {:.1}%)",
            outcome.output,
            outcome.compression_ratio()
        );

        Ok(outcome)
    }

    async fn split(
        &self,
        input: &Path,
        max_part_bytes: u64,
        limiter: &ConversionLimiter,
    ) -> Result<SplitOutput, TranscodeError> {
        let input_bytes = tokio::fs::metadata(input).await?.len();
        if input_bytes <= max_part_bytes {
            return Ok(SplitOutput::whole(input));
        }

        let (workdir, input_name) = locate(input).await?;
        let _permit = limiter.acquire().await?;

        let probe_name = Self::container_name();
        let probe = self
            .run(&probe_name, &self.probe_args(&probe_name, &workdir, &input_name))
            .await?;
        let total_seconds = parse_duration(&String::from_utf8_lossy(&probe.stderr))
            .filter(|seconds| *seconds > 0.0)
            .ok_or(TranscodeError::DurationUnavailable)?;

        let plan = SplitPlan::new(input_bytes, max_part_bytes, total_seconds);
        info!(
            "Splitting video into {} parts, {:.1}s each",
            plan.parts, plan.part_seconds
        );

        let stem = file_stem(&input_name);
        let mut parts = Vec::new();
        for segment in plan.segments() {
            let part_name = SplitPlan::part_name(segment.index, stem);
            let part_path = workdir.join(&part_name);
            let name = Self::container_name();
            let args = self.split_args(
                &name,
                &workdir,
                &input_name,
                &part_name,
                segment.start_seconds,
                segment.length_seconds,
            );

            match self.run(&name, &args).await {
                Ok(output) if output.status.success() && part_path.exists() => {
                    info!("Created part {}: {:?}", segment.index, part_path);
                    parts.push(VideoPart {
                        index: segment.index,
                        path: part_path,
                    });
                }
                Ok(output) => error!(
                    "Failed to create part {}: {}",
                    segment.index,
                    stderr_tail(&output.stderr)
                ),
                Err(e) => error!("Failed to create part {}: {}", segment.index, e),
            }
        }

        if parts.is_empty() {
            return Err(TranscodeError::NoParts);
        }
        Ok(SplitOutput {
            planned: plan.parts,
            parts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transcoder(use_gpu: bool) -> DockerTranscoder {
        DockerTranscoder::new(DockerSettings {
            program: "docker".to_string(),
            image: "ffmpeg:test".to_string(),
            use_gpu,
            timeout: Duration::from_secs(5),
        })
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_settings_from_config() {
        let settings = DockerSettings::from(&TranscodeConfig::default());
        assert_eq!(settings.program, "docker");
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert!(settings.use_gpu);
    }

    #[test]
    fn test_conversion_args() {
        let args = transcoder(true).conversion_args(
            "recast-test",
            Path::new("/tmp/req"),
            "clip.mov",
            "converted_clip.mp4",
            CompressionTier::Standard,
        );

        assert_eq!(
            &args[..12],
            &[
                "run",
                "--rm",
                "--name",
                "recast-test",
                "--gpus",
                "all",
                "-v",
                "/tmp/req:/workdir",
                "-w",
                "/workdir",
                "ffmpeg:test",
                "-threads"
            ]
        );
        assert!(args.windows(2).any(|w| w == ["-i", "clip.mov"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "h264_nvenc"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "64k"]));
        assert_eq!(&args[args.len() - 2..], &["-y", "converted_clip.mp4"]);
    }

    #[test]
    fn test_conversion_args_without_gpu() {
        let args = transcoder(false).conversion_args(
            "recast-test",
            Path::new("/w"),
            "a.mp4",
            "converted_a.mp4",
            CompressionTier::Aggressive,
        );
        assert!(!args.iter().any(|a| a == "--gpus"));
        assert!(args.iter().any(|a| a == "32k"));
    }

    #[test]
    fn test_split_args_copy_streams() {
        let args = transcoder(true).split_args(
            "recast-part",
            Path::new("/w"),
            "big.mp4",
            "part_1_big.mp4",
            0.0,
            61.25,
        );
        assert!(args.windows(2).any(|w| w == ["--name", "recast-part"]));
        assert!(!args.iter().any(|a| a == "--gpus"));
        assert!(args.windows(2).any(|w| w == ["-ss", "0.000"]));
        assert!(args.windows(2).any(|w| w == ["-t", "61.250"]));
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert_eq!(args.last().unwrap(), "part_1_big.mp4");
    }

    #[test]
    fn test_probe_args() {
        let args = transcoder(true).probe_args("recast-probe", Path::new("/w"), "big.mp4");
        assert_eq!(&args[args.len() - 3..], &["-hide_banner", "-i", "big.mp4"]);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("movie.final.mkv"), "movie.final");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[tokio::test]
    async fn test_run_command_captures_failure() {
        let output = run_command("sh", &sh("echo bad >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!output.status.success());
        assert_eq!(stderr_tail(&output.stderr), "bad");
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let result = run_command("sh", &sh("sleep 5"), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(TranscodeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let result = run_command(
            "recast-definitely-not-installed",
            &[],
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(TranscodeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_split_small_file_returns_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("small.mp4");
        std::fs::write(&input, b"tiny").unwrap();

        let limiter = ConversionLimiter::new(1);
        let output = transcoder(false).split(&input, 1024, &limiter).await.unwrap();
        assert_eq!(output, SplitOutput::whole(&input));
    }

    #[test]
    fn test_container_names_are_unique() {
        let a = DockerTranscoder::container_name();
        assert!(a.starts_with("recast-"));
        assert_ne!(a, DockerTranscoder::container_name());
    }

    /// Stand-in docker client: records every invocation and hangs on `run`.
    fn fake_docker(dir: &Path) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("fake-docker");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\nif [ \"$1\" = run ]; then exec sleep 5; fi\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[tokio::test]
    async fn test_timed_out_container_is_removed() {
        let dir = TempDir::new().unwrap();
        let (script, log) = fake_docker(dir.path());
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"video").unwrap();

        let transcoder = DockerTranscoder::new(DockerSettings {
            program: script.to_string_lossy().to_string(),
            image: "ffmpeg:test".to_string(),
            use_gpu: false,
            timeout: Duration::from_millis(300),
        });
        let limiter = ConversionLimiter::new(1);

        let result = transcoder.convert(&input, &limiter).await;
        assert!(matches!(result, Err(TranscodeError::Timeout(_))));

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 2);

        let run_name = lines[0]
            .split_whitespace()
            .skip_while(|arg| *arg != "--name")
            .nth(1)
            .unwrap();
        assert!(run_name.starts_with("recast-"));
        assert_eq!(lines[1], format!("rm -f {}", run_name));
        assert_eq!(limiter.available(), 1);
    }
}
