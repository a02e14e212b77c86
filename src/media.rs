// src/media.rs
// Local media operations behind a narrow trait so the pipeline can be
// exercised without a real FFmpeg install.

use async_trait::async_trait;
use std::process::Command;
use tokio::task;

use crate::utils::{execute_ffmpeg_command, execute_ffprobe_command, validate_input_files};

#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &str) -> Result<f64, String>;

    /// Concatenate video files in the given order without re-encoding.
    async fn concat_videos(&self, inputs: &[String], output: &str) -> Result<(), String>;

    /// Concatenate audio files in the given order.
    async fn concat_audio(&self, inputs: &[String], output: &str) -> Result<(), String>;

    /// Apply fade in/out to an audio file.
    async fn fade_audio(
        &self,
        input: &str,
        output: &str,
        fade_in: f64,
        fade_out: f64,
        duration: f64,
    ) -> Result<(), String>;

    /// Mux an audio track onto a video stream, re-encoding audio only.
    async fn mux_audio(&self, video: &str, audio: &str, output: &str) -> Result<(), String>;
}

pub struct FfmpegTools;

impl FfmpegTools {
    pub fn new() -> Self {
        Self
    }
}

/// Concat demuxer path shared by video and audio concatenation. Writes the
/// file list next to the output so parallel jobs cannot clobber each other.
fn concat_media(inputs: &[String], output: &str) -> Result<(), String> {
    validate_input_files(inputs)?;

    let concat_list = inputs
        .iter()
        .map(|f| {
            let absolute = std::fs::canonicalize(f)
                .map_err(|e| format!("Failed to resolve path {}: {}", f, e))?;
            Ok(format!("file '{}'", absolute.display()))
        })
        .collect::<Result<Vec<_>, String>>()?
        .join("\n");

    let concat_file_path = format!("{}.txt", output);
    std::fs::write(&concat_file_path, concat_list)
        .map_err(|e| format!("Failed to write concat list: {}", e))?;

    let mut command = Command::new("ffmpeg");
    command
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(&concat_file_path)
        .arg("-c")
        .arg("copy")
        .arg("-y")
        .arg(output);

    let result = execute_ffmpeg_command(command);
    std::fs::remove_file(&concat_file_path).ok();
    result.map(|_| ())
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe_duration(&self, path: &str) -> Result<f64, String> {
        let path = path.to_string();
        let output = task::spawn_blocking(move || {
            execute_ffprobe_command(&[
                "-v",
                "quiet",
                "-show_entries",
                "format=duration",
                "-of",
                "csv=p=0",
                &path,
            ])
        })
        .await
        .map_err(|e| format!("ffprobe task failed: {}", e))??;

        output
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("Failed to parse duration '{}': {}", output.trim(), e))
    }

    async fn concat_videos(&self, inputs: &[String], output: &str) -> Result<(), String> {
        let inputs = inputs.to_vec();
        let output = output.to_string();
        task::spawn_blocking(move || concat_media(&inputs, &output))
            .await
            .map_err(|e| format!("ffmpeg task failed: {}", e))?
    }

    async fn concat_audio(&self, inputs: &[String], output: &str) -> Result<(), String> {
        let inputs = inputs.to_vec();
        let output = output.to_string();
        task::spawn_blocking(move || concat_media(&inputs, &output))
            .await
            .map_err(|e| format!("ffmpeg task failed: {}", e))?
    }

    async fn fade_audio(
        &self,
        input: &str,
        output: &str,
        fade_in: f64,
        fade_out: f64,
        duration: f64,
    ) -> Result<(), String> {
        let input = input.to_string();
        let output = output.to_string();
        task::spawn_blocking(move || {
            let filter = format!(
                "afade=t=in:st=0:d={},afade=t=out:st={}:d={}",
                fade_in,
                (duration - fade_out).max(0.0),
                fade_out
            );

            let mut command = Command::new("ffmpeg");
            command
                .arg("-i")
                .arg(&input)
                .arg("-af")
                .arg(&filter)
                .arg("-y")
                .arg(&output);

            execute_ffmpeg_command(command).map(|_| ())
        })
        .await
        .map_err(|e| format!("ffmpeg task failed: {}", e))?
    }

    async fn mux_audio(&self, video: &str, audio: &str, output: &str) -> Result<(), String> {
        let video = video.to_string();
        let audio = audio.to_string();
        let output = output.to_string();
        task::spawn_blocking(move || {
            let mut command = Command::new("ffmpeg");
            command
                .arg("-i")
                .arg(&video)
                .arg("-i")
                .arg(&audio)
                .arg("-c:v")
                .arg("copy")
                .arg("-c:a")
                .arg("aac")
                .arg("-shortest")
                .arg("-y")
                .arg(&output);

            execute_ffmpeg_command(command).map(|_| ())
        })
        .await
        .map_err(|e| format!("ffmpeg task failed: {}", e))?
    }
}
