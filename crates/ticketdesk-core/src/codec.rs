//! Voice transcoding for dashboard uploads.
//!
//! Chat clients only render voice notes encoded as OGG/Opus. Recordings made
//! in the browser are usually WebM or MP4, so they are converted first when
//! an encoder is available.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("transcoder unavailable: {0}")]
    Unavailable(String),

    #[error("transcoder failed: {0}")]
    Failed(String),
}

/// Converts audio to OGG/Opus.
#[async_trait]
pub trait VoiceTranscoder: Send + Sync {
    async fn to_ogg_opus(&self, input: Vec<u8>) -> Result<Vec<u8>, TranscodeError>;
}

/// Returns true if the bytes already carry an OGG container header.
pub fn is_ogg(data: &[u8]) -> bool {
    data.starts_with(b"OggS")
}

/// Transcoder backed by an `ffmpeg` subprocess.
pub struct FfmpegTranscoder {
    program: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Checks that the binary can be executed.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl VoiceTranscoder for FfmpegTranscoder {
    async fn to_ogg_opus(&self, input: Vec<u8>) -> Result<Vec<u8>, TranscodeError> {
        let mut child = Command::new(&self.program)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-c:a",
                "libopus",
                "-b:a",
                "48k",
                "-f",
                "ogg",
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::Unavailable(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TranscodeError::Failed("stdin not captured".into()))?;
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TranscodeError::Failed(e.to_string()))?;
        if let Ok(Err(e)) = writer.await {
            debug!(error = %e, "ffmpeg closed stdin early");
        }

        if !output.status.success() {
            return Err(TranscodeError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if output.stdout.is_empty() {
            return Err(TranscodeError::Failed("empty output".into()));
        }
        debug!(bytes = output.stdout.len(), "Transcoded voice note");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_ogg() {
        assert!(is_ogg(b"OggS\0\x02"));
        assert!(!is_ogg(b"\x1a\x45\xdf\xa3"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let transcoder = FfmpegTranscoder::new("definitely-not-a-real-ffmpeg");
        assert!(!transcoder.is_available().await);
        assert!(matches!(
            transcoder.to_ogg_opus(vec![1, 2, 3]).await,
            Err(TranscodeError::Unavailable(_))
        ));
    }
}
