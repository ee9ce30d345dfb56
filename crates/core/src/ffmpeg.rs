//! FFmpeg/FFprobe utilities for the video composer.
//!
//! Command construction is kept in pure functions so the argument lists are
//! unit-testable; only the thin `run_*` wrappers actually spawn processes.

use std::path::Path;

use serde::Deserialize;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub channels: Option<i32>,
    pub sample_rate: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe_media(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

/// Parse the media duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Format-level duration first, then any stream that carries one.
    if let Some(d) = &probe.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    for stream in &probe.streams {
        if let Some(d) = &stream.duration {
            if let Ok(secs) = d.parse::<f64>() {
                return secs;
            }
        }
    }
    0.0
}

/// Duration of an audio file in seconds. Zero-length or unreadable audio
/// reports 0.0 so callers can substitute a default still duration.
pub async fn audio_duration_secs(path: &Path) -> Result<f64, FfmpegError> {
    let probe = probe_media(path).await?;
    Ok(parse_duration(&probe))
}

// ---------------------------------------------------------------------------
// Clip encoding
// ---------------------------------------------------------------------------

/// Build the ffmpeg argument list for a still-image clip.
///
/// The image is looped for `duration_secs` and encoded to H.264 + AAC at
/// the given output resolution. When `audio` is present its stream is
/// muxed in; otherwise a silent clip is produced.
pub fn still_clip_args(
    image: &Path,
    audio: Option<&Path>,
    duration_secs: f64,
    width: u32,
    height: u32,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loop".into(),
        "1".into(),
        "-i".into(),
        image.to_string_lossy().to_string(),
    ];
    if let Some(audio) = audio {
        args.push("-i".into());
        args.push(audio.to_string_lossy().to_string());
    }
    args.extend([
        "-t".into(),
        format!("{duration_secs:.3}"),
        // Pad to the target frame so mixed source aspect ratios concatenate.
        "-vf".into(),
        format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2"
        ),
        "-c:v".into(),
        "libx264".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-r".into(),
        "25".into(),
    ]);
    if audio.is_some() {
        args.extend(["-c:a".into(), "aac".into(), "-shortest".into()]);
    }
    args.push(output.to_string_lossy().to_string());
    args
}

/// Build the ffmpeg argument list for concatenating uniform clips via the
/// concat demuxer. All clips come out of [`still_clip_args`], so stream
/// copy is safe.
pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.to_string_lossy().to_string(),
        "-c".into(),
        "copy".into(),
        output.to_string_lossy().to_string(),
    ]
}

/// Render the concat demuxer list file contents for a set of clip paths.
///
/// Single quotes inside paths are escaped per the demuxer's quoting rules.
pub fn concat_list(clips: &[&Path]) -> String {
    let mut out = String::new();
    for clip in clips {
        let escaped = clip.to_string_lossy().replace('\'', r"'\''");
        out.push_str(&format!("file '{escaped}'\n"));
    }
    out
}

/// Run ffmpeg with a prebuilt argument list.
pub async fn run_ffmpeg(args: &[String]) -> Result<(), FfmpegError> {
    let output = tokio::process::Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_duration_from_format() {
        let probe = FfprobeOutput {
            streams: vec![],
            format: FfprobeFormat {
                duration: Some("12.34".to_string()),
                size: None,
                format_name: None,
            },
        };
        assert!((parse_duration(&probe) - 12.34).abs() < 0.001);
    }

    #[test]
    fn parse_duration_falls_back_to_stream() {
        let probe = FfprobeOutput {
            streams: vec![FfprobeStream {
                index: 0,
                codec_name: Some("pcm_s16le".into()),
                codec_type: Some("audio".into()),
                channels: Some(1),
                sample_rate: Some("22050".into()),
                duration: Some("3.5".into()),
            }],
            format: FfprobeFormat {
                duration: None,
                size: None,
                format_name: None,
            },
        };
        assert!((parse_duration(&probe) - 3.5).abs() < 0.001);
    }

    #[test]
    fn parse_duration_defaults_to_zero() {
        let probe = FfprobeOutput {
            streams: vec![],
            format: FfprobeFormat {
                duration: None,
                size: None,
                format_name: None,
            },
        };
        assert_eq!(parse_duration(&probe), 0.0);
    }

    #[test]
    fn still_clip_args_with_audio() {
        let args = still_clip_args(
            Path::new("/a/img.png"),
            Some(Path::new("/a/voice.wav")),
            4.2,
            1280,
            720,
            Path::new("/a/clip.mp4"),
        );
        assert_eq!(args[0], "-y");
        assert!(args.contains(&"/a/img.png".to_string()));
        assert!(args.contains(&"/a/voice.wav".to_string()));
        assert!(args.contains(&"4.200".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().unwrap(), "/a/clip.mp4");
    }

    #[test]
    fn still_clip_args_without_audio_is_silent() {
        let args = still_clip_args(
            Path::new("img.png"),
            None,
            5.0,
            720,
            1280,
            Path::new("clip.mp4"),
        );
        assert!(!args.contains(&"aac".to_string()));
        assert!(!args.contains(&"-shortest".to_string()));
        let vf = args.iter().find(|a| a.contains("scale=720:1280")).unwrap();
        assert!(vf.contains("pad=720:1280"));
    }

    #[test]
    fn concat_args_use_stream_copy() {
        let args = concat_args(Path::new("list.txt"), Path::new("out.mp4"));
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "concat"));
    }

    #[test]
    fn concat_list_renders_one_line_per_clip() {
        let a = PathBuf::from("/tmp/a.mp4");
        let b = PathBuf::from("/tmp/b.mp4");
        let list = concat_list(&[a.as_path(), b.as_path()]);
        assert_eq!(list, "file '/tmp/a.mp4'\nfile '/tmp/b.mp4'\n");
    }

    #[test]
    fn concat_list_escapes_single_quotes() {
        let p = PathBuf::from("/tmp/it's.mp4");
        let list = concat_list(&[p.as_path()]);
        assert!(list.contains(r"it'\''s"));
    }

    #[tokio::test]
    async fn probe_missing_file_errors() {
        let err = probe_media(Path::new("/nonexistent/file.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, FfmpegError::MediaNotFound(_)));
    }
}
