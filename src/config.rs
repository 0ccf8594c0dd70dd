//! Supervisor configuration

use std::path::PathBuf;

/// Supervisor configuration options
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory under which per-stream output directories are created
    pub media_root: PathBuf,

    /// Base URL prepended to the raw publish path to build the pull URL fed
    /// to the transcoder (e.g. "rtmp://127.0.0.1:1935")
    pub pull_url_base: String,

    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,

    /// Capacity of the notification channel between the protocol server and
    /// the dispatch task
    pub event_capacity: usize,

    /// Encoding parameters passed through to the transcoder
    pub encoding: EncodingOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("./media"),
            pull_url_base: "rtmp://127.0.0.1:1935".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            event_capacity: 64,
            encoding: EncodingOptions::default(),
        }
    }
}

impl Config {
    /// Create a new config with a custom media root
    pub fn with_media_root(root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: root.into(),
            ..Default::default()
        }
    }

    /// Set the media root
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    /// Set the pull URL base
    pub fn pull_url_base(mut self, base: impl Into<String>) -> Self {
        self.pull_url_base = base.into();
        self
    }

    /// Set the ffmpeg binary path
    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Set the notification channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Set the encoding options
    pub fn encoding(mut self, encoding: EncodingOptions) -> Self {
        self.encoding = encoding;
        self
    }

    /// Build the pull URL for a raw publish path
    pub fn pull_url(&self, raw_path: &str) -> String {
        format!("{}{}", self.pull_url_base, raw_path)
    }
}

/// Encoding parameters handed to the transcoder
///
/// These are opaque to the supervisor: they are rendered to ffmpeg output
/// arguments and never interpreted.
#[derive(Debug, Clone)]
pub struct EncodingOptions {
    /// Video codec
    pub video_codec: String,

    /// Encoder preset
    pub preset: String,

    /// Constant rate factor (quality, lower is better)
    pub crf: u32,

    /// Audio codec
    pub audio_codec: String,

    /// HLS segment duration in seconds
    pub segment_seconds: u32,

    /// Number of segments kept in the playlist window
    pub playlist_size: u32,

    /// Delete segments that have fallen out of the playlist window
    pub delete_segments: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 28,
            audio_codec: "aac".to_string(),
            segment_seconds: 2,
            playlist_size: 3,
            delete_segments: true,
        }
    }
}

impl EncodingOptions {
    /// Set the video codec
    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Set the encoder preset
    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Set the constant rate factor
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = crf;
        self
    }

    /// Set the audio codec
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    /// Set the HLS segment duration in seconds
    pub fn segment_seconds(mut self, seconds: u32) -> Self {
        self.segment_seconds = seconds.max(1);
        self
    }

    /// Set the playlist window size
    pub fn playlist_size(mut self, size: u32) -> Self {
        self.playlist_size = size.max(1);
        self
    }

    /// Keep segments after they leave the playlist window
    pub fn keep_segments(mut self) -> Self {
        self.delete_segments = false;
        self
    }

    /// Render to ffmpeg output arguments
    pub fn to_output_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            self.playlist_size.to_string(),
        ];
        if self.delete_segments {
            args.push("-hls_flags".to_string());
            args.push("delete_segments".to_string());
        }
        args
    }
}
