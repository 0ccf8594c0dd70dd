//! Transcoder process events
//!
//! A launched transcoder reports its lifecycle as a stream of events:
//! the spawned command line, periodic progress, and exactly one of
//! finished/failed at the end. No event is dropped silently; the job driver
//! logs every one of them.

/// Event reported by a running transcoder process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// The subprocess was spawned; encoding is beginning
    Started {
        /// Human-readable description of the launched command
        command: String,
    },
    /// Periodic encoding progress
    Progress(ProgressStats),
    /// The subprocess exited cleanly
    Finished,
    /// The subprocess reported an error or exited abnormally
    Failed {
        /// Best-effort description of what went wrong
        message: String,
    },
}

/// Progress snapshot parsed from ffmpeg's `-progress` output
///
/// All fields are optional; ffmpeg omits fields it cannot compute (e.g. fps
/// before the first keyframe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressStats {
    /// Frames encoded so far
    pub frame: Option<u64>,
    /// Current encoding rate in frames per second
    pub fps: Option<f64>,
    /// Current output bitrate in kbit/s
    pub bitrate_kbps: Option<f64>,
    /// Output timestamp reached, as reported (e.g. "00:00:04.96")
    pub out_time: Option<String>,
    /// Encoding speed relative to realtime (1.0 = realtime)
    pub speed: Option<f64>,
}

impl ProgressStats {
    /// Apply one `key=value` line from ffmpeg's `-progress` output
    ///
    /// Returns `true` when the line is the `progress=` block terminator,
    /// meaning the accumulated snapshot is complete and should be emitted.
    pub fn apply_line(&mut self, line: &str) -> bool {
        let Some((name, value)) = line.split_once('=') else {
            return false;
        };
        let value = value.trim();

        match name.trim() {
            "progress" => return true,
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = value.parse().ok(),
            "bitrate" => {
                self.bitrate_kbps = value.strip_suffix("kbits/s").map(str::trim).and_then(|v| v.parse().ok())
            }
            "out_time" => self.out_time = Some(value.to_string()),
            "speed" => self.speed = value.strip_suffix('x').and_then(|v| v.trim().parse().ok()),
            _ => {}
        }

        false
    }
}
