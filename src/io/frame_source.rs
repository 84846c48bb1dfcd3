//! Frame replay from a JSONL detection log
//!
//! Each line is one frame: `{ts?, width, height, detections: [{bbox, confidence, track_id?}]}`.
//! Unparsable lines, including ones that are not UTF-8, are skipped with a
//! warning; end of file ends the stream.

use crate::domain::types::Frame;
use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Option<Frame>;
}

pub struct JsonlFrameSource {
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_no: u64,
    skipped: u64,
}

impl JsonlFrameSource {
    /// Open the replay file; failure here is fatal at startup
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open frame source {}", path.display()))?;
        info!(path = %path.display(), "frame_source_opened");
        Ok(Self { reader: BufReader::new(file), buf: Vec::new(), line_no: 0, skipped: 0 })
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl FrameSource for JsonlFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, line = %(self.line_no + 1), "frame_source_read_failed");
                    return None;
                }
            }
            self.line_no += 1;

            let Ok(line) = std::str::from_utf8(&self.buf) else {
                self.skipped += 1;
                warn!(line = %self.line_no, error = "invalid utf-8", "frame_parse_failed");
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(line) {
                Ok(frame) => return Some(frame),
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = %self.line_no, error = %e, "frame_parse_failed");
                }
            }
        }
    }
}

/// In-memory source, mostly for tests and simulations
pub struct VecFrameSource {
    frames: std::vec::IntoIter<Frame>,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames: frames.into_iter() }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.next()
    }
}
