//! Capture files: recorded detector output, one JSON frame per line.
//!
//! ```text
//! {"dir": 1, "point_sets": [[{"x": 10.0, "y": 20.0}, ...], [...]]}
//! {"point_sets": [[...], [...]]}
//! ```
//!
//! Blank lines are skipped. A frame without `dir` keeps the previous
//! frame's orientation.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anglemeter_pipeline::replay::CapturedFrame;

/// Failure to read a capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read capture line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("invalid frame on capture line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl CaptureError {
    /// 1-based line number the error occurred on.
    pub const fn line(&self) -> usize {
        match self {
            Self::Io { line, .. } | Self::Parse { line, .. } => *line,
        }
    }
}

/// Streaming reader over a capture, yielding one frame per non-blank line.
#[derive(Debug)]
pub struct CaptureFrames<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> CaptureFrames<R> {
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }
}

impl CaptureFrames<BufReader<File>> {
    /// Open a capture file.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> Iterator for CaptureFrames<R> {
    type Item = Result<CapturedFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(CaptureError::Io {
                        line: self.line,
                        source,
                    }));
                }
            }
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(text).map_err(|source| CaptureError::Parse {
                    line: self.line,
                    source,
                }),
            );
        }
    }
}
