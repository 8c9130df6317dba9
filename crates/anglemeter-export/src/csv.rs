//! CSV angle log.
//!
//! One header line, then one row per processed frame:
//!
//! ```text
//! frame,angle1,angle2,compute_ms
//! 0,12.5,-3.25,0.412
//! 1,0,-3.5,0.398
//! ```
//!
//! Angle columns follow the role order. A role that was not measured in a
//! frame is written as `0` (the sentinel), so the log has no gaps. Floats
//! use Rust's default `Display` rendering, the shortest text that reads
//! back to the same value.

use std::fmt::Write as _;
use std::io::{self, Write};

use anglemeter_pipeline::{FrameRecord, RecordSink};

/// Header line (without newline) for a log with `role_count` angle columns.
///
/// # Examples
///
/// ```
/// use anglemeter_export::csv_header;
///
/// assert_eq!(csv_header(2), "frame,angle1,angle2,compute_ms");
/// ```
#[must_use]
pub fn csv_header(role_count: usize) -> String {
    let mut out = String::from("frame");
    for i in 1..=role_count {
        let _ = write!(out, ",angle{i}");
    }
    out.push_str(",compute_ms");
    out
}

/// Data row (without newline) for one record.
///
/// Always emits exactly `role_count` angle columns: missing entries are
/// filled with the sentinel and extra entries are dropped, so every row
/// lines up with [`csv_header`].
#[must_use]
pub fn csv_row(record: &FrameRecord, role_count: usize) -> String {
    let mut out = record.frame_index.to_string();
    for role in 0..role_count {
        let _ = write!(out, ",{}", record.angle(role));
    }
    let _ = write!(out, ",{}", record.compute_ms);
    out
}

/// Streaming CSV log over any writer.
///
/// The header is written on construction. Rows go straight to the writer
/// on [`RecordSink::append`]; wrap files in a [`std::io::BufWriter`] and
/// rely on [`RecordSink::flush`] at end of run.
#[derive(Debug)]
pub struct CsvLog<W: Write> {
    out: W,
    role_count: usize,
    rows: u64,
}

impl<W: Write> CsvLog<W> {
    /// Start a log with `role_count` angle columns.
    ///
    /// # Errors
    ///
    /// Returns the writer's error if the header cannot be written.
    pub fn new(mut out: W, role_count: usize) -> io::Result<Self> {
        writeln!(out, "{}", csv_header(role_count))?;
        Ok(Self {
            out,
            role_count,
            rows: 0,
        })
    }

    #[must_use]
    pub const fn role_count(&self) -> usize {
        self.role_count
    }

    /// Data rows written so far (the header is not counted).
    #[must_use]
    pub const fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Recover the writer. Does not flush.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for CsvLog<W> {
    fn append(&mut self, record: &FrameRecord) -> io::Result<()> {
        writeln!(self.out, "{}", csv_row(record, self.role_count))?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(frame_index: u64, angles: Vec<f64>, compute_ms: f64) -> FrameRecord {
        FrameRecord {
            frame_index,
            angles,
            compute_ms,
        }
    }

    #[test]
    fn header_follows_role_count() {
        assert_eq!(csv_header(0), "frame,compute_ms");
        assert_eq!(csv_header(1), "frame,angle1,compute_ms");
        assert_eq!(csv_header(3), "frame,angle1,angle2,angle3,compute_ms");
    }

    #[test]
    fn row_uses_default_float_rendering() {
        let row = csv_row(&record(7, vec![12.5, -3.25], 0.75), 2);
        assert_eq!(row, "7,12.5,-3.25,0.75");
    }

    #[test]
    fn row_fills_missing_angles_with_sentinel() {
        let row = csv_row(&record(0, vec![4.0], 1.0), 2);
        assert_eq!(row, "0,4,0,1");
    }

    #[test]
    fn row_drops_extra_angles() {
        let row = csv_row(&record(2, vec![1.0, 2.0, 3.0], 0.5), 2);
        assert_eq!(row, "2,1,2,0.5");
    }

    #[test]
    fn log_writes_header_then_rows() {
        let mut log = CsvLog::new(Vec::new(), 2).unwrap();
        log.append(&record(0, vec![10.0, -20.0], 0.5)).unwrap();
        log.append(&record(1, vec![0.0, -19.5], 0.25)).unwrap();
        log.flush().unwrap();
        assert_eq!(log.rows_written(), 2);
        assert_eq!(log.role_count(), 2);

        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(
            text,
            "frame,angle1,angle2,compute_ms\n0,10,-20,0.5\n1,0,-19.5,0.25\n"
        );
    }

    #[derive(Debug)]
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn header_failure_is_reported() {
        let err = CsvLog::new(BrokenWriter, 2).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    /// Accepts the header, then fails every later write.
    #[derive(Debug, Default)]
    struct FullAfterHeader {
        accepted: Vec<u8>,
    }

    impl Write for FullAfterHeader {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted.ends_with(b"\n") {
                return Err(io::Error::other("disk full"));
            }
            self.accepted.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn append_failure_is_reported_and_not_counted() {
        let mut log = CsvLog::new(FullAfterHeader::default(), 1).unwrap();
        let err = log.append(&record(0, vec![1.0], 0.5)).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(log.rows_written(), 0);
        assert_eq!(log.into_inner().accepted, b"frame,angle1,compute_ms\n");
    }
}
