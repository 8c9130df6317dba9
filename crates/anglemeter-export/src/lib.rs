//! anglemeter-export: output formats for measured angles.
//!
//! - [`csv`]: the per-frame angle log, streamed to any [`std::io::Write`].
//! - [`svg`]: per-frame overlay documents built from a
//!   [`FrameOverlay`](anglemeter_pipeline::overlay::FrameOverlay).
//!
//! Serializers take a writer or return a `String`; opening files is the
//! caller's job.

pub mod csv;
pub mod svg;

pub use csv::{CsvLog, csv_header, csv_row};
pub use svg::{SvgMetadata, to_overlay_svg};
