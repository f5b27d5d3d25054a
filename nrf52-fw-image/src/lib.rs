//! Model of the firmware bundle shipped on the gateway's nRF52 image
//! partition.
//!
//! A bundle consists of an `info.txt` manifest naming the firmware version
//! and up to five flash segments, plus one raw binary file per segment.
//! This crate provides the data types, the manifest parser and the
//! matching formatter; it performs no I/O and knows nothing about the
//! debug link used to program the target.

#![warn(missing_docs)]

mod manifest;
mod version;

pub use manifest::{
    Manifest, ManifestError, ManifestErrorKind, Segment, MAX_FILE_NAME_LEN, MAX_SEGMENTS,
};
pub use version::{FirmwareVersion, InvalidVersion};
