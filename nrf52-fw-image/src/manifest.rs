use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::FirmwareVersion;

/// Maximum number of segments a manifest may describe.
pub const MAX_SEGMENTS: usize = 5;

/// Maximum length of a segment file name, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 19;

/// One contiguous range of target flash, backed by a file on the image
/// partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Word-aligned target flash address the segment is programmed to.
    pub address: u32,
    /// Segment length in bytes; positive and a multiple of 4.
    pub size: u32,
    /// Name of the backing file, relative to the image partition root.
    pub file_name: String,
    /// CRC-32/IEEE over the raw file contents.
    pub crc: u32,
}

impl Segment {
    /// First address past the segment.
    pub fn end(&self) -> u32 {
        self.address + self.size
    }
}

/// Parsed `info.txt`: the bundle version and its flash segments, in
/// ascending address order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the bundled firmware.
    pub version: FirmwareVersion,
    /// Flash segments, ascending by address, non-overlapping.
    pub segments: Vec<Segment>,
}

impl Manifest {
    /// Total number of bytes across all segments.
    pub fn total_size(&self) -> u32 {
        self.segments.iter().map(|s| s.size).sum()
    }

    /// Parses the text of an `info.txt` manifest.
    ///
    /// The first non-empty line must be `# vM.m.p`; each further non-empty
    /// line describes one segment as `address size file-name crc`, with
    /// address and CRC in hex (`0x` optional), and size either decimal or
    /// `0x`-prefixed hex. Lines are right-stripped of CR, spaces and tabs;
    /// lines left empty by that are skipped. Parsing stops at the first
    /// offending line, reported by its 1-based number.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut version = None;
        let mut segments: Vec<Segment> = Vec::new();

        for (index, raw_line) in text.split('\n').enumerate() {
            let line_number = index as u32 + 1;
            let line = raw_line.trim_end_matches(['\r', ' ', '\t']);
            if line.is_empty() {
                continue;
            }

            let fail = |kind| ManifestError {
                line: line_number,
                kind,
            };

            if version.is_none() {
                version = Some(parse_version_line(line).map_err(fail)?);
                continue;
            }

            if segments.len() >= MAX_SEGMENTS {
                return Err(fail(ManifestErrorKind::TooManySegments));
            }
            let segment = parse_segment_line(line).map_err(fail)?;
            segment
                .address
                .checked_add(segment.size)
                .ok_or_else(|| fail(ManifestErrorKind::AddressOverflow))?;
            if let Some(previous) = segments.last() {
                if segment.address < previous.end() {
                    return Err(fail(ManifestErrorKind::OutOfOrder));
                }
            }
            if segments.iter().any(|s| s.file_name == segment.file_name) {
                return Err(fail(ManifestErrorKind::DuplicateFileName));
            }
            segments.push(segment);
        }

        let version = version.ok_or(ManifestError {
            line: 1,
            kind: ManifestErrorKind::MissingVersion,
        })?;
        Ok(Manifest { version, segments })
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.version)?;
        for segment in &self.segments {
            writeln!(
                f,
                "{:#010x} {} {} {:#010x}",
                segment.address, segment.size, segment.file_name, segment.crc
            )?;
        }
        Ok(())
    }
}

/// A manifest was rejected; `line` is the offending 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ManifestError {
    /// 1-based number of the line that failed to parse or validate.
    pub line: u32,
    /// What was wrong with it.
    pub kind: ManifestErrorKind,
}

/// The ways a manifest line can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestErrorKind {
    /// The manifest contains no version line.
    #[error("missing version line")]
    MissingVersion,
    /// The first non-empty line is not `# vM.m.p`.
    #[error("expected a version line of the form `# vM.m.p`")]
    BadVersionLine,
    /// The segment address field is not a 32-bit hex number.
    #[error("bad segment address")]
    BadAddress,
    /// The segment size field is not a decimal or `0x`-hex 32-bit number.
    #[error("bad segment size")]
    BadSize,
    /// The segment size is zero or not a multiple of 4.
    #[error("segment size {size} is zero or not a multiple of 4")]
    InvalidSize {
        /// The rejected size.
        size: u32,
    },
    /// The segment address is not word-aligned.
    #[error("segment address {address:#010x} is not word-aligned")]
    UnalignedAddress {
        /// The rejected address.
        address: u32,
    },
    /// The file name is missing or longer than [`MAX_FILE_NAME_LEN`].
    #[error("file name is missing or longer than 19 bytes")]
    BadFileName,
    /// The CRC field is not a 32-bit hex number.
    #[error("bad segment CRC")]
    BadCrc,
    /// The line continues past the CRC field.
    #[error("trailing data after the CRC field")]
    TrailingData,
    /// The manifest describes more than [`MAX_SEGMENTS`] segments.
    #[error("more than 5 segments")]
    TooManySegments,
    /// Segments are not in strictly ascending order, or overlap.
    #[error("segments overlap or are out of ascending address order")]
    OutOfOrder,
    /// Two segments name the same backing file.
    #[error("duplicate segment file name")]
    DuplicateFileName,
    /// A segment extends past the end of the 32-bit address space.
    #[error("segment end overflows the 32-bit address space")]
    AddressOverflow,
}

fn parse_version_line(line: &str) -> Result<FirmwareVersion, ManifestErrorKind> {
    let rest = line
        .strip_prefix("# v")
        .ok_or(ManifestErrorKind::BadVersionLine)?;
    rest.parse().map_err(|_| ManifestErrorKind::BadVersionLine)
}

fn parse_segment_line(line: &str) -> Result<Segment, ManifestErrorKind> {
    let (token, rest) = next_token(line).ok_or(ManifestErrorKind::BadAddress)?;
    let address = parse_hex32(token).ok_or(ManifestErrorKind::BadAddress)?;

    let (token, rest) = next_token(rest).ok_or(ManifestErrorKind::BadSize)?;
    let size = parse_size(token).ok_or(ManifestErrorKind::BadSize)?;

    let (file_name, rest) = next_token(rest).ok_or(ManifestErrorKind::BadFileName)?;
    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(ManifestErrorKind::BadFileName);
    }

    let (token, rest) = next_token(rest).ok_or(ManifestErrorKind::BadCrc)?;
    let crc = parse_hex32(token).ok_or(ManifestErrorKind::BadCrc)?;

    if next_token(rest).is_some() {
        return Err(ManifestErrorKind::TrailingData);
    }

    if size == 0 || size % 4 != 0 {
        return Err(ManifestErrorKind::InvalidSize { size });
    }
    if address % 4 != 0 {
        return Err(ManifestErrorKind::UnalignedAddress { address });
    }

    Ok(Segment {
        address,
        size,
        file_name: file_name.to_owned(),
        crc,
    })
}

/// Splits the next run of non-blank characters off `input`, skipping
/// leading spaces and tabs. Returns the token and the remainder.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start_matches([' ', '\t']);
    if input.is_empty() {
        return None;
    }
    let end = input.find([' ', '\t']).unwrap_or(input.len());
    Some((&input[..end], &input[end..]))
}

/// 32-bit hex number with an optional `0x` prefix; digits only.
fn parse_hex32(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Size field: `0x`-prefixed hex, or plain decimal.
fn parse_size(token: &str) -> Option<u32> {
    if token.starts_with("0x") || token.starts_with("0X") {
        return parse_hex32(token);
    }
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
