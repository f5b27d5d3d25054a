use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Firmware version of an nRF52 application image.
///
/// Encoded as the 32-bit word `[major, minor, patch, 0]`, major in the most
/// significant byte. The same word is stamped into the target's UICR; the
/// low byte is reserved and never takes part in comparisons, so it is
/// forced to zero on every construction path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FirmwareVersion(u32);

impl FirmwareVersion {
    /// Builds a version from its `major.minor.patch` components.
    pub const fn from_parts(major: u8, minor: u8, patch: u8) -> Self {
        FirmwareVersion((major as u32) << 24 | (minor as u32) << 16 | (patch as u32) << 8)
    }

    /// Reinterprets a word read from the target's UICR.
    ///
    /// The reserved low byte is masked off.
    pub const fn from_word(word: u32) -> Self {
        FirmwareVersion(word & 0xFFFF_FF00)
    }

    /// The word written to the target's UICR (low byte zero).
    pub const fn as_word(self) -> u32 {
        self.0
    }

    /// Major component.
    pub const fn major(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Minor component.
    pub const fn minor(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Patch component.
    pub const fn patch(self) -> u8 {
        (self.0 >> 8) as u8
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// A string did not parse as a `major.minor.patch` firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("expected a version of the form `major.minor.patch` with components 0..=255")]
pub struct InvalidVersion;

impl FromStr for FirmwareVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let major = parse_component(parts.next())?;
        let minor = parse_component(parts.next())?;
        let patch = parse_component(parts.next())?;
        if parts.next().is_some() {
            return Err(InvalidVersion);
        }
        Ok(FirmwareVersion::from_parts(major, minor, patch))
    }
}

/// Strict decimal `u8`: digits only, no sign, no surrounding whitespace.
fn parse_component(part: Option<&str>) -> Result<u8, InvalidVersion> {
    let part = part.ok_or(InvalidVersion)?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidVersion);
    }
    part.parse().map_err(|_| InvalidVersion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn word_encoding() {
        let version = FirmwareVersion::from_parts(1, 2, 3);
        assert_eq!(version.as_word(), 0x0102_0300);
        assert_eq!((version.major(), version.minor(), version.patch()), (1, 2, 3));
        assert_eq!(version.to_string(), "v1.2.3");
    }

    #[test]
    fn low_byte_is_ignored() {
        let stamped = FirmwareVersion::from_word(0x0102_0300);
        let with_low_byte = FirmwareVersion::from_word(0x0102_03A5);
        assert_eq!(stamped, with_low_byte);
    }

    #[test_case("1.2.3", Some((1, 2, 3)) ; "valid_1_2_3")]
    #[test_case("0.0.0", Some((0, 0, 0)) ; "valid_0_0_0")]
    #[test_case("255.255.255", Some((255, 255, 255)) ; "valid_255_255_255")]
    #[test_case("256.0.0", None ; "out_of_range_component")]
    #[test_case("1.2", None ; "missing_patch_component")]
    #[test_case("1.2.3.4", None ; "extra_component")]
    #[test_case("1.2.", None ; "trailing_dot")]
    #[test_case("1.+2.3", None ; "plus_sign_in_component")]
    #[test_case(" 1.2.3", None ; "leading_whitespace")]
    #[test_case("1.2.3x", None ; "trailing_garbage")]
    fn parsing(input: &str, expected: Option<(u8, u8, u8)>) {
        let parsed = input.parse::<FirmwareVersion>();
        match expected {
            Some((major, minor, patch)) => {
                assert_eq!(parsed, Ok(FirmwareVersion::from_parts(major, minor, patch)));
            }
            None => assert_eq!(parsed, Err(InvalidVersion)),
        }
    }

    #[test]
    fn ordering_follows_components() {
        assert!(FirmwareVersion::from_parts(1, 2, 3) < FirmwareVersion::from_parts(1, 3, 0));
        assert!(FirmwareVersion::from_parts(2, 0, 0) > FirmwareVersion::from_parts(1, 255, 255));
    }
}
