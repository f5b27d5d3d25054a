//! Wire-level access to the target's SWD port.
//!
//! The debug link is a half-duplex, LSB-first SPI pair (clock + shared
//! data line) plus the target's active-low reset pin. [`SwdBus`] is the
//! seam between the SWD packet driver and the actual peripheral; the
//! Linux backend lives in [`spidev`] behind the `spidev` feature.

#[cfg(feature = "spidev")]
pub mod spidev;

/// An error in the SPI or GPIO layer below the SWD protocol.
///
/// The bus never retries; whatever the OS driver reports is surfaced
/// as-is and the update attempt decides what to do with it.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// An SPI transfer failed.
    #[error("SPI transfer failed")]
    Spi(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The reset line could not be driven.
    #[error("failed to drive the nRST line")]
    Reset(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Bit-level transfers on the shared SWD data line.
///
/// `bits` are transferred least-significant bit first, matching the SWD
/// wire order. Byte-oriented hardware pads a partial trailing byte with
/// zero bits, which the target treats as idle cycles; callers therefore
/// only rely on the first `bit_len` clocks of a write. At most 64 bits per
/// transfer.
pub trait SwdBus {
    /// Drives `bit_len` clock cycles with the host driving the data line.
    fn write_bits(&mut self, bits: u64, bit_len: u8) -> Result<(), ProbeError>;

    /// Drives `bit_len` clock cycles sampling the data line.
    fn read_bits(&mut self, bit_len: u8) -> Result<u64, ProbeError>;

    /// Drives the target's active-low reset pin. `assert` pulls the line
    /// low; releasing lets the pull-up take it high.
    fn set_nrst(&mut self, assert: bool) -> Result<(), ProbeError>;
}
