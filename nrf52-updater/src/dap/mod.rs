//! SW-DP and MEM-AP plumbing for the target's debug access port.
//!
//! [`swd`] frames register accesses into SWD packets over a [`SwdBus`];
//! [`session`] builds the connect/power-up/memory/core-control operations
//! on top of the register level. [`RawDapAccess`] is the seam between the
//! two, and the one the fake target implements for tests.

pub mod cortex_m;
pub mod registers;
pub mod session;
pub mod swd;

#[cfg(any(test, feature = "test"))]
pub mod fake;

use crate::probe::ProbeError;

/// An error in the communication with an access port or debug port.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq, Copy)]
pub enum DapError {
    /// An error occurred in the SWD communication between host and device.
    #[error("An error occurred in the SWD communication between host and device.")]
    SwdProtocol,
    /// The target device did not respond to the request.
    #[error("Target device did not respond to request.")]
    NoAcknowledge,
    /// The target device responded with a FAULT response to the request.
    #[error("Target device responded with a FAULT response to the request.")]
    FaultResponse,
    /// Target device responded with a WAIT response to the request.
    #[error("Target device responded with a WAIT response to the request.")]
    WaitResponse,
    /// The parity bit on the read request was incorrect.
    #[error("Incorrect parity on READ request.")]
    IncorrectParity,
}

/// An error at the debug-session level.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The wire layer below the protocol failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// The target faulted an SWD transaction.
    #[error(transparent)]
    Dap(#[from] DapError),
    /// The attached device is not the expected target.
    #[error("wrong IDCODE {idcode:#010x} (expected {expected:#010x})")]
    WrongIdCode {
        /// IDCODE read from the debug port.
        idcode: u32,
        /// IDCODE the target family reports.
        expected: u32,
    },
    /// The debug power-up request was not acknowledged.
    #[error("debug power-up request was not acknowledged")]
    PowerUpFailed,
    /// The core did not report the halted state.
    #[error("the core did not halt")]
    HaltTimeout,
    /// A memory access used a non-word-aligned address.
    #[error("memory access at {address:#010x} is not word-aligned")]
    UnalignedAccess {
        /// The offending address.
        address: u32,
    },
}

/// Address of a register on the SW-DP or the MEM-AP.
///
/// Only the two address bits A\[3:2\] travel in an SWD request; bank
/// selection for the DP is through SELECT, which this driver keeps at
/// bank 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAddress {
    /// A debug-port register at the given byte offset.
    Dp(u8),
    /// An access-port register at the given byte offset.
    Ap(u8),
}

impl RegisterAddress {
    /// Whether the address selects an AP register.
    pub fn is_ap(self) -> bool {
        matches!(self, RegisterAddress::Ap(_))
    }

    /// Address bit 2 as it appears in the request phase.
    pub fn a2(self) -> bool {
        let (RegisterAddress::Dp(a) | RegisterAddress::Ap(a)) = self;
        a & 0b0100 != 0
    }

    /// Address bit 3 as it appears in the request phase.
    pub fn a3(self) -> bool {
        let (RegisterAddress::Dp(a) | RegisterAddress::Ap(a)) = self;
        a & 0b1000 != 0
    }
}

/// A typed 32-bit DP, AP or memory-mapped debug register.
pub trait Register: From<u32> + Into<u32> + Sized {
    /// Byte offset of the register in its block.
    const ADDRESS: u8;
    /// Register name for diagnostics.
    const NAME: &'static str;
}

/// Register-level access to the target's debug port.
///
/// Implemented by [`swd::SwdInterface`] over real hardware and by the fake
/// target for tests. All operations are synchronous: when a call returns,
/// the transaction has been acknowledged by the target.
pub trait RawDapAccess {
    /// Reads a DP or AP register.
    fn raw_read_register(&mut self, address: RegisterAddress) -> Result<u32, SessionError>;

    /// Writes a DP or AP register.
    fn raw_write_register(&mut self, address: RegisterAddress, value: u32)
        -> Result<(), SessionError>;

    /// Clocks out a raw bit sequence (line resets, protocol switches),
    /// least-significant bit first.
    fn swj_sequence(&mut self, bit_len: u8, bits: u64) -> Result<(), SessionError>;

    /// Drives the target's active-low reset pin.
    fn set_nrst(&mut self, assert: bool) -> Result<(), SessionError>;
}
