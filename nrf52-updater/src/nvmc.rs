//! Flash sequencing through the target's Non-Volatile Memory Controller.
//!
//! Every state-changing operation observes the same contract: READY must
//! read set before and after the command, and CONFIG.WEN is opened to the
//! matching mode (write or erase) only for the duration of the command,
//! then returned to read-only. A fatal fault may leave WEN open; the
//! orchestrator answers that with a hardware reset.

use crate::dap::session::SwdSession;
use crate::dap::{RawDapAccess, SessionError};
use crate::scheduler::Scheduler;

/// NVMC.READY: bit 0 set when the controller is idle.
pub const NVMC_READY: u32 = 0x4001_E400;
/// NVMC.CONFIG: WEN field selecting read-only/write/erase mode.
pub const NVMC_CONFIG: u32 = 0x4001_E504;
/// NVMC.ERASEPAGE: write a page address to erase that page.
pub const NVMC_ERASEPAGE: u32 = 0x4001_E508;
/// NVMC.ERASEALL: write 1 to erase main flash and the UICR.
pub const NVMC_ERASEALL: u32 = 0x4001_E50C;

/// Flash page size of the target.
pub const FLASH_PAGE_SIZE: u32 = 4096;

const READY_MASK: u32 = 0x0000_0001;

/// CONFIG.WEN: read-only.
pub(crate) const WEN_REN: u32 = 0;
/// CONFIG.WEN: write enabled.
pub(crate) const WEN_WEN: u32 = 1;
/// CONFIG.WEN: erase enabled.
pub(crate) const WEN_EEN: u32 = 2;

/// An NVMC operation failed.
#[derive(Debug, thiserror::Error)]
pub enum NvmcError {
    /// The underlying debug session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// An erase-page address was not page-aligned.
    #[error("page address {address:#010x} is not page-aligned")]
    UnalignedPage {
        /// The offending address.
        address: u32,
    },
}

/// NVMC sequencer borrowing an attached session.
pub struct Nvmc<'a, P: RawDapAccess, S: Scheduler> {
    session: &'a mut SwdSession<P>,
    scheduler: &'a mut S,
}

impl<'a, P: RawDapAccess, S: Scheduler> Nvmc<'a, P, S> {
    /// Wraps a session and the scheduler used while waiting on READY.
    pub fn new(session: &'a mut SwdSession<P>, scheduler: &'a mut S) -> Self {
        Nvmc { session, scheduler }
    }

    /// Erases main flash and the UICR in one command.
    pub fn erase_all(&mut self) -> Result<(), NvmcError> {
        self.wait_ready()?;
        self.set_wen(WEN_EEN)?;
        self.session.write_word(NVMC_ERASEALL, 1)?;
        self.wait_ready()?;
        self.set_wen(WEN_REN)
    }

    /// Erases the flash page starting at `address`.
    pub fn erase_page(&mut self, address: u32) -> Result<(), NvmcError> {
        if address % FLASH_PAGE_SIZE != 0 {
            return Err(NvmcError::UnalignedPage { address });
        }
        self.wait_ready()?;
        self.set_wen(WEN_EEN)?;
        self.session.write_word(NVMC_ERASEPAGE, address)?;
        self.wait_ready()?;
        self.set_wen(WEN_REN)
    }

    /// Programs a burst of words starting at the word-aligned `address`.
    pub fn write_words(&mut self, address: u32, words: &[u32]) -> Result<(), NvmcError> {
        self.wait_ready()?;
        self.set_wen(WEN_WEN)?;
        self.session.write_mem(address, words)?;
        self.wait_ready()?;
        self.set_wen(WEN_REN)
    }

    /// Polls READY until set, yielding once per iteration so the wait
    /// never starves lower-priority tasks. Bounded only by the system
    /// watchdog: a full-chip erase takes hundreds of milliseconds.
    fn wait_ready(&mut self) -> Result<(), NvmcError> {
        loop {
            let ready = self.session.read_word(NVMC_READY)?;
            if ready & READY_MASK != 0 {
                return Ok(());
            }
            self.scheduler.yield_now();
        }
    }

    fn set_wen(&mut self, wen: u32) -> Result<(), NvmcError> {
        self.session.write_word(NVMC_CONFIG, wen)?;
        Ok(())
    }
}
