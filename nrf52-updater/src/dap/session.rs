//! High-level debug session on top of register-level DAP access.
//!
//! Owns the connect sequence (line reset, protocol switch, IDCODE check,
//! debug power-up), MEM-AP memory bursts and the Cortex-M core-control
//! operations the flash path needs.

use super::cortex_m::{Aircr, Demcr, Dhcsr};
use super::registers::{
    Abort, Csw, Ctrl, Dpidr, Drw, RdBuff, Select, Tar, CSW_ADDRINC_SINGLE, CSW_SIZE_WORD,
};
use super::{RawDapAccess, Register, RegisterAddress, SessionError};

/// IDCODE of the nRF52 SW-DP. Anything else on the wire is fatal.
pub const NRF52_IDCODE: u32 = 0x2BA0_1477;

/// FICR INFO.PART word, holds the part number of the attached device.
const FICR_INFO_PART: u32 = 0x1000_0100;

/// The MEM-AP address auto-increment wraps at 1 KiB boundaries, so TAR is
/// rewritten whenever a burst crosses one.
const TAR_AUTOINC_BLOCK: u32 = 0x400;

const POWER_UP_ATTEMPTS: u32 = 1000;
const HALT_ATTEMPTS: u32 = 1000;

/// An attached SWD debug session.
///
/// The session owns the probe for its whole lifetime; there are no
/// globals, and dropping the session releases whatever the probe holds.
pub struct SwdSession<P: RawDapAccess> {
    probe: P,
}

impl<P: RawDapAccess> SwdSession<P> {
    /// Wraps a probe. No wire traffic happens until [`attach`](Self::attach).
    pub fn new(probe: P) -> Self {
        SwdSession { probe }
    }

    /// Consumes the session, returning the probe.
    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Brings the debug port up: line reset, JTAG-to-SWD switch, IDCODE
    /// check, debug power-up and MEM-AP configuration.
    pub fn attach(&mut self) -> Result<(), SessionError> {
        self.line_reset()?;
        self.check_id_code()?;
        self.power_up()?;

        // 32-bit transfers, address auto-increment within a burst.
        let mut csw = Csw::default();
        csw.set_dbg_sw_enable(true);
        csw.set_prot(0b010);
        csw.set_addr_inc(CSW_ADDRINC_SINGLE);
        csw.set_size(CSW_SIZE_WORD);
        self.write_ap_register(csw)?;

        let part = self.read_word(FICR_INFO_PART)?;
        tracing::info!("nRF52 part: {:#x}", part);
        Ok(())
    }

    /// Puts the wire into SWD mode: >50 cycles high, the JTAG-to-SWD
    /// select pattern, >50 cycles high again, then idle low.
    fn line_reset(&mut self) -> Result<(), SessionError> {
        self.probe.swj_sequence(51, 0x0007_FFFF_FFFF_FFFF)?;
        self.probe.swj_sequence(16, 0xE79E)?;
        self.probe.swj_sequence(51, 0x0007_FFFF_FFFF_FFFF)?;
        self.probe.swj_sequence(8, 0x00)?;
        Ok(())
    }

    /// Reads the IDCODE and verifies the expected target is attached.
    pub fn check_id_code(&mut self) -> Result<(), SessionError> {
        let dpidr: Dpidr = self.read_dp_register()?;
        let idcode: u32 = dpidr.into();
        if idcode != NRF52_IDCODE {
            tracing::error!(
                "Wrong nRF52 ID code {:#010x} (expected {:#010x})",
                idcode,
                NRF52_IDCODE
            );
            return Err(SessionError::WrongIdCode {
                idcode,
                expected: NRF52_IDCODE,
            });
        }
        tracing::info!("IDCODE: {:#010x}", idcode);
        Ok(())
    }

    /// Clears sticky errors and requests debug and system power.
    fn power_up(&mut self) -> Result<(), SessionError> {
        let mut abort = Abort(0);
        abort.set_orunerrclr(true);
        abort.set_wderrclr(true);
        abort.set_stkerrclr(true);
        abort.set_stkcmpclr(true);
        self.probe
            .raw_write_register(RegisterAddress::Dp(Abort::ADDRESS), abort.into())?;

        self.write_dp_register(Select::default())?;

        let mut ctrl = Ctrl::default();
        ctrl.set_cdbgpwrupreq(true);
        ctrl.set_csyspwrupreq(true);
        self.write_dp_register(ctrl)?;

        for _ in 0..POWER_UP_ATTEMPTS {
            let ctrl: Ctrl = self.read_dp_register()?;
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                return Ok(());
            }
        }
        tracing::error!("Debug power request failed");
        Err(SessionError::PowerUpFailed)
    }

    /// Reads `out.len()` words starting at the word-aligned `address`.
    ///
    /// AP reads are pipelined: each burst issues a priming DRW read and
    /// collects the final word from RDBUFF, so every value handed back has
    /// been acknowledged by the target.
    pub fn read_mem(&mut self, address: u32, out: &mut [u32]) -> Result<(), SessionError> {
        if address % 4 != 0 {
            return Err(SessionError::UnalignedAccess { address });
        }
        let mut address = address;
        let mut remaining = out;
        while !remaining.is_empty() {
            let chunk_len = words_to_boundary(address).min(remaining.len());
            let (chunk, rest) = std::mem::take(&mut remaining).split_at_mut(chunk_len);
            remaining = rest;

            self.write_ap_register(Tar(address))?;
            let _ = self.read_ap_register::<Drw>()?;
            for slot in chunk[..chunk_len - 1].iter_mut() {
                *slot = self.read_ap_register::<Drw>()?.0;
            }
            chunk[chunk_len - 1] = self.read_dp_register::<RdBuff>()?.0;

            address += chunk_len as u32 * 4;
        }
        Ok(())
    }

    /// Writes `data` starting at the word-aligned `address`.
    pub fn write_mem(&mut self, address: u32, data: &[u32]) -> Result<(), SessionError> {
        if address % 4 != 0 {
            return Err(SessionError::UnalignedAccess { address });
        }
        let mut address = address;
        let mut remaining = data;
        while !remaining.is_empty() {
            let chunk_len = words_to_boundary(address).min(remaining.len());
            let (chunk, rest) = remaining.split_at(chunk_len);
            remaining = rest;

            self.write_ap_register(Tar(address))?;
            for &word in chunk {
                self.write_ap_register(Drw(word))?;
            }
            address += chunk_len as u32 * 4;
        }
        Ok(())
    }

    /// Reads one word of target memory.
    pub fn read_word(&mut self, address: u32) -> Result<u32, SessionError> {
        let mut word = 0;
        self.read_mem(address, std::slice::from_mut(&mut word))?;
        Ok(word)
    }

    /// Writes one word of target memory.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), SessionError> {
        self.write_mem(address, std::slice::from_ref(&value))
    }

    /// Halts the core and waits until it reports the halted state.
    pub fn halt(&mut self) -> Result<(), SessionError> {
        let mut dhcsr = Dhcsr(0);
        dhcsr.set_c_debugen(true);
        dhcsr.set_c_halt(true);
        dhcsr.enable_write();
        self.write_word(Dhcsr::ADDRESS, dhcsr.into())?;

        for _ in 0..HALT_ATTEMPTS {
            let dhcsr = Dhcsr(self.read_word(Dhcsr::ADDRESS)?);
            if dhcsr.s_halt() {
                return Ok(());
            }
        }
        Err(SessionError::HaltTimeout)
    }

    /// Arms the reset vector catch: if the core resets while the debugger
    /// holds it, it halts at the reset vector instead of executing.
    pub fn enable_reset_vector_catch(&mut self) -> Result<(), SessionError> {
        let mut demcr = Demcr(self.read_word(Demcr::ADDRESS)?);
        demcr.set_vc_corereset(true);
        self.write_word(Demcr::ADDRESS, demcr.into())?;
        // Reading DHCSR clears the sticky reset status.
        let _ = self.read_word(Dhcsr::ADDRESS)?;
        Ok(())
    }

    /// Releases the core: clears the reset vector catch and disables
    /// halting debug so the target executes its firmware.
    pub fn run(&mut self) -> Result<(), SessionError> {
        let mut demcr = Demcr(self.read_word(Demcr::ADDRESS)?);
        demcr.set_vc_corereset(false);
        self.write_word(Demcr::ADDRESS, demcr.into())?;

        let mut dhcsr = Dhcsr(0);
        dhcsr.enable_write();
        self.write_word(Dhcsr::ADDRESS, dhcsr.into())
    }

    /// Requests a system-wide reset through AIRCR.
    pub fn reset_system(&mut self) -> Result<(), SessionError> {
        let mut aircr = Aircr(0);
        aircr.vectkey();
        aircr.set_sysresetreq(true);
        self.write_word(Aircr::ADDRESS, aircr.into())
    }

    /// Drives the target's hardware reset line.
    pub fn reset(&mut self, assert: bool) -> Result<(), SessionError> {
        self.probe.set_nrst(assert)
    }

    fn read_dp_register<R: Register>(&mut self) -> Result<R, SessionError> {
        let value = self
            .probe
            .raw_read_register(RegisterAddress::Dp(R::ADDRESS))?;
        Ok(R::from(value))
    }

    fn write_dp_register<R: Register>(&mut self, register: R) -> Result<(), SessionError> {
        self.probe
            .raw_write_register(RegisterAddress::Dp(R::ADDRESS), register.into())
    }

    fn read_ap_register<R: Register>(&mut self) -> Result<R, SessionError> {
        let value = self
            .probe
            .raw_read_register(RegisterAddress::Ap(R::ADDRESS))?;
        Ok(R::from(value))
    }

    fn write_ap_register<R: Register>(&mut self, register: R) -> Result<(), SessionError> {
        self.probe
            .raw_write_register(RegisterAddress::Ap(R::ADDRESS), register.into())
    }
}

/// Words left before the next TAR auto-increment boundary.
fn words_to_boundary(address: u32) -> usize {
    ((TAR_AUTOINC_BLOCK - address % TAR_AUTOINC_BLOCK) / 4) as usize
}
