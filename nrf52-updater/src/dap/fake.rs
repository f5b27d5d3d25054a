#![allow(missing_docs)] // Don't require docs for test helpers

//! A register-accurate fake of the target for tests and dry runs.
//!
//! Models the pieces of the device the updater talks to: the SW-DP with
//! its power-up handshake, the MEM-AP with pipelined DRW reads and TAR
//! auto-increment, the NVMC (WEN gating, ERASEALL/ERASEPAGE, READY
//! busy simulation), the UICR firmware-version word, FICR INFO.PART and
//! the Cortex-M halting-debug registers. High-level effects are recorded
//! in an operation log so tests can assert ordering.

use super::session::NRF52_IDCODE;
use super::{RawDapAccess, RegisterAddress, SessionError};
use crate::nvmc::{self, WEN_EEN, WEN_REN, WEN_WEN};

const FLASH_SIZE: usize = 512 * 1024;
const UICR_FW_VERSION: u32 = 0x1000_1080;
const FICR_INFO_PART: u32 = 0x1000_0100;
const DHCSR: u32 = 0xE000_EDF0;
const DEMCR: u32 = 0xE000_EDFC;
const AIRCR: u32 = 0xE000_ED0C;

/// A high-level effect observed by the fake target, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOp {
    /// Main flash and UICR erased through NVMC.ERASEALL.
    EraseAll,
    /// One page erased through NVMC.ERASEPAGE.
    ErasePage(u32),
    /// A word programmed into flash or the UICR.
    WriteWord { address: u32, value: u32 },
    /// NVMC.CONFIG.WEN changed.
    NvmcConfig(u32),
    /// The core entered the halted state.
    Halt,
    /// The core was released.
    Run,
    /// A system reset was requested through AIRCR.
    SysReset,
    /// The reset line was driven low.
    NrstAssert,
    /// The reset line was released.
    NrstRelease,
}

pub struct FakeNrf52 {
    flash: Vec<u8>,
    uicr_fw_version: u32,
    idcode: u32,
    part: u32,

    // DP/AP state
    ctrl: u32,
    csw: u32,
    tar: u32,
    read_buffer: u32,

    // NVMC state
    nvmc_config: u32,
    busy_after_command: u32,
    busy_polls: u32,

    // Core debug state
    demcr: u32,
    halted: bool,

    nrst_asserted: bool,

    /// Observed effects, in order.
    pub ops: Vec<FakeOp>,
    /// Number of SWD line resets seen.
    pub line_resets: u32,
    /// Completed assert/release reset pulses.
    pub nrst_pulses: u32,

    corrupt_readback_at: Option<u32>,
}

impl FakeNrf52 {
    pub fn new() -> Self {
        Self::with_idcode(NRF52_IDCODE)
    }

    /// A fake answering with a different IDCODE (or none: 0xFFFFFFFF).
    pub fn with_idcode(idcode: u32) -> Self {
        FakeNrf52 {
            flash: vec![0xFF; FLASH_SIZE],
            uicr_fw_version: 0xFFFF_FFFF,
            idcode,
            part: 0x52840,
            ctrl: 0,
            csw: 0,
            tar: 0,
            read_buffer: 0,
            nvmc_config: WEN_REN,
            busy_after_command: 0,
            busy_polls: 0,
            demcr: 0,
            halted: false,
            nrst_asserted: false,
            ops: Vec::new(),
            line_resets: 0,
            nrst_pulses: 0,
            corrupt_readback_at: None,
        }
    }

    /// Presets the UICR firmware-version word.
    pub fn set_uicr_fw_version(&mut self, word: u32) {
        self.uicr_fw_version = word;
    }

    pub fn uicr_fw_version(&self) -> u32 {
        self.uicr_fw_version
    }

    /// Current NVMC.CONFIG.WEN value.
    pub fn nvmc_config(&self) -> u32 {
        self.nvmc_config
    }

    /// The flash contents starting at `address`.
    pub fn flash_at(&self, address: u32, len: usize) -> &[u8] {
        &self.flash[address as usize..address as usize + len]
    }

    /// Makes READY read busy for `polls` reads after each NVMC command.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_after_command = polls;
    }

    /// Memory reads of the word at `address` return a corrupted value,
    /// simulating a marginal flash cell discovered on read-back.
    pub fn corrupt_readback_at(&mut self, address: u32) {
        self.corrupt_readback_at = Some(address);
    }

    fn read_word(&mut self, address: u32) -> u32 {
        let value = match address {
            a if (a as usize) < self.flash.len() => {
                let i = a as usize;
                u32::from_le_bytes([
                    self.flash[i],
                    self.flash[i + 1],
                    self.flash[i + 2],
                    self.flash[i + 3],
                ])
            }
            UICR_FW_VERSION => self.uicr_fw_version,
            FICR_INFO_PART => self.part,
            nvmc::NVMC_READY => {
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    0
                } else {
                    1
                }
            }
            nvmc::NVMC_CONFIG => self.nvmc_config,
            DHCSR => u32::from(self.halted) << 17,
            DEMCR => self.demcr,
            _ => 0,
        };
        if self.corrupt_readback_at == Some(address) {
            value ^ 1
        } else {
            value
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        match address {
            nvmc::NVMC_CONFIG => {
                self.nvmc_config = value & 3;
                self.ops.push(FakeOp::NvmcConfig(self.nvmc_config));
            }
            nvmc::NVMC_ERASEALL => {
                if value == 1 && self.nvmc_config == WEN_EEN {
                    self.flash.fill(0xFF);
                    self.uicr_fw_version = 0xFFFF_FFFF;
                    self.busy_polls = self.busy_after_command;
                    self.ops.push(FakeOp::EraseAll);
                }
            }
            nvmc::NVMC_ERASEPAGE => {
                if self.nvmc_config == WEN_EEN {
                    let start = value as usize;
                    let end = (start + nvmc::FLASH_PAGE_SIZE as usize).min(self.flash.len());
                    if start < self.flash.len() {
                        self.flash[start..end].fill(0xFF);
                    }
                    self.busy_polls = self.busy_after_command;
                    self.ops.push(FakeOp::ErasePage(value));
                }
            }
            DHCSR => {
                if value >> 16 == 0xA05F {
                    let c_debugen = value & 1 != 0;
                    let c_halt = value & 2 != 0;
                    if c_debugen && c_halt {
                        if !self.halted {
                            self.ops.push(FakeOp::Halt);
                        }
                        self.halted = true;
                    } else if !c_debugen {
                        if self.halted {
                            self.ops.push(FakeOp::Run);
                        }
                        self.halted = false;
                    }
                }
            }
            DEMCR => self.demcr = value,
            AIRCR => {
                if value >> 16 == 0x05FA && value & (1 << 2) != 0 {
                    self.ops.push(FakeOp::SysReset);
                }
            }
            UICR_FW_VERSION => {
                if self.nvmc_config == WEN_WEN {
                    self.uicr_fw_version = value;
                    self.busy_polls = self.busy_after_command;
                    self.ops.push(FakeOp::WriteWord { address, value });
                }
            }
            a if (a as usize) < self.flash.len() => {
                if self.nvmc_config == WEN_WEN {
                    self.flash[a as usize..a as usize + 4].copy_from_slice(&value.to_le_bytes());
                    self.busy_polls = self.busy_after_command;
                    self.ops.push(FakeOp::WriteWord { address, value });
                }
            }
            _ => {}
        }
    }

    /// TAR auto-increments when CSW says so.
    fn advance_tar(&mut self) {
        if (self.csw >> 4) & 0b11 == 0b01 {
            self.tar = self.tar.wrapping_add(4);
        }
    }
}

impl Default for FakeNrf52 {
    fn default() -> Self {
        Self::new()
    }
}

impl RawDapAccess for FakeNrf52 {
    fn raw_read_register(&mut self, address: RegisterAddress) -> Result<u32, SessionError> {
        Ok(match address {
            RegisterAddress::Dp(0x0) => self.idcode,
            RegisterAddress::Dp(0x4) => {
                // Power-up acknowledges follow the requests immediately.
                let mut value = self.ctrl;
                if value & (1 << 28) != 0 {
                    value |= 1 << 29;
                }
                if value & (1 << 30) != 0 {
                    value |= 1 << 31;
                }
                value
            }
            RegisterAddress::Dp(0xC) => self.read_buffer,
            RegisterAddress::Dp(_) => 0,
            RegisterAddress::Ap(0x0) => self.csw,
            RegisterAddress::Ap(0x4) => self.tar,
            RegisterAddress::Ap(0xC) => {
                // Pipelined: hand back the previous fetch, start the next.
                let previous = self.read_buffer;
                let tar = self.tar;
                self.read_buffer = self.read_word(tar);
                self.advance_tar();
                previous
            }
            RegisterAddress::Ap(_) => 0,
        })
    }

    fn raw_write_register(
        &mut self,
        address: RegisterAddress,
        value: u32,
    ) -> Result<(), SessionError> {
        match address {
            RegisterAddress::Dp(0x0) => {} // ABORT: nothing sticky to clear here
            RegisterAddress::Dp(0x4) => self.ctrl = value,
            RegisterAddress::Dp(_) => {} // SELECT and friends: bank 0 assumed
            RegisterAddress::Ap(0x0) => self.csw = value,
            RegisterAddress::Ap(0x4) => self.tar = value,
            RegisterAddress::Ap(0xC) => {
                let tar = self.tar;
                self.write_word(tar, value);
                self.advance_tar();
            }
            RegisterAddress::Ap(_) => {}
        }
        Ok(())
    }

    fn swj_sequence(&mut self, bit_len: u8, bits: u64) -> Result<(), SessionError> {
        if bit_len >= 50 && bits.count_ones() >= 50 {
            self.line_resets += 1;
        }
        Ok(())
    }

    fn set_nrst(&mut self, assert: bool) -> Result<(), SessionError> {
        if assert && !self.nrst_asserted {
            self.ops.push(FakeOp::NrstAssert);
        }
        if !assert && self.nrst_asserted {
            self.ops.push(FakeOp::NrstRelease);
            self.nrst_pulses += 1;
        }
        self.nrst_asserted = assert;
        Ok(())
    }
}
