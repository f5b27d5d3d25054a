//! Cortex-M debug-control registers reached through the MEM-AP.

use bitfield::bitfield;

bitfield! {
    /// Debug Halting Control and Status Register.
    ///
    /// Writes only take effect when the debug key has been placed in the
    /// upper half-word via [`Dhcsr::enable_write`].
    #[derive(Copy, Clone)]
    pub struct Dhcsr(u32);
    impl Debug;
    /// At least one reset happened since the last read. Sticky, clears on
    /// read.
    pub s_reset_st, _: 25;
    /// An instruction retired since the last read. Sticky, clears on read.
    pub s_retire_st, _: 24;
    /// The processor is locked up on an unrecoverable exception.
    pub s_lockup, _: 19;
    /// The processor is sleeping.
    pub s_sleep, _: 18;
    /// The processor is in Debug state.
    pub s_halt, _: 17;
    /// Handshake flag for DCRDR transfers.
    pub s_regrdy, _: 16;
    /// Mask PendSV, SysTick and external interrupts while halted.
    pub c_maskints, set_c_maskints: 3;
    /// Single-step the processor.
    pub c_step, set_c_step: 2;
    /// Request the processor to halt.
    pub c_halt, set_c_halt: 1;
    /// Enable halting debug.
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    /// Memory address of the register.
    pub const ADDRESS: u32 = 0xE000_EDF0;

    /// Places the debug key in bits 31:16, required for the write to be
    /// accepted.
    pub fn enable_write(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= 0xa05f << 16;
    }
}

impl From<u32> for Dhcsr {
    fn from(raw: u32) -> Self {
        Dhcsr(raw)
    }
}

impl From<Dhcsr> for u32 {
    fn from(raw: Dhcsr) -> Self {
        raw.0
    }
}

bitfield! {
    /// Debug Exception and Monitor Control Register.
    #[derive(Copy, Clone)]
    pub struct Demcr(u32);
    impl Debug;
    /// Global enable for the DWT and ITM units.
    pub trcena, set_trcena: 24;
    /// Halt on a HardFault.
    pub vc_harderr, set_vc_harderr: 10;
    /// Halt when the core comes out of reset.
    pub vc_corereset, set_vc_corereset: 0;
}

impl Demcr {
    /// Memory address of the register.
    pub const ADDRESS: u32 = 0xE000_EDFC;
}

impl From<u32> for Demcr {
    fn from(raw: u32) -> Self {
        Demcr(raw)
    }
}

impl From<Demcr> for u32 {
    fn from(raw: Demcr) -> Self {
        raw.0
    }
}

bitfield! {
    /// Application Interrupt and Reset Control Register.
    ///
    /// Writes require the vector key in bits 31:16, see [`Aircr::vectkey`].
    #[derive(Copy, Clone)]
    pub struct Aircr(u32);
    impl Debug;
    /// Data endianness of the system.
    pub endianness, _: 15;
    /// Request a system-wide reset.
    pub sysresetreq, set_sysresetreq: 2;
    /// Clear active-exception state (debug only).
    pub vectclractive, set_vectclractive: 1;
}

impl Aircr {
    /// Memory address of the register.
    pub const ADDRESS: u32 = 0xE000_ED0C;

    /// Places the vector key in bits 31:16, required for the write to be
    /// accepted.
    pub fn vectkey(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= 0x05fa << 16;
    }
}

impl From<u32> for Aircr {
    fn from(raw: u32) -> Self {
        Aircr(raw)
    }
}

impl From<Aircr> for u32 {
    fn from(raw: Aircr) -> Self {
        raw.0
    }
}
