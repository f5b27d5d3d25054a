//! SW-DP and MEM-AP register definitions.

use bitfield::bitfield;

use super::Register;

bitfield! {
    /// Debug port identification register.
    #[derive(Clone)]
    pub struct Dpidr(u32);
    impl Debug;
    /// Implementation-defined revision.
    pub u8, revision, _: 31, 28;
    /// Part number of the debug port.
    pub u8, part_no, _: 27, 20;
    /// Minimal debug port implemented.
    pub min, _: 16;
    /// Debug port architecture version.
    pub u8, version, _: 15, 12;
    /// JEP106 designer code.
    pub u16, designer, _: 11, 1;
}

impl From<u32> for Dpidr {
    fn from(raw: u32) -> Self {
        Dpidr(raw)
    }
}

impl From<Dpidr> for u32 {
    fn from(raw: Dpidr) -> Self {
        raw.0
    }
}

impl Register for Dpidr {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "DPIDR";
}

bitfield! {
    /// Abort register: clears sticky error flags.
    #[derive(Clone)]
    pub struct Abort(u32);
    impl Debug;
    /// Clears the sticky overrun flag.
    pub _, set_orunerrclr: 4;
    /// Clears the write data error flag.
    pub _, set_wderrclr: 3;
    /// Clears the sticky error flag.
    pub _, set_stkerrclr: 2;
    /// Clears the sticky compare flag.
    pub _, set_stkcmpclr: 1;
    /// Aborts the current AP transaction.
    pub _, set_dapabort: 0;
}

impl From<u32> for Abort {
    fn from(raw: u32) -> Self {
        Abort(raw)
    }
}

impl From<Abort> for u32 {
    fn from(raw: Abort) -> Self {
        raw.0
    }
}

impl Register for Abort {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "ABORT";
}

bitfield! {
    /// Control/status register of the debug port.
    #[derive(Clone)]
    pub struct Ctrl(u32);
    impl Debug;
    /// System power-up acknowledge.
    pub csyspwrupack, _: 31;
    /// System power-up request.
    pub csyspwrupreq, set_csyspwrupreq: 30;
    /// Debug power-up acknowledge.
    pub cdbgpwrupack, _: 29;
    /// Debug power-up request.
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    /// Debug reset acknowledge.
    pub cdbgrstack, _: 27;
    /// Debug reset request.
    pub c_dbg_rst_req, set_c_dbg_rst_req: 26;
    /// Sticky write data error.
    pub w_data_err, _: 7;
    /// Read transaction completed without error.
    pub read_ok, _: 6;
    /// Sticky error flag.
    pub sticky_err, _: 5;
    /// Sticky compare flag.
    pub sticky_cmp, _: 4;
    /// Sticky overrun flag.
    pub sticky_orun, _: 1;
    /// Overrun detection enable.
    pub orun_detect, set_orun_detect: 0;
}

impl Default for Ctrl {
    fn default() -> Self {
        Ctrl(0)
    }
}

impl From<u32> for Ctrl {
    fn from(raw: u32) -> Self {
        Ctrl(raw)
    }
}

impl From<Ctrl> for u32 {
    fn from(raw: Ctrl) -> Self {
        raw.0
    }
}

impl Register for Ctrl {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "CTRL/STAT";
}

bitfield! {
    /// AP and bank select register.
    #[derive(Clone)]
    pub struct Select(u32);
    impl Debug;
    /// Selected access port.
    pub u8, ap_sel, set_ap_sel: 31, 24;
    /// Selected 4-register AP bank.
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    /// Selected DP register bank.
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl Default for Select {
    fn default() -> Self {
        Select(0)
    }
}

impl From<u32> for Select {
    fn from(raw: u32) -> Self {
        Select(raw)
    }
}

impl From<Select> for u32 {
    fn from(raw: Select) -> Self {
        raw.0
    }
}

impl Register for Select {
    const ADDRESS: u8 = 0x8;
    const NAME: &'static str = "SELECT";
}

/// Read buffer: returns the result of the last pipelined AP read without
/// starting a new transaction.
#[derive(Debug, Clone)]
pub struct RdBuff(pub u32);

impl From<u32> for RdBuff {
    fn from(raw: u32) -> Self {
        RdBuff(raw)
    }
}

impl From<RdBuff> for u32 {
    fn from(raw: RdBuff) -> Self {
        raw.0
    }
}

impl Register for RdBuff {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "RDBUFF";
}

/// Transfer size encoding of [`Csw::size`]: 32-bit accesses.
pub const CSW_SIZE_WORD: u8 = 0b010;
/// Address increment encoding of [`Csw::addr_inc`]: increment by the
/// transfer size after each access.
pub const CSW_ADDRINC_SINGLE: u8 = 0b01;

bitfield! {
    /// Control/status word of the MEM-AP.
    #[derive(Clone)]
    pub struct Csw(u32);
    impl Debug;
    /// Debug software access enable.
    pub dbg_sw_enable, set_dbg_sw_enable: 31;
    /// Bus access protection control.
    pub u8, prot, set_prot: 30, 24;
    /// Secure debug enabled.
    pub spiden, _: 23;
    /// A transfer is in progress on the memory bus.
    pub tr_in_prog, _: 7;
    /// The MEM-AP is enabled.
    pub device_en, _: 6;
    /// Address auto-increment mode.
    pub u8, addr_inc, set_addr_inc: 5, 4;
    /// Transfer size.
    pub u8, size, set_size: 2, 0;
}

impl Default for Csw {
    fn default() -> Self {
        Csw(0)
    }
}

impl From<u32> for Csw {
    fn from(raw: u32) -> Self {
        Csw(raw)
    }
}

impl From<Csw> for u32 {
    fn from(raw: Csw) -> Self {
        raw.0
    }
}

impl Register for Csw {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "CSW";
}

/// Transfer address register of the MEM-AP.
#[derive(Debug, Clone)]
pub struct Tar(pub u32);

impl From<u32> for Tar {
    fn from(raw: u32) -> Self {
        Tar(raw)
    }
}

impl From<Tar> for u32 {
    fn from(raw: Tar) -> Self {
        raw.0
    }
}

impl Register for Tar {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "TAR";
}

/// Data read/write register of the MEM-AP: accessing it performs the
/// memory transaction at the current TAR.
#[derive(Debug, Clone)]
pub struct Drw(pub u32);

impl From<u32> for Drw {
    fn from(raw: u32) -> Self {
        Drw(raw)
    }
}

impl From<Drw> for u32 {
    fn from(raw: Drw) -> Self {
        raw.0
    }
}

impl Register for Drw {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "DRW";
}
