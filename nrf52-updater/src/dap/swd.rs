//! SWD packet framing over a half-duplex bus.
//!
//! Every transaction is an 8-bit request from the host, a turnaround
//! cycle, a 3-bit acknowledge from the target, and a 33-bit data phase
//! (32 data bits plus parity) in whichever direction the request named.
//! On a half-duplex bus the turnarounds fall on the direction switches:
//! the acknowledge read absorbs the first one, the write data phase
//! carries the second as its leading don't-care bit, and the trailing
//! turnaround after read data disappears into the idle cycles clocked
//! after every transaction.

use bitfield::bitfield;

use super::{DapError, RawDapAccess, RegisterAddress, SessionError};
use crate::probe::SwdBus;

// Acknowledge values as sampled off the wire, LSB first.
const ACK_OK: u64 = 0b001;
const ACK_WAIT: u64 = 0b010;
const ACK_FAULT: u64 = 0b100;

bitfield! {
    /// The request phase of an SWD transaction.
    #[derive(Copy, Clone)]
    struct SwdRequest(u8);
    impl Debug;
    start, set_start: 0;
    ap_n_dp, set_ap_n_dp: 1;
    r_n_w, set_r_n_w: 2;
    a2, set_a2: 3;
    a3, set_a3: 4;
    parity, set_parity: 5;
    stop, set_stop: 6;
    park, set_park: 7;
}

impl SwdRequest {
    fn new(address: RegisterAddress, read: bool) -> Self {
        let mut request = SwdRequest(0);
        request.set_start(true);
        request.set_ap_n_dp(address.is_ap());
        request.set_r_n_w(read);
        request.set_a2(address.a2());
        request.set_a3(address.a3());
        request.set_parity(address.is_ap() ^ read ^ address.a2() ^ address.a3());
        request.set_stop(false);
        request.set_park(true);
        request
    }
}

/// SWD wire driver: implements register-level DAP access by framing
/// packets onto a [`SwdBus`].
pub struct SwdInterface<B: SwdBus> {
    bus: B,
}

impl<B: SwdBus> SwdInterface<B> {
    /// Wraps a bus in the packet driver.
    pub fn new(bus: B) -> Self {
        SwdInterface { bus }
    }

    /// Consumes the driver, returning the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Reads the turnaround cycle plus the 3-bit acknowledge.
    fn read_ack(&mut self) -> Result<(), SessionError> {
        let bits = self.bus.read_bits(4)?;
        match bits >> 1 {
            ACK_OK => Ok(()),
            ACK_WAIT => Err(DapError::WaitResponse.into()),
            ACK_FAULT => Err(DapError::FaultResponse.into()),
            0b111 => Err(DapError::NoAcknowledge.into()),
            _ => Err(DapError::SwdProtocol.into()),
        }
    }
}

impl<B: SwdBus> RawDapAccess for SwdInterface<B> {
    fn raw_read_register(&mut self, address: RegisterAddress) -> Result<u32, SessionError> {
        let request = SwdRequest::new(address, true);
        self.bus.write_bits(u64::from(request.0), 8)?;
        self.read_ack()?;

        let bits = self.bus.read_bits(33)?;
        let data = bits as u32;
        let parity = (bits >> 32) & 1 == 1;
        // Trailing turnaround, then idle until the next request.
        self.bus.write_bits(0, 8)?;

        if (data.count_ones() & 1 == 1) != parity {
            return Err(DapError::IncorrectParity.into());
        }
        Ok(data)
    }

    fn raw_write_register(
        &mut self,
        address: RegisterAddress,
        value: u32,
    ) -> Result<(), SessionError> {
        let request = SwdRequest::new(address, false);
        self.bus.write_bits(u64::from(request.0), 8)?;
        self.read_ack()?;

        // Turnaround back to the host, 32 data bits, parity.
        let parity = u64::from(value.count_ones() & 1);
        let bits = (u64::from(value) << 1) | (parity << 33);
        self.bus.write_bits(bits, 34)?;
        self.bus.write_bits(0, 8)?;
        Ok(())
    }

    fn swj_sequence(&mut self, bit_len: u8, bits: u64) -> Result<(), SessionError> {
        self.bus.write_bits(bits, bit_len)?;
        Ok(())
    }

    fn set_nrst(&mut self, assert: bool) -> Result<(), SessionError> {
        self.bus.set_nrst(assert)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Bus that records writes and replays queued read values.
    #[derive(Default)]
    struct ScriptedBus {
        written: Vec<(u64, u8)>,
        reads: VecDeque<u64>,
    }

    impl ScriptedBus {
        fn replying(reads: &[u64]) -> Self {
            ScriptedBus {
                written: Vec::new(),
                reads: reads.iter().copied().collect(),
            }
        }
    }

    impl SwdBus for ScriptedBus {
        fn write_bits(&mut self, bits: u64, bit_len: u8) -> Result<(), ProbeError> {
            let bits = if bit_len == 64 {
                bits
            } else {
                bits & ((1u64 << bit_len) - 1)
            };
            self.written.push((bits, bit_len));
            Ok(())
        }

        fn read_bits(&mut self, _bit_len: u8) -> Result<u64, ProbeError> {
            Ok(self.reads.pop_front().expect("unexpected bus read"))
        }

        fn set_nrst(&mut self, _assert: bool) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    /// Turnaround low plus an OK acknowledge, as sampled LSB-first.
    const TRN_ACK_OK: u64 = ACK_OK << 1;

    fn read_reply(data: u32) -> u64 {
        let parity = u64::from(data.count_ones() & 1);
        u64::from(data) | (parity << 32)
    }

    #[test]
    fn request_byte_encoding() {
        // The canonical request bytes for the registers this driver uses.
        assert_eq!(SwdRequest::new(RegisterAddress::Dp(0x0), true).0, 0xA5); // DPIDR
        assert_eq!(SwdRequest::new(RegisterAddress::Dp(0x4), false).0, 0xA9); // CTRL/STAT
        assert_eq!(SwdRequest::new(RegisterAddress::Dp(0xC), true).0, 0xBD); // RDBUFF
        assert_eq!(SwdRequest::new(RegisterAddress::Ap(0x4), false).0, 0x8B); // TAR
        assert_eq!(SwdRequest::new(RegisterAddress::Ap(0xC), true).0, 0x9F); // DRW
    }

    #[test]
    fn read_transaction_phases() {
        let mut dap = SwdInterface::new(ScriptedBus::replying(&[
            TRN_ACK_OK,
            read_reply(0x2BA0_1477),
        ]));
        let value = dap.raw_read_register(RegisterAddress::Dp(0)).unwrap();
        assert_eq!(value, 0x2BA0_1477);
        // Request byte, then trailing turnaround + idle.
        assert_eq!(dap.bus.written, vec![(0xA5, 8), (0, 8)]);
    }

    #[test]
    fn write_transaction_phases() {
        let mut dap = SwdInterface::new(ScriptedBus::replying(&[TRN_ACK_OK]));
        dap.raw_write_register(RegisterAddress::Dp(0x4), 0x5000_0000)
            .unwrap();
        // 0x50000000 has two set bits, so even parity; the data phase is
        // the word shifted past the leading turnaround bit.
        assert_eq!(
            dap.bus.written,
            vec![(0xA9, 8), (u64::from(0x5000_0000u32) << 1, 34), (0, 8)]
        );
    }

    #[test]
    fn write_parity_bit_is_set_for_odd_data() {
        let mut dap = SwdInterface::new(ScriptedBus::replying(&[TRN_ACK_OK]));
        dap.raw_write_register(RegisterAddress::Dp(0x4), 1).unwrap();
        assert_eq!(dap.bus.written[1], ((1 << 1) | (1 << 33), 34));
    }

    #[test]
    fn acknowledge_faults_are_reported() {
        for (ack, expected) in [
            (ACK_WAIT, DapError::WaitResponse),
            (ACK_FAULT, DapError::FaultResponse),
            (0b111, DapError::NoAcknowledge),
            (0b101, DapError::SwdProtocol),
        ] {
            let mut dap = SwdInterface::new(ScriptedBus::replying(&[ack << 1]));
            let result = dap.raw_read_register(RegisterAddress::Dp(0));
            match result {
                Err(SessionError::Dap(e)) => assert_eq!(e, expected),
                other => panic!("expected a DAP error, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_read_parity_is_detected() {
        let reply = read_reply(0x1234_5678) ^ (1 << 32);
        let mut dap = SwdInterface::new(ScriptedBus::replying(&[TRN_ACK_OK, reply]));
        let result = dap.raw_read_register(RegisterAddress::Dp(0));
        assert!(matches!(
            result,
            Err(SessionError::Dap(DapError::IncorrectParity))
        ));
    }

    #[test]
    fn swj_sequences_pass_through_masked() {
        let mut dap = SwdInterface::new(ScriptedBus::default());
        dap.swj_sequence(51, 0x0007_FFFF_FFFF_FFFF).unwrap();
        dap.swj_sequence(16, 0xE79E).unwrap();
        assert_eq!(
            dap.bus.written,
            vec![(0x0007_FFFF_FFFF_FFFF, 51), (0xE79E, 16)]
        );
    }
}
