//! SWD bus backend for Linux hosts.
//!
//! The clock/data pair is a spidev device opened in 3-wire, LSB-first
//! mode 0 without a chip select (SWD has none); the target's reset pin is
//! a sysfs GPIO exported as an output, released (high) at init. The SPI
//! data line is the shared SWDIO wire, so the kernel driver must support
//! `SPI_3WIRE` half-duplex turnaround.

use std::path::Path;

use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use sysfs_gpio::{Direction, Pin};

use super::{ProbeError, SwdBus};

/// Nominal SWD clock rate.
const SPI_SPEED_HZ: u32 = 2_000_000;

/// [`SwdBus`] over a Linux spidev device and a sysfs GPIO reset line.
pub struct SpidevSwdBus {
    spidev: Spidev,
    nrst: Pin,
}

impl SpidevSwdBus {
    /// Opens `spi_path` and exports `nrst_gpio` as the reset line.
    ///
    /// The reset line comes up released. On any failure the parts already
    /// acquired are released again before returning.
    pub fn open(spi_path: impl AsRef<Path>, nrst_gpio: u64) -> Result<Self, ProbeError> {
        let mut spidev = Spidev::open(spi_path).map_err(|e| ProbeError::Spi(Box::new(e)))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_SPEED_HZ)
            .lsb_first(true)
            .mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_3WIRE | SpiModeFlags::SPI_NO_CS)
            .build();
        spidev
            .configure(&options)
            .map_err(|e| ProbeError::Spi(Box::new(e)))?;

        let nrst = Pin::new(nrst_gpio);
        nrst.export().map_err(|e| ProbeError::Reset(Box::new(e)))?;
        // Direction::High configures the pin as an output driven high, so
        // the target is out of reset as soon as the line is ours.
        if let Err(e) = nrst.set_direction(Direction::High) {
            let _ = nrst.unexport();
            return Err(ProbeError::Reset(Box::new(e)));
        }

        tracing::debug!(speed_hz = SPI_SPEED_HZ, gpio = nrst_gpio, "SWD bus ready");
        Ok(SpidevSwdBus { spidev, nrst })
    }
}

impl SwdBus for SpidevSwdBus {
    fn write_bits(&mut self, bits: u64, bit_len: u8) -> Result<(), ProbeError> {
        assert!(bit_len <= 64);
        // Mask unused bits and round up to whole bytes; the pad bits clock
        // out as idle cycles.
        let bits = if bit_len == 64 {
            bits
        } else {
            bits & ((1u64 << bit_len) - 1)
        };
        let tx = bits.to_le_bytes();
        let num_bytes = usize::from(bit_len.div_ceil(8));
        let mut transfer = SpidevTransfer::write(&tx[..num_bytes]);
        self.spidev
            .transfer(&mut transfer)
            .map_err(|e| ProbeError::Spi(Box::new(e)))
    }

    fn read_bits(&mut self, bit_len: u8) -> Result<u64, ProbeError> {
        assert!(bit_len <= 64);
        let mut rx = [0u8; 8];
        let num_bytes = usize::from(bit_len.div_ceil(8));
        {
            let mut transfer = SpidevTransfer::read(&mut rx[..num_bytes]);
            self.spidev
                .transfer(&mut transfer)
                .map_err(|e| ProbeError::Spi(Box::new(e)))?;
        }
        let bits = u64::from_le_bytes(rx);
        Ok(if bit_len == 64 {
            bits
        } else {
            bits & ((1u64 << bit_len) - 1)
        })
    }

    fn set_nrst(&mut self, assert: bool) -> Result<(), ProbeError> {
        let level = if assert { 0 } else { 1 };
        self.nrst
            .set_value(level)
            .map_err(|e| ProbeError::Reset(Box::new(e)))
    }
}

impl Drop for SpidevSwdBus {
    fn drop(&mut self) {
        // Leave the target running and give the GPIO back.
        let _ = self.nrst.set_value(1);
        let _ = self.nrst.unexport();
    }
}
