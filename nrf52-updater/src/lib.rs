//! Firmware updater for the nRF52 coprocessor of a dual-MCU gateway.
//!
//! On every gateway boot the updater compares the firmware bundle on the
//! read-only image partition against the version stamped in the
//! coprocessor's UICR and, when they diverge, reprograms the coprocessor
//! in place: the whole chip is mass-erased, every manifest segment is
//! written and read back in 64-word chunks, and the new version is
//! stamped as the very last flash write. The debug link is SWD, bit-banged
//! through a half-duplex LSB-first SPI peripheral plus a reset GPIO.
//!
//! ```no_run
//! # #[cfg(feature = "spidev")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nrf52_updater::dap::swd::SwdInterface;
//! use nrf52_updater::flashing::Updater;
//! use nrf52_updater::probe::spidev::SpidevSwdBus;
//! use nrf52_updater::scheduler::ThreadScheduler;
//!
//! let bus = SpidevSwdBus::open("/dev/spidev0.0", 17)?;
//! let mut updater = Updater::new(SwdInterface::new(bus), ThreadScheduler);
//! let outcome = updater.run(std::path::Path::new("/fs_nrf52"))?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "spidev"))]
//! # fn main() {}
//! ```
//!
//! The layers, bottom up: [`probe`] (raw bit transfers and the reset
//! line), [`dap`] (SWD packet framing, DP/AP registers, the debug
//! session), [`nvmc`] (flash controller sequencing), [`fs`] and the
//! manifest model from [`nrf52_fw_image`], and [`flashing`] (verify,
//! progress, the orchestrator).

#![warn(missing_docs)]

pub mod dap;
pub mod error;
pub mod flashing;
pub mod fs;
pub mod nvmc;
pub mod probe;
pub mod scheduler;

pub use crate::error::{UpdateError, UpdateStatus, WriteError};
pub use crate::flashing::{FlashProgress, ProgressEvent, UpdateOutcome, Updater};

/// The firmware-bundle data model this updater consumes.
pub use nrf52_fw_image as image;
