//! The end-to-end update state machine.
//!
//! One call to [`Updater::run`] performs one update attempt: hardware
//! reset in, SWD attach and halt, mount and parse the image bundle, read
//! the target's version stamp. Only when the versions diverge does it
//! verify the bundle, mass-erase, program and read back every segment,
//! stamp the new version and release the core. A final hardware reset is
//! guaranteed on every exit path, including panics, via a drop guard.

use std::path::Path;
use std::time::Duration;

use nrf52_fw_image::{FirmwareVersion, Manifest, Segment};

use crate::dap::session::SwdSession;
use crate::dap::RawDapAccess;
use crate::error::{UpdateError, WriteError};
use crate::flashing::progress::FlashProgress;
use crate::flashing::verify::{self, ChunkReader, CHUNK_SIZE};
use crate::fs::FirmwareFs;
use crate::nvmc::Nvmc;
use crate::scheduler::Scheduler;

/// UICR word holding the firmware-version stamp. Read at the start of an
/// attempt, written as its very last flash operation.
pub const UICR_FW_VERSION_ADDR: u32 = 0x1000_1080;

/// Name of the manifest on the image partition.
pub const MANIFEST_FILE: &str = "info.txt";

/// Where the gateway mounts the image partition.
pub const DEFAULT_IMAGE_ROOT: &str = "/fs_nrf52";

/// How long NRST is held low on each hardware reset.
const RESET_HOLD: Duration = Duration::from_millis(100);

/// Words per flash-and-verify chunk.
const CHUNK_WORDS: usize = CHUNK_SIZE / 4;

/// How a successful update attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The target already runs the bundled version; nothing was written.
    AlreadyCurrent {
        /// The version on both sides.
        version: FirmwareVersion,
    },
    /// The target was reprogrammed.
    Updated {
        /// Version previously stamped on the target.
        from: FirmwareVersion,
        /// Version now running.
        to: FirmwareVersion,
    },
}

/// Drives one firmware-update attempt against the coprocessor.
pub struct Updater<P: RawDapAccess, S: Scheduler> {
    session: SwdSession<P>,
    scheduler: S,
    progress: FlashProgress,
}

impl<P: RawDapAccess, S: Scheduler> Updater<P, S> {
    /// Builds an updater owning the probe for the duration of the attempt.
    pub fn new(probe: P, scheduler: S) -> Self {
        Updater {
            session: SwdSession::new(probe),
            scheduler,
            progress: FlashProgress::empty(),
        }
    }

    /// Installs a progress reporter.
    pub fn with_progress(mut self, progress: FlashProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Consumes the updater, returning the probe.
    pub fn into_probe(self) -> P {
        self.session.into_probe()
    }

    /// Runs one update attempt against the image bundle at `image_root`.
    ///
    /// The target is hardware-reset on entry and, no matter how the
    /// attempt ends, once more on exit.
    pub fn run(&mut self, image_root: &Path) -> Result<UpdateOutcome, UpdateError> {
        let guard = ResetGuard { updater: self };
        guard.updater.update(image_root)
    }

    fn update(&mut self, image_root: &Path) -> Result<UpdateOutcome, UpdateError> {
        self.reset_pulse()?;

        self.session.attach()?;
        self.session.halt()?;

        let fs = FirmwareFs::mount(image_root)?;
        let manifest = Manifest::parse(&fs.read_to_string(MANIFEST_FILE)?)?;
        tracing::info!("Firmware on image partition: {}", manifest.version);

        let current = FirmwareVersion::from_word(self.session.read_word(UICR_FW_VERSION_ADDR)?);
        tracing::info!("Firmware on nRF52: {}", current);

        if current == manifest.version {
            tracing::info!("Firmware updating is not needed");
            self.session.run()?;
            return Ok(UpdateOutcome::AlreadyCurrent { version: current });
        }
        tracing::info!("Need to update firmware on nRF52");

        verify::verify_image(&fs, &manifest)?;

        let total_bytes = manifest.total_size();
        self.progress
            .initialized(total_bytes, manifest.segments.len());

        tracing::info!("Erasing flash memory");
        self.progress.started_erasing();
        if let Err(e) = Nvmc::new(&mut self.session, &mut self.scheduler).erase_all() {
            self.progress.failed_erasing();
            tracing::error!("Mass erase failed: {e}");
            return Err(UpdateError::Erase(e));
        }
        self.progress.finished_erasing();

        tracing::info!("Flash {} segments", manifest.segments.len());
        let mut buffers = TransferBuffers::default();
        let mut flashed_bytes = 0u32;
        for segment in &manifest.segments {
            tracing::info!(
                "Flash segment {:#010x} size={} from '{}'",
                segment.address,
                segment.size,
                segment.file_name
            );
            self.progress.started_segment(segment.address, segment.size);
            if let Err((address, source)) =
                self.write_segment(&fs, segment, &mut buffers, &mut flashed_bytes, total_bytes)
            {
                self.progress.failed_programming();
                tracing::error!(
                    "Failed to write {:#010x} from '{}': {source}",
                    address,
                    segment.file_name
                );
                return Err(UpdateError::Write {
                    file: segment.file_name.clone(),
                    address,
                    source,
                });
            }
        }

        // The version stamp is the last flash write: a crash before this
        // point leaves the target unmistakably blank, never stale.
        Nvmc::new(&mut self.session, &mut self.scheduler)
            .write_words(UICR_FW_VERSION_ADDR, &[manifest.version.as_word()])
            .map_err(UpdateError::Stamp)?;
        self.progress.version_stamped(manifest.version);
        self.progress.finished_programming();
        tracing::info!("Firmware version stamped: {}", manifest.version);

        tracing::info!("Run nRF52 firmware");
        if let Err(e) = self.session.run() {
            tracing::warn!("Firmware written and stamped, but the core could not be released");
            return Err(UpdateError::Protocol(e));
        }

        Ok(UpdateOutcome::Updated {
            from: current,
            to: manifest.version,
        })
    }

    /// Programs one segment in [`CHUNK_WORDS`]-word chunks, reading every
    /// chunk back and comparing. On failure returns the failing address
    /// with the cause.
    fn write_segment(
        &mut self,
        fs: &FirmwareFs,
        segment: &Segment,
        buffers: &mut TransferBuffers,
        flashed_bytes: &mut u32,
        total_bytes: u32,
    ) -> Result<(), (u32, WriteError)> {
        let file = fs
            .open(&segment.file_name)
            .map_err(|e| (segment.address, WriteError::Fs(e)))?;
        let mut reader = ChunkReader::new(file, segment);

        let mut offset = 0u32;
        loop {
            let address = segment.address + offset;
            let len = reader
                .next_chunk(&mut buffers.file)
                .map_err(|e| (address, WriteError::Source(e)))?;
            if len == 0 {
                break;
            }
            let words = len / 4;
            for (word, bytes) in buffers.write[..words]
                .iter_mut()
                .zip(buffers.file[..len].chunks_exact(4))
            {
                *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }

            tracing::debug!("Writing {:#010x}", address);
            Nvmc::new(&mut self.session, &mut self.scheduler)
                .write_words(address, &buffers.write[..words])
                .map_err(|e| (address, WriteError::Nvmc(e)))?;

            self.session
                .read_mem(address, &mut buffers.verify[..words])
                .map_err(|e| (address, WriteError::Session(e)))?;
            if buffers.verify[..words] != buffers.write[..words] {
                return Err((address, WriteError::ReadBackMismatch));
            }

            offset += len as u32;
            *flashed_bytes += len as u32;
            self.progress
                .chunk_programmed(address, len as u32, *flashed_bytes, total_bytes);
        }
        reader
            .finish()
            .map_err(|e| (segment.address + offset, WriteError::Source(e)))?;
        Ok(())
    }

    /// One hardware reset: assert NRST, hold, release.
    fn reset_pulse(&mut self) -> Result<(), UpdateError> {
        tracing::info!("Hardware reset nRF52");
        self.session.reset(true)?;
        self.scheduler.sleep(RESET_HOLD);
        self.session.reset(false)?;
        Ok(())
    }
}

/// Scratch buffers for the write path, allocated once per update attempt:
/// one chunk of file bytes, the words to program and the read-back words.
struct TransferBuffers {
    file: [u8; CHUNK_SIZE],
    write: [u32; CHUNK_WORDS],
    verify: [u32; CHUNK_WORDS],
}

impl Default for TransferBuffers {
    fn default() -> Self {
        TransferBuffers {
            file: [0; CHUNK_SIZE],
            write: [0; CHUNK_WORDS],
            verify: [0; CHUNK_WORDS],
        }
    }
}

/// Guarantees the outgoing hardware reset on every exit path of
/// [`Updater::run`], including panics unwinding through it.
struct ResetGuard<'a, P: RawDapAccess, S: Scheduler> {
    updater: &'a mut Updater<P, S>,
}

impl<P: RawDapAccess, S: Scheduler> Drop for ResetGuard<'_, P, S> {
    fn drop(&mut self) {
        if let Err(e) = self.updater.reset_pulse() {
            tracing::error!("hardware reset after the update attempt failed: {e}");
        }
    }
}
