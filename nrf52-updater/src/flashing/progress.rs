//! Progress reporting for the flashing procedure.

use nrf52_fw_image::FirmwareVersion;

/// A structure to manage the flashing procedure progress reporting.
///
/// Stores a handler closure which is called on every event during the
/// update: erase start/finish, every programmed chunk, the final version
/// stamp. A handler cannot fail; whatever it does with the event is its
/// own business.
///
/// ```
/// use nrf52_updater::flashing::FlashProgress;
///
/// // Print events
/// let progress = FlashProgress::new(|event| println!("Event: {:?}", event));
/// ```
pub struct FlashProgress {
    handler: Box<dyn Fn(ProgressEvent)>,
}

impl FlashProgress {
    /// Create a new `FlashProgress` structure with a given `handler` to be
    /// called on events.
    pub fn new(handler: impl Fn(ProgressEvent) + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// A progress reporter that discards all events.
    pub fn empty() -> Self {
        Self::new(|_| {})
    }

    /// Emit a flashing progress event.
    fn emit(&self, event: ProgressEvent) {
        (self.handler)(event);
    }

    /// Signal that the image was verified and flashing is about to start.
    pub(crate) fn initialized(&self, total_bytes: u32, segments: usize) {
        self.emit(ProgressEvent::Initialized {
            total_bytes,
            segments,
        });
    }

    /// Signal that the mass erase started.
    pub(crate) fn started_erasing(&self) {
        self.emit(ProgressEvent::StartedErasing);
    }

    /// Signal that the mass erase completed.
    pub(crate) fn finished_erasing(&self) {
        self.emit(ProgressEvent::FinishedErasing);
    }

    /// Signal that the mass erase failed.
    pub(crate) fn failed_erasing(&self) {
        self.emit(ProgressEvent::FailedErasing);
    }

    /// Signal that programming of one segment started.
    pub(crate) fn started_segment(&self, address: u32, size: u32) {
        self.emit(ProgressEvent::StartedSegment { address, size });
    }

    /// Signal that one chunk was programmed and verified.
    pub(crate) fn chunk_programmed(
        &self,
        address: u32,
        size: u32,
        flashed_bytes: u32,
        total_bytes: u32,
    ) {
        self.emit(ProgressEvent::ChunkProgrammed {
            address,
            size,
            flashed_bytes,
            total_bytes,
        });
    }

    /// Signal that the firmware version was stamped into the UICR.
    pub(crate) fn version_stamped(&self, version: FirmwareVersion) {
        self.emit(ProgressEvent::VersionStamped { version });
    }

    /// Signal that the whole image was programmed successfully.
    pub(crate) fn finished_programming(&self) {
        self.emit(ProgressEvent::FinishedProgramming);
    }

    /// Signal that programming failed.
    pub(crate) fn failed_programming(&self) {
        self.emit(ProgressEvent::FailedProgramming);
    }
}

/// Possible events during the flashing process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The image passed verification; programming is about to begin.
    Initialized {
        /// Bytes that will be written across all segments.
        total_bytes: u32,
        /// Number of segments in the manifest.
        segments: usize,
    },
    /// The mass erase has started.
    StartedErasing,
    /// The mass erase finished successfully.
    FinishedErasing,
    /// The mass erase failed.
    FailedErasing,
    /// Programming of one segment has started.
    StartedSegment {
        /// Target address of the segment.
        address: u32,
        /// Size of the segment in bytes.
        size: u32,
    },
    /// A chunk has been programmed and read back successfully.
    ChunkProgrammed {
        /// Target address of the chunk.
        address: u32,
        /// Chunk size in bytes.
        size: u32,
        /// Bytes flashed so far, across segments.
        flashed_bytes: u32,
        /// Bytes the whole image needs.
        total_bytes: u32,
    },
    /// The firmware version has been written to the UICR.
    VersionStamped {
        /// The stamped version.
        version: FirmwareVersion,
    },
    /// The whole image has been programmed successfully.
    FinishedProgramming,
    /// Programming failed.
    FailedProgramming,
}
