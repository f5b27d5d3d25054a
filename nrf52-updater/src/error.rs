//! The overarching error and exit status of an update attempt.

use nrf52_fw_image::ManifestError;

use crate::dap::SessionError;
use crate::flashing::verify::VerifyError;
use crate::fs::FsError;
use crate::nvmc::NvmcError;

/// Final status of one update attempt, as surfaced to the caller.
///
/// [`FailWrite`](UpdateStatus::FailWrite) deserves special handling: it
/// means mass-erase had already run, so the coprocessor holds no valid
/// firmware until it is re-flashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The target runs the bundled firmware (updated now, or already
    /// current).
    Ok,
    /// The bundled image failed CRC verification; the target is untouched.
    FailVerify,
    /// A failure after mass-erase began; the target is in an
    /// indeterminate state.
    FailWrite,
    /// The SWD/DAP conversation with the target failed.
    FailProto,
    /// A filesystem or SPI/GPIO error.
    FailIo,
    /// The manifest was rejected.
    FailManifest,
}

/// An update attempt failed.
///
/// Every variant maps onto one [`UpdateStatus`] via
/// [`status`](UpdateError::status); the source chain keeps the precise
/// cause.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The manifest was rejected.
    #[error("firmware manifest rejected")]
    Manifest(#[from] ManifestError),
    /// The on-media image does not match the manifest. Nothing was
    /// written to the target.
    #[error("firmware image verification failed")]
    Verify(#[from] VerifyError),
    /// The mass erase failed; the target is in an indeterminate state.
    #[error("mass erase failed")]
    Erase(#[source] NvmcError),
    /// Programming a segment failed after the erase; the target has no
    /// valid firmware.
    #[error("failed to program '{file}' at {address:#010x}")]
    Write {
        /// The segment file being programmed.
        file: String,
        /// Address of the failed chunk.
        address: u32,
        /// What went wrong.
        #[source]
        source: WriteError,
    },
    /// Writing the firmware-version stamp failed.
    #[error("failed to stamp the firmware version")]
    Stamp(#[source] NvmcError),
    /// The debug session failed outside the write path.
    #[error("debug session failed")]
    Protocol(#[from] SessionError),
    /// The image partition failed outside the write path.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Cause of a segment-programming failure.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The read-back of a programmed chunk differs from the source data.
    #[error("read-back differs from the written data")]
    ReadBackMismatch,
    /// The debug session failed mid-write.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The NVMC sequencer failed mid-write.
    #[error(transparent)]
    Nvmc(#[from] NvmcError),
    /// The segment file misbehaved mid-write.
    #[error(transparent)]
    Source(#[from] VerifyError),
    /// The segment file could not be opened.
    #[error(transparent)]
    Fs(#[from] FsError),
}

impl UpdateError {
    /// Collapses the error into the caller-facing exit status.
    pub fn status(&self) -> UpdateStatus {
        match self {
            UpdateError::Manifest(_) => UpdateStatus::FailManifest,
            UpdateError::Verify(VerifyError::Fs(_) | VerifyError::Read { .. }) => {
                UpdateStatus::FailIo
            }
            UpdateError::Verify(_) => UpdateStatus::FailVerify,
            UpdateError::Erase(_) | UpdateError::Write { .. } | UpdateError::Stamp(_) => {
                UpdateStatus::FailWrite
            }
            UpdateError::Protocol(SessionError::Probe(_)) => UpdateStatus::FailIo,
            UpdateError::Protocol(_) => UpdateStatus::FailProto,
            UpdateError::Fs(_) => UpdateStatus::FailIo,
        }
    }
}
