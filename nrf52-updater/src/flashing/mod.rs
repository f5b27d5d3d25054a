//! Flash programming of the coprocessor: verification, progress
//! reporting and the update state machine.

pub mod progress;
pub mod updater;
pub mod verify;

pub use progress::{FlashProgress, ProgressEvent};
pub use updater::{
    UpdateOutcome, Updater, DEFAULT_IMAGE_ROOT, MANIFEST_FILE, UICR_FW_VERSION_ADDR,
};
pub use verify::{verify_image, VerifyError};
