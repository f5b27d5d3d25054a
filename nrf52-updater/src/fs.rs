//! Read-only view of the firmware image partition.
//!
//! The partition is exposed to the updater as a mounted directory; all
//! access goes through a [`FirmwareFs`] handle so every open pairs with a
//! close and nothing outside the partition root is reachable through a
//! manifest file name.

use std::fs::File;
use std::io;
use std::path::PathBuf;

/// A filesystem error while accessing the image partition.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The partition could not be mounted.
    #[error("failed to mount image partition at '{path}'")]
    Mount {
        /// The requested mount root.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A manifest file name is not a plain name inside the partition.
    #[error("invalid image file name '{name}'")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// A file could not be opened or read.
    #[error("can't open '{name}'")]
    Open {
        /// The file name, relative to the partition root.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Mounted read-only image partition.
///
/// The handle is borrowed by the update attempt and released when it goes
/// out of scope, on every exit path.
#[derive(Debug)]
pub struct FirmwareFs {
    root: PathBuf,
}

impl FirmwareFs {
    /// Mounts the partition rooted at `root`.
    pub fn mount(root: impl Into<PathBuf>) -> Result<Self, FsError> {
        let root = root.into();
        let metadata = std::fs::metadata(&root).map_err(|source| FsError::Mount {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(FsError::Mount {
                path: root,
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        tracing::debug!("image partition mounted at '{}'", root.display());
        Ok(FirmwareFs { root })
    }

    /// Opens a file on the partition by its manifest name.
    pub fn open(&self, name: &str) -> Result<File, FsError> {
        self.validate(name)?;
        File::open(self.root.join(name)).map_err(|source| FsError::Open {
            name: name.to_owned(),
            source,
        })
    }

    /// Reads a whole text file from the partition.
    pub fn read_to_string(&self, name: &str) -> Result<String, FsError> {
        self.validate(name)?;
        std::fs::read_to_string(self.root.join(name)).map_err(|source| FsError::Open {
            name: name.to_owned(),
            source,
        })
    }

    /// Manifest names are plain file names: no separators, no parent
    /// references.
    fn validate(&self, name: &str) -> Result<(), FsError> {
        if name.is_empty() || name == ".." || name.contains(['/', '\\']) {
            return Err(FsError::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mounts_a_directory_and_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("info.txt"), "# v1.0.0\n").unwrap();

        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert_eq!(fs.read_to_string("info.txt").unwrap(), "# v1.0.0\n");
        assert!(fs.open("info.txt").is_ok());
    }

    #[test]
    fn mount_fails_for_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FirmwareFs::mount(&missing),
            Err(FsError::Mount { .. })
        ));
    }

    #[test]
    fn rejects_names_that_escape_the_partition() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        for name in ["", "..", "a/b", "a\\b", "../secret"] {
            assert!(
                matches!(fs.open(name), Err(FsError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn open_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert!(matches!(fs.open("absent.bin"), Err(FsError::Open { .. })));
    }
}
