//! Pre-flight verification of the on-media firmware image.
//!
//! Every segment file is streamed in word-aligned chunks through a
//! CRC-32/IEEE digest and compared against the CRC the manifest declares.
//! This runs before anything touches the target, so a damaged bundle
//! leaves the coprocessor exactly as it was.

use std::io::Read;

use crc::{crc32, Hasher32};
use nrf52_fw_image::{Manifest, Segment};

use crate::fs::{FirmwareFs, FsError};

/// Chunk size of the streaming buffers, in bytes.
pub(crate) const CHUNK_SIZE: usize = 256;

/// The on-media image does not match its manifest.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A segment file's CRC differs from the manifest.
    #[error("segment '{file}': expected CRC {expected:#010x}, actual CRC {actual:#010x}")]
    CrcMismatch {
        /// The segment file name.
        file: String,
        /// CRC declared by the manifest.
        expected: u32,
        /// CRC computed over the file.
        actual: u32,
    },
    /// A chunk of the file is not a whole number of words.
    #[error("segment '{file}': read length {len} is not word-aligned")]
    UnalignedChunk {
        /// The segment file name.
        file: String,
        /// The offending chunk length.
        len: usize,
    },
    /// The file holds more bytes than the manifest declares.
    #[error("segment '{file}': file is larger than the declared {declared} bytes")]
    Oversized {
        /// The segment file name.
        file: String,
        /// Size the manifest declares.
        declared: u32,
    },
    /// The file ended before the declared size was reached.
    #[error("segment '{file}': file ends after {actual} of {declared} bytes")]
    Truncated {
        /// The segment file name.
        file: String,
        /// Bytes actually present.
        actual: u32,
        /// Size the manifest declares.
        declared: u32,
    },
    /// Reading the file failed.
    #[error("read error on '{file}'")]
    Read {
        /// The segment file name.
        file: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The image partition failed underneath the verifier.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Streams a segment file in [`CHUNK_SIZE`] chunks, enforcing the segment
/// size contract: every chunk is word-aligned, the stream never exceeds
/// the declared size, and [`finish`](Self::finish) requires it to have
/// reached the declared size exactly. Shared by the verify and the write
/// paths so a short file can never turn into a short write.
pub(crate) struct ChunkReader<R> {
    inner: R,
    file: String,
    declared: u32,
    transferred: u32,
}

impl<R: Read> ChunkReader<R> {
    pub(crate) fn new(inner: R, segment: &Segment) -> Self {
        ChunkReader {
            inner,
            file: segment.file_name.clone(),
            declared: segment.size,
            transferred: 0,
        }
    }

    /// Fills `buf` as far as the stream allows. Returns the chunk length,
    /// or 0 at the end of the stream.
    pub(crate) fn next_chunk(&mut self, buf: &mut [u8; CHUNK_SIZE]) -> Result<usize, VerifyError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .inner
                .read(&mut buf[filled..])
                .map_err(|source| VerifyError::Read {
                    file: self.file.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(0);
        }
        if filled % 4 != 0 {
            return Err(VerifyError::UnalignedChunk {
                file: self.file.clone(),
                len: filled,
            });
        }
        let transferred = self.transferred.saturating_add(filled as u32);
        if transferred > self.declared {
            return Err(VerifyError::Oversized {
                file: self.file.clone(),
                declared: self.declared,
            });
        }
        self.transferred = transferred;
        Ok(filled)
    }

    /// Checks that exactly the declared number of bytes was transferred.
    pub(crate) fn finish(&self) -> Result<(), VerifyError> {
        if self.transferred != self.declared {
            return Err(VerifyError::Truncated {
                file: self.file.clone(),
                actual: self.transferred,
                declared: self.declared,
            });
        }
        Ok(())
    }
}

/// Verifies every segment of `manifest` against the files on `fs`.
pub fn verify_image(fs: &FirmwareFs, manifest: &Manifest) -> Result<(), VerifyError> {
    for segment in &manifest.segments {
        verify_segment(fs, segment)?;
    }
    Ok(())
}

fn verify_segment(fs: &FirmwareFs, segment: &Segment) -> Result<(), VerifyError> {
    tracing::debug!(
        "Verifying segment {:#010x} from '{}'",
        segment.address,
        segment.file_name
    );
    let file = fs.open(&segment.file_name)?;
    let mut reader = ChunkReader::new(file, segment);
    let mut digest = crc32::Digest::new(crc32::IEEE);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let len = reader.next_chunk(&mut buf)?;
        if len == 0 {
            break;
        }
        digest.write(&buf[..len]);
    }
    reader.finish()?;

    let actual = digest.sum32();
    if actual != segment.crc {
        tracing::error!(
            "Segment {:#010x}: expected CRC {:#010x}, actual CRC {:#010x}",
            segment.address,
            segment.crc,
            actual
        );
        return Err(VerifyError::CrcMismatch {
            file: segment.file_name.clone(),
            expected: segment.crc,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrf52_fw_image::FirmwareVersion;
    use pretty_assertions::assert_eq;

    fn segment_for(name: &str, data: &[u8]) -> Segment {
        Segment {
            address: 0x1000,
            size: data.len() as u32,
            file_name: name.to_owned(),
            crc: crc32::checksum_ieee(data),
        }
    }

    fn image_with(name: &str, data: &[u8], segment: Segment) -> (tempfile::TempDir, Manifest) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), data).unwrap();
        let manifest = Manifest {
            version: FirmwareVersion::from_parts(1, 0, 0),
            segments: vec![segment],
        };
        (dir, manifest)
    }

    #[test]
    fn accepts_a_matching_segment() {
        let data: Vec<u8> = (0u16..1024).map(|i| i as u8).collect();
        let (dir, manifest) = image_with("app.bin", &data, segment_for("app.bin", &data));
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        verify_image(&fs, &manifest).unwrap();
    }

    #[test]
    fn reports_a_crc_mismatch() {
        let data = vec![0xAAu8; 512];
        let mut segment = segment_for("app.bin", &data);
        segment.crc ^= 1;
        let expected = segment.crc;
        let (dir, manifest) = image_with("app.bin", &data, segment);
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        match verify_image(&fs, &manifest) {
            Err(VerifyError::CrcMismatch {
                file,
                expected: e,
                actual,
            }) => {
                assert_eq!(file, "app.bin");
                assert_eq!(e, expected);
                assert_eq!(actual, expected ^ 1);
            }
            other => panic!("expected CrcMismatch, got {other:?}"),
        }
    }

    #[test]
    fn rejects_a_file_shorter_than_declared() {
        let data = vec![0x55u8; 256];
        let mut segment = segment_for("app.bin", &data);
        segment.size = 512;
        let (dir, manifest) = image_with("app.bin", &data, segment);
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert!(matches!(
            verify_image(&fs, &manifest),
            Err(VerifyError::Truncated {
                actual: 256,
                declared: 512,
                ..
            })
        ));
    }

    #[test]
    fn rejects_a_file_longer_than_declared() {
        let data = vec![0x55u8; 512];
        let mut segment = segment_for("app.bin", &data);
        segment.size = 256;
        let (dir, manifest) = image_with("app.bin", &data, segment);
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert!(matches!(
            verify_image(&fs, &manifest),
            Err(VerifyError::Oversized { declared: 256, .. })
        ));
    }

    #[test]
    fn rejects_a_word_torn_file() {
        let data = vec![0x55u8; 258];
        let (dir, manifest) = image_with("app.bin", &data, segment_for("app.bin", &data));
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert!(matches!(
            verify_image(&fs, &manifest),
            Err(VerifyError::UnalignedChunk { len: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_a_filesystem_error() {
        let data = vec![0u8; 4];
        let (dir, mut manifest) = image_with("app.bin", &data, segment_for("app.bin", &data));
        manifest.segments[0].file_name = "missing.bin".to_owned();
        let fs = FirmwareFs::mount(dir.path()).unwrap();
        assert!(matches!(
            verify_image(&fs, &manifest),
            Err(VerifyError::Fs(FsError::Open { .. }))
        ));
    }
}
