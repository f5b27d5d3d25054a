//! End-to-end update scenarios against the fake target.

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crc::crc32;
use nrf52_updater::dap::fake::{FakeNrf52, FakeOp};
use nrf52_updater::flashing::{FlashProgress, ProgressEvent, UpdateOutcome, Updater};
use nrf52_updater::image::{FirmwareVersion, ManifestError};
use nrf52_updater::scheduler::Scheduler;
use nrf52_updater::{UpdateError, UpdateStatus, WriteError};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Scheduler that completes reset holds and READY polls instantly.
struct InstantScheduler;

impl Scheduler for InstantScheduler {
    fn sleep(&mut self, _duration: Duration) {}
    fn yield_now(&mut self) {}
}

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Writes `info.txt` plus one file per `(address, data)` segment.
fn write_image(dir: &Path, version: &str, segments: &[(u32, Vec<u8>)]) {
    let mut info = format!("# v{version}\n");
    for (i, (address, data)) in segments.iter().enumerate() {
        let name = format!("segment_{}.bin", i + 1);
        std::fs::write(dir.join(&name), data).unwrap();
        info += &format!(
            "{address:#010x} {} {name} {:#010x}\n",
            data.len(),
            crc32::checksum_ieee(data)
        );
    }
    std::fs::write(dir.join("info.txt"), info).unwrap();
}

fn run_update(
    fake: FakeNrf52,
    image_root: &Path,
) -> (
    Result<UpdateOutcome, UpdateError>,
    FakeNrf52,
    Vec<ProgressEvent>,
) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let mut updater = Updater::new(fake, InstantScheduler)
        .with_progress(FlashProgress::new(move |event| {
            sink.borrow_mut().push(event)
        }));
    let result = updater.run(image_root);
    let fake = updater.into_probe();
    let events = events.borrow().clone();
    (result, fake, events)
}

fn flash_writes(fake: &FakeNrf52) -> Vec<(u32, u32)> {
    fake.ops
        .iter()
        .filter_map(|op| match *op {
            FakeOp::WriteWord { address, value } => Some((address, value)),
            _ => None,
        })
        .collect()
}

#[test]
fn update_is_skipped_when_versions_match() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "1.2.3", &[(0x0000, random_bytes(2816, 1))]);

    let mut fake = FakeNrf52::new();
    fake.set_uicr_fw_version(0x0102_0300);

    let (result, fake, events) = run_update(fake, dir.path());
    assert_eq!(
        result.unwrap(),
        UpdateOutcome::AlreadyCurrent {
            version: FirmwareVersion::from_parts(1, 2, 3)
        }
    );
    assert!(flash_writes(&fake).is_empty());
    assert!(!fake.ops.contains(&FakeOp::EraseAll));
    assert_eq!(fake.uicr_fw_version(), 0x0102_0300);
    assert_eq!(fake.nrst_pulses, 2);
    assert!(events.is_empty());
}

#[test]
fn happy_path_reflashes_and_stamps_last() {
    let dir = tempfile::tempdir().unwrap();
    let segments = [
        (0x0000_0000, random_bytes(2816, 10)),
        (0x0000_1000, random_bytes(151_016, 11)),
        (0x0002_6000, random_bytes(24448, 12)),
    ];
    write_image(dir.path(), "1.2.3", &segments);

    let mut fake = FakeNrf52::new();
    fake.set_uicr_fw_version(0x0102_0000); // v1.2.0 on the target

    let (result, fake, events) = run_update(fake, dir.path());
    assert_eq!(
        result.unwrap(),
        UpdateOutcome::Updated {
            from: FirmwareVersion::from_parts(1, 2, 0),
            to: FirmwareVersion::from_parts(1, 2, 3),
        }
    );

    // Exactly one mass erase, before any programming.
    let erase_count = fake
        .ops
        .iter()
        .filter(|op| matches!(op, FakeOp::EraseAll))
        .count();
    assert_eq!(erase_count, 1);
    let erase_at = fake
        .ops
        .iter()
        .position(|op| matches!(op, FakeOp::EraseAll))
        .unwrap();
    let first_write = fake
        .ops
        .iter()
        .position(|op| matches!(op, FakeOp::WriteWord { .. }))
        .unwrap();
    assert!(erase_at < first_write);

    // The flash holds exactly the segment files.
    for (address, data) in &segments {
        assert_eq!(fake.flash_at(*address, data.len()), &data[..]);
    }

    // Every write happened with WEN open, and WEN is read-only at rest.
    let mut wen = 0;
    for op in &fake.ops {
        match *op {
            FakeOp::NvmcConfig(value) => wen = value,
            FakeOp::WriteWord { .. } => assert_eq!(wen, 1),
            FakeOp::EraseAll => assert_eq!(wen, 2),
            _ => {}
        }
    }
    assert_eq!(fake.nvmc_config(), 0);

    // Segment words land in ascending address order, and the UICR stamp
    // is the very last flash write, followed by the core release.
    let writes = flash_writes(&fake);
    let (stamp_address, stamp_value) = *writes.last().unwrap();
    assert_eq!(stamp_address, 0x1000_1080);
    assert_eq!(stamp_value, 0x0102_0300);
    assert!(writes[..writes.len() - 1]
        .windows(2)
        .all(|w| w[0].0 < w[1].0));
    assert_eq!(fake.uicr_fw_version(), 0x0102_0300);

    let last_write_at = fake
        .ops
        .iter()
        .rposition(|op| matches!(op, FakeOp::WriteWord { .. }))
        .unwrap();
    let run_at = fake
        .ops
        .iter()
        .position(|op| matches!(op, FakeOp::Run))
        .unwrap();
    assert!(run_at > last_write_at);
    assert_eq!(fake.nrst_pulses, 2);

    // Progress: one chunk event per 256-byte chunk, monotone accumulator.
    let total_bytes: u32 = segments.iter().map(|(_, d)| d.len() as u32).sum();
    let expected_chunks: usize = segments.iter().map(|(_, d)| d.len().div_ceil(256)).sum();
    let chunks: Vec<_> = events
        .iter()
        .filter_map(|event| match *event {
            ProgressEvent::ChunkProgrammed {
                flashed_bytes,
                total_bytes,
                ..
            } => Some((flashed_bytes, total_bytes)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), expected_chunks);
    assert!(chunks.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(chunks.last().unwrap(), &(total_bytes, total_bytes));
    assert!(events.contains(&ProgressEvent::StartedErasing));
    assert!(events.contains(&ProgressEvent::FinishedErasing));
    assert!(events.contains(&ProgressEvent::VersionStamped {
        version: FirmwareVersion::from_parts(1, 2, 3)
    }));
    assert!(events.contains(&ProgressEvent::FinishedProgramming));
}

#[test]
fn crc_mismatch_aborts_before_the_erase() {
    let dir = tempfile::tempdir().unwrap();
    let segments = [
        (0x0000_0000, random_bytes(512, 20)),
        (0x0000_1000, random_bytes(1024, 21)),
    ];
    write_image(dir.path(), "2.0.0", &segments);
    // Same length, different content: the manifest CRC no longer matches.
    std::fs::write(dir.path().join("segment_2.bin"), random_bytes(1024, 99)).unwrap();

    let mut fake = FakeNrf52::new();
    fake.set_uicr_fw_version(0x0100_0000);

    let (result, fake, _) = run_update(fake, dir.path());
    let error = result.unwrap_err();
    assert_eq!(error.status(), UpdateStatus::FailVerify);
    assert!(!fake.ops.contains(&FakeOp::EraseAll));
    assert!(flash_writes(&fake).is_empty());
    assert_eq!(fake.uicr_fw_version(), 0x0100_0000);
    assert_eq!(fake.nrst_pulses, 2);
}

#[test]
fn manifest_parse_error_reports_the_line_and_leaves_the_target_alone() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("info.txt"),
        "# v1.2.3\n\
         0x00000000 2816 segment_1.bin 0x2c5a9d14\n\
         0x00001000q 151016 segment_2.bin 0x0e326e66\n",
    )
    .unwrap();

    let (result, fake, _) = run_update(FakeNrf52::new(), dir.path());
    let error = result.unwrap_err();
    assert_eq!(error.status(), UpdateStatus::FailManifest);
    match error {
        UpdateError::Manifest(ManifestError { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected a manifest error, got {other:?}"),
    }
    assert!(!fake.ops.contains(&FakeOp::EraseAll));
    assert!(flash_writes(&fake).is_empty());
    assert_eq!(fake.nrst_pulses, 2);
}

#[test]
fn wrong_idcode_fails_before_the_filesystem_is_touched() {
    // A nonexistent image root: if the updater mounted the filesystem
    // before checking the IDCODE this would surface as an I/O failure.
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not-mounted");

    let (result, fake, _) = run_update(FakeNrf52::with_idcode(0xFFFF_FFFF), &missing);
    let error = result.unwrap_err();
    assert_eq!(error.status(), UpdateStatus::FailProto);
    assert!(flash_writes(&fake).is_empty());
    assert_eq!(fake.nrst_pulses, 2);
}

#[test]
fn read_back_mismatch_fails_the_write_and_skips_the_stamp() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "1.2.3", &[(0x0000_1000, random_bytes(1024, 30))]);

    let mut fake = FakeNrf52::new();
    fake.set_uicr_fw_version(0x0102_0000);
    fake.corrupt_readback_at(0x0000_1200);

    let (result, fake, events) = run_update(fake, dir.path());
    let error = result.unwrap_err();
    assert_eq!(error.status(), UpdateStatus::FailWrite);
    match error {
        UpdateError::Write {
            file,
            address,
            source: WriteError::ReadBackMismatch,
        } => {
            assert_eq!(file, "segment_1.bin");
            assert_eq!(address, 0x1200);
        }
        other => panic!("expected a read-back mismatch, got {other:?}"),
    }

    // The erase ran, so the version stamp must not have been written.
    assert!(fake.ops.contains(&FakeOp::EraseAll));
    assert_eq!(fake.uicr_fw_version(), 0xFFFF_FFFF);
    assert!(events.contains(&ProgressEvent::FailedProgramming));
    assert_eq!(fake.nrst_pulses, 2);
}

#[test]
fn hardware_reset_runs_even_when_a_progress_handler_panics() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "1.2.3", &[(0x0000_1000, random_bytes(512, 40))]);

    let mut fake = FakeNrf52::new();
    fake.set_uicr_fw_version(0x0102_0000);

    let mut updater = Updater::new(fake, InstantScheduler)
        .with_progress(FlashProgress::new(|event| {
            if matches!(event, ProgressEvent::ChunkProgrammed { .. }) {
                panic!("handler gave up");
            }
        }));
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| updater.run(dir.path())));
    assert!(result.is_err());

    let fake = updater.into_probe();
    assert_eq!(fake.nrst_pulses, 2);
}
