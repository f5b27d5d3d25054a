//! Command-line front end for the coprocessor firmware updater.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use nrf52_updater::dap::swd::SwdInterface;
use nrf52_updater::flashing::{FlashProgress, ProgressEvent, Updater, DEFAULT_IMAGE_ROOT};
use nrf52_updater::probe::spidev::SpidevSwdBus;
use nrf52_updater::scheduler::ThreadScheduler;
use nrf52_updater::{UpdateOutcome, UpdateStatus};

#[derive(Parser)]
#[command(
    name = "nrf52-updater",
    about = "Update the nRF52 coprocessor firmware over SWD",
    version
)]
struct Cli {
    /// Root of the mounted firmware image partition.
    #[arg(long, default_value = DEFAULT_IMAGE_ROOT)]
    image: PathBuf,

    /// spidev device wired to the coprocessor's SWD pins.
    #[arg(long, default_value = "/dev/spidev0.0")]
    spi: PathBuf,

    /// GPIO number of the coprocessor's nRST line.
    #[arg(long, default_value_t = 17)]
    nrst_gpio: u64,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let bus = match SpidevSwdBus::open(&cli.spi, cli.nrst_gpio) {
        Ok(bus) => bus,
        Err(e) => {
            tracing::error!("cannot open the SWD bus: {:#}", anyhow::Error::new(e));
            return ExitCode::from(exit_code(UpdateStatus::FailIo));
        }
    };

    let progress = FlashProgress::new(|event| match event {
        ProgressEvent::StartedErasing => tracing::info!("erasing"),
        ProgressEvent::ChunkProgrammed {
            flashed_bytes,
            total_bytes,
            ..
        } => tracing::info!("flashed {flashed_bytes}/{total_bytes} bytes"),
        _ => {}
    });

    let mut updater =
        Updater::new(SwdInterface::new(bus), ThreadScheduler).with_progress(progress);
    match updater.run(&cli.image) {
        Ok(UpdateOutcome::AlreadyCurrent { version }) => {
            tracing::info!("coprocessor already runs {version}");
            ExitCode::SUCCESS
        }
        Ok(UpdateOutcome::Updated { from, to }) => {
            tracing::info!("coprocessor updated from {from} to {to}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let status = e.status();
            tracing::error!("update failed ({status:?}): {:#}", anyhow::Error::new(e));
            ExitCode::from(exit_code(status))
        }
    }
}

/// Process exit code for each update status. `FailWrite` is distinct so
/// supervisors can tell a bricked coprocessor from a transient failure.
fn exit_code(status: UpdateStatus) -> u8 {
    match status {
        UpdateStatus::Ok => 0,
        UpdateStatus::FailVerify => 2,
        UpdateStatus::FailWrite => 3,
        UpdateStatus::FailProto => 4,
        UpdateStatus::FailIo => 5,
        UpdateStatus::FailManifest => 6,
    }
}
