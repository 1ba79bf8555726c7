//! Command-line interface definitions.

use std::path::PathBuf;

use clap::Parser;

use crate::flash::PORT_ENV;
use crate::select::{Channel, Platform};
use crate::update::{UpgradeConfig, DEFAULT_CACHE_DIR};

/// Download and flash Meshtastic firmware using device-update.sh (honors ESPTOOL_PORT).
#[derive(Parser, Debug)]
#[command(name = "meshtastic-upgrade", version, about)]
pub struct Cli {
    /// Target platform bundle to download (e.g., esp32s3)
    #[arg(long, value_enum, ignore_case = true)]
    pub firmware: Platform,

    /// Exact board slug (e.g., tlora-t3s3-v1). If provided, auto-select the matching image
    #[arg(long)]
    pub board: Option<String>,

    /// Serial port for flashing (e.g., /dev/ttyACM0)
    #[arg(long, env = PORT_ENV)]
    pub port: Option<String>,

    /// Run the change-mode prep step before flashing; the run stops if it fails
    #[arg(long)]
    pub change_mode: bool,

    /// Use the previous release instead of the latest in the chosen channel
    #[arg(long)]
    pub previous: bool,

    /// Use the latest alpha (prerelease) instead of stable
    #[arg(long)]
    pub alpha: bool,

    /// Use a specific release tag, e.g., v2.7.11.ee68575
    #[arg(long)]
    pub tag: Option<String>,

    /// Where to download/extract the firmware bundle
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    pub output_dir: PathBuf,

    /// Print actions without executing flashing steps
    #[arg(long)]
    pub dry_run: bool,

    /// Do not prompt before flashing (still prompts to select an image if --board is not used)
    #[arg(long)]
    pub yes: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> UpgradeConfig {
        UpgradeConfig {
            platform: self.firmware,
            board: self.board,
            port: self.port,
            channel: Channel::from_alpha_flag(self.alpha),
            previous: self.previous,
            tag: self.tag,
            output_dir: self.output_dir,
            change_mode: self.change_mode,
            dry_run: self.dry_run,
            assume_yes: self.yes,
        }
    }
}
