//! meshtastic-upgrade - fetch a Meshtastic firmware bundle and flash it
//!
//! Usage:
//!   meshtastic-upgrade --firmware esp32s3 --board tlora-t3s3-v1 --port /dev/ttyACM0
//!   meshtastic-upgrade --firmware esp32s3 --alpha --change-mode
//!   meshtastic-upgrade --firmware esp32s3 --dry-run --verbose

mod bundle;
mod cli;
mod error;
mod flash;
mod github;
mod prompt;
mod select;
mod update;

use clap::Parser;

use error::Category;
pub use error::{Error, Result};

const LOG_FILTER: &str = "info";
const VERBOSE_LOG_FILTER: &str = "info,meshtastic_upgrade=debug";

fn main() {
    let cli = cli::Cli::parse();

    let filter = if cli.verbose {
        VERBOSE_LOG_FILTER
    } else {
        LOG_FILTER
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(err) = update::run_upgrade(&cli.into_config()) {
        match err.category() {
            Category::Execution => log::error!("❌ {err}. See the output above."),
            _ => log::error!("{err}"),
        }
        for line in err.hint() {
            eprintln!("  {line}");
        }
        std::process::exit(err.exit_code());
    }
}
