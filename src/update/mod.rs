use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::bundle::BundleCache;
use crate::flash::{
    find_flash_tool, CommandExecutor, FlashCommand, FlashOrchestrator, ProcessExecutor,
};
use crate::github::ReleaseProvider;
use crate::prompt::{choose_image, confirm_ready};
use crate::select::{find_release, pick_asset, resolve_image, Channel, Platform, Resolution};
use crate::{Error, Result};

use fetching::{GithubReleases, FIRMWARE_REPO};

mod fetching;

pub const DEFAULT_CACHE_DIR: &str = "./.meshtastic_firmware_cache";

/// Everything one upgrade run needs, already resolved from flags and
/// environment.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    pub platform: Platform,
    pub board: Option<String>,
    pub port: Option<String>,
    pub channel: Channel,
    pub previous: bool,
    pub tag: Option<String>,
    pub output_dir: PathBuf,
    pub change_mode: bool,
    pub dry_run: bool,
    pub assume_yes: bool,
}

/// Checks the local setup, then runs the upgrade against GitHub and the real
/// console.
pub fn run_upgrade(config: &UpgradeConfig) -> Result<()> {
    let port = config
        .port
        .as_deref()
        .filter(|port| !port.is_empty())
        .ok_or(Error::MissingPort)?;

    let tool = find_flash_tool().ok_or(Error::MissingFlashTool)?;
    log::debug!("Found flashing tool at {}", tool.display());

    let provider = GithubReleases::new(FIRMWARE_REPO)?;
    let stdin = io::stdin();
    let stdout = io::stdout();

    upgrade(
        config,
        port,
        &provider,
        ProcessExecutor,
        &mut stdin.lock(),
        &mut stdout.lock(),
    )
}

/// Release → bundle → image → flash, with every collaborator passed in.
pub fn upgrade<P, E, R, W>(
    config: &UpgradeConfig,
    port: &str,
    provider: &P,
    executor: E,
    input: &mut R,
    output: &mut W,
) -> Result<()>
where
    P: ReleaseProvider,
    E: CommandExecutor,
    R: BufRead,
    W: Write,
{
    let release = find_release(
        provider,
        config.channel,
        config.previous,
        config.tag.as_deref(),
    )?;
    let asset = pick_asset(&release, config.platform)?;

    log::info!(
        "Selected release: {} [{}] (previous={})",
        release.tag_name,
        release.channel_label(),
        config.previous
    );
    log::info!("Asset: {} ({} bytes)", asset.name, asset.size);

    let cache = BundleCache::new(&config.output_dir)?;
    log::debug!("Download to: {}", cache.archive_path(&asset.name).display());

    let bundle = cache.fetch(asset, provider)?;
    log::debug!(
        "Bundle at {} holds {} image(s)",
        bundle.dir.display(),
        bundle.images.len()
    );

    let image = match resolve_image(&bundle.images, config.board.as_deref(), &release.tag_name)? {
        Resolution::Resolved(image) => image,
        Resolution::Ambiguous(ambiguity) => {
            if ambiguity.board.is_some() {
                log::warn!("{ambiguity}");
            }
            choose_image(&bundle.images, input, output)?
        }
    };

    writeln!(
        output,
        "\nReady to flash Meshtastic {} [{}] for platform {}.",
        release.tag_name,
        release.channel_label(),
        config.platform
    )?;
    writeln!(output, "- Bundle: {}", asset.name)?;
    writeln!(output, "- Script: {}", bundle.script.display())?;
    writeln!(output, "- Image : {}", image.name())?;
    writeln!(output, "- Port  : {port}\n")?;

    if !config.assume_yes {
        confirm_ready(input, output)?;
    }

    let preparer = config
        .change_mode
        .then(|| FlashCommand::change_mode(&bundle.script, image.path(), port));
    let flasher = FlashCommand::flash(&bundle.script, image.path(), port);

    let mut orchestrator = FlashOrchestrator::new(executor);
    let outcome = orchestrator.execute(preparer.as_ref(), &flasher, config.dry_run, output)?;
    log::debug!("Flash run ended in state {:?}", orchestrator.state());
    outcome.into_result()?;

    writeln!(output, "✅ Flash completed successfully.")?;
    Ok(())
}
