//! Error types for the upgrade tool.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::flash::Step;
use crate::select::{Channel, Platform};

/// Broad failure classes, used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Missing serial port or flashing tool. Fixed by the operator.
    Configuration,
    /// No release, asset, image or script could be selected.
    Resolution,
    /// More than one (or no) image fits and nobody picked one.
    Ambiguity,
    /// The prepare or flash step failed.
    Execution,
    /// Network, filesystem or archive failure.
    Transport,
}

/// The main error type for upgrade operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ESPTOOL_PORT is not set. Use --port or set the env var.")]
    MissingPort,

    #[error("'esptool.py' (or 'esptool') was not found in your PATH.")]
    MissingFlashTool,

    #[error("release {tag} not found on meshtastic/firmware")]
    NotFound { tag: String },

    #[error("no suitable {channel} releases found on meshtastic/firmware")]
    NoCandidates { channel: Channel },

    #[error("requested release (previous) not found: only {available} {channel} release(s) available")]
    InsufficientHistory { channel: Channel, available: usize },

    #[error("no firmware bundle found for platform '{platform}' in release {tag}")]
    NoAssetForPlatform { platform: Platform, tag: String },

    #[error("no '*-update.bin' images were found inside the firmware bundle")]
    NoImagesFound,

    #[error("device-update.sh not found in extracted firmware bundle {}", dir.display())]
    NoFlashScript { dir: PathBuf },

    #[error(transparent)]
    Ambiguous(#[from] AmbiguityError),

    #[error("input closed before an answer was given")]
    PromptClosed,

    #[error("{step} step failed with exit code {code}")]
    StepFailed { step: Step, code: i32 },

    #[error("failed to run {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GitHub API request failed: {status} ({url})")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("could not store download: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Error::MissingPort | Error::MissingFlashTool => Category::Configuration,
            Error::NotFound { .. }
            | Error::NoCandidates { .. }
            | Error::InsufficientHistory { .. }
            | Error::NoAssetForPlatform { .. }
            | Error::NoImagesFound
            | Error::NoFlashScript { .. }
            | Error::Pattern(_) => Category::Resolution,
            Error::Ambiguous(_) | Error::PromptClosed => Category::Ambiguity,
            Error::StepFailed { .. } | Error::Spawn { .. } => Category::Execution,
            Error::HttpStatus { .. }
            | Error::Fetch(_)
            | Error::Io(_)
            | Error::Zip(_)
            | Error::Persist(_) => Category::Transport,
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingPort => 2,
            Error::MissingFlashTool => 3,
            Error::StepFailed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Remediation lines shown below the error message.
    pub fn hint(&self) -> &'static [&'static str] {
        match self {
            Error::MissingPort => &["e.g., --port /dev/ttyACM0  or  export ESPTOOL_PORT=/dev/ttyACM0"],
            Error::MissingFlashTool => &[
                "Install with pipx (recommended):",
                "  pipx install esptool",
                "Or with pip (user):",
                "  python3 -m pip install --user esptool",
            ],
            _ => &[],
        }
    }
}

/// Image resolution could not settle on one image without help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityError {
    /// Board hint that was tried, if any.
    pub board: Option<String>,
    /// Number of images that loosely matched the board.
    pub candidates: usize,
}

impl AmbiguityError {
    pub fn no_board() -> Self {
        Self {
            board: None,
            candidates: 0,
        }
    }
}

impl fmt::Display for AmbiguityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.board, self.candidates) {
            (None, _) => write!(f, "no board given, image must be chosen by hand"),
            (Some(board), 0) => {
                write!(f, "could not automatically find image for board '{board}'")
            }
            (Some(board), n) => write!(
                f,
                "{n} images match board '{board}' and none carries the release version"
            ),
        }
    }
}

impl std::error::Error for AmbiguityError {}

/// Result type alias for upgrade operations.
pub type Result<T> = std::result::Result<T, Error>;
