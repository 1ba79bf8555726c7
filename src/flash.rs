//! Running the bundle's flashing script.
//!
//! A run is at most two invocations of `device-update.sh`: an optional
//! change-mode step, then the flash itself. A failed change-mode step ends
//! the run and the flash step is never attempted.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{Error, Result};

/// Environment variable the flashing script reads the serial port from.
pub const PORT_ENV: &str = "ESPTOOL_PORT";

/// Executables that satisfy the flashing script's esptool dependency.
const FLASH_TOOL_NAMES: [&str; 2] = ["esptool.py", "esptool"];

/// Looks for an esptool executable on `PATH`.
pub fn find_flash_tool() -> Option<PathBuf> {
    find_flash_tool_in(&env::var_os("PATH")?)
}

fn find_flash_tool_in(search_path: &OsStr) -> Option<PathBuf> {
    env::split_paths(search_path)
        .flat_map(|dir| FLASH_TOOL_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// One invocation of the flashing script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Value pinned into [`PORT_ENV`] for this invocation only.
    pub port: String,
}

impl FlashCommand {
    /// `device-update.sh -f <image> --change-mode`
    pub fn change_mode(script: &Path, image: &Path, port: &str) -> Self {
        let mut command = Self::flash(script, image, port);
        command.args.push("--change-mode".into());
        command
    }

    /// `device-update.sh -f <image>`
    pub fn flash(script: &Path, image: &Path, port: &str) -> Self {
        Self {
            program: script.to_path_buf(),
            args: vec!["-f".into(), image.as_os_str().to_owned()],
            port: port.to_string(),
        }
    }
}

impl fmt::Display for FlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs a [`FlashCommand`] to completion and reports its exit status.
pub trait CommandExecutor {
    fn run(&mut self, command: &FlashCommand) -> Result<i32>;
}

/// Spawns the command as a child process and waits for it.
pub struct ProcessExecutor;

impl CommandExecutor for ProcessExecutor {
    fn run(&mut self, command: &FlashCommand) -> Result<i32> {
        let status = Command::new(&command.program)
            .args(&command.args)
            .env(PORT_ENV, &command.port)
            .status()
            .map_err(|source| Error::Spawn {
                program: command.program.clone(),
                source,
            })?;

        // Killed by a signal: no code, still a failure.
        Ok(status.code().unwrap_or(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Flash,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Prepare => write!(f, "change-mode"),
            Step::Flash => write!(f, "flash"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Idle,
    Preparing,
    Flashing,
    Success,
    Failed,
}

/// How a run ended and which step decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOutcome {
    pub state: FlashState,
    pub step: Step,
    pub code: i32,
}

impl FlashOutcome {
    pub fn is_success(&self) -> bool {
        self.state == FlashState::Success
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::StepFailed {
                step: self.step,
                code: self.code,
            })
        }
    }
}

pub struct FlashOrchestrator<E> {
    executor: E,
    state: FlashState,
}

impl<E: CommandExecutor> FlashOrchestrator<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            state: FlashState::Idle,
        }
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Runs the optional prepare step and then the flash step, announcing
    /// each on `output`.
    ///
    /// In dry-run mode nothing is executed and every step counts as exit
    /// status 0.
    pub fn execute<W: Write>(
        &mut self,
        preparer: Option<&FlashCommand>,
        flasher: &FlashCommand,
        dry_run: bool,
        output: &mut W,
    ) -> Result<FlashOutcome> {
        if let Some(preparer) = preparer {
            self.state = FlashState::Preparing;
            writeln!(output, "Step 1/2: Preparing flash (change mode)...")?;
            output.flush()?;

            let code = self.invoke(preparer, dry_run)?;
            if code != 0 {
                return Ok(self.finish(Step::Prepare, code));
            }
        } else {
            log::debug!("Skipping change-mode step (not requested).");
        }

        self.state = FlashState::Flashing;
        writeln!(output, "Step 2/2: Flashing firmware...")?;
        output.flush()?;

        let code = self.invoke(flasher, dry_run)?;
        Ok(self.finish(Step::Flash, code))
    }

    fn invoke(&mut self, command: &FlashCommand, dry_run: bool) -> Result<i32> {
        if dry_run {
            log::info!("+ {command}");
            return Ok(0);
        }

        log::debug!("+ {command}");
        match self.executor.run(command) {
            Ok(code) => Ok(code),
            Err(err) => {
                self.state = FlashState::Failed;
                Err(err)
            }
        }
    }

    fn finish(&mut self, step: Step, code: i32) -> FlashOutcome {
        self.state = if code == 0 {
            FlashState::Success
        } else {
            FlashState::Failed
        };

        FlashOutcome {
            state: self.state,
            step,
            code,
        }
    }
}
