//! Console interaction with the operator.
//!
//! Both prompts block on a line of input. They take any `BufRead`/`Write`
//! pair so the flow can be driven without a terminal.

use std::io::{BufRead, Write};

use crate::select::Image;
use crate::{Error, Result};

/// Reads one line, trimmed. End of input is an error: the prompts cannot
/// make progress without an answer.
fn read_answer<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(Error::PromptClosed);
    }
    Ok(line.trim().to_string())
}

/// Lists `images` and asks for an exact file name until one matches.
///
/// Only a case-sensitive, whole-name match is accepted. Patterns, prefixes
/// and list numbers are rejected.
pub fn choose_image<'a, R: BufRead, W: Write>(
    images: &'a [Image],
    input: &mut R,
    output: &mut W,
) -> Result<&'a Image> {
    writeln!(output, "\nAvailable update binaries in this bundle:\n")?;
    for (i, image) in images.iter().enumerate() {
        writeln!(output, "  {:2}. {}", i + 1, image.name())?;
    }

    loop {
        write!(
            output,
            "\nEnter the EXACT filename to flash (copy/paste from list): "
        )?;
        output.flush()?;

        let answer = read_answer(input)?;
        if answer.is_empty() {
            writeln!(output, "Please enter a filename.")?;
            continue;
        }

        let mut matches = images.iter().filter(|image| image.name() == answer);
        match (matches.next(), matches.next()) {
            (Some(image), None) => return Ok(image),
            (Some(_), Some(_)) => writeln!(
                output,
                "That name appears more than once in the bundle. Remove the duplicate or use --board."
            )?,
            (None, _) => writeln!(
                output,
                "No exact match. Please copy/paste the filename exactly as shown."
            )?,
        }
    }
}

/// Waits for the operator to put the device in download mode.
pub fn confirm_ready<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<()> {
    writeln!(
        output,
        ">>> ACTION REQUIRED: Put your device in BOOT/Download mode if needed."
    )?;
    writeln!(
        output,
        "For some boards (t3s3, etc), you may need to hold the BOOT (or 0) button while powering on."
    )?;
    write!(output, "Press Enter to continue when the device is ready...")?;
    output.flush()?;

    read_answer(input)?;
    Ok(())
}
