//! Shared helpers for command handlers.

use std::io::IsTerminal;

use thermopoll_api::DecodeSpec;

use crate::cli::DecodeArgs;
use crate::error::CliError;

/// Build a decode spec from `--bytes/--signed/--scale`.
pub fn decode_spec(args: DecodeArgs) -> Result<DecodeSpec, CliError> {
    Ok(DecodeSpec::new(args.bytes, args.signed, args.scale)?)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Refuses outright when stdin is not a terminal, so scripts never hang
/// on a hidden prompt.
pub fn confirm(action: &str, message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer failure into `CliError`.
pub fn prompt_err(e: dialoguer::Error) -> CliError {
    CliError::Io(std::io::Error::other(e))
}

/// Render `label: value` pairs as an aligned listing.
pub fn detail(pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    pairs
        .iter()
        .map(|(k, v)| format!("{k:<width$}  {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}
