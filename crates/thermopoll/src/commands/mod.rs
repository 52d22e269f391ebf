//! Command dispatch: bridges CLI args -> device client -> output formatting.

pub mod aggregates;
pub mod config_cmd;
pub mod info;
pub mod read;
pub mod util;
pub mod watch;
pub mod write;

use thermopoll_api::DeviceClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &DeviceClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Info => info::handle(client, global).await,
        Command::Read(args) => read::handle(client, args, global).await,
        Command::Write(args) => write::handle(client, args, global).await,
        Command::Dashboard(args) => aggregates::dashboard(client, args, global).await,
        Command::Profile(args) => aggregates::profile(client, args, global).await,
        Command::Reset => write::reset(client, global).await,
        // Config, Completions and Watch are handled before dispatch
        Command::Config(_) | Command::Completions(_) | Command::Watch(_) => unreachable!(),
    }
}
