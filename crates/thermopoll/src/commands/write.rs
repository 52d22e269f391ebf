//! `thermopoll write property` and `thermopoll reset`

use thermopoll_api::{DeviceClient, PropertyPath};

use crate::cli::{GlobalOpts, WriteArgs, WriteCommand};
use crate::commands::util::{self, decode_spec};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    client: &DeviceClient,
    args: WriteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        WriteCommand::Property {
            path,
            value,
            decode,
        } => {
            let path: PropertyPath = path.parse()?;
            let spec = decode_spec(decode)?;
            client.write_property(path, value, spec).await?;
            if !global.quiet {
                eprintln!(
                    "Wrote {} to property {path} on {}",
                    output::format_number(value),
                    client.device_id()
                );
            }
            Ok(())
        }
    }
}

pub async fn reset(client: &DeviceClient, global: &GlobalOpts) -> Result<(), CliError> {
    let prompt = format!("Reset device '{}'?", client.device_id());
    if !util::confirm("reset", &prompt, global.yes)? {
        return Err(CliError::Cancelled);
    }
    client.reset_device().await?;
    if !global.quiet {
        eprintln!("Reset sent to {}", client.device_id());
    }
    Ok(())
}
