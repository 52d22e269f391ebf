//! `thermopoll info`

use thermopoll_api::DeviceClient;

use crate::cli::GlobalOpts;
use crate::commands::util::detail;
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &DeviceClient, global: &GlobalOpts) -> Result<(), CliError> {
    let info = client.device_info().await?;
    let out = output::render_single(
        &global.output,
        &info,
        |i| {
            detail(&[
                ("Device", client.device_id().to_string()),
                ("URL", client.endpoint().base_url().to_string()),
                ("Serial", i.serial.clone()),
                ("Model", i.model.clone().unwrap_or_else(|| "-".into())),
                ("Firmware", i.firmware.clone().unwrap_or_else(|| "-".into())),
            ])
        },
        |i| i.serial.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
