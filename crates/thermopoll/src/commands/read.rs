//! `thermopoll read telemetry|property`

use serde::Serialize;

use thermopoll_api::{DeviceClient, PropertyPath, Resource};

use crate::cli::{GlobalOpts, ReadArgs, ReadCommand};
use crate::commands::util::{decode_spec, detail};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ReadingView {
    device: String,
    resource: String,
    value: f64,
    raw: Vec<u8>,
}

pub async fn handle(
    client: &DeviceClient,
    args: ReadArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (resource, decode) = match args.command {
        ReadCommand::Telemetry { id, decode } => (Resource::Telemetry(id), decode),
        ReadCommand::Property { path, decode } => {
            let path: PropertyPath = path.parse()?;
            (Resource::Property(path), decode)
        }
    };
    let spec = decode_spec(decode)?;

    let reading = client.read(resource, spec).await?;
    let view = ReadingView {
        device: client.device_id().to_string(),
        resource: resource.to_string(),
        value: reading.value,
        raw: reading.raw,
    };

    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            detail(&[
                ("Device", v.device.clone()),
                ("Resource", v.resource.clone()),
                ("Value", output::format_number(v.value)),
                ("Raw", output::hex_bytes(&v.raw)),
            ])
        },
        |v| output::format_number(v.value),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
