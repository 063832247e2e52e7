use std::time::Duration;

use sockwire_client::{Event, Session, Value};
use tracing::info;

use crate::cmd::{open_channel, parse_duration, EmitArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_event, OutputFormat};

/// Time allowed for queued packets and the close packet to leave.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

pub async fn run(args: EmitArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connection.session_config()?;
    let connect_timeout = args.connection.connect_timeout()?;
    let ack_timeout = parse_duration(&args.ack_timeout)?;
    let items = resolve_items(&args)?;

    let session =
        Session::native(&args.url, config).map_err(|err| client_error("session setup failed", err))?;
    let channel = open_channel(&session, &args.path, connect_timeout).await?;
    info!(path = %channel.path(), event = %args.event, "connected, emitting");

    let result = if args.ack {
        match channel
            .emit_with_ack(&args.event, items)
            .response(ack_timeout)
            .await
        {
            Ok(reply) => {
                print_event(&Event::new("ack", reply), channel.path(), format);
                Ok(SUCCESS)
            }
            Err(err) => Err(client_error("acknowledgement failed", err)),
        }
    } else {
        channel
            .emit(&args.event, items)
            .map(|()| SUCCESS)
            .map_err(|err| client_error("emit failed", err))
    };

    let _ = session.disconnect();
    tokio::time::sleep(FLUSH_GRACE).await;
    result
}

fn resolve_items(args: &EmitArgs) -> CliResult<Vec<Value>> {
    if let Some(json) = &args.json {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(match parsed {
            serde_json::Value::Array(items) => items.into_iter().map(Value::from).collect(),
            other => vec![Value::from(other)],
        });
    }
    if let Some(data) = &args.data {
        return Ok(vec![Value::from(data.as_str())]);
    }
    Ok(Vec::new())
}
