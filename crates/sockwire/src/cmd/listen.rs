use sockwire_client::{client_event, ClientStatus, Event, Session};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cmd::{open_channel, ListenArgs};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connection.session_config()?;
    let connect_timeout = args.connection.connect_timeout()?;

    let session =
        Session::native(&args.url, config).map_err(|err| client_error("session setup failed", err))?;

    // Subscribe before connecting so the first events are not missed.
    let channel = session.channel(&args.path);
    let (tx, mut events) = mpsc::unbounded_channel::<Event>();
    channel.on_any(move |event| {
        let _ = tx.send(event.clone());
    });
    let channel = open_channel(&session, &args.path, connect_timeout).await?;
    info!(path = %channel.path(), "listening");

    let mut status = session.status_changes();
    let mut printed = 0usize;
    let code = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    return Err(CliError::new(INTERNAL, format!("signal handler setup failed: {err}")));
                }
                info!("interrupted");
                break SUCCESS;
            }
            changed = status.wait_for(|s| *s == ClientStatus::Disconnected) => {
                if changed.is_err() {
                    break INTERNAL;
                }
                warn!("session disconnected");
                break TRANSPORT_ERROR;
            }
            Some(event) = events.recv() => {
                if !wanted(&args, &event) {
                    continue;
                }
                print_event(&event, channel.path(), format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break SUCCESS;
                }
            }
        }
    };

    let _ = session.disconnect();
    Ok(code)
}

fn wanted(args: &ListenArgs, event: &Event) -> bool {
    match &args.events {
        Some(names) => names.iter().any(|name| name == &event.name),
        // Lifecycle chatter is only printed when asked for by name.
        None => !matches!(
            event.name.as_str(),
            client_event::STATUS_CHANGE | client_event::PING | client_event::PONG
        ),
    }
}
