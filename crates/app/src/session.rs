//! Peer session loops
//!
//! Both loops drive a [`PeerCoordinator`], print every frame it produces as
//! one JSON line, and forward input lines to the realm once negotiation has
//! finished. End of input disconnects; the loop returns after the offline
//! frame.

use std::io::Write;

use relay_core::{
    ChannelFrame, Dispatcher, FrameKind, NegotiationState, PeerCoordinator, RelayClient,
};
use relay_net::OfflineRelay;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;

/// Run against a live relay
pub async fn run_online<R, W>(config: &Config, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (writer, mut events) = relay_net::connect(config.relay.address.as_str()).await?;
    let mut dispatcher = Dispatcher::new(PeerCoordinator::new(config.realm_options()), writer);
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        let negotiated = dispatcher.handler().state() == NegotiationState::Negotiated;

        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => dispatcher.handle_event(event)?,
                    None => {
                        warn!("Transport stopped without closing");
                        break;
                    }
                }
            }

            line = lines.next_line(), if input_open && negotiated => {
                match line? {
                    Some(line) => send_input(dispatcher.client(), &line),
                    None => {
                        input_open = false;
                        dispatcher.client().disconnect()?;
                    }
                }
            }
        }

        if print_frames(dispatcher.handler_mut(), out)? {
            break;
        }
    }

    Ok(())
}

/// Run against the built-in offline relay
pub async fn run_offline<R, W>(config: &Config, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let coordinator = PeerCoordinator::new(config.realm_options());
    let mut relay = OfflineRelay::new(coordinator, config.offline_options()?)?;
    let mut lines = input.lines();
    let mut input_open = true;

    relay.start();

    loop {
        let negotiated = relay.handler().state() == NegotiationState::Negotiated;
        let pending = relay.has_pending();

        tokio::select! {
            delivered = relay.step(), if pending => {
                delivered?;
            }

            line = lines.next_line(), if input_open && negotiated => {
                match line? {
                    Some(line) => send_input(relay.client(), &line),
                    None => {
                        input_open = false;
                        relay.client().disconnect()?;
                    }
                }
            }

            else => {
                info!("Offline relay has nothing left to deliver");
                break;
            }
        }

        if print_frames(relay.handler_mut(), out)? {
            break;
        }
    }

    Ok(())
}

/// Forward one input line to the whole realm
fn send_input(client: &mut dyn RelayClient, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if let Err(e) = client.send_to_all(line) {
        warn!(error = %e, "Failed to send input");
    }
}

/// Write every queued frame; returns `true` once the offline frame is out
fn print_frames<W: Write>(coordinator: &mut PeerCoordinator, out: &mut W) -> Result<bool> {
    let mut offline = false;
    loop {
        let frame: ChannelFrame = match coordinator.next_frame() {
            Ok(Some(frame)) => frame,
            // Nothing can be queued before the first status change
            Ok(None) | Err(relay_core::Error::NotStarted) => break,
            Err(e) => return Err(e.into()),
        };
        debug!(kind = ?frame.kind, "Frame");
        offline |= frame.kind == FrameKind::Offline;
        writeln!(out, "{}", serde_json::to_string(&frame)?)?;
    }
    out.flush()?;
    Ok(offline)
}
