//! TCP line transport for a relay connection
//!
//! [`connect`] spawns a connection task that owns the socket. Inbound lines
//! and lifecycle changes come back as [`TransportEvent`]s on a channel; the
//! returned [`LineWriter`] queues outbound lines for the same task.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use relay_core::{LineSink, TransportEvent};

use crate::error::{Error, Result};
use crate::line::{write_line, LineReader, MAX_LINE_LENGTH};

/// Inbound events buffered before the reader waits on the consumer
const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
enum WriterCommand {
    Line(String),
    Close,
}

/// Outbound half of a connection
#[derive(Debug, Clone)]
pub struct LineWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl LineSink for LineWriter {
    /// Rejects up front any line the writer task would refuse
    fn send_line(&mut self, line: &str) -> relay_core::Result<()> {
        if line.contains(['\n', '\r']) {
            return Err(relay_core::Error::Protocol(
                "Line contains a raw newline".into(),
            ));
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err(relay_core::Error::Protocol(format!(
                "Line too long: {} bytes",
                line.len()
            )));
        }
        self.tx
            .send(WriterCommand::Line(line.to_string()))
            .map_err(|_| relay_core::Error::NotConnected)
    }

    fn close(&mut self) {
        let _ = self.tx.send(WriterCommand::Close);
    }
}

/// Connect to a relay over TCP
pub async fn connect<A>(addr: A) -> Result<(LineWriter, mpsc::Receiver<TransportEvent>)>
where
    A: ToSocketAddrs + std::fmt::Debug,
{
    info!(addr = ?addr, "Connecting to relay");

    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;

    Ok(spawn_connection(stream))
}

/// Run the line protocol over an already-open stream
///
/// `TransportEvent::Open` is always the first event and `Closed` the last.
pub fn spawn_connection<S>(stream: S) -> (LineWriter, mpsc::Receiver<TransportEvent>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    // The channel is empty, so this cannot fail
    let _ = event_tx.try_send(TransportEvent::Open);

    tokio::spawn(connection_task(
        LineReader::new(BufReader::new(reader)),
        writer,
        event_tx,
        cmd_rx,
    ));

    (LineWriter { tx: cmd_tx }, event_rx)
}

/// Main connection task
async fn connection_task<R, W>(
    mut reader: LineReader<R>,
    mut writer: W,
    event_tx: mpsc::Sender<TransportEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<WriterCommand>,
) where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            // Incoming line from the relay
            result = reader.next_line() => {
                match result {
                    Ok(line) => {
                        if event_tx.send(TransportEvent::Line(line)).await.is_err() {
                            debug!("Event receiver dropped");
                            break;
                        }
                    }
                    Err(Error::ConnectionClosed) => {
                        debug!("Relay closed connection");
                        break;
                    }
                    Err(Error::InvalidUtf8(e)) => {
                        debug!(error = %e, "Skipping line that is not UTF-8");
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            // Outgoing line
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(WriterCommand::Line(line)) => {
                        if let Err(e) = write_line(&mut writer, &line).await {
                            warn!(error = %e, "Write error");
                            let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    Some(WriterCommand::Close) | None => {
                        debug!("Disconnect requested");
                        let _ = writer.shutdown().await;
                        break;
                    }
                }
            }
        }
    }

    let _ = event_tx.send(TransportEvent::Closed).await;
    info!("Disconnected from relay");
}
