use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::irc_parser::{CMD_NICK, CMD_PASS, TWITCH_CAPABILITIES};
use crate::error::{KasaiError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const OUTGOING_BUFFER: usize = 64;

#[derive(Debug)]
enum Outgoing {
    Line(String),
    Close,
}

/// The raw chat socket: a reader task forwarding received lines and a writer
/// task draining outgoing ones.
#[derive(Debug)]
pub struct IrcConnection {
    outgoing: mpsc::Sender<Outgoing>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl IrcConnection {
    /// Connects, requests capabilities, authenticates, and starts forwarding
    /// every received line to `lines_tx`.
    pub async fn open(
        addr: &str,
        token: &str,
        nickname: &str,
        lines_tx: mpsc::Sender<String>,
    ) -> Result<Self> {
        tracing::debug!(irc.addr = %addr, "Connecting to Twitch IRC");

        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(tcp_error)) => {
                tracing::error!(irc.addr = %addr, error = %tcp_error, "TCP connection failed");
                return Err(KasaiError::Io(tcp_error));
            }
            Err(_) => {
                tracing::error!(irc.addr = %addr, timeout = ?CONNECT_TIMEOUT, "TCP connection timed out");
                return Err(KasaiError::Timeout(format!(
                    "TCP connection to {addr} timed out after {CONNECT_TIMEOUT:?}"
                )));
            }
        };
        tracing::debug!(peer = ?stream.peer_addr().ok(), "TCP connected");

        let (reader, mut writer) = tokio::io::split(stream);

        let token = token.trim();
        let token = token.strip_prefix("oauth:").unwrap_or(token);
        writer
            .write_all(format!("{}\r\n", TWITCH_CAPABILITIES).as_bytes())
            .await?;
        writer
            .write_all(format!("{} oauth:{}\r\n", CMD_PASS, token).as_bytes())
            .await?;
        writer
            .write_all(format!("{} {}\r\n", CMD_NICK, nickname).as_bytes())
            .await?;
        writer.flush().await?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Outgoing>(OUTGOING_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let writer_task = tokio::spawn(async move {
            while let Some(outgoing) = outgoing_rx.recv().await {
                match outgoing {
                    Outgoing::Line(line) => {
                        tracing::trace!(size = line.len(), payload = %line.trim_end(), "Sending IRC payload");
                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            tracing::error!(error = %e, "Failed to write to IRC socket");
                            break;
                        }
                        if let Err(e) = writer.flush().await {
                            tracing::error!(error = %e, "Failed to flush IRC socket");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = writer.shutdown().await;
                        break;
                    }
                }
            }
            tracing::debug!("IRC writer task stopped");
        });

        let reader_task = tokio::spawn(async move {
            let mut buf_reader = BufReader::new(reader);
            let mut line_buffer = Vec::new();
            loop {
                line_buffer.clear();
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!("IRC reader received shutdown signal");
                        break;
                    }
                    read = buf_reader.read_until(b'\n', &mut line_buffer) => match read {
                        Ok(0) => {
                            tracing::warn!("IRC socket closed by Twitch (EOF)");
                            break;
                        }
                        Ok(size) => {
                            // Twitch relays whatever bytes users send, so decode lossily.
                            let decoded = String::from_utf8_lossy(&line_buffer);
                            let line = decoded.trim_end_matches(['\r', '\n']);
                            if line.is_empty() {
                                continue;
                            }
                            tracing::trace!(size, payload = %line, "Received IRC payload");
                            if lines_tx.send(line.to_string()).await.is_err() {
                                tracing::debug!("IRC line consumer is gone");
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Error reading from IRC socket");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            outgoing: outgoing_tx,
            shutdown_tx: Some(shutdown_tx),
            reader: reader_task,
            writer: writer_task,
        })
    }

    /// Queues a raw line. A missing `\r\n` terminator is added.
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        let mut line = line.to_string();
        if !line.ends_with("\r\n") {
            line.push_str("\r\n");
        }
        self.outgoing
            .send(Outgoing::Line(line))
            .await
            .map_err(|_| KasaiError::NotAlive("the IRC socket is closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed() || self.reader.is_finished()
    }

    /// Flushes whatever is already queued, then closes the socket and stops
    /// both tasks.
    pub async fn shutdown(mut self) {
        let _ = self.outgoing.send(Outgoing::Close).await;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.writer)
            .await
            .is_err()
        {
            tracing::warn!("IRC writer did not stop in time, aborting it");
            self.writer.abort();
        }
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.reader)
            .await
            .is_err()
        {
            self.reader.abort();
        }
    }
}
