//! SMTP receive side.
//!
//! One task per connection; the session machine in [`session`] holds the
//! protocol state while this module owns the sockets, the timeouts and the
//! DATA framing (dot-unstuffing, size cap). Store operations only happen
//! once a payload is fully buffered, so no lock is ever held across I/O.

pub mod proto;
pub mod sasl;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::config::SmtpConfig;
use crate::smtp::proto::{parse_command, Reply};
use crate::smtp::session::{Action, Session};
use crate::storage::Store;

pub struct SmtpServer {
    bind_addr: SocketAddr,
    hostname: String,
    read_timeout: Duration,
    write_timeout: Duration,
    max_message_bytes: usize,
    max_recipients: usize,
    store: Arc<Store>,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            bind_addr: config.bind_addr,
            hostname: config.hostname,
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            max_message_bytes: config.max_message_bytes,
            max_recipients: config.max_recipients,
            store,
        })
    }

    pub async fn run(self: Arc<Self>, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr).await?;
        tracing::info!("SMTP server listening on {:#}", self.bind_addr);

        let mut connections = FuturesUnordered::new();

        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::debug!("accepted SMTP connection from {}", remote_addr);

            let server = self.clone();
            let conn = tokio::spawn(async move {
                if let Err(e) = server.handle_connection(socket).await {
                    tracing::warn!(err = ?e, remote = %remote_addr, "SMTP connection failed");
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("SMTP server shutting down, draining remaining connections...");
        while connections.next().await.is_some() {}

        Ok(())
    }

    async fn handle_connection(&self, socket: TcpStream) -> Result<()> {
        let (read_half, mut writer) = socket.into_split();
        let mut reader = BufReader::new(read_half);
        let mut session = Session::new(
            self.store.clone(),
            self.hostname.clone(),
            self.max_message_bytes,
            self.max_recipients,
        );

        let greeting = Reply::new(220, format!("{} ESMTP Service Ready", self.hostname));
        self.write_reply(&mut writer, &greeting).await?;

        let mut buf = Vec::new();
        loop {
            let line = match self.read_line(&mut reader, &mut buf).await? {
                Some(line) => line,
                None => break,
            };

            match session.handle(parse_command(&line)) {
                Action::Reply(reply) => self.write_reply(&mut writer, &reply).await?,
                Action::Challenge(reply) => {
                    self.write_reply(&mut writer, &reply).await?;
                    match self.read_line(&mut reader, &mut buf).await? {
                        Some(response) => {
                            let reply = session.handle_auth_response(&response);
                            self.write_reply(&mut writer, &reply).await?;
                        }
                        None => break,
                    }
                }
                Action::CollectData(reply) => {
                    self.write_reply(&mut writer, &reply).await?;
                    let reply = self.collect_data(&mut reader, &mut session).await?;
                    self.write_reply(&mut writer, &reply).await?;
                }
                Action::Quit(reply) => {
                    self.write_reply(&mut writer, &reply).await?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads one command line. `None` means the client closed the
    /// connection. Invalid UTF-8 is replaced rather than rejected; command
    /// lines are not payload.
    async fn read_line<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        buf: &mut Vec<u8>,
    ) -> Result<Option<String>> {
        buf.clear();
        let n = match timeout(self.read_timeout, reader.read_until(b'\n', buf)).await {
            Ok(res) => res?,
            Err(_) => bail!("read timed out"),
        };
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(strip_crlf(buf));
        Ok(Some(line.into_owned()))
    }

    /// Buffers the DATA payload up to the terminating dot line.
    ///
    /// Leading dots are unstuffed; everything else is kept byte for byte.
    /// An oversized payload is drained to the terminator and dropped.
    async fn collect_data<R: AsyncBufRead + Unpin>(
        &self,
        reader: &mut R,
        session: &mut Session,
    ) -> Result<Reply> {
        let max = session.max_message_bytes();
        let mut payload: Vec<u8> = Vec::new();
        let mut raw = Vec::new();
        let mut oversized = false;

        loop {
            raw.clear();
            let n = match timeout(self.read_timeout, reader.read_until(b'\n', &mut raw)).await {
                Ok(res) => res?,
                Err(_) => bail!("read timed out during DATA"),
            };
            if n == 0 {
                bail!("connection closed during DATA");
            }

            if strip_crlf(&raw) == b"." {
                if oversized {
                    return Ok(session.reject_oversized_data());
                }
                return Ok(session.commit_data(payload));
            }

            let line: &[u8] = if raw.starts_with(b".") { &raw[1..] } else { &raw };

            if !oversized {
                if payload.len() + line.len() > max {
                    oversized = true;
                    payload = Vec::new();
                } else {
                    payload.extend_from_slice(line);
                }
            }
        }
    }

    async fn write_reply<W: AsyncWrite + Unpin>(&self, writer: &mut W, reply: &Reply) -> Result<()> {
        match timeout(self.write_timeout, writer.write_all(reply.render().as_bytes())).await {
            Ok(res) => res?,
            Err(_) => bail!("write timed out"),
        }
        Ok(())
    }
}

fn strip_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
