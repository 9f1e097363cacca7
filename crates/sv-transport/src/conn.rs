use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::{client::TlsStream, TlsConnector};

use sv_core::{Error, Result};

use crate::config::ServerConfig;
use crate::error::{classify_io, to_core_error};

/// Connection lifecycle: `disconnected -> connecting ->
/// ready <-> in_use -> (ready | broken)`. A broken connection is dropped by
/// the pool rather than reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Ready,
    InUse,
    Broken,
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// One authenticated session against one upstream server: a line-oriented,
/// NNTP-like command set (`POST`, `ARTICLE <message-id>`, `GROUP`, an
/// `XOVER`-style search) layered over a buffered TLS or plain stream —
/// chosen because no crate in the retrieval pack speaks a news protocol and
/// the storage backend is treated as an implementation-opaque
/// "message-oriented news network" rather than naming NNTP specifically
/// (see `DESIGN.md`).
pub struct Connection {
    pub server_name: String,
    reader: BufReader<Stream>,
    state: ConnState,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl Connection {
    pub async fn connect(server: &ServerConfig) -> Result<Self> {
        let tcp = TcpStream::connect((server.host.as_str(), server.port))
            .await
            .map_err(|e| to_core_error("connect", classify_io(&e), e))?;

        let stream = if server.tls {
            Stream::Tls(Box::new(connect_tls(tcp, &server.host).await?))
        } else {
            Stream::Plain(tcp)
        };

        let mut conn = Connection {
            server_name: server.name.clone(),
            reader: BufReader::new(stream),
            state: ConnState::Connecting,
            created_at: Instant::now(),
            last_used: Instant::now(),
        };

        conn.read_status_line().await?;

        if let (Some(user), Some(pass)) = (&server.username, &server.password) {
            conn.write_line(&format!("AUTHINFO USER {user}")).await?;
            let resp = conn.read_status_line().await?;
            if resp.starts_with("381") {
                conn.write_line(&format!("AUTHINFO PASS {pass}")).await?;
                let resp = conn.read_status_line().await?;
                if !resp.starts_with("281") {
                    conn.state = ConnState::Broken;
                    return Err(Error::TransportTerminal(format!("authentication rejected: {resp}")));
                }
            } else if !resp.starts_with("281") {
                conn.state = ConnState::Broken;
                return Err(Error::TransportTerminal(format!("authentication rejected: {resp}")));
            }
        }

        conn.state = ConnState::Ready;
        Ok(conn)
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn mark_in_use(&mut self) {
        self.state = ConnState::InUse;
    }

    pub fn mark_ready(&mut self) {
        self.state = ConnState::Ready;
        self.last_used = Instant::now();
    }

    pub fn mark_broken(&mut self) {
        self.state = ConnState::Broken;
    }

    /// Lightweight health check before handing a connection out of the pool
    ///: a `GROUP` select against the server's default group.
    pub async fn health_check(&mut self, group: &str) -> Result<()> {
        self.select_group(group).await.map(|_| ())
    }

    pub async fn select_group(&mut self, group: &str) -> Result<u64> {
        self.write_line(&format!("GROUP {group}")).await?;
        let resp = self.read_status_line().await?;
        if !resp.starts_with("211") {
            return Err(Error::TransportRetryable(format!("GROUP failed: {resp}")));
        }
        let count = resp
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Ok(count)
    }

    pub async fn post(&mut self, subject: &str, group: &str, body: &[u8]) -> Result<String> {
        self.write_line("POST").await?;
        let resp = self.read_status_line().await?;
        if !resp.starts_with("340") {
            return Err(Error::TransportTerminal(format!("POST refused: {resp}")));
        }

        self.write_line(&format!("Subject: {subject}")).await?;
        self.write_line(&format!("Newsgroups: {group}")).await?;
        self.write_line("").await?;
        self.write_dot_stuffed(body).await?;

        let resp = self.read_status_line().await?;
        if let Some(rest) = resp.strip_prefix("240 ") {
            let message_id = rest.split_whitespace().next().unwrap_or_default().to_string();
            if message_id.is_empty() {
                return Err(Error::TransportRetryable(format!("POST accepted without message-id: {resp}")));
            }
            Ok(message_id)
        } else if resp.starts_with("441") {
            Err(Error::TransportRetryable(format!("POST failed: {resp}")))
        } else {
            Err(Error::TransportTerminal(format!("POST refused: {resp}")))
        }
    }

    pub async fn retrieve(&mut self, message_id: &str) -> Result<Vec<u8>> {
        self.write_line(&format!("ARTICLE {message_id}")).await?;
        let resp = self.read_status_line().await?;
        if resp.starts_with("430") {
            return Err(Error::NotFound(format!("no such article: {message_id}")));
        }
        if !resp.starts_with("220") {
            return Err(Error::TransportRetryable(format!("ARTICLE failed: {resp}")));
        }
        self.read_dot_stuffed().await
    }

    /// Best-effort subject search (: "not relied on for
    /// correctness"). Returns message-ids whose subject line matches
    /// `pattern` as a plain substring.
    pub async fn search(&mut self, group: &str, pattern: &str, limit: usize) -> Result<Vec<String>> {
        let count = self.select_group(group).await?;
        self.write_line(&format!("XOVER 1-{count}")).await?;
        let resp = self.read_status_line().await?;
        if !resp.starts_with("224") {
            return Ok(Vec::new());
        }
        let lines = self.read_multiline().await?;
        let mut matches = Vec::new();
        for line in lines.lines() {
            let mut fields = line.split('\t');
            let _article_no = fields.next();
            let subject = fields.next().unwrap_or_default();
            let message_id = fields.nth(3).unwrap_or_default();
            if subject.contains(pattern) && !message_id.is_empty() {
                matches.push(message_id.to_string());
                if matches.len() >= limit {
                    break;
                }
            }
        }
        Ok(matches)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| to_core_error("write", classify_io(&e), e))?;
        stream
            .write_all(b"\r\n")
            .await
            .map_err(|e| to_core_error("write", classify_io(&e), e))?;
        stream.flush().await.map_err(|e| to_core_error("flush", classify_io(&e), e))
    }

    async fn write_dot_stuffed(&mut self, body: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        for line in body.split(|&b| b == b'\n') {
            if line.starts_with(b".") {
                stream.write_all(b".").await.map_err(|e| to_core_error("write", classify_io(&e), e))?;
            }
            stream.write_all(line).await.map_err(|e| to_core_error("write", classify_io(&e), e))?;
            stream.write_all(b"\r\n").await.map_err(|e| to_core_error("write", classify_io(&e), e))?;
        }
        stream.write_all(b".\r\n").await.map_err(|e| to_core_error("write", classify_io(&e), e))?;
        stream.flush().await.map_err(|e| to_core_error("flush", classify_io(&e), e))
    }

    async fn read_status_line(&mut self) -> Result<String> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .map_err(|e| to_core_error("read", classify_io(&e), e))?;
        if line.is_empty() {
            return Err(Error::TransportRetryable("connection closed by peer".into()));
        }
        Ok(line.trim_end().to_string())
    }

    async fn read_dot_stuffed(&mut self) -> Result<Vec<u8>> {
        Ok(self.read_multiline().await?.into_bytes())
    }

    async fn read_multiline(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| to_core_error("read", classify_io(&e), e))?;
            if n == 0 {
                return Err(Error::TransportRetryable("connection closed mid-response".into()));
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed == "." {
                break;
            }
            let unstuffed = trimmed.strip_prefix('.').unwrap_or(trimmed);
            out.push_str(unstuffed);
            out.push('\n');
        }
        Ok(out)
    }
}

async fn connect_tls(tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::InvalidInput(format!("invalid server hostname: {host}")))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| to_core_error("tls handshake", classify_io(&e), e))
}
