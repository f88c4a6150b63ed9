//! Network transport used by the probe and speed-test stages
//!
//! [`EdgeTransport`] is the seam between the worker pools and the network.
//! [`HttpTransport`] is the production implementation. It dials the candidate
//! over TCP to measure latency, then runs the trace request over that same
//! stream (TLS-wrapped when enabled) with the configured host name in SNI
//! and `Host`. The edge sees a normal request for its own domain even though
//! DNS was never consulted.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1;
use hyper::header::{HOST, USER_AGENT};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_native_tls::{native_tls, TlsConnector};
use url::{Position, Url};

use crate::config::Config;
use crate::models::Candidate;
use crate::utils::error::{ProbeError, SpeedTestError};

/// Byte stream an HTTP exchange can run over
pub trait EdgeStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> EdgeStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Open connection to a candidate
pub struct EdgeConnection {
    /// Stream the trace request is written to
    pub stream: Box<dyn EdgeStream>,

    /// Time taken to establish the connection
    pub connect_time: Duration,
}

impl EdgeConnection {
    pub fn new(stream: impl EdgeStream + 'static, connect_time: Duration) -> Self {
        Self {
            stream: Box::new(stream),
            connect_time,
        }
    }
}

impl fmt::Debug for EdgeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeConnection")
            .field("connect_time", &self.connect_time)
            .finish_non_exhaustive()
    }
}

/// Bytes received over a measured interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadSample {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl DownloadSample {
    /// Throughput in kB/s (1 kB = 1024 bytes)
    pub fn kilobytes_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs / 1024.0
    }
}

/// Network operations needed by the scanner
///
/// Implementations must honour the deadlines they are given; the pools add
/// no retries on top.
#[async_trait]
pub trait EdgeTransport: Send + Sync {
    /// Open a TCP connection within `timeout`
    async fn dial(&self, candidate: &Candidate, timeout: Duration)
        -> Result<EdgeConnection, ProbeError>;

    /// Request the trace endpoint over `connection` and return the body
    async fn fetch_trace(
        &self,
        candidate: &Candidate,
        connection: EdgeConnection,
    ) -> Result<String, ProbeError>;

    /// Download from the speed test endpoint on a fresh connection for at
    /// most `max_duration`
    async fn download(
        &self,
        candidate: &Candidate,
        max_duration: Duration,
    ) -> Result<DownloadSample, SpeedTestError>;
}

/// Build the speed test URL, forcing the scheme selected by `tls`
///
/// Accepts values with or without a scheme, e.g.
/// `speed.cloudflare.com/__down?bytes=500000000`.
pub fn speed_test_url(raw: &str, tls: bool) -> Result<Url, SpeedTestError> {
    let without_scheme = raw
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(raw)
        .trim();
    let scheme = if tls { "https" } else { "http" };

    let url = Url::parse(&format!("{scheme}://{without_scheme}"))
        .map_err(|e| SpeedTestError::InvalidUrl(format!("{raw}: {e}")))?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(SpeedTestError::InvalidUrl(raw.to_string()));
    }

    Ok(url)
}

/// Production transport over TCP, optional TLS and HTTP/1.1
#[derive(Clone)]
pub struct HttpTransport {
    tls: Option<TlsConnector>,
    trace_host: String,
    trace_path: String,
    user_agent: String,
    connect_timeout: Duration,
    speed_test_host: String,
    speed_test_path: String,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// The TLS connector is built once here and shared by every exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the speed test URL is malformed or the TLS
    /// connector cannot be created
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let url = speed_test_url(&config.scan.speed_test_url, config.scan.enable_tls)?;
        let speed_test_host = url
            .host_str()
            .ok_or_else(|| SpeedTestError::InvalidUrl(url.to_string()))?
            .to_string();

        let tls = if config.scan.enable_tls {
            Some(TlsConnector::from(native_tls::TlsConnector::new()?))
        } else {
            None
        };

        Ok(Self {
            tls,
            trace_host: config.scan.trace_host.clone(),
            trace_path: config.scan.trace_path.clone(),
            user_agent: config.scan.user_agent.clone(),
            connect_timeout: config.tcp_timeout(),
            speed_test_host,
            speed_test_path: url[Position::BeforePath..].to_string(),
        })
    }

    /// Wrap `stream` in TLS for `host` when TLS is enabled
    async fn secure(
        &self,
        host: &str,
        stream: Box<dyn EdgeStream>,
    ) -> Result<Box<dyn EdgeStream>, native_tls::Error> {
        match &self.tls {
            Some(connector) => Ok(Box::new(connector.connect(host, stream).await?)),
            None => Ok(stream),
        }
    }

    fn get(&self, host: &str, path: &str) -> Result<Request<Empty<Bytes>>, hyper::http::Error> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(HOST, host)
            .header(USER_AGENT, self.user_agent.as_str())
            .body(Empty::new())
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("tls", &self.tls.is_some())
            .field("trace_host", &self.trace_host)
            .field("trace_path", &self.trace_path)
            .field("speed_test_host", &self.speed_test_host)
            .field("speed_test_path", &self.speed_test_path)
            .finish_non_exhaustive()
    }
}

/// Poll `exchange` while keeping its connection task alive
///
/// The connection is dropped, closing the socket, as soon as the exchange
/// is done. If the connection ends first, the exchange still drains what
/// was already buffered.
async fn drive<C, F, T>(connection: C, exchange: F) -> T
where
    C: Future<Output = hyper::Result<()>>,
    F: Future<Output = T>,
{
    tokio::pin!(connection);
    tokio::pin!(exchange);

    tokio::select! {
        biased;
        out = &mut exchange => out,
        closed = &mut connection => {
            if let Err(e) = closed {
                tracing::debug!(error = %e, "Connection closed during exchange");
            }
            exchange.await
        }
    }
}

async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ProbeError> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::ConnectTimeout(timeout)),
    }
}

#[async_trait]
impl EdgeTransport for HttpTransport {
    async fn dial(
        &self,
        candidate: &Candidate,
        timeout: Duration,
    ) -> Result<EdgeConnection, ProbeError> {
        let addr = candidate.socket_addr()?;
        let start = Instant::now();
        let stream = connect(addr, timeout).await?;
        Ok(EdgeConnection::new(stream, start.elapsed()))
    }

    async fn fetch_trace(
        &self,
        _candidate: &Candidate,
        connection: EdgeConnection,
    ) -> Result<String, ProbeError> {
        let stream = self
            .secure(&self.trace_host, connection.stream)
            .await
            .map_err(ProbeError::Tls)?;
        let request = self.get(&self.trace_host, &self.trace_path)?;

        let (mut sender, conn) = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(stream)).await?;
        let body = drive(conn, async move {
            let response = sender.send_request(request).await?;
            let body = response.into_body().collect().await?;
            Ok::<_, hyper::Error>(body.to_bytes())
        })
        .await?;

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn download(
        &self,
        candidate: &Candidate,
        max_duration: Duration,
    ) -> Result<DownloadSample, SpeedTestError> {
        let addr = candidate
            .socket_addr()
            .map_err(|_| SpeedTestError::InvalidAddress(candidate.address.clone()))?;
        let request = self.get(&self.speed_test_host, &self.speed_test_path)?;

        let start = Instant::now();
        let deadline = start + max_duration;
        let timed_out = || SpeedTestError::Timeout(max_duration);

        let open = async {
            let stream = match connect(addr, self.connect_timeout).await {
                Ok(stream) => stream,
                Err(ProbeError::Connect(e)) => return Err(SpeedTestError::Connect(e)),
                Err(_) => return Err(timed_out()),
            };
            let stream = self
                .secure(&self.speed_test_host, Box::new(stream))
                .await
                .map_err(SpeedTestError::Tls)?;
            let handshake = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(stream)).await?;
            Ok::<_, SpeedTestError>(handshake)
        };
        let (mut sender, conn) = tokio::time::timeout_at(deadline, open)
            .await
            .map_err(|_| timed_out())??;

        let bytes = drive(conn, async move {
            let response = tokio::time::timeout_at(deadline, sender.send_request(request))
                .await
                .map_err(|_| timed_out())??;

            let status = response.status();
            if !status.is_success() {
                return Err(SpeedTestError::Status(status.as_u16()));
            }

            let mut body = response.into_body();
            let mut bytes: u64 = 0;
            loop {
                match tokio::time::timeout_at(deadline, body.frame()).await {
                    Ok(Some(Ok(frame))) => {
                        if let Some(data) = frame.data_ref() {
                            bytes += data.len() as u64;
                        }
                    }
                    Ok(None) => break,
                    // A cut-off transfer still yields a measurement
                    Ok(Some(Err(e))) if bytes == 0 => return Err(SpeedTestError::Http(e)),
                    Ok(Some(Err(_))) => break,
                    Err(_) => break,
                }
            }
            Ok(bytes)
        })
        .await?;

        Ok(DownloadSample {
            bytes,
            elapsed: start.elapsed(),
        })
    }
}
