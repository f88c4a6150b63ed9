//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edgescan::locations::LocationDirectory;
use edgescan::models::Candidate;
use edgescan::scanner::{DownloadSample, EdgeConnection, EdgeTransport};
use edgescan::utils::error::{ProbeError, SpeedTestError};

/// Location table used across tests
pub const LOCATIONS_JSON: &str = r#"[
    {"iata":"NRT","lat":35.76,"lon":140.38,"cca2":"JP","region":"Asia Pacific","city":"Tokyo","region_zh":"亚太","country":"Japan","city_zh":"东京","emoji":"🇯🇵"},
    {"iata":"LAX","lat":33.94,"lon":-118.41,"cca2":"US","region":"North America","city":"Los Angeles","region_zh":"北美","country":"United States","city_zh":"洛杉矶","emoji":"🇺🇸"},
    {"iata":"FRA","lat":50.03,"lon":8.56,"cca2":"DE","region":"Europe","city":"Frankfurt","region_zh":"欧洲","country":"Germany","city_zh":"法兰克福","emoji":"🇩🇪"}
]"#;

pub fn directory() -> LocationDirectory {
    LocationDirectory::from_json_str(LOCATIONS_JSON).expect("fixture table is valid")
}

/// Trace body as the edge returns it
pub fn trace_body(colo: &str, loc: &str) -> String {
    format!(
        "fl=123f45\nh=speed.cloudflare.com\nip=203.0.113.7\nts=1700000000.123\nvisit_scheme=https\nuag=Mozilla/5.0\ncolo={colo}\nsliver=none\nhttp=http/1.1\nloc={loc}\ntls=TLSv1.3\nsni=plaintext\nwarp=off\ngateway=off\n"
    )
}

/// Behaviour of one simulated host
#[derive(Debug, Clone)]
pub struct MockHost {
    /// Connect latency; `None` refuses the connection
    pub latency: Option<Duration>,
    pub trace: TraceBehaviour,
    /// Download speed in kB/s; `None` fails the download
    pub speed_kbs: Option<f64>,
    /// Report the full latency as a successful connect even past the deadline
    pub ignores_deadline: bool,
}

#[derive(Debug, Clone)]
pub enum TraceBehaviour {
    Body(String),
    /// Never answers; the probe's trace budget has to cut it off
    Hang,
}

impl MockHost {
    /// Reachable edge host answering a normal trace
    pub fn edge(latency_ms: u64, colo: &str, loc: &str) -> Self {
        Self {
            latency: Some(Duration::from_millis(latency_ms)),
            trace: TraceBehaviour::Body(trace_body(colo, loc)),
            speed_kbs: Some(1000.0),
            ignores_deadline: false,
        }
    }

    pub fn refused() -> Self {
        Self {
            latency: None,
            trace: TraceBehaviour::Body(String::new()),
            speed_kbs: None,
            ignores_deadline: false,
        }
    }

    pub fn with_speed(mut self, speed_kbs: Option<f64>) -> Self {
        self.speed_kbs = speed_kbs;
        self
    }

    pub fn with_trace(mut self, trace: TraceBehaviour) -> Self {
        self.trace = trace;
        self
    }

    pub fn ignoring_deadline(mut self) -> Self {
        self.ignores_deadline = true;
        self
    }
}

/// In-memory network keyed by candidate address
///
/// Tracks how many dials are in flight at once so tests can check the
/// concurrency cap.
#[derive(Default)]
pub struct MockNetwork {
    hosts: HashMap<String, MockHost>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    dials: AtomicUsize,
    downloads: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, address: &str, host: MockHost) -> Self {
        self.hosts.insert(address.to_string(), host);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn lookup(&self, candidate: &Candidate) -> Option<&MockHost> {
        self.hosts.get(&candidate.address)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EdgeTransport for MockNetwork {
    async fn dial(
        &self,
        candidate: &Candidate,
        timeout: Duration,
    ) -> Result<EdgeConnection, ProbeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let Some((latency, ignores_deadline)) = self
            .lookup(candidate)
            .and_then(|h| h.latency.map(|latency| (latency, h.ignores_deadline)))
        else {
            tokio::task::yield_now().await;
            return Err(ProbeError::Connect(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        };

        if latency > timeout && !ignores_deadline {
            tokio::time::sleep(timeout).await;
            return Err(ProbeError::ConnectTimeout(timeout));
        }

        tokio::time::sleep(latency).await;
        let (stream, _edge_side) = tokio::io::duplex(64);
        Ok(EdgeConnection::new(stream, latency))
    }

    async fn fetch_trace(
        &self,
        candidate: &Candidate,
        _connection: EdgeConnection,
    ) -> Result<String, ProbeError> {
        match self.lookup(candidate).map(|h| &h.trace) {
            Some(TraceBehaviour::Body(body)) => Ok(body.clone()),
            Some(TraceBehaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }

    async fn download(
        &self,
        candidate: &Candidate,
        max_duration: Duration,
    ) -> Result<DownloadSample, SpeedTestError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        match self.lookup(candidate).and_then(|h| h.speed_kbs) {
            Some(speed) => {
                let elapsed = max_duration.min(Duration::from_secs(1));
                Ok(DownloadSample {
                    bytes: (speed * 1024.0 * elapsed.as_secs_f64()).round() as u64,
                    elapsed,
                })
            }
            None => Err(SpeedTestError::Status(503)),
        }
    }
}
