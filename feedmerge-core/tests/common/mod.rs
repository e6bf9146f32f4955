//! Shared fixtures: scripted adapters and a one-shot local HTTP server.

#![allow(dead_code)]

use chrono::NaiveDate;
use feedmerge_core::domain::{
    BarTime, Credential, DateRange, Frequency, ProviderName, ProviderSymbol, RawProviderRow,
};
use feedmerge_core::{FetchError, ProviderAdapter, ProviderSettings};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn jan_range() -> DateRange {
    DateRange::new(d(2024, 1, 2), d(2024, 1, 4)).unwrap()
}

/// What a scripted adapter does when called.
#[derive(Clone)]
pub enum Script {
    /// One daily bar per day in the range; `close` offsets identify the provider.
    Daily { close_offset: f64 },
    Fail(FetchError),
    Empty,
}

/// Adapter that follows a script and counts its calls. Like the real
/// adapters it reports a missing credential before doing anything else.
pub struct ScriptedAdapter {
    pub provider: ProviderName,
    pub script: Script,
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(provider: ProviderName, script: Script) -> Self {
        Self {
            provider,
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn daily(provider: ProviderName, close_offset: f64) -> Self {
        Self::new(provider, Script::Daily { close_offset })
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> ProviderName {
        self.provider
    }

    fn fetch(
        &self,
        symbol: &ProviderSymbol,
        range: DateRange,
        _frequency: Frequency,
        credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        credential.ok_or(FetchError::CredentialMissing(self.provider))?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(symbol.describe());
        match &self.script {
            Script::Daily { close_offset } => {
                let mut rows = Vec::new();
                let mut day = range.end;
                // Reverse order on purpose: projection must sort by timestamp.
                while day >= range.start {
                    let close = 100.0 + close_offset;
                    rows.push(
                        RawProviderRow::new(BarTime::Date(day))
                            .ohlcv(Some(close - 1.0), Some(close + 1.0), Some(close - 2.0), Some(close), Some(1000.0))
                            .extra("vwap", Some(close)),
                    );
                    day = day.pred_opt().unwrap();
                }
                Ok(rows)
            }
            Script::Fail(e) => Err(e.clone()),
            Script::Empty => Ok(Vec::new()),
        }
    }
}

/// Adapter that records how many calls overlap. Clones share the gauge, so one
/// gauge can watch several providers at once.
#[derive(Clone)]
pub struct GaugedAdapter {
    pub provider: ProviderName,
    pub hold: Duration,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl GaugedAdapter {
    pub fn new(provider: ProviderName, hold: Duration) -> Self {
        Self {
            provider,
            hold,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Same gauge, different provider.
    pub fn for_provider(&self, provider: ProviderName) -> Self {
        Self {
            provider,
            ..self.clone()
        }
    }
}

impl ProviderAdapter for GaugedAdapter {
    fn provider(&self) -> ProviderName {
        self.provider
    }

    fn fetch(
        &self,
        _symbol: &ProviderSymbol,
        range: DateRange,
        _frequency: Frequency,
        _credential: Option<&Credential>,
    ) -> Result<Vec<RawProviderRow>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.hold);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![RawProviderRow::new(BarTime::Date(range.start)).ohlcv(
            Some(1.0),
            Some(1.0),
            Some(1.0),
            Some(1.0),
            Some(1.0),
        )])
    }
}

/// Settings pointing a real adapter at a local server.
pub fn local_settings(base_url: &str) -> ProviderSettings {
    ProviderSettings {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        api_key_env: "FEEDMERGE_TEST_KEY".into(),
    }
}

/// Like `local_settings`, with a one-second call timeout.
pub fn impatient_settings(base_url: &str) -> ProviderSettings {
    ProviderSettings {
        timeout_secs: 1,
        ..local_settings(base_url)
    }
}

/// A canned HTTP response.
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Local HTTP server that answers each incoming request with the next reply,
/// then stops. Captures each request head for assertions. `{BASE}` in a reply
/// body is replaced with the server's own base URL.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);
        let base = base_url.clone();

        let handle = std::thread::spawn(move || {
            for reply in replies {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                captured.lock().unwrap().push(head);

                let body = reply.body.replace("{BASE}", &base);
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            base_url,
            requests,
            handle: Some(handle),
        }
    }

    /// Server that accepts one connection, reads the request head and then
    /// sends nothing for `hold` before closing.
    pub fn silent(hold: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);

        let handle = std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            captured.lock().unwrap().push(head);
            std::thread::sleep(hold);
        });

        Self {
            base_url,
            requests,
            handle: Some(handle),
        }
    }

    /// Request heads received so far, in arrival order.
    pub fn requests(&mut self) -> Vec<String> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.requests.lock().unwrap().clone()
    }
}
