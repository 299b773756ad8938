//! Port plumbing between drivers and the stream I/O layer.
//!
//! This crate never touches hardware itself. A [`Transport`] hands out
//! [`Link`]s for named ports and drivers talk to them through [`DeviceIo`],
//! which adds the bounded request/reply helpers used during declarations.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::DeviceError;
use crate::nmea;

/// An opened port.
pub trait Link: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Next complete reply line, or `None` when nothing arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens ports by identifier (`/dev/ttyUSB0`, `COM1`, ...).
pub trait Transport: Send + Sync {
    fn open(&self, port: &str) -> io::Result<Box<dyn Link>>;
}

/// The port side of a bound slot, as seen by its driver.
pub struct DeviceIo {
    port: String,
    transport: Arc<dyn Transport>,
    link: Option<Box<dyn Link>>,
    timeout: Duration,
}

impl DeviceIo {
    pub fn new(port: impl Into<String>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            transport,
            link: None,
            timeout,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Budget for a single reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn open(&mut self) -> Result<(), DeviceError> {
        if self.link.is_none() {
            self.link = Some(self.transport.open(&self.port)?);
            debug!("Opened port {port}", port = self.port);
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DeviceError> {
        if let Some(mut link) = self.link.take() {
            link.close()?;
            debug!("Closed port {port}", port = self.port);
        }
        Ok(())
    }

    /// Close and open again; closing errors are ignored since the old link is
    /// discarded either way.
    pub fn reopen(&mut self) -> Result<(), DeviceError> {
        if let Err(e) = self.close() {
            debug!("Ignoring close error on {port}: {e}", port = self.port);
        }
        self.open()
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        let port = &self.port;
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DeviceError::NotOpen(port.clone()))?;
        trace!("{port} <- {bytes}", bytes = hex::encode(bytes));
        link.write(bytes)?;
        Ok(())
    }

    pub fn write_str(&mut self, text: &str) -> Result<(), DeviceError> {
        self.write(text.as_bytes())
    }

    /// Write `body` framed as a checksummed NMEA sentence.
    pub fn send_sentence(&mut self, body: &str) -> Result<(), DeviceError> {
        self.write_str(&nmea::sentence(body))
    }

    /// Read replies until one contains `ok`.
    ///
    /// A reply containing `fail` is a refusal. Unrelated lines (the device
    /// may still be streaming NMEA) are skipped. Gives up after the I/O
    /// timeout.
    pub fn expect(&mut self, ok: &str, fail: &str) -> Result<String, DeviceError> {
        let deadline = Instant::now() + self.timeout;
        let port = self.port.clone();
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DeviceError::NotOpen(port.clone()))?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(line) = link.read_line(remaining)? else {
                return Err(DeviceError::Timeout {
                    expected: ok.to_string(),
                    timeout: self.timeout,
                });
            };
            trace!("{port} -> {line:?}");

            if line.contains(ok) {
                return Ok(line);
            }
            if !fail.is_empty() && line.contains(fail) {
                return Err(DeviceError::Nack(line.trim().to_string()));
            }
            if remaining.is_zero() {
                return Err(DeviceError::Timeout {
                    expected: ok.to_string(),
                    timeout: self.timeout,
                });
            }
        }
    }

    /// Write `command` and wait for its acknowledgement.
    pub fn transact(&mut self, command: &str, ok: &str, fail: &str) -> Result<String, DeviceError> {
        self.write_str(command)?;
        self.expect(ok, fail)
    }
}

impl std::fmt::Debug for DeviceIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIo")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Default)]
struct MemoryPort {
    open: bool,
    open_count: usize,
    fail_open: bool,
    written: Vec<u8>,
    replies: VecDeque<String>,
    responders: Vec<(String, String)>,
}

type MemoryPorts = Arc<Mutex<HashMap<String, MemoryPort>>>;

/// In-process transport with scripted device replies.
///
/// Used for log replay and by the test-suite. Writes are recorded per port;
/// a responder queues its reply whenever a write contains its trigger.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    ports: MemoryPorts,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_port<R>(&self, port: &str, f: impl FnOnce(&mut MemoryPort) -> R) -> R {
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        f(ports.entry(port.to_string()).or_default())
    }

    /// Queue a reply line for the next read on `port`.
    pub fn push_reply(&self, port: &str, line: impl Into<String>) {
        let line = line.into();
        self.with_port(port, |p| p.replies.push_back(line));
    }

    /// Reply with `reply` each time a write to `port` contains `trigger`.
    pub fn respond(&self, port: &str, trigger: impl Into<String>, reply: impl Into<String>) {
        let rule = (trigger.into(), reply.into());
        self.with_port(port, |p| p.responders.push(rule));
    }

    pub fn clear_responders(&self, port: &str) {
        self.with_port(port, |p| p.responders.clear());
    }

    /// Make subsequent opens of `port` fail.
    pub fn set_fail_open(&self, port: &str, fail: bool) {
        self.with_port(port, |p| p.fail_open = fail);
    }

    /// Everything written to `port` so far, lossily decoded.
    pub fn written(&self, port: &str) -> String {
        self.with_port(port, |p| String::from_utf8_lossy(&p.written).into_owned())
    }

    pub fn clear_written(&self, port: &str) {
        self.with_port(port, |p| p.written.clear());
    }

    pub fn is_open(&self, port: &str) -> bool {
        self.with_port(port, |p| p.open)
    }

    pub fn open_count(&self, port: &str) -> usize {
        self.with_port(port, |p| p.open_count)
    }
}

impl Transport for MemoryTransport {
    fn open(&self, port: &str) -> io::Result<Box<dyn Link>> {
        self.with_port(port, |p| {
            if p.fail_open {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("cannot open {port}"),
                ));
            }
            p.open = true;
            p.open_count += 1;
            Ok(())
        })?;

        Ok(Box::new(MemoryLink {
            port: port.to_string(),
            ports: self.ports.clone(),
        }))
    }
}

struct MemoryLink {
    port: String,
    ports: MemoryPorts,
}

impl MemoryLink {
    fn with_port<R>(&self, f: impl FnOnce(&mut MemoryPort) -> R) -> R {
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        f(ports.entry(self.port.clone()).or_default())
    }
}

impl Link for MemoryLink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.with_port(|p| {
            if !p.open {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
            }
            p.written.extend_from_slice(bytes);
            let text = String::from_utf8_lossy(bytes);
            let replies: Vec<String> = p
                .responders
                .iter()
                .filter(|(trigger, _)| text.contains(trigger.as_str()))
                .map(|(_, reply)| reply.clone())
                .collect();
            p.replies.extend(replies);
            Ok(())
        })
    }

    fn read_line(&mut self, _timeout: Duration) -> io::Result<Option<String>> {
        Ok(self.with_port(|p| p.replies.pop_front()))
    }

    fn close(&mut self) -> io::Result<()> {
        self.with_port(|p| p.open = false);
        Ok(())
    }
}
