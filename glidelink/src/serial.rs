//! Serial port transport for the device layer.
//!
//! Every opened port is split in three handles: the link keeps a writer and a
//! reply reader for drivers, and a second reader is parked until the monitor
//! takes it for the continuous NMEA stream. Only one of the two readers should
//! be consumed at a time.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use glidelink_core::config::SlotConfig;
use glidelink_core::{GlideConfig, Link, PortLine, Transport};
use serialport::SerialPort;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest a single blocking read may wait before deadlines are re-checked.
const READ_POLL: Duration = Duration::from_millis(100);

type ParkedReaders = Arc<Mutex<HashMap<String, Box<dyn SerialPort>>>>;

pub struct SerialTransport {
    baud_rates: HashMap<String, u32>,
    default_baud_rate: u32,
    readers: ParkedReaders,
}

impl SerialTransport {
    /// Baud rates are taken from the slot configured for each port.
    pub fn from_config(config: &GlideConfig) -> Self {
        let baud_rates = config
            .slots
            .iter()
            .filter_map(|slot| slot.port.clone().map(|port| (port, slot.baud_rate)))
            .collect();

        Self {
            baud_rates,
            default_baud_rate: SlotConfig::default().baud_rate,
            readers: ParkedReaders::default(),
        }
    }

    /// Stream readers of ports opened since the last call.
    pub fn take_readers(&self) -> Vec<(String, Box<dyn SerialPort>)> {
        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        readers.drain().collect()
    }
}

impl Transport for SerialTransport {
    fn open(&self, port: &str) -> io::Result<Box<dyn Link>> {
        let baud_rate = self
            .baud_rates
            .get(port)
            .copied()
            .unwrap_or(self.default_baud_rate);

        let writer = serialport::new(port, baud_rate)
            .timeout(READ_POLL)
            .data_bits(serialport::DataBits::Eight)
            .open()?;
        let replies = writer.try_clone()?;
        let stream = writer.try_clone()?;
        info!("Opened serial port {port} at {baud_rate} baud");

        self.readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port.to_string(), stream);

        Ok(Box::new(SerialLink {
            port: port.to_string(),
            writer,
            replies: BufReader::new(replies),
            pending: Vec::new(),
        }))
    }
}

struct SerialLink {
    port: String,
    writer: Box<dyn SerialPort>,
    replies: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl Link for SerialLink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.replies.read_until(b'\n', &mut self.pending) {
                Ok(_) if self.pending.ends_with(b"\n") => {
                    let line = take_line(&mut self.pending);
                    if !line.is_empty() {
                        return Ok(Some(line));
                    }
                }
                Ok(0) => return Ok(None),
                Ok(_) => {}
                // Command prompts such as `cmd>` are not newline terminated.
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if self.pending.ends_with(b">") {
                        return Ok(Some(take_line(&mut self.pending)));
                    }
                }
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        debug!("Closing serial port {port}", port = self.port);
        self.pending.clear();
        Ok(())
    }
}

fn take_line(buffer: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buffer).trim().to_string();
    buffer.clear();
    line
}

/// Read `reader` line by line on a blocking thread and forward every line
/// to `lines`. Ends on a read error or when the receiver is dropped.
pub fn spawn_line_reader(
    port: String,
    reader: Box<dyn SerialPort>,
    lines: mpsc::Sender<PortLine>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => {
                    debug!("{port}: end of stream");
                    break;
                }
                Ok(_) if buffer.ends_with(b"\n") => {
                    let line = take_line(&mut buffer);
                    if line.is_empty() {
                        continue;
                    }
                    if lines.blocking_send(PortLine::new(&port, line)).is_err() {
                        debug!("{port}: line receiver dropped");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    if lines.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Serial read on {port} failed: {e}");
                    break;
                }
            }
        }
    })
}
