// src/io/serial/link.rs
//
// Serial link worker.
// One dedicated thread owns the open port for the whole session. Each loop
// iteration writes at most one queued command, then reads whatever the device
// has sent and forwards it to the observer as text.

use std::io::{Read, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use super::utils::{self, Parity};
use crate::error::{LinkError, Result, StimError};
use crate::io::channel::CommandChannel;
use crate::io::codec::TextDecoder;

pub const DEFAULT_BAUD_RATE: u32 = 256_000;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll interval bounds. The floor keeps an idle worker from spinning and the
/// ceiling bounds how long `stop()` can wait.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);

const READ_BUF_SIZE: usize = 256;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial link configuration
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Upper bound on a single port read
    pub read_timeout: Duration,
    /// How long the worker waits for a queued command when the device is quiet.
    /// Clamped to `MIN_POLL_INTERVAL..=MAX_POLL_INTERVAL` by the worker.
    pub poll_interval: Duration,
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Poll interval the worker actually uses
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }
}

/// Why a worker loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Stopped,
    Error,
}

/// Events delivered from the worker thread to the display layer
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    Opened { port: String },
    /// Device echo, carriage returns removed
    Text(String),
    /// Mid-session I/O failure. Sent at most once per link.
    Error(LinkError),
    Closed { reason: CloseReason },
}

/// Receiver of link events. Called on the worker thread.
pub trait LinkObserver: Send + Sync {
    fn on_event(&self, event: LinkEvent);
}

impl<F> LinkObserver for F
where
    F: Fn(LinkEvent) + Send + Sync,
{
    fn on_event(&self, event: LinkEvent) {
        self(event)
    }
}

/// Byte pipe the worker drives. Implemented for real serial ports and for
/// in-memory ports in tests.
pub trait Transport: Read + Write + Send {
    /// Bytes waiting in the input buffer
    fn bytes_to_read(&mut self) -> std::io::Result<u32>;
    /// Discard anything the OS buffered before the session started
    fn clear_input(&mut self) -> std::io::Result<()>;
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn bytes_to_read(&mut self) -> std::io::Result<u32> {
        serialport::SerialPort::bytes_to_read(&**self).map_err(std::io::Error::from)
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        serialport::SerialPort::clear(&**self, serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

/// Open the configured port. No retry.
pub fn open_port(config: &LinkConfig) -> Result<Box<dyn serialport::SerialPort>> {
    utils::port_builder(config)?
        .open()
        .map_err(|e| StimError::LinkOpen {
            port: config.port.clone(),
            reason: e.to_string(),
        })
}

// ============================================================================
// Serial Link
// ============================================================================

/// Handle to a running link worker. Dropping the handle stops the worker.
pub struct SerialLink {
    port: String,
    channel: Arc<CommandChannel>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SerialLink {
    /// Open the serial port and start the worker.
    pub fn start(config: LinkConfig, observer: Arc<dyn LinkObserver>) -> Result<Self> {
        let port = open_port(&config)?;
        Self::start_with_transport(config, port, observer)
    }

    /// Start the worker on an already-open transport.
    pub fn start_with_transport<T>(
        config: LinkConfig,
        mut transport: T,
        observer: Arc<dyn LinkObserver>,
    ) -> Result<Self>
    where
        T: Transport + 'static,
    {
        let open_err = |reason: String| StimError::LinkOpen {
            port: config.port.clone(),
            reason,
        };

        transport
            .clear_input()
            .map_err(|e| open_err(format!("Failed to flush input: {}", e)))?;

        let channel = Arc::new(CommandChannel::new());
        let stop_flag = Arc::new(AtomicBool::new(false));

        tlog!(serial: "Opened {} at {}", config.port, utils::line_summary(&config));

        let handle = {
            let channel = channel.clone();
            let stop_flag = stop_flag.clone();
            let config = config.clone();
            std::thread::Builder::new()
                .name(format!("serial-link {}", config.port))
                .spawn(move || LinkWorker::new(transport, config, channel, observer).run(stop_flag))
                .map_err(|e| open_err(format!("Failed to spawn worker: {}", e)))?
        };

        Ok(Self {
            port: config.port,
            channel,
            stop_flag,
            handle: Some(handle),
        })
    }

    /// Queue a command for transmission. Fails once the worker has exited,
    /// since nothing would ever drain the queue.
    pub fn send(&self, command: String) -> Result<()> {
        if !self.is_running() {
            tlog!(serial: "Dropped {:?} for {}: link is not running", command.trim_end(), self.port);
            return Err(StimError::NotConnected);
        }
        self.channel.push(command);
        Ok(())
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// False once the worker has exited, whether stopped or failed.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it. The port is closed when this returns.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tlog!(serial: "Worker for {} panicked", self.port);
            }
            let dropped = self.channel.clear();
            if dropped > 0 {
                tlog!(serial: "{} unsent command(s) discarded for {}", dropped, self.port);
            }
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the worker thread for one session.
struct LinkWorker<T: Transport> {
    transport: T,
    config: LinkConfig,
    channel: Arc<CommandChannel>,
    observer: Arc<dyn LinkObserver>,
    decoder: TextDecoder,
    buf: [u8; READ_BUF_SIZE],
    bytes_written: u64,
    bytes_read: u64,
}

impl<T: Transport> LinkWorker<T> {
    fn new(
        transport: T,
        config: LinkConfig,
        channel: Arc<CommandChannel>,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        Self {
            transport,
            config,
            channel,
            observer,
            decoder: TextDecoder::new(),
            buf: [0u8; READ_BUF_SIZE],
            bytes_written: 0,
            bytes_read: 0,
        }
    }

    /// One loop iteration: write at most one command, then read what is available.
    fn step(&mut self) -> std::result::Result<(), LinkError> {
        // Don't linger on the queue when input is already waiting
        let inbound_waiting = self.transport.bytes_to_read().map_err(|e| LinkError::read(&e))? > 0;
        let wait = if inbound_waiting {
            Duration::ZERO
        } else {
            self.config.effective_poll_interval()
        };

        if let Some(cmd) = self.channel.blocking_pop(wait) {
            self.transport
                .write_all(cmd.as_bytes())
                .and_then(|_| self.transport.flush())
                .map_err(|e| LinkError::write(&e))?;
            self.bytes_written += cmd.len() as u64;
        }

        let available = self.transport.bytes_to_read().map_err(|e| LinkError::read(&e))? as usize;
        if available == 0 {
            return Ok(());
        }
        let want = available.min(self.buf.len());
        match self.transport.read(&mut self.buf[..want]) {
            Ok(0) => Err(LinkError::disconnected()),
            Ok(n) => {
                self.bytes_read += n as u64;
                let text = self.decoder.decode(&self.buf[..n]);
                if !text.is_empty() {
                    self.observer.on_event(LinkEvent::Text(text));
                }
                Ok(())
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(LinkError::read(&e)),
        }
    }

    /// Blocking loop. The transport is closed when this returns.
    fn run(mut self, stop_flag: Arc<AtomicBool>) {
        self.observer.on_event(LinkEvent::Opened {
            port: self.config.port.clone(),
        });

        let reason = loop {
            if stop_flag.load(Ordering::SeqCst) {
                break CloseReason::Stopped;
            }
            if let Err(e) = self.step() {
                tlog!(serial: "{} on {}", e, self.config.port);
                self.observer.on_event(LinkEvent::Error(e));
                break CloseReason::Error;
            }
        };

        let tail = self.decoder.flush();
        if !tail.is_empty() {
            self.observer.on_event(LinkEvent::Text(tail));
        }

        let LinkWorker {
            transport,
            config,
            observer,
            bytes_written,
            bytes_read,
            ..
        } = self;
        drop(transport);
        tlog!(
            serial: "Closed {} ({:?}, {} bytes out, {} bytes in)",
            config.port,
            reason,
            bytes_written,
            bytes_read
        );
        observer.on_event(LinkEvent::Closed { reason });
    }
}

// ============================================================================
// Tests
// ============================================================================
