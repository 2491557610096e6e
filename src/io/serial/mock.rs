// src/io/serial/mock.rs
//
// In-memory transport and event capture for link and supervisor tests.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::link::{LinkEvent, LinkObserver, Transport};

#[derive(Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    ops: Vec<String>,
    clears: usize,
    fail_writes: bool,
    unplugged: bool,
    closed: bool,
}

/// Shared-state fake port. Clones observe the same state. Only the handle
/// returned by `handle()` stands for the open device: dropping it marks the
/// port closed, dropping a plain clone does not.
#[derive(Default)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
    owns_port: bool,
}

impl Clone for MockPort {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            owns_port: false,
        }
    }
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the port: the returned handle is what a link worker should own.
    pub fn handle(&self) -> Self {
        self.with(|s| s.closed = false);
        Self {
            state: self.state.clone(),
            owns_port: true,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    pub fn queue_inbound(&self, bytes: &[u8]) {
        self.with(|s| s.inbound.extend(bytes.iter().copied()));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.with(|s| s.fail_writes = fail);
    }

    pub fn unplug(&self) {
        self.with(|s| s.unplugged = true);
    }

    pub fn written(&self) -> String {
        self.with(|s| String::from_utf8_lossy(&s.written).into_owned())
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.written().lines().map(|l| format!("{}\n", l)).collect()
    }

    pub fn ops(&self) -> Vec<String> {
        self.with(|s| s.ops.clone())
    }

    pub fn clears(&self) -> usize {
        self.with(|s| s.clears)
    }

    pub fn is_closed(&self) -> bool {
        self.with(|s| s.closed)
    }

    pub fn wait_for_written(&self, pred: impl Fn(&str) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if pred(&self.written()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        pred(&self.written())
    }
}

fn unplugged_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.with(|s| {
            if s.unplugged {
                return Err(unplugged_error());
            }
            let n = buf.len().min(s.inbound.len());
            for (dst, src) in buf.iter_mut().zip(s.inbound.drain(..n)) {
                *dst = src;
            }
            s.ops.push(format!("R:{}", String::from_utf8_lossy(&buf[..n])));
            Ok(n)
        })
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|s| {
            if s.unplugged || s.fail_writes {
                return Err(unplugged_error());
            }
            s.written.extend_from_slice(buf);
            s.ops.push(format!("W:{}", String::from_utf8_lossy(buf)));
            Ok(buf.len())
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.with(|s| {
            if s.unplugged {
                Err(unplugged_error())
            } else {
                Ok(s.inbound.len() as u32)
            }
        })
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.with(|s| {
            if s.unplugged {
                return Err(unplugged_error());
            }
            s.inbound.clear();
            s.clears += 1;
            Ok(())
        })
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        if self.owns_port {
            self.with(|s| s.closed = true);
        }
    }
}

/// Records every event delivered by a link.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> Arc<dyn LinkObserver> {
        let events = self.events.clone();
        Arc::new(move |event: LinkEvent| {
            events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
        })
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Concatenated text events
    pub fn text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn wait_for(&self, pred: impl Fn(&EventLog) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if pred(self) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        pred(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_the_port_handle_closes() {
        let port = MockPort::new();
        let handle = port.handle();
        drop(port.clone());
        assert!(!port.is_closed());

        drop(handle);
        assert!(port.is_closed());

        let reopened = port.handle();
        assert!(!port.is_closed());
        drop(reopened);
        assert!(port.is_closed());
    }
}
