// src/io/serial/mod.rs
//
// Serial port link to the stimulator.
//
// Features:
// - Dedicated worker thread owning the port for the session
// - Ordered command transmission from the shared command channel
// - Device echo forwarded to an observer as text

pub mod link;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use link::{
    open_port, CloseReason, LinkConfig, LinkEvent, LinkObserver, SerialLink, Transport,
    DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL, DEFAULT_READ_TIMEOUT, MAX_POLL_INTERVAL,
    MIN_POLL_INTERVAL,
};
pub use utils::{list_ports, Parity};
