// src/io/mod.rs
//
// Everything between the console state and the wire: command encoding,
// the outbound queue and the serial worker.

pub mod channel;
pub mod codec;
pub mod serial;

pub use channel::CommandChannel;
pub use codec::{
    encode_pulse_train, encode_start, encode_stop, encode_trigger_threshold, TextDecoder,
    TriggerChannel,
};
pub use serial::{CloseReason, LinkConfig, LinkEvent, LinkObserver, SerialLink, Transport};
