// src/io/codec.rs
//
// Stimulator command grammar.
// Outbound commands are single ASCII lines:
//
//   R{channel},{threshold}                       trigger threshold
//   S{slot},{m0},{m1},{period_us},{total_us};{a0},{a1},{dur_us};...
//                                                pulse-train definition
//   T{slot}                                      start train
//   T-1                                          stop any running train
//
// Inbound bytes are plain text echo with no framing.

use std::fmt::Write as _;

use crate::error::Result;
use crate::program::{ProgramBank, PulseTrainProgram};

/// Slot sentinel meaning "halt whatever train is running".
pub const STOP_SLOT: i32 = -1;

/// Input channel whose trigger comparator is being configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerChannel {
    In0 = 0,
    In1 = 1,
}

impl TriggerChannel {
    pub const ALL: [TriggerChannel; 2] = [TriggerChannel::In0, TriggerChannel::In1];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(TriggerChannel::In0),
            1 => Some(TriggerChannel::In1),
            _ => None,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

pub fn encode_trigger_threshold(channel: TriggerChannel, threshold: i32) -> String {
    format!("R{},{}\n", channel.index(), threshold)
}

/// Encode a pulse-train definition for `slot`.
///
/// Period and total duration are truncated toward zero to whole microseconds,
/// matching the device firmware's expectations. Inactive phases are skipped.
pub fn encode_pulse_train(slot: usize, program: &PulseTrainProgram) -> Result<String> {
    let slot = ProgramBank::check_slot(slot)?;
    let (period_us, total_us) = program.wire_timing()?;

    let mut buf = format!(
        "S{},{},{},{},{};",
        slot, program.ch0_mode, program.ch1_mode, period_us, total_us
    );
    for phase in program.active_phases() {
        // Writing to a String cannot fail
        let _ = write!(
            buf,
            "{},{},{};",
            phase.amplitude0, phase.amplitude1, phase.duration_us
        );
    }
    buf.push('\n');
    Ok(buf)
}

pub fn encode_start(slot: usize) -> Result<String> {
    let slot = ProgramBank::check_slot(slot)?;
    Ok(format!("T{}\n", slot))
}

pub fn encode_stop() -> String {
    format!("T{}\n", STOP_SLOT)
}

// ============================================================================
// Inbound Text
// ============================================================================

/// Turns raw inbound chunks into display text.
///
/// Carriage returns are dropped. A multi-byte UTF-8 sequence split across two
/// reads is held back until its remaining bytes arrive; bytes that can never
/// be valid are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct TextDecoder {
    pending: Vec<u8>,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    text.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to guarantees this slice is UTF-8
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let held = rest.to_vec();
        self.pending = held;

        text.retain(|c| c != '\r');
        text
    }

    /// Emit whatever is still held back, e.g. when the link closes.
    pub fn flush(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).replace('\r', "");
        self.pending.clear();
        text
    }
}

// ============================================================================
// Tests
// ============================================================================
