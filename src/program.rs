// src/program.rs
//
// Pulse-train programs and the fixed bank of program slots held by the console.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StimError};

/// Number of program slots on the device.
pub const NUM_PULSETRAINS: usize = 100;

/// Rows in every phase table.
pub const NUM_PHASES: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// One segment of a pulse train. Zero-duration phases are inert placeholders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub amplitude0: i32,
    pub amplitude1: i32,
    pub duration_us: i32,
}

impl Phase {
    pub const fn new(amplitude0: i32, amplitude1: i32, duration_us: i32) -> Self {
        Self {
            amplitude0,
            amplitude1,
            duration_us,
        }
    }

    pub fn is_active(&self) -> bool {
        self.duration_us > 0
    }
}

/// A stimulation program for both output channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PulseTrainProgram {
    #[serde(default = "default_mode")]
    pub ch0_mode: u8,
    #[serde(default = "default_mode")]
    pub ch1_mode: u8,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,
    #[serde(default = "default_duration_sec")]
    pub duration_sec: f64,
    #[serde(default, with = "phase_table")]
    pub phases: [Phase; NUM_PHASES],
}

fn default_mode() -> u8 {
    3
}
fn default_frequency_hz() -> f64 {
    100.0
}
fn default_duration_sec() -> f64 {
    0.5
}

impl Default for PulseTrainProgram {
    fn default() -> Self {
        Self {
            ch0_mode: default_mode(),
            ch1_mode: default_mode(),
            frequency_hz: default_frequency_hz(),
            duration_sec: default_duration_sec(),
            phases: [Phase::default(); NUM_PHASES],
        }
    }
}

impl PulseTrainProgram {
    /// Check that the timing values can be turned into whole microseconds.
    pub fn validate(&self) -> Result<()> {
        self.wire_timing().map(|_| ())
    }

    /// Pulse period and total train length in whole microseconds, truncated
    /// toward zero. Both must fit the device's signed 32-bit fields.
    pub fn wire_timing(&self) -> Result<(i32, i32)> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(StimError::InvalidProgram(format!(
                "frequency must be a positive number of Hz, got {}",
                self.frequency_hz
            )));
        }
        if !self.duration_sec.is_finite() || self.duration_sec <= 0.0 {
            return Err(StimError::InvalidProgram(format!(
                "duration must be a positive number of seconds, got {}",
                self.duration_sec
            )));
        }
        let period_us = to_micros("period", MICROS_PER_SEC / self.frequency_hz)?;
        let total_us = to_micros("duration", MICROS_PER_SEC * self.duration_sec)?;
        Ok((period_us, total_us))
    }

    /// Active phases in table order.
    pub fn active_phases(&self) -> impl Iterator<Item = &Phase> {
        self.phases.iter().filter(|p| p.is_active())
    }
}

const MICROS_PER_SEC: f64 = 1_000_000.0;

fn to_micros(what: &str, us: f64) -> Result<i32> {
    // i32::MAX + 1 is exact in f64; anything at or above it truncates out of range
    if !us.is_finite() || us >= i32::MAX as f64 + 1.0 {
        return Err(StimError::InvalidProgram(format!(
            "{} of {} us does not fit the device (max {} us)",
            what,
            us,
            i32::MAX
        )));
    }
    Ok(us.trunc() as i32)
}

/// Serde helper: phase tables may be written short in files and are padded with inert phases.
mod phase_table {
    use super::{Phase, NUM_PHASES};
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(phases: &[Phase; NUM_PHASES], s: S) -> Result<S::Ok, S::Error> {
        // Trailing inert rows carry no information
        let used = phases
            .iter()
            .rposition(|p| *p != Phase::default())
            .map(|i| i + 1)
            .unwrap_or(0);
        phases[..used].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[Phase; NUM_PHASES], D::Error> {
        let rows = Vec::<Phase>::deserialize(d)?;
        if rows.len() > NUM_PHASES {
            return Err(D::Error::custom(format!(
                "at most {} phases per program, got {}",
                NUM_PHASES,
                rows.len()
            )));
        }
        let mut table = [Phase::default(); NUM_PHASES];
        table[..rows.len()].copy_from_slice(&rows);
        Ok(table)
    }
}

// ============================================================================
// Program Bank
// ============================================================================

/// Fixed-capacity set of program slots. Slots are reset, never removed.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramBank {
    programs: Vec<PulseTrainProgram>,
}

/// On-disk layout of a program bank file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgramFile {
    #[serde(default, rename = "program")]
    programs: Vec<SlotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SlotEntry {
    slot: usize,
    #[serde(flatten)]
    program: PulseTrainProgram,
}

impl Default for ProgramBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBank {
    pub fn new() -> Self {
        Self {
            programs: vec![PulseTrainProgram::default(); NUM_PULSETRAINS],
        }
    }

    pub fn check_slot(slot: usize) -> Result<usize> {
        if slot < NUM_PULSETRAINS {
            Ok(slot)
        } else {
            Err(StimError::SlotOutOfRange(slot))
        }
    }

    pub fn get(&self, slot: usize) -> Result<&PulseTrainProgram> {
        Ok(&self.programs[Self::check_slot(slot)?])
    }

    /// Store a program. Rejected programs leave the slot untouched.
    pub fn set(&mut self, slot: usize, program: PulseTrainProgram) -> Result<()> {
        let slot = Self::check_slot(slot)?;
        program.validate()?;
        self.programs[slot] = program;
        Ok(())
    }

    pub fn reset(&mut self, slot: usize) -> Result<()> {
        let slot = Self::check_slot(slot)?;
        self.programs[slot] = PulseTrainProgram::default();
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &PulseTrainProgram)> {
        self.programs.iter().enumerate()
    }

    /// Parse a TOML bank. Slots not named in the file keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ProgramFile = toml::from_str(content)
            .map_err(|e| StimError::ProgramFile(format!("Failed to parse programs: {}", e)))?;

        let mut bank = Self::new();
        for entry in file.programs {
            bank.set(entry.slot, entry.program).map_err(|e| {
                StimError::ProgramFile(format!("slot {}: {}", entry.slot, e))
            })?;
        }
        Ok(bank)
    }

    /// Serialise every slot that differs from the default program.
    pub fn to_toml(&self) -> Result<String> {
        let default = PulseTrainProgram::default();
        let file = ProgramFile {
            programs: self
                .iter()
                .filter(|(_, p)| **p != default)
                .map(|(slot, p)| SlotEntry {
                    slot,
                    program: p.clone(),
                })
                .collect(),
        };
        toml::to_string_pretty(&file)
            .map_err(|e| StimError::ProgramFile(format!("Failed to serialize programs: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StimError::ProgramFile(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            StimError::ProgramFile(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
