// src/supervisor.rs
//
// Connection lifecycle and console state.
// Holds the program bank and trigger thresholds, allows at most one live
// serial link, and brings the device back in sync after every connect.

use std::sync::Arc;

use crate::error::{Result, StimError};
use crate::io::codec::{self, TriggerChannel};
use crate::io::serial::{LinkConfig, LinkObserver, SerialLink};
use crate::program::{ProgramBank, PulseTrainProgram};

/// Lifecycle of the single link session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Opens a link for the supervisor. Swapped out in tests.
pub trait PortOpener: Send {
    fn open(&self, config: &LinkConfig, observer: Arc<dyn LinkObserver>) -> Result<SerialLink>;
}

/// Opens real serial ports through the serialport crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    fn open(&self, config: &LinkConfig, observer: Arc<dyn LinkObserver>) -> Result<SerialLink> {
        SerialLink::start(config.clone(), observer)
    }
}

/// Every command needed to mirror `bank` and `thresholds` on the device:
/// all slot definitions in slot order, then both trigger thresholds.
pub fn resync_commands(bank: &ProgramBank, thresholds: [i32; 2]) -> Result<Vec<String>> {
    let mut commands = bank
        .iter()
        .map(|(slot, program)| codec::encode_pulse_train(slot, program))
        .collect::<Result<Vec<_>>>()?;
    commands.extend(
        TriggerChannel::ALL
            .iter()
            .map(|&ch| codec::encode_trigger_threshold(ch, thresholds[ch.index()])),
    );
    Ok(commands)
}

pub struct LinkSupervisor {
    opener: Box<dyn PortOpener>,
    observer: Arc<dyn LinkObserver>,
    /// Line settings; the port name is filled in on connect
    line: LinkConfig,
    state: LinkState,
    link: Option<SerialLink>,
    programs: ProgramBank,
    thresholds: [i32; 2],
}

impl LinkSupervisor {
    pub fn new(observer: Arc<dyn LinkObserver>) -> Self {
        Self::with_opener(SerialPortOpener, observer)
    }

    pub fn with_opener(opener: impl PortOpener + 'static, observer: Arc<dyn LinkObserver>) -> Self {
        Self {
            opener: Box::new(opener),
            observer,
            line: LinkConfig::new(""),
            state: LinkState::Disconnected,
            link: None,
            programs: ProgramBank::new(),
            thresholds: [0, 0],
        }
    }

    /// Line settings used by the next connect. The port field is ignored.
    pub fn set_line_config(&mut self, config: LinkConfig) {
        self.line = config;
    }

    /// Current state. A link whose worker has died reports `Disconnected`.
    pub fn state(&self) -> LinkState {
        match self.state {
            LinkState::Connected if !self.link.as_ref().is_some_and(|l| l.is_running()) => {
                LinkState::Disconnected
            }
            state => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    pub fn connected_port(&self) -> Option<&str> {
        self.live_link().map(|l| l.port())
    }

    /// Open `port` and re-send every program and both trigger thresholds.
    pub fn connect(&mut self, port: &str) -> Result<()> {
        self.reap();
        if self.state == LinkState::Connected {
            return Err(StimError::AlreadyConnected);
        }

        let mut config = self.line.clone();
        config.port = port.to_string();

        // Every stored program passed wire_timing on entry
        let commands = resync_commands(&self.programs, self.thresholds)?;

        tlog!(supervisor: "Connecting to {}", port);
        self.state = LinkState::Connecting;
        let link = match self.opener.open(&config, self.observer.clone()) {
            Ok(link) => link,
            Err(e) => {
                self.state = LinkState::Disconnected;
                tlog!(supervisor: "Failed to open port: {}", e);
                return Err(e);
            }
        };

        let count = commands.len();
        for cmd in commands {
            if let Err(e) = link.send(cmd) {
                // Worker died before the resync was queued
                self.state = LinkState::Disconnected;
                return Err(e);
            }
        }
        self.link = Some(link);
        self.state = LinkState::Connected;
        tlog!(supervisor: "Connected to {}, queued {} sync commands", port, count);
        Ok(())
    }

    /// Stop the link if there is one. Safe to call at any time.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            tlog!(supervisor: "Disconnecting from {}", link.port());
            link.stop();
        }
        self.state = LinkState::Disconnected;
    }

    pub fn programs(&self) -> &ProgramBank {
        &self.programs
    }

    pub fn program(&self, slot: usize) -> Result<&PulseTrainProgram> {
        self.programs.get(slot)
    }

    pub fn trigger_thresholds(&self) -> [i32; 2] {
        self.thresholds
    }

    /// Store a program and, when connected, send it to the device.
    pub fn update_program(&mut self, slot: usize, program: PulseTrainProgram) -> Result<()> {
        self.programs.set(slot, program)?;
        self.sync_slot(slot)
    }

    pub fn reset_program(&mut self, slot: usize) -> Result<()> {
        self.programs.reset(slot)?;
        self.sync_slot(slot)
    }

    /// Replace the whole bank, e.g. after loading a program file.
    pub fn load_programs(&mut self, bank: ProgramBank) -> Result<()> {
        self.programs = bank;
        if let Some(link) = self.live_link() {
            for (slot, program) in self.programs.iter() {
                link.send(codec::encode_pulse_train(slot, program)?)?;
            }
        }
        Ok(())
    }

    /// Store a threshold; when connected it is also sent. Storing never fails,
    /// a lost link just leaves the value for the next resync.
    pub fn set_trigger_threshold(&mut self, channel: TriggerChannel, value: i32) {
        self.thresholds[channel.index()] = value;
        if let Some(link) = self.live_link() {
            let _ = link.send(codec::encode_trigger_threshold(channel, value));
        }
    }

    /// Re-send the slot definition, then start it.
    pub fn start_train(&self, slot: usize) -> Result<()> {
        let program = self.programs.get(slot)?;
        let link = self.live_link().ok_or(StimError::NotConnected)?;
        link.send(codec::encode_pulse_train(slot, program)?)?;
        link.send(codec::encode_start(slot)?)
    }

    pub fn stop_train(&self) -> Result<()> {
        let link = self.live_link().ok_or(StimError::NotConnected)?;
        link.send(codec::encode_stop())
    }

    /// Queue an arbitrary, already-encoded command.
    pub fn send_raw(&self, command: String) -> Result<()> {
        let link = self.live_link().ok_or(StimError::NotConnected)?;
        link.send(command)
    }

    fn sync_slot(&self, slot: usize) -> Result<()> {
        if let Some(link) = self.live_link() {
            link.send(codec::encode_pulse_train(slot, self.programs.get(slot)?)?)?;
        }
        Ok(())
    }

    fn live_link(&self) -> Option<&SerialLink> {
        self.link.as_ref().filter(|l| l.is_running())
    }

    /// Tear down a link whose worker exited on its own.
    fn reap(&mut self) {
        if self.state == LinkState::Connected && self.live_link().is_none() {
            tlog!(supervisor: "Link worker exited; cleaning up");
            self.disconnect();
        }
    }
}

impl Drop for LinkSupervisor {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================
