// Logging first: tlog! must be defined before the modules that use it
#[macro_use]
pub mod logging;

pub mod error;
pub mod io;
pub mod program;
pub mod settings;
pub mod supervisor;

// ============================================================================
// Public surface
// ============================================================================

pub use error::{LinkError, LinkErrorKind, Result, StimError};
pub use io::codec::{
    encode_pulse_train, encode_start, encode_stop, encode_trigger_threshold, TriggerChannel,
    STOP_SLOT,
};
pub use io::serial::{list_ports, CloseReason, LinkConfig, LinkEvent, LinkObserver, Parity};
pub use program::{Phase, ProgramBank, PulseTrainProgram, NUM_PHASES, NUM_PULSETRAINS};
pub use settings::ConsoleSettings;
pub use supervisor::{resync_commands, LinkState, LinkSupervisor, PortOpener, SerialPortOpener};
