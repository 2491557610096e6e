// stim_cli -- operator console for the stimulator.
//
// Usage:
//   stim_cli ports
//   stim_cli console --port /dev/ttyACM0 --programs programs.toml
//   stim_cli encode --programs programs.toml --slot 5
//
// Console lines read from stdin:
//   start N       re-send slot N and start it
//   stop          stop the running train
//   trigger C V   set trigger threshold for input C (0 or 1) to V
//   show N        print the stored program for slot N
//   quit          disconnect and exit

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use stimpulser::settings::{self, ConsoleSettings};
use stimpulser::{
    encode_pulse_train, list_ports, logging, resync_commands, tlog, LinkEvent, LinkSupervisor,
    ProgramBank, StimError, TriggerChannel,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "stim_cli", version, about = "Serial console for the stimulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports.
    Ports,
    /// Connect, sync every program and stream device output.
    Console {
        /// Serial port path (defaults to the last port used).
        #[arg(long)]
        port: Option<String>,
        /// Override the configured baud rate.
        #[arg(long)]
        baud: Option<u32>,
        /// Program bank to load (TOML).
        #[arg(long)]
        programs: Option<PathBuf>,
    },
    /// Print the commands a connect would send, without opening a port.
    Encode {
        #[arg(long)]
        programs: Option<PathBuf>,
        /// Only this slot's definition.
        #[arg(long)]
        slot: Option<usize>,
    },
}

// ---------------------------------------------------------------------------
// Console line parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Start(usize),
    Stop,
    Trigger(TriggerChannel, i32),
    Show(usize),
    Quit,
}

fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    fn arg<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
        let word = word.ok_or_else(|| format!("missing {}", what))?;
        word.parse().map_err(|_| format!("invalid {}: {}", what, word))
    }

    let cmd = match verb {
        "start" => ConsoleCommand::Start(arg(words.next(), "slot")?),
        "stop" => ConsoleCommand::Stop,
        "trigger" => {
            let index: usize = arg(words.next(), "channel")?;
            let channel = TriggerChannel::from_index(index)
                .ok_or_else(|| format!("invalid channel: {} (expected 0 or 1)", index))?;
            ConsoleCommand::Trigger(channel, arg(words.next(), "threshold")?)
        }
        "show" => ConsoleCommand::Show(arg(words.next(), "slot")?),
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };

    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument: {}", extra));
    }
    Ok(Some(cmd))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn load_bank(path: Option<&Path>) -> Result<ProgramBank, StimError> {
    match path {
        Some(path) => {
            let bank = ProgramBank::load(path)?;
            tlog!(cli: "Loaded programs from {}", path.display());
            Ok(bank)
        }
        None => Ok(ProgramBank::new()),
    }
}

fn run_ports() -> Result<(), StimError> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn run_encode(
    settings: &ConsoleSettings,
    programs: Option<&Path>,
    slot: Option<usize>,
) -> Result<(), StimError> {
    let bank = load_bank(programs)?;
    let commands = match slot {
        Some(slot) => vec![encode_pulse_train(slot, bank.get(slot)?)?],
        None => resync_commands(&bank, settings.trigger_thresholds)?,
    };
    for cmd in commands {
        print!("{}", cmd);
    }
    Ok(())
}

fn run_console(
    settings: &mut ConsoleSettings,
    port: Option<String>,
    baud: Option<u32>,
    programs: Option<&Path>,
) -> Result<(), StimError> {
    let port = port
        .or_else(|| settings.port.clone())
        .ok_or_else(|| StimError::LinkOpen {
            port: String::new(),
            reason: "No port given and none saved in settings".to_string(),
        })?;
    if let Some(baud) = baud {
        settings.baud_rate = baud;
    }

    let observer = Arc::new(|event: LinkEvent| match event {
        LinkEvent::Text(text) => {
            let mut out = io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
        LinkEvent::Error(e) => eprintln!("Link error: {}", e),
        LinkEvent::Opened { port } => eprintln!("Connected to {}", port),
        LinkEvent::Closed { reason } => eprintln!("Link closed ({:?})", reason),
    });

    let mut supervisor = LinkSupervisor::new(observer);
    supervisor.set_line_config(settings.link_config(&port));
    for channel in TriggerChannel::ALL {
        supervisor.set_trigger_threshold(channel, settings.trigger_thresholds[channel.index()]);
    }
    supervisor.load_programs(load_bank(programs)?)?;
    supervisor.connect(&port)?;

    settings.port = Some(port);
    if let Err(e) = settings::save_settings(settings) {
        tlog!(cli: "Could not save settings: {}", e);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tlog!(cli: "stdin read failed: {}", e);
                break;
            }
        };
        let cmd = match parse_console_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{}", msg);
                continue;
            }
        };

        let result = match cmd {
            ConsoleCommand::Start(slot) => supervisor.start_train(slot),
            ConsoleCommand::Stop => supervisor.stop_train(),
            ConsoleCommand::Trigger(channel, value) => {
                supervisor.set_trigger_threshold(channel, value);
                settings.trigger_thresholds[channel.index()] = value;
                Ok(())
            }
            ConsoleCommand::Show(slot) => supervisor.program(slot).map(|p| println!("{:#?}", p)),
            ConsoleCommand::Quit => break,
        };
        if let Err(e) = result {
            eprintln!("{}", e);
        }
    }

    supervisor.disconnect();
    if let Err(e) = settings::save_settings(settings) {
        tlog!(cli: "Could not save settings: {}", e);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = settings::load_settings().unwrap_or_else(|e| {
        eprintln!("Using default settings: {}", e);
        ConsoleSettings::default()
    });

    if let Err(e) = logging::init_file_logging(&settings) {
        eprintln!("File logging disabled: {}", e);
    }

    let result = match cli.command {
        Command::Ports => run_ports(),
        Command::Encode { programs, slot } => run_encode(&settings, programs.as_deref(), slot),
        Command::Console {
            port,
            baud,
            programs,
        } => run_console(&mut settings, port, baud, programs.as_deref()),
    };

    logging::stop_file_logging();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_console_line("start 5"), Ok(Some(ConsoleCommand::Start(5))));
        assert_eq!(parse_console_line("  stop  "), Ok(Some(ConsoleCommand::Stop)));
        assert_eq!(
            parse_console_line("trigger 1 -250"),
            Ok(Some(ConsoleCommand::Trigger(TriggerChannel::In1, -250)))
        );
        assert_eq!(parse_console_line("show 99"), Ok(Some(ConsoleCommand::Show(99))));
        assert_eq!(parse_console_line("quit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_console_line(""), Ok(None));
    }

    #[test]
    fn test_parse_console_errors() {
        assert!(parse_console_line("start").is_err());
        assert!(parse_console_line("start x").is_err());
        assert!(parse_console_line("trigger 2 10").is_err());
        assert!(parse_console_line("stop now").is_err());
        assert!(parse_console_line("fire").is_err());
    }
}
