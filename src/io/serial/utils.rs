// src/io/serial/utils.rs
//
// Line settings for the stimulator port and port enumeration for front ends.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, SerialPortBuilder, StopBits};

use super::link::LinkConfig;
use crate::error::{Result, StimError};

/// Parity as written in the settings file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// `256000 baud 8N1` style summary for log lines
pub fn line_summary(config: &LinkConfig) -> String {
    let parity = match config.parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    };
    format!(
        "{} baud {}{}{}",
        config.baud_rate, config.data_bits, parity, config.stop_bits
    )
}

/// Port builder for `config`. Bit counts the UART cannot do are refused
/// instead of being replaced with 8N1.
pub fn port_builder(config: &LinkConfig) -> Result<SerialPortBuilder> {
    let unsupported = |what: &str, bits: u8| StimError::LinkOpen {
        port: config.port.clone(),
        reason: format!("unsupported {} bits: {}", what, bits),
    };

    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        n => return Err(unsupported("data", n)),
    };
    let stop_bits = match config.stop_bits {
        1 => StopBits::One,
        2 => StopBits::Two,
        n => return Err(unsupported("stop", n)),
    };

    Ok(serialport::new(&config.port, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(config.parity.into())
        .timeout(config.read_timeout))
}

/// List available serial port identifiers.
///
/// On macOS only `/dev/cu.*` is listed; the matching `/dev/tty.*` node
/// blocks on open until carrier detect.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| StimError::PortScan(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|_name| {
            #[cfg(target_os = "macos")]
            {
                !_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_in_settings_json() {
        assert_eq!(serde_json::to_string(&Parity::Odd).unwrap(), "\"odd\"");
        let p: Parity = serde_json::from_str("\"even\"").unwrap();
        assert_eq!(p, Parity::Even);
        assert!(matches!(serialport::Parity::from(p), serialport::Parity::Even));
    }

    #[test]
    fn test_line_summary() {
        let mut config = LinkConfig::new("/dev/ttyACM0");
        assert_eq!(line_summary(&config), "256000 baud 8N1");

        config.baud_rate = 9600;
        config.data_bits = 7;
        config.parity = Parity::Even;
        config.stop_bits = 2;
        assert_eq!(line_summary(&config), "9600 baud 7E2");
    }

    #[test]
    fn test_port_builder_refuses_unsupported_bits() {
        let mut config = LinkConfig::new("/dev/ttyACM0");
        config.data_bits = 7;
        config.stop_bits = 2;
        assert!(port_builder(&config).is_ok());

        config.data_bits = 9;
        match port_builder(&config) {
            Err(StimError::LinkOpen { port, reason }) => {
                assert_eq!(port, "/dev/ttyACM0");
                assert_eq!(reason, "unsupported data bits: 9");
            }
            _ => panic!("9 data bits accepted"),
        }

        config.data_bits = 8;
        config.stop_bits = 0;
        assert!(matches!(port_builder(&config), Err(StimError::LinkOpen { .. })));
    }
}
