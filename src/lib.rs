//! # Argos-SMD Exerciser Library
//!
//! This library contains the core logic for exercising an Argos-SMD
//! satellite-uplink transceiver over a serial AT-command link. It is split
//! into a static command catalog, the command/response exchange, and the two
//! driver loops used by the CLI: a batch self-test that walks the full
//! catalog, and a demo that configures the module and transmits an uplink
//! payload on a timer.

use std::path::PathBuf;
use std::time::Duration;

pub mod catalog;
pub mod driver;
pub mod exchange;

use catalog::RadioProfile;

/// Errors surfaced by the exchange and driver layers.
///
/// Transport failures are fatal: the self-test aborts the whole run and the
/// demo propagates out of its main sequence. Device-reported errors are not
/// represented here; they are decoded and logged without failing an exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// A read or write on an open connection (or the log file) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// All runtime settings, built once at startup and passed by reference into
/// the exchange and driver components.
#[derive(Debug, Clone)]
pub struct Config {
    /// Serial port name or path (e.g. `/dev/ttyUSB0` or `COM6`).
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout configured on the serial connection.
    pub read_timeout: Duration,
    /// Overall response budget used by the self-test read policy.
    pub response_budget: Duration,
    /// Pause between consecutive self-test commands.
    pub command_pause: Duration,
    /// Pause between demo setup steps.
    pub setup_pause: Duration,
    /// Settle delay right after opening the port.
    pub settle_delay: Duration,
    /// Interval between uplink transmissions in the demo loop.
    pub tx_interval: Duration,
    pub log_path: PathBuf,
    /// Radio configuration profile used by the demo.
    pub profile: RadioProfile,
}

impl Config {
    // Baseline settings shared by both modes, mirroring the module's
    // expected serial parameters.
    fn base(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: 9600,
            read_timeout: Duration::from_secs(2),
            response_budget: Duration::from_secs(2),
            command_pause: Duration::from_millis(500),
            setup_pause: Duration::from_millis(100),
            settle_delay: Duration::from_secs(2),
            tx_interval: Duration::from_secs(3),
            log_path: PathBuf::from("argos_log_test_command.txt"),
            profile: RadioProfile::Lda2,
        }
    }

    /// Settings for the batch self-test mode.
    pub fn for_self_test(port: &str) -> Self {
        Self::base(port)
    }

    /// Settings for the demo mode.
    pub fn for_demo(port: &str) -> Self {
        let mut config = Self::base(port);
        config.settle_delay = Duration::from_secs(1);
        config.log_path = PathBuf::from("argos_log.txt");
        config
    }
}
