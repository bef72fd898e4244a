//! Static AT-command catalog, device error-code table, and radio
//! configuration profiles for the Argos-SMD module.
//!
//! AT command set of the module (vendor documentation):
//!
//! - `AT+PING=?`       : ping the SMD module
//! - `AT+FW=?`         : read the firmware version
//! - `AT+ADDR=?`       : read the (MAC) address
//! - `AT+SECKEY=?`     : read the secret key
//! - `AT+SN=?`         : read the serial number
//! - `AT+ID=?`         : read the SMD identifier
//! - `AT+TCXO_WU=?`    : read the TCXO warm-up time
//! - `AT+RCONF=?`      : read the radio configuration
//! - `AT+RCONF=<hex>`  : write a radio configuration profile
//! - `AT+SAVE_RCONF=`  : persist the radio configuration
//! - `AT+TX=<hex>`     : send an uplink message
//! - `AT+CW=...`       : emit a continuous-wave signal
//! - `AT+LPM=?`        : read the low-power mode
//! - `AT+VERSION=?`    : read the AT protocol version
//! - `AT+UDATE=?`      : read the UTC date
//! - `AT+KMAC=0/1`     : reset / enable the KMAC profile

/// Line terminator appended to every command placed on the wire.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Marker the module prefixes to a structured error report.
pub const ERROR_MARKER: &str = "+ERROR=";

/// Description logged for error codes the vendor table does not cover.
pub const UNKNOWN_ERROR: &str = "unknown error code";

/// The full self-test command list, sent in this exact order.
pub const SELF_TEST_COMMANDS: &[&str] = &[
    "AT+KMAC=0",
    "AT+KMAC=1",
    "AT+PING=?",
    "AT+FW=?",
    "AT+ADDR=?",
    "AT+SECKEY=?",
    "AT+SN=?",
    "AT+ID=?",
    "AT+TCXO_WU=?",
    "AT+RCONF=?",
    "AT+SAVE_RCONF=",
    "AT+TX=000000000000000000000000000000000000000000000000",
    "AT+CW=1,401000000,20",
    "AT+LPM=?",
    "AT+VERSION=?",
    "AT+UDATE=?",
    // Radio configuration profiles
    "AT+RCONF=44cd3a299068292a74d2126f3402610d", // LDA2
    "AT+RCONF=bd176535b394a665bd86f354c5f424fb", // LDA2L
    "AT+RCONF=efd2412f8570581457f2d982e76d44d7", // VLDA4
    "AT+RCONF=41bc11b8980df01ba8b4b8f41099620b", // LDK
];

/// Looks up a device error code in the vendor table.
///
/// Returns `None` for codes the table does not cover; callers log
/// [`UNKNOWN_ERROR`] in that case.
pub fn error_description(code: i64) -> Option<&'static str> {
    let description = match code {
        0 => "no error (OK)",
        1 => "unknown AT command",
        2 => "invalid parameter format",
        3 => "missing parameters",
        4 => "too many parameters",
        5 => "incompatible value",
        6 => "unrecognized AT command",
        7 => "invalid ID",
        8 => "unknown ID",
        20 => "invalid user data length",
        21 => "data queue full",
        22 => "data queue empty",
        30 => "RX reception timeout",
        40 => "transceiver error (e.g. message not transmitted)",
        41 => "transceiver auto-tuning error",
        42 => "transceiver PLL error",
        43 => "transceiver oscillator timeout",
        44 => "transceiver reset",
        60 => "invalid TX frequency/modulation in configuration",
        _ => return None,
    };
    Some(description)
}

/// Radio configuration profiles of the module. Each profile is selected by
/// writing its hex blob with `AT+RCONF=` and carries the uplink payload the
/// demo transmits under that modulation/rate class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RadioProfile {
    Lda2,
    Lda2l,
    Vlda4,
    Ldk,
}

impl RadioProfile {
    /// The `AT+RCONF=` hex blob selecting this profile.
    pub fn rconf_hex(self) -> &'static str {
        match self {
            RadioProfile::Lda2 => "44cd3a299068292a74d2126f3402610d",
            RadioProfile::Lda2l => "bd176535b394a665bd86f354c5f424fb",
            RadioProfile::Vlda4 => "efd2412f8570581457f2d982e76d44d7",
            RadioProfile::Ldk => "41bc11b8980df01ba8b4b8f41099620b",
        }
    }

    /// Typical uplink payload for this profile (payload length depends on
    /// the modulation/rate class).
    pub fn tx_payload(self) -> &'static str {
        match self {
            RadioProfile::Lda2 => "cafebabe0000000000000000000000000000000000000000",
            RadioProfile::Lda2l => "000000000000000000000000000000000000000000000000",
            RadioProfile::Vlda4 => "000000",
            RadioProfile::Ldk => "00000000000000000000000000000000000000",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RadioProfile::Lda2 => "LDA2",
            RadioProfile::Lda2l => "LDA2L",
            RadioProfile::Vlda4 => "VLDA4",
            RadioProfile::Ldk => "LDK",
        }
    }
}

impl std::fmt::Display for RadioProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
