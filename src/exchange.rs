//! Command/response exchange with the module, the response-read strategies,
//! and the append-only transaction log.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::debug;

use crate::catalog::{self, ERROR_MARKER, LINE_TERMINATOR, UNKNOWN_ERROR};
use crate::Error;

/// Strategy deciding when a response capture is complete.
///
/// The two implementations exhibit genuinely different timing behavior and
/// are kept as distinct named policies: [`FixedBudgetReader`] tolerates idle
/// gaps until an overall budget elapses, [`IdleTimeoutReader`] gives up on
/// the first idle read.
pub trait ResponseReader {
    /// Accumulates response bytes from `port` until the stop condition of
    /// the strategy is met. An empty response is not an error; it means the
    /// device stayed silent.
    fn read_response(&self, port: &mut dyn Read) -> io::Result<Vec<u8>>;
}

/// Self-test policy: a timed-out read ends the capture only once the elapsed
/// time since the loop started exceeds a fixed budget. Bytes arriving inside
/// the budget keep the capture alive across idle gaps.
pub struct FixedBudgetReader {
    budget: Duration,
}

impl FixedBudgetReader {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

impl ResponseReader for FixedBudgetReader {
    fn read_response(&self, port: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        let start = Instant::now();
        loop {
            // Ok(0) and a timed-out read both mean the device yielded
            // nothing this round.
            let idle = match port.read(&mut byte) {
                Ok(0) => true,
                Ok(_) => {
                    response.push(byte[0]);
                    false
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
                Err(e) => return Err(e),
            };
            if idle {
                if start.elapsed() > self.budget {
                    debug!("response budget elapsed after {} bytes", response.len());
                    break;
                }
                // Keep sources that report idleness instantly (EOF-style
                // readers) from spinning for the whole budget.
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(response)
    }
}

/// Demo policy: the serial connection's own read timeout alone gates
/// termination; the first read that yields nothing ends the capture.
pub struct IdleTimeoutReader;

impl ResponseReader for IdleTimeoutReader {
    fn read_response(&self, port: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => response.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        debug!("device idle after {} bytes", response.len());
        Ok(response)
    }
}

/// Append-only log of every exchange.
///
/// Each record goes through a scoped open/append/close, so records written
/// before a transport failure still land on disk. No rotation, no size
/// limit.
pub struct TransactionLog {
    path: PathBuf,
}

impl TransactionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating the file on first use.
    pub fn append(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// Local-time timestamp in the log record format.
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Outcome of scanning a response for a structured `+ERROR=` report.
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorReport {
    /// A code listed in the vendor table.
    Known {
        code: i64,
        description: &'static str,
    },
    /// A numeric code the table does not cover (including negative ones).
    Unknown { code: i64 },
    /// Marker present but the code is not an integer.
    Malformed,
}

/// Finds an error report in a decoded response.
///
/// The code is the whitespace-delimited token right after the marker, parsed
/// as an integer; any integer outside the vendor table is reported as
/// [`ErrorReport::Unknown`], anything non-numeric as
/// [`ErrorReport::Malformed`]. Returns `None` when the marker is absent.
pub fn parse_error_report(response: &str) -> Option<ErrorReport> {
    let tail = response.split_once(ERROR_MARKER)?.1;
    let token = tail.split_whitespace().next().unwrap_or("");
    let report = match token.parse::<i64>() {
        Ok(code) => match catalog::error_description(code) {
            Some(description) => ErrorReport::Known { code, description },
            None => ErrorReport::Unknown { code },
        },
        Err(_) => ErrorReport::Malformed,
    };
    Some(report)
}

/// Sends one AT command and captures the module's reply.
///
/// The command plus the line terminator goes out as a single contiguous
/// write. The reply is accumulated per `reader`'s stop condition, decoded
/// with lossy UTF-8 replacement and trimmed. Both directions are logged and
/// echoed before the caller can send the next command, and any `+ERROR=`
/// fragment in the reply is decoded against the vendor table without
/// failing the exchange.
pub fn send_command<P: Read + Write>(
    port: &mut P,
    command: &str,
    reader: &dyn ResponseReader,
    log: &TransactionLog,
) -> Result<String, Error> {
    let now = timestamp();
    println!("\n{now} > {command}");
    log.append(&format!("[{now}] > {command}"))?;

    let mut frame = Vec::with_capacity(command.len() + LINE_TERMINATOR.len());
    frame.extend_from_slice(command.as_bytes());
    frame.extend_from_slice(LINE_TERMINATOR.as_bytes());
    port.write_all(&frame)?;
    debug!("wrote {} bytes", frame.len());

    let raw = reader.read_response(port)?;
    let decoded = String::from_utf8_lossy(&raw).trim().to_string();
    println!("< {decoded}");
    log.append(&format!("[{now}] < {decoded}"))?;

    match parse_error_report(&decoded) {
        Some(ErrorReport::Known { code, description }) => {
            println!("device error +ERROR={code}: {description}");
            log.append(&format!("[ERROR {code}] {description}"))?;
        }
        Some(ErrorReport::Unknown { code }) => {
            println!("device error +ERROR={code}: {UNKNOWN_ERROR}");
            log.append(&format!("[ERROR {code}] {UNKNOWN_ERROR}"))?;
        }
        Some(ErrorReport::Malformed) => {
            println!("device error report not recognized");
            log.append("[ERROR] malformed error report")?;
        }
        None => {}
    }

    Ok(decoded)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::TransactionLog;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// One scripted read outcome of a fake device.
    pub(crate) enum Step {
        Byte(u8),
        Idle,
    }

    /// In-memory serial port double: replays scripted read outcomes and
    /// records everything written to it. Once the script is exhausted every
    /// read times out, like a silent device.
    pub(crate) struct ScriptedPort {
        steps: VecDeque<Step>,
        pub(crate) written: Vec<u8>,
    }

    impl ScriptedPort {
        pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                written: Vec::new(),
            }
        }

        /// A port replying with each string in turn, going idle after each.
        pub(crate) fn replying(replies: &[&str]) -> Self {
            let mut steps = Vec::new();
            for reply in replies {
                steps.extend(reply.bytes().map(Step::Byte));
                steps.push(Step::Idle);
            }
            Self::new(steps)
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Step::Byte(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Step::Idle) | None => {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "device silent"))
                }
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A fresh log file in the temp directory, removed from previous runs.
    pub(crate) fn temp_log(name: &str) -> TransactionLog {
        let mut path = std::env::temp_dir();
        path.push(format!("argos-smd-test-{}-{}.txt", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        TransactionLog::new(path)
    }

    /// Log lines with their timestamp prefix removed, for structural
    /// comparison across runs.
    pub(crate) fn structural_lines(log: &TransactionLog) -> Vec<String> {
        std::fs::read_to_string(log.path())
            .expect("log file readable")
            .lines()
            .map(|line| match line.split_once("] ") {
                Some((prefix, rest)) if prefix.starts_with('[') && !prefix.starts_with("[ERROR") => {
                    rest.to_string()
                }
                _ => line.to_string(),
            })
            .collect()
    }
}
