//! Driver loops: the batch self-test, the demo configuration and transmit
//! sequence, and the interactive prompt the demo falls back to.

use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;

use crate::catalog::{RadioProfile, SELF_TEST_COMMANDS};
use crate::exchange::{
    send_command, FixedBudgetReader, IdleTimeoutReader, ResponseReader, TransactionLog,
};
use crate::{Config, Error};

/// Opens the serial connection described by the configuration. The returned
/// handle is the single exclusively-owned transport for the whole run;
/// dropping it on any exit path releases the device.
fn open_port(config: &Config) -> Result<Box<dyn serialport::SerialPort>, Error> {
    info!(
        "opening {} at {} baud, read timeout {:?}",
        config.port, config.baud_rate, config.read_timeout
    );
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout)
        .open()?;
    Ok(port)
}

/// Runs the batch self-test: every catalog command once, in order, with a
/// fixed pause in between. A serial open failure aborts the whole run.
pub fn run_self_test(config: &Config) -> Result<(), Error> {
    let mut port = open_port(config)?;
    thread::sleep(config.settle_delay);

    let log = TransactionLog::new(&config.log_path);
    let reader = FixedBudgetReader::new(config.response_budget);
    run_batch(
        &mut port,
        SELF_TEST_COMMANDS,
        &reader,
        &log,
        config.command_pause,
    )?;

    println!("\nSelf-test finished.");
    Ok(())
}

/// Sends each command exactly once, never pipelining: every response is
/// captured and logged before the next command goes out.
pub fn run_batch<P: Read + Write>(
    port: &mut P,
    commands: &[&str],
    reader: &dyn ResponseReader,
    log: &TransactionLog,
    pause: Duration,
) -> Result<(), Error> {
    for command in commands {
        send_command(port, command, reader, log)?;
        thread::sleep(pause);
    }
    Ok(())
}

/// The fixed status-query and configuration sequence the demo runs before
/// its transmit loop, in the exact order the module expects.
pub fn demo_setup_commands(profile: RadioProfile) -> Vec<String> {
    vec![
        "AT+PING=?".to_string(),
        "AT+FW=?".to_string(),
        "AT+ADDR=?".to_string(),
        "AT+SN=?".to_string(),
        "AT+ID=?".to_string(),
        // KMAC reload: reset the profile, then re-enable it.
        "AT+KMAC=0".to_string(),
        "AT+KMAC=1".to_string(),
        format!("AT+RCONF={}", profile.rconf_hex()),
        "AT+RCONF=?".to_string(),
        "AT+SAVE_RCONF=".to_string(),
    ]
}

/// Runs the demo: configuration sequence, then the transmit loop until the
/// first interrupt, then the interactive prompt until an exit keyword, end
/// of input, or a second interrupt.
pub fn run_demo(config: &Config, interrupted: Arc<AtomicBool>) -> Result<(), Error> {
    let mut port = open_port(config)?;
    thread::sleep(config.settle_delay);

    let log = TransactionLog::new(&config.log_path);
    let reader = IdleTimeoutReader;

    for command in demo_setup_commands(config.profile) {
        send_command(&mut port, &command, &reader, &log)?;
        thread::sleep(config.setup_pause);
    }

    run_transmit_loop(&mut port, config, &reader, &log, &interrupted)?;

    // First interrupt drops to the prompt; it never returns to the loop.
    interrupted.store(false, Ordering::SeqCst);
    println!("\nTransmit loop interrupted. Entering interactive mode.");
    let lines = spawn_stdin_reader();
    run_interactive(&lines, &mut port, &reader, &log, &interrupted)
}

/// Feeds operator-typed lines through a channel from a background thread.
/// The prompt loop can then keep watching the interrupt flag instead of
/// blocking in a stdin read that a signal does not unblock. The sender is
/// dropped on end of input, which the prompt loop sees as a disconnect.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        loop {
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Transmits the profile payload on a fixed interval until interrupted. The
/// flag is only checked between iterations, never mid-exchange.
pub fn run_transmit_loop<P: Read + Write>(
    port: &mut P,
    config: &Config,
    reader: &dyn ResponseReader,
    log: &TransactionLog,
    interrupted: &AtomicBool,
) -> Result<(), Error> {
    let command = format!("AT+TX={}", config.profile.tx_payload());
    while !interrupted.load(Ordering::SeqCst) {
        println!("\nSending {} uplink message...", config.profile.name());
        send_command(port, &command, reader, log)?;
        println!("Waiting {} seconds...", config.tx_interval.as_secs());
        sleep_interruptible(config.tx_interval, interrupted);
    }
    Ok(())
}

// Sleeps in short slices so an interrupt is noticed promptly without ever
// cancelling an exchange in flight.
fn sleep_interruptible(total: Duration, interrupted: &AtomicBool) {
    let slice = Duration::from_millis(100);
    let deadline = Instant::now() + total;
    while !interrupted.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(slice));
    }
}

/// Forwards operator-typed lines to the module until an exit keyword
/// (`exit`/`quit`, case-insensitive), end of input, or an interrupt.
///
/// Lines arrive through the channel fed by [`spawn_stdin_reader`]; waiting
/// on the channel with a short timeout keeps the interrupt flag live even
/// while no input is coming, so a second Ctrl+C ends the program without
/// the operator having to press Enter first.
pub fn run_interactive<P: Read + Write>(
    lines: &Receiver<String>,
    port: &mut P,
    reader: &dyn ResponseReader,
    log: &TransactionLog,
    interrupted: &AtomicBool,
) -> Result<(), Error> {
    println!("Type an AT command, or 'exit' to quit.");
    print!(">>> ");
    io::stdout().flush()?;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            println!("\nInterrupted.");
            break;
        }

        let line = match lines.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break, // end of input
        };

        let command = line.trim();
        if command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit") {
            println!("Leaving interactive mode.");
            break;
        }
        if !command.is_empty() {
            send_command(port, command, reader, log)?;
        }
        print!(">>> ");
        io::stdout().flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::testing::{structural_lines, temp_log, ScriptedPort};

    fn demo_config() -> Config {
        let mut config = Config::for_demo("test-port");
        config.tx_interval = Duration::ZERO;
        config
    }

    // Test double that raises the interrupt flag as soon as the first
    // command hits the wire, so the transmit loop runs exactly once.
    struct InterruptOnFirstWrite {
        port: ScriptedPort,
        flag: Arc<AtomicBool>,
    }

    impl Read for InterruptOnFirstWrite {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.port.read(buf)
        }
    }

    impl Write for InterruptOnFirstWrite {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.flag.store(true, Ordering::SeqCst);
            self.port.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.port.flush()
        }
    }

    #[test]
    fn batch_alternates_send_and_receive_records() {
        let mut port = ScriptedPort::replying(&["PONG", "1.2.3"]);
        let log = temp_log("batch-order");
        run_batch(
            &mut port,
            &["AT+PING=?", "AT+FW=?"],
            &IdleTimeoutReader,
            &log,
            Duration::ZERO,
        )
        .unwrap();

        assert_eq!(
            structural_lines(&log),
            vec!["> AT+PING=?", "< PONG", "> AT+FW=?", "< 1.2.3"]
        );
        assert_eq!(port.written, b"AT+PING=?\r\nAT+FW=?\r\n");
    }

    #[test]
    fn identical_runs_produce_identical_log_structure() {
        let commands = &["AT+SN=?", "AT+ID=?"];
        let mut first_lines = None;
        for name in ["idempotent-a", "idempotent-b"] {
            let mut port = ScriptedPort::replying(&["+SN=42", "+ID=7"]);
            let log = temp_log(name);
            run_batch(&mut port, commands, &IdleTimeoutReader, &log, Duration::ZERO).unwrap();
            let lines = structural_lines(&log);
            if let Some(previous) = first_lines.take() {
                assert_eq!(lines, previous);
            }
            first_lines = Some(lines);
        }
    }

    #[test]
    fn demo_setup_sequence_is_exact() {
        assert_eq!(
            demo_setup_commands(RadioProfile::Lda2),
            vec![
                "AT+PING=?",
                "AT+FW=?",
                "AT+ADDR=?",
                "AT+SN=?",
                "AT+ID=?",
                "AT+KMAC=0",
                "AT+KMAC=1",
                "AT+RCONF=44cd3a299068292a74d2126f3402610d",
                "AT+RCONF=?",
                "AT+SAVE_RCONF=",
            ]
        );
    }

    #[test]
    fn transmit_loop_sends_profile_payload_until_interrupted() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut port = InterruptOnFirstWrite {
            port: ScriptedPort::replying(&["OK"]),
            flag: Arc::clone(&flag),
        };
        let log = temp_log("tx-loop");
        run_transmit_loop(&mut port, &demo_config(), &IdleTimeoutReader, &log, &flag).unwrap();

        assert_eq!(
            port.port.written,
            b"AT+TX=cafebabe0000000000000000000000000000000000000000\r\n"
        );
    }

    #[test]
    fn transmit_loop_with_flag_already_raised_sends_nothing() {
        let flag = AtomicBool::new(true);
        let mut port = ScriptedPort::replying(&[]);
        let log = temp_log("tx-loop-preempted");
        run_transmit_loop(&mut port, &demo_config(), &IdleTimeoutReader, &log, &flag).unwrap();
        assert!(port.written.is_empty());
    }

    // A prompt input channel preloaded with the given lines. Dropping the
    // returned sender simulates end of input.
    fn line_channel(lines: &[&str]) -> (mpsc::Sender<String>, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            tx.send(format!("{line}\n")).unwrap();
        }
        (tx, rx)
    }

    #[test]
    fn interactive_forwards_commands_until_exit() {
        let (_tx, input) = line_channel(&["AT+PING=?", "exit", "AT+FW=?"]);
        let mut port = ScriptedPort::replying(&["PONG"]);
        let log = temp_log("interactive-exit");
        let flag = AtomicBool::new(false);
        run_interactive(&input, &mut port, &IdleTimeoutReader, &log, &flag).unwrap();

        // Nothing after the exit keyword reaches the wire.
        assert_eq!(port.written, b"AT+PING=?\r\n");
    }

    #[test]
    fn interactive_exit_keywords_are_case_insensitive() {
        for keyword in ["QUIT", "Exit", "quit"] {
            let (_tx, input) = line_channel(&[keyword]);
            let mut port = ScriptedPort::replying(&[]);
            let log = temp_log("interactive-keywords");
            let flag = AtomicBool::new(false);
            run_interactive(&input, &mut port, &IdleTimeoutReader, &log, &flag).unwrap();
            assert!(port.written.is_empty());
        }
    }

    #[test]
    fn interactive_skips_blank_lines_and_stops_on_eof() {
        let (tx, input) = line_channel(&["", "   ", "AT+SN=?"]);
        drop(tx); // end of input after the last line
        let mut port = ScriptedPort::replying(&["+SN=1"]);
        let log = temp_log("interactive-blank");
        let flag = AtomicBool::new(false);
        run_interactive(&input, &mut port, &IdleTimeoutReader, &log, &flag).unwrap();

        assert_eq!(port.written, b"AT+SN=?\r\n");
    }

    #[test]
    fn interactive_stops_when_interrupted() {
        let (_tx, input) = line_channel(&["AT+PING=?"]);
        let mut port = ScriptedPort::replying(&[]);
        let log = temp_log("interactive-interrupted");
        let flag = AtomicBool::new(true);
        run_interactive(&input, &mut port, &IdleTimeoutReader, &log, &flag).unwrap();
        assert!(port.written.is_empty());
    }

    #[test]
    fn interactive_honors_interrupt_while_waiting_for_input() {
        // The operator presses Ctrl+C at an empty prompt: no line ever
        // arrives, yet the prompt loop must return promptly.
        let (_tx, input) = line_channel(&[]);
        let mut port = ScriptedPort::replying(&[]);
        let log = temp_log("interactive-interrupt-at-prompt");
        let flag = Arc::new(AtomicBool::new(false));

        let raiser = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
            })
        };
        run_interactive(&input, &mut port, &IdleTimeoutReader, &log, &flag).unwrap();
        raiser.join().unwrap();

        assert!(port.written.is_empty());
    }
}
