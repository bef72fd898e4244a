use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use argos_smd::catalog::RadioProfile;
use argos_smd::{driver, Config};

// The main entry point for the command-line exerciser application.
#[derive(Parser)]
#[command(
    name = "argos_cli",
    version,
    about = "Serial AT-command exerciser for the Argos-SMD satellite uplink module"
)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send the full AT self-test catalog once and log every exchange
    SelfTest {
        /// Serial port of the module (e.g. /dev/ttyUSB0 or COM6)
        port: String,
        /// Baud rate of the serial link
        #[arg(long, default_value_t = 9600)]
        baud: u32,
        /// Log file (default: argos_log_test_command.txt)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Configure the module, then transmit an uplink payload on a timer;
    /// Ctrl+C drops to an interactive prompt
    Demo {
        /// Serial port of the module (e.g. /dev/ttyUSB0 or COM6)
        port: String,
        /// Baud rate of the serial link
        #[arg(long, default_value_t = 9600)]
        baud: u32,
        /// Seconds between uplink transmissions
        #[arg(long, default_value_t = 3)]
        interval: u64,
        /// Radio configuration profile to write before transmitting
        #[arg(long, value_enum, default_value = "lda2")]
        profile: RadioProfile,
        /// Log file (default: argos_log.txt)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.mode {
        Mode::SelfTest {
            port,
            baud,
            log_file,
        } => {
            let mut config = Config::for_self_test(&port);
            config.baud_rate = baud;
            if let Some(path) = log_file {
                config.log_path = path;
            }
            println!("AT command self-test - opening serial port...");
            driver::run_self_test(&config)
        }
        Mode::Demo {
            port,
            baud,
            interval,
            profile,
            log_file,
        } => {
            let mut config = Config::for_demo(&port);
            config.baud_rate = baud;
            config.tx_interval = Duration::from_secs(interval);
            config.profile = profile;
            if let Some(path) = log_file {
                config.log_path = path;
            }

            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&interrupted);
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
                eprintln!("[ERROR] Could not install interrupt handler: {e}");
                process::exit(1);
            }

            println!(
                "Starting demo: {} uplink every {} seconds. Press Ctrl+C for the prompt.",
                config.profile, interval
            );
            driver::run_demo(&config, interrupted)
        }
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {e}");
        process::exit(1);
    }
}
