/* ratbagd-rs entrypoint: sets up tracing, loads the device database, spawns the udev monitor,
 * and starts the DBus server. */
mod actor;
mod dbus;
mod device;
mod device_database;
mod driver;
mod error;
mod macro_model;
mod path;
#[cfg(feature = "dev-hooks")]
mod test_device;
mod udev_monitor;

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Process exit codes. `ALREADY_RUNNING` is distinct from a generic startup
/// failure so supervisors (systemd, test harnesses) can tell "another
/// instance owns the bus name" apart from "something is actually broken".
mod exit_code {
    pub const USAGE: u8 = 2;
    pub const ALREADY_RUNNING: u8 = 3;
}

const USAGE: &str = "\
Usage: ratbagd [OPTIONS]

Options:
  --verbose[=raw|debug]  Increase log verbosity (default: info)
  --quiet                Only log warnings and errors
  --version              Print the version and exit
  --help                 Print this message and exit";

enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VerboseRaw,
    VerboseDebug,
}

/// Parse the fixed set of CLI flags the daemon accepts. Hand-rolled rather
/// than pulled in via a CLI crate: five flags don't need one.
fn parse_args(args: &[String]) -> Result<Verbosity, String> {
    let mut verbosity = Verbosity::Normal;

    for arg in args {
        match arg.as_str() {
            "--quiet" => verbosity = Verbosity::Quiet,
            "--verbose" => verbosity = Verbosity::Verbose,
            "--verbose=raw" => verbosity = Verbosity::VerboseRaw,
            "--verbose=debug" => verbosity = Verbosity::VerboseDebug,
            "--version" => {
                println!("ratbagd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => return Err(format!("unrecognized option '{other}'")),
        }
    }

    Ok(verbosity)
}

fn env_filter_for(verbosity: &Verbosity) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "trace",
        Verbosity::VerboseRaw => "ratbagd=trace",
        Verbosity::VerboseDebug => "debug",
    };
    EnvFilter::new(directive)
}

/* Single-threaded cooperative runtime: the object broker, commit scheduler,
 * and hotplug dispatch all interleave on this one OS thread via tokio's
 * task scheduler, matching the daemon's single-threaded reactor design. */
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let verbosity = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("ratbagd: {msg}\n\n{USAGE}");
            return ExitCode::from(exit_code::USAGE);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter_for(&verbosity))
        .init();

    info!(
        "Starting ratbagd-rs version {} (API version {})",
        env!("CARGO_PKG_VERSION"),
        dbus::manager::API_VERSION
    );

    /* Load the .device file database from the project's data directory */
    let data_dir = PathBuf::from(
        std::env::var("RATBAGD_DATA_DIR")
            .unwrap_or_else(|_| "/usr/share/libratbag".to_string()),
    );
    let device_db = device_database::load_device_database(&data_dir);

    let (device_tx, device_rx) = tokio::sync::mpsc::channel(32);

    /* Spawn the udev monitor for hidraw device hotplug */
    tokio::spawn(udev_monitor::run(device_tx.clone()));

    /* Link a default fixture device at startup so dev-hooks builds always
     * have something to point a client at without an extra LoadTestDevice
     * round trip. */
    #[cfg(feature = "dev-hooks")]
    link_default_test_device(&device_tx).await;

    /* Run the DBus server (blocks until shutdown) */
    match dbus::run_server(device_rx, device_db).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(dbus::StartupError::AlreadyRunning) => {
            ExitCode::from(exit_code::ALREADY_RUNNING)
        }
        Err(dbus::StartupError::Other(e)) => {
            error!("ratbagd failed to start: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "dev-hooks")]
async fn link_default_test_device(device_tx: &tokio::sync::mpsc::Sender<udev_monitor::DeviceAction>) {
    use test_device::spec::{build_device_info, Fixture};

    let device_info = build_device_info("test0", Fixture::default());
    let action = udev_monitor::DeviceAction::InjectTest {
        sysname: "test0".to_string(),
        device_info,
    };
    if device_tx.send(action).await.is_err() {
        error!("failed to link default test device: event loop channel closed");
    } else {
        info!("Linked default test device 'test0'");
    }
}
