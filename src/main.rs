use std::error::Error;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::SignalKind;

use padbridge::bluetooth;
use padbridge::cli::Args;
use padbridge::config::{self, DebugSpec};
use padbridge::constants::{DEBUG_ENV, GADGET_FFS_DIR, PROFILE_PATH, SHUTDOWN_GRACE_MS};
use padbridge::drivers::dualsense::driver::DualSenseDriver;
use padbridge::input::registry::Registry;
use padbridge::input::source;
use padbridge::lightbar::LightbarReader;
use padbridge::output::OutputForwarder;
use padbridge::profile::applier::Applier;
use padbridge::profile::Profile;
use padbridge::state::bus::StateBus;
use padbridge::state::system::SystemStateMachine;
use padbridge::target::ps3::gadget::GadgetEndpoints;
use padbridge::target::ps3::{ControlChannel, DataChannel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let spec_text = args.debug.or_else(|| std::env::var(DEBUG_ENV).ok());
    let spec = match spec_text.as_deref().map(DebugSpec::parse) {
        Some(Ok(spec)) => spec,
        Some(Err(e)) => {
            eprintln!("Invalid debug spec ({e}); continuing with errors only");
            DebugSpec::errors_only()
        }
        None => DebugSpec::errors_only(),
    };
    config::init_logging(&spec);

    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting padbridge v{VERSION}");

    // Source drivers, in match precedence order.
    let mut registry = Registry::new();
    if let Err(e) = registry.register(Arc::new(DualSenseDriver::new())) {
        log::error!("Driver registration failed: {e}");
        process::exit(1);
    }
    let registry = Arc::new(registry);
    let bus = Arc::new(StateBus::new());

    // Bluetooth command task serving the state machine's link requests.
    let (bt_client, bt_task) = bluetooth::channel(None);
    let bt_handle = tokio::spawn(bt_task.run());

    let system = Arc::new(SystemStateMachine::new(bus.clone(), Box::new(bt_client)));

    // Without the gadget endpoints there is no console to talk to.
    let endpoints = match GadgetEndpoints::open(GADGET_FFS_DIR) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            log::error!("Unable to bind gadget endpoints under {GADGET_FFS_DIR}: {e}");
            process::exit(1);
        }
    };

    let operational = Arc::new(AtomicBool::new(false));
    let control = ControlChannel::new(
        endpoints.control,
        operational.clone(),
        bus.clone(),
        system.clone(),
    );
    let applier = Applier::new(Profile::load(Path::new(PROFILE_PATH)));
    let data = DataChannel::new(
        endpoints.interrupt_in,
        endpoints.interrupt_out,
        operational,
        bus.clone(),
        registry.clone(),
        system.clone(),
        applier,
    );
    let forwarder = OutputForwarder::new(
        bus.clone(),
        registry.clone(),
        system.clone(),
        LightbarReader::new(),
    );

    let running = Arc::new(AtomicBool::new(true));
    let mut workers = Vec::new();
    {
        let registry = registry.clone();
        let bus = bus.clone();
        let system = system.clone();
        let running = running.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            source::run(registry, bus, system, running)
        }));
    }
    {
        let running = running.clone();
        workers.push(tokio::task::spawn_blocking(move || control.run(running)));
    }
    {
        let running = running.clone();
        workers.push(tokio::task::spawn_blocking(move || data.run(running)));
    }
    {
        let running = running.clone();
        workers.push(tokio::task::spawn_blocking(move || forwarder.run(running)));
    }

    let mut sig_term = tokio::signal::unix::signal(SignalKind::terminate())?;
    let mut sig_int = tokio::signal::unix::signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received CTRL+C. Shutting down.");
        },
        _ = sig_int.recv() => {
            log::info!("Received SIGINT. Shutting down.");
        },
        _ = sig_term.recv() => {
            log::info!("Received SIGTERM. Shutting down.");
        }
    }

    running.store(false, Ordering::SeqCst);
    let grace = Duration::from_millis(SHUTDOWN_GRACE_MS);
    for worker in workers {
        if tokio::time::timeout(grace, worker).await.is_err() {
            log::warn!("A worker did not stop within the shutdown grace period");
        }
    }
    bt_handle.abort();

    log::info!("padbridge stopped");
    Ok(())
}
