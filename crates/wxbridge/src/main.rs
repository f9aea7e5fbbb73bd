//! wxbridge daemon
//!
//! Polls WeatherLink Live hubs on the local network, listens for their
//! UDP broadcasts, and republishes normalized readings to CWOP, Weather
//! Underground and PWSWeather on configurable schedules.

use anyhow::Context;
use argh::FromArgs;
use tokio::sync::watch;

use wxbridge::config::BridgeConfig;
use wxbridge::dispatcher::{bind_configured_sensors, Dispatcher};
use wxbridge::registry::{default_state_file, SensorRegistry};

#[derive(FromArgs)]
/// wxbridge - bridge WeatherLink Live hubs to weather upload services
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c', default = "String::from(\"wxbridge.yaml\")")]
    config: String,

    /// list bound and discovered sensors, then exit
    #[argh(switch)]
    list_sensors: bool,

    /// forget discovered sensors that are not bound, then exit
    #[argh(switch)]
    purge_known: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    let config = BridgeConfig::from_file(&args.config)
        .with_context(|| format!("loading config {}", args.config))?;
    let mut registry =
        SensorRegistry::load(default_state_file()).context("loading sensor table")?;

    // One-shot registry commands
    if args.list_sensors {
        bind_configured_sensors(&mut registry, &config);
        println!("Bound sensors:");
        for line in registry.list_bound(None) {
            println!("  {}", line);
        }
        println!("Available sensors:");
        for line in registry.list_available(None) {
            println!("  {}", line);
        }
        return Ok(());
    }

    if args.purge_known {
        bind_configured_sensors(&mut registry, &config);
        let removed = registry.purge_available();
        registry.save().context("saving sensor table")?;
        println!("Purged {} unbound sensors", removed);
        return Ok(());
    }

    log::info!("Starting wxbridge...");

    // Set up Ctrl+C handler
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let mut dispatcher = Dispatcher::from_config(&config, registry)?;

    log::info!("wxbridge running. Press Ctrl+C to exit.");
    dispatcher.run(shutdown_rx).await;

    log::info!("wxbridge stopped.");
    Ok(())
}
