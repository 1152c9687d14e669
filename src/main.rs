use std::time::Duration;

use anyhow::Context;
use ble_peripheral_rust::{gatt::peripheral_event::PeripheralEvent, uuid::ShortUuid};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use blehub::advertisement::Advertisement;
use blehub::ble::ble_owner_task;
use blehub::config::{Args, Config};
use blehub::consts::*;
use blehub::hid::{HidOptions, build_application};
use blehub::host_power::{get_battery_percent, spawn_battery_monitor};
use blehub::input::{AppCmd, spawn_simulation, spawn_stdin_reader};

const BATTERY_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args)?;
    tracing::debug!(?config, "Configuration loaded");

    let app = build_application(&HidOptions {
        profile: config.profile,
        mouse_layout: config.mouse_layout,
        device_info: config.device_info.clone(),
        battery: config.battery.then(|| get_battery_percent().unwrap_or(100)),
    });

    let mut service_uuids = vec![
        Uuid::from_short(UUID_HID_SERVICE),
        Uuid::from_short(UUID_DIS_SERVICE),
    ];
    if config.battery {
        service_uuids.push(Uuid::from_short(UUID_BAS_SERVICE));
    }
    let advert = Advertisement::peripheral(config.device_name.clone(), service_uuids, config.appearance())
        .with_discoverable(config.discoverable)
        .with_tx_power(config.include_tx_power);

    let (cmd_tx, cmd_rx) = mpsc::channel::<AppCmd>(256);
    let (evt_tx, evt_rx) = mpsc::channel::<PeripheralEvent>(256);

    if config.stdin {
        spawn_stdin_reader(cmd_tx.clone());
    }
    if config.simulate.enabled {
        spawn_simulation(cmd_tx.clone(), config.simulate.interval(), config.simulate.step);
    }
    if config.battery {
        spawn_battery_monitor(cmd_tx.clone(), BATTERY_POLL_INTERVAL);
    }
    // Held so the command channel stays open with no producers running.
    let _cmd_tx = cmd_tx;

    ble_owner_task(app, advert, cmd_rx, evt_rx, evt_tx).await
}
