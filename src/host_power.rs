use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::input::AppCmd;

/// Try to read host battery percentage as 0-100.
/// Returns None if not available on this platform or not found.
pub fn get_battery_percent() -> Option<u8> {
    #[cfg(target_os = "linux")]
    {
        return linux_sysfs_battery_percent(Path::new("/sys/class/power_supply"));
    }

    #[cfg(all(not(target_os = "linux"), feature = "battery-crate"))]
    {
        return battery_crate_percent();
    }

    #[allow(unreachable_code)]
    None
}

/// Scan a `power_supply` class directory for the first battery's capacity.
pub fn linux_sysfs_battery_percent(root: &Path) -> Option<u8> {
    let entries = fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let p = entry.path();
        // Supplies without a `type` file are matched by their BAT* name
        let ty = fs::read_to_string(p.join("type")).ok().map(|s| s.trim().to_owned());
        if let Some(t) = ty {
            if t != "Battery" {
                continue;
            }
        } else if !p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("BAT"))
        {
            continue;
        }
        if let Ok(s) = fs::read_to_string(p.join("capacity")) {
            if let Ok(v) = s.trim().parse::<u8>() {
                return Some(v.min(100));
            }
        }
    }
    None
}

#[cfg(all(not(target_os = "linux"), feature = "battery-crate"))]
fn battery_crate_percent() -> Option<u8> {
    let manager = battery::Manager::new().ok()?;
    for b in manager.batteries().ok()?.flatten() {
        let v = b.state_of_charge().value * 100.0;
        let pct = v.round() as i16; // allow bounds
        return Some(pct.clamp(0, 100) as u8);
    }
    None
}

/// Poll the host battery every `period` and feed readings to the event loop.
/// Hosts without a battery produce nothing.
pub fn spawn_battery_monitor(tx: mpsc::Sender<AppCmd>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let Some(level) = get_battery_percent() else {
                continue;
            };
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(AppCmd::Battery(level)) {
                break;
            }
        }
    })
}
