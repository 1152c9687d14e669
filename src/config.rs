use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use crate::hid::{DeviceInfo, Profile};
use crate::report::MouseLayout;

#[derive(Parser, Debug, Default)]
#[command(name = "blehub", version, about = "BLE HID-over-GATT mouse/keyboard peripheral")]
pub struct Args {
    /// JSON configuration file; CLI flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Advertised local name
    #[arg(short, long)]
    pub name: Option<String>,

    /// GAP appearance (e.g. 0x03C2 for a mouse)
    #[arg(long, value_parser = parse_u16)]
    pub appearance: Option<u16>,

    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    #[arg(long, value_enum)]
    pub mouse_layout: Option<MouseLayout>,

    /// Emit a periodic self-test mouse movement
    #[arg(long)]
    pub simulate: bool,

    /// Do not read input commands from stdin
    #[arg(long)]
    pub no_stdin: bool,

    /// Do not expose the Battery Service
    #[arg(long)]
    pub no_battery: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid u16 '{s}': {e}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulateConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub step: i32,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 2000,
            step: 10,
        }
    }
}

impl SimulateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Configuration record consumed at process start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_name: String,
    /// Falls back to the profile's appearance when unset.
    pub appearance: Option<u16>,
    pub profile: Profile,
    pub mouse_layout: MouseLayout,
    pub discoverable: bool,
    pub include_tx_power: bool,
    pub simulate: SimulateConfig,
    pub stdin: bool,
    pub battery: bool,
    pub device_info: DeviceInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "BLE-HID".to_owned(),
            appearance: None,
            profile: Profile::default(),
            mouse_layout: MouseLayout::default(),
            discoverable: true,
            include_tx_power: true,
            simulate: SimulateConfig::default(),
            stdin: true,
            battery: true,
            device_info: DeviceInfo::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parsing configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// File (if any) first, then CLI overrides.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(name) = &args.name {
            self.device_name = name.clone();
        }
        if args.appearance.is_some() {
            self.appearance = args.appearance;
        }
        if let Some(profile) = args.profile {
            self.profile = profile;
        }
        if let Some(layout) = args.mouse_layout {
            self.mouse_layout = layout;
        }
        if args.simulate {
            self.simulate.enabled = true;
        }
        if args.no_stdin {
            self.stdin = false;
        }
        if args.no_battery {
            self.battery = false;
        }
    }

    pub fn appearance(&self) -> u16 {
        self.appearance.unwrap_or_else(|| self.profile.appearance())
    }
}
