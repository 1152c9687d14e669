//! Input event interface and the producers that feed it.
//!
//! Producers run off the event loop (stdin on its own thread, the simulator
//! as a tokio task) and hand commands over a bounded channel with
//! `try_send`, so they never block on, or touch, the GATT tree directly.

use std::io::BufRead;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::{GattError, GattResult};
use crate::gatt::Application;
use crate::hid::{key_name_to_usage, keyboard_usage_to_modifier};
use crate::report::{Delivery, InputReport, KeyboardReport, MouseReport};

/// One discrete input snapshot; `report_id: None` routes to the first
/// report whose layout fits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub report_id: Option<u8>,
    pub report: InputReport,
}

impl InputEvent {
    pub fn mouse(buttons: u8, dx: i32, dy: i32, wheel: i32) -> Self {
        Self {
            report_id: None,
            report: InputReport::Mouse(MouseReport {
                buttons,
                dx,
                dy,
                wheel,
            }),
        }
    }

    pub fn keyboard(modifiers: u8, keycodes: Vec<u8>) -> Self {
        Self {
            report_id: None,
            report: InputReport::Keyboard(KeyboardReport {
                modifiers,
                keycodes,
            }),
        }
    }
}

impl Application {
    /// Route an input event to its report, resolving a missing report id
    /// to the first report of the matching kind.
    pub fn send_input(&mut self, event: &InputEvent) -> GattResult<Delivery> {
        let report_id = match event.report_id {
            Some(id) => id,
            None => self
                .default_report_id(&event.report)
                .ok_or_else(|| GattError::InvalidArgs("no report accepts this input".to_owned()))?,
        };
        self.send_report(report_id, &event.report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCmd {
    Input(InputEvent),
    KeyDown(u8),
    KeyUp(u8),
    Battery(u8),
    Exit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("invalid number: {0}")]
    Number(String),
    #[error("unknown key: {0}")]
    Key(String),
    #[error("expected at least {0} arguments")]
    Arity(usize),
}

fn parse_int(s: &str) -> Result<i32, ParseError> {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| ParseError::Number(s.to_owned()))
}

fn parse_u8(s: &str) -> Result<u8, ParseError> {
    u8::try_from(parse_int(s)?).map_err(|_| ParseError::Number(s.to_owned()))
}

fn parse_mouse(args: &[&str]) -> Result<AppCmd, ParseError> {
    if args.len() < 2 {
        return Err(ParseError::Arity(2));
    }
    let dx = parse_int(args[0])?;
    let dy = parse_int(args[1])?;
    let buttons = args.get(2).map(|s| parse_u8(s)).transpose()?.unwrap_or(0);
    let wheel = args.get(3).map(|s| parse_int(s)).transpose()?.unwrap_or(0);
    Ok(AppCmd::Input(InputEvent::mouse(buttons, dx, dy, wheel)))
}

fn parse_key(s: &str) -> Result<u8, ParseError> {
    key_name_to_usage(s)
        .or_else(|| parse_u8(s).ok())
        .ok_or_else(|| ParseError::Key(s.to_owned()))
}

/// Parse one line of the CLI harness:
///
/// - `dx dy [buttons] [wheel]` or `m dx dy [buttons] [wheel]`: mouse report
/// - `k [+mod ...] [key ...]`: keyboard report; bare `k` releases everything
/// - `tap key ...`: press then release each key
/// - `battery N`, `q` / `quit` / `exit`
pub fn parse_command(line: &str) -> Result<Vec<AppCmd>, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = words.split_first() else {
        return Err(ParseError::Empty);
    };
    match head.to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => Ok(vec![AppCmd::Exit]),
        "m" => Ok(vec![parse_mouse(rest)?]),
        "battery" => {
            let level = rest.first().ok_or(ParseError::Arity(1))?;
            Ok(vec![AppCmd::Battery(parse_u8(level)?)])
        }
        "k" => {
            let mut modifiers = 0u8;
            let mut keycodes = Vec::new();
            for word in rest {
                let usage = parse_key(word.trim_start_matches('+'))?;
                match keyboard_usage_to_modifier(usage) {
                    Some(m) => modifiers |= m,
                    None => keycodes.push(usage),
                }
            }
            Ok(vec![AppCmd::Input(InputEvent::keyboard(modifiers, keycodes))])
        }
        "tap" => {
            if rest.is_empty() {
                return Err(ParseError::Arity(1));
            }
            let usages = rest.iter().map(|w| parse_key(w)).collect::<Result<Vec<_>, _>>()?;
            let mut cmds: Vec<AppCmd> = usages.iter().map(|&u| AppCmd::KeyDown(u)).collect();
            cmds.extend(usages.iter().rev().map(|&u| AppCmd::KeyUp(u)));
            Ok(cmds)
        }
        _ => Ok(vec![parse_mouse(&words)?]),
    }
}

/// Read commands from stdin on a dedicated thread. EOF ends the reader but
/// not the service; only an explicit quit asks the loop to exit.
pub fn spawn_stdin_reader(tx: mpsc::Sender<AppCmd>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let cmds = match parse_command(&line) {
                Ok(cmds) => cmds,
                Err(e) => {
                    tracing::warn!(error = %e, %line, "Invalid input");
                    continue;
                }
            };
            for cmd in cmds {
                if cmd == AppCmd::Exit {
                    let _ = tx.blocking_send(cmd);
                    return;
                }
                match tx.try_send(cmd) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(cmd)) => {
                        tracing::warn!(?cmd, "Input queue full, dropping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            }
        }
        tracing::debug!("stdin closed");
    })
}

/// Self-test producer: moves the pointer by `(+step, +step)` then
/// `(-step, -step)` every `period`.
pub fn spawn_simulation(
    tx: mpsc::Sender<AppCmd>,
    period: Duration,
    step: i32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        let mut direction = 1;
        loop {
            ticker.tick().await;
            let delta = step * direction;
            tracing::debug!(%delta, "Simulating mouse move");
            match tx.try_send(AppCmd::Input(InputEvent::mouse(0, delta, delta, 0))) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
            direction = -direction;
        }
    })
}
