use std::time::Duration;

use tokio::sync::mpsc;

use blehub::consts::*;
use blehub::error::GattError;
use blehub::gatt::WriteOptions;
use blehub::hid::{HidOptions, Profile, build_application};
use blehub::input::{AppCmd, InputEvent, ParseError, parse_command, spawn_simulation};
use blehub::report::Delivery;

#[test]
fn parse_mouse_commands() {
    assert_eq!(
        parse_command("10 -5").unwrap(),
        vec![AppCmd::Input(InputEvent::mouse(0, 10, -5, 0))]
    );
    assert_eq!(
        parse_command("m 1 2 0x1 -3").unwrap(),
        vec![AppCmd::Input(InputEvent::mouse(1, 1, 2, -3))]
    );
    assert_eq!(parse_command("5"), Err(ParseError::Arity(2)));
    assert_eq!(parse_command("x 1"), Err(ParseError::Number("x".to_owned())));
    assert_eq!(parse_command("m 1 1 300"), Err(ParseError::Number("300".to_owned())));
}

#[test]
fn parse_keyboard_commands() {
    assert_eq!(
        parse_command("k +shift a").unwrap(),
        vec![AppCmd::Input(InputEvent::keyboard(0x02, vec![0x04]))]
    );
    assert_eq!(
        parse_command("k").unwrap(),
        vec![AppCmd::Input(InputEvent::keyboard(0, vec![]))]
    );
    assert_eq!(parse_command("k nosuchkey"), Err(ParseError::Key("nosuchkey".to_owned())));
    assert_eq!(
        parse_command("tap a b").unwrap(),
        vec![
            AppCmd::KeyDown(0x04),
            AppCmd::KeyDown(0x05),
            AppCmd::KeyUp(0x05),
            AppCmd::KeyUp(0x04),
        ]
    );
    assert_eq!(parse_command("tap"), Err(ParseError::Arity(1)));
}

#[test]
fn parse_control_commands() {
    assert_eq!(parse_command("battery 42").unwrap(), vec![AppCmd::Battery(42)]);
    assert_eq!(parse_command("battery"), Err(ParseError::Arity(1)));
    for quit in ["q", "quit", "EXIT"] {
        assert_eq!(parse_command(quit).unwrap(), vec![AppCmd::Exit]);
    }
    assert_eq!(parse_command("   "), Err(ParseError::Empty));
}

#[test]
fn send_input_routes_by_kind() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    let cccd = app.cccd(report).unwrap();
    app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions::request()).unwrap();

    assert_eq!(app.send_input(&InputEvent::mouse(0, 3, 3, 0)), Ok(Delivery::Sent));
    assert!(matches!(
        app.send_input(&InputEvent::keyboard(0, vec![0x04])),
        Err(GattError::InvalidArgs(_))
    ));

    let explicit = InputEvent {
        report_id: Some(RID_KEYBD),
        ..InputEvent::keyboard(0, vec![0x04])
    };
    assert_eq!(app.send_input(&explicit), Err(GattError::UnknownReport(RID_KEYBD)));
}

#[test]
fn send_input_in_combo_profile() {
    let mut app = build_application(&HidOptions {
        profile: Profile::Combo,
        ..Default::default()
    });
    // Not subscribed yet
    assert_eq!(
        app.send_input(&InputEvent::keyboard(0, vec![0x04])),
        Ok(Delivery::Dropped)
    );
    assert_eq!(app.pending_notifications(), 0);
}

#[tokio::test]
async fn simulation_alternates_direction() {
    let (tx, mut rx) = mpsc::channel(8);
    let handle = spawn_simulation(tx, Duration::from_millis(5), 10);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first, AppCmd::Input(InputEvent::mouse(0, 10, 10, 0)));
    assert_eq!(second, AppCmd::Input(InputEvent::mouse(0, -10, -10, 0)));

    // Producer stops once the loop is gone
    drop(rx);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
