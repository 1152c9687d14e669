use ble_peripheral_rust::uuid::ShortUuid;
use uuid::Uuid;

use blehub::consts::*;
use blehub::error::GattError;
use blehub::gatt::{
    Application, ApplicationBuilder, CharacteristicId, CharacteristicKind, DescriptorKind, Flag,
    PropertyValue, Subscription, WriteOptions, WriteType,
};
use blehub::hid::{HidOptions, MOUSE_REPORT_MAP, build_application};
use blehub::report::Delivery;

fn hid_char(app: &Application, uuid: u16) -> CharacteristicId {
    app.find_characteristic(Uuid::from_short(UUID_HID_SERVICE), Uuid::from_short(uuid))
        .unwrap()
}

fn subscribe(app: &mut Application, id: CharacteristicId) {
    let cccd = app.cccd(id).unwrap();
    app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions::request())
        .unwrap();
}

#[test]
fn cccd_write_toggles_notifying() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    let cccd = app.cccd(report).unwrap();
    assert_eq!(app.subscription(report), Subscription::Unsubscribed);

    app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions::request()).unwrap();
    assert!(app.characteristic(report).unwrap().notifying());
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x01, 0x00]);

    // Redundant enable is a no-op
    app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions::request()).unwrap();
    assert_eq!(app.subscription(report), Subscription::Subscribed);

    app.write_descriptor(cccd, &[0x00, 0x00], WriteOptions::request()).unwrap();
    assert!(!app.characteristic(report).unwrap().notifying());
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x00, 0x00]);
}

#[test]
fn cccd_rejects_bad_length_and_offset() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    let cccd = app.cccd(report).unwrap();

    assert_eq!(
        app.write_descriptor(cccd, &[0x01], WriteOptions::request()),
        Err(GattError::InvalidValueLength { expected: 2, actual: 1 })
    );
    assert!(matches!(
        app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions { offset: 1, ..Default::default() }),
        Err(GattError::InvalidOffset { .. })
    ));
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x00, 0x00]);
    assert!(!app.characteristic(report).unwrap().notifying());
}

#[test]
fn notify_requires_notify_flag() {
    let mut builder = ApplicationBuilder::new(APP_PATH);
    let service = builder.add_service(Uuid::from_short(UUID_DIS_SERVICE), true);
    let chrc = builder.add_characteristic(
        service,
        Uuid::from_short(UUID_MODEL_NUM),
        &[Flag::Read],
        CharacteristicKind::Generic,
        b"m".to_vec(),
    );
    let cccd = builder.add_cccd(chrc);
    let mut app = builder.build();

    assert_eq!(app.start_notify(chrc), Err(GattError::NotSupported("notify")));
    assert_eq!(
        app.write_descriptor(cccd, &[0x01, 0x00], WriteOptions::request()),
        Err(GattError::NotSupported("notify"))
    );
    assert!(!app.characteristic(chrc).unwrap().notifying());
    // Disabling is harmless
    app.write_descriptor(cccd, &[0x00, 0x00], WriteOptions::request()).unwrap();
}

#[test]
fn notifying_implies_notify_flag() {
    let mut app = build_application(&HidOptions {
        battery: Some(50),
        ..Default::default()
    });
    let ids: Vec<_> = app.characteristic_ids().collect();
    for &id in &ids {
        let _ = app.start_notify(id);
    }
    for id in ids {
        let chrc = app.characteristic(id).unwrap();
        assert!(!chrc.notifying() || chrc.has(Flag::Notify), "{}", chrc.path());
    }
}

#[test]
fn control_point_is_write_only() {
    let mut app = build_application(&HidOptions::default());
    let cp = hid_char(&app, UUID_HID_CONTROL_POINT);
    assert_eq!(app.read_characteristic(cp), Err(GattError::NotSupported("read")));

    app.write_characteristic(cp, &[CONTROL_POINT_SUSPEND], WriteOptions::command()).unwrap();
    assert!(app.is_suspended());
    app.write_characteristic(cp, &[CONTROL_POINT_EXIT_SUSPEND], WriteOptions::command()).unwrap();
    assert!(!app.is_suspended());
}

#[test]
fn protocol_mode_accepts_boot_and_report_only() {
    let mut app = build_application(&HidOptions::default());
    let pm = hid_char(&app, UUID_HID_PROTOCOL_MODE);

    // Malformed command is dropped, request is rejected
    app.write_characteristic(pm, &[0x02], WriteOptions::command()).unwrap();
    assert_eq!(app.read_characteristic(pm).unwrap(), vec![PROTOCOL_MODE_REPORT]);
    assert!(matches!(
        app.write_characteristic(pm, &[0x02], WriteOptions::request()),
        Err(GattError::InvalidArgs(_))
    ));
    assert_eq!(
        app.write_characteristic(pm, &[0x00, 0x00], WriteOptions::request()),
        Err(GattError::InvalidValueLength { expected: 1, actual: 2 })
    );

    app.write_characteristic(pm, &[PROTOCOL_MODE_BOOT], WriteOptions::command()).unwrap();
    assert_eq!(app.read_characteristic(pm).unwrap(), vec![0x00]);
    assert_eq!(app.protocol_mode(), Some(PROTOCOL_MODE_BOOT));
}

#[test]
fn read_only_characteristics_reject_writes() {
    let mut app = build_application(&HidOptions::default());
    let map = hid_char(&app, UUID_HID_REPORT_MAP);
    assert_eq!(
        app.write_characteristic(map, &[0x00], WriteOptions::request()),
        Err(GattError::NotSupported("write"))
    );
}

#[test]
fn report_map_is_stable_across_traffic() {
    let mut app = build_application(&HidOptions::default());
    let map = hid_char(&app, UUID_HID_REPORT_MAP);
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    subscribe(&mut app, report);
    for i in 0..10 {
        app.send_mouse(RID_MOUSE, 0, i, -i, 0).unwrap();
    }
    app.drain_notifications().for_each(drop);
    assert_eq!(app.read_characteristic(map).unwrap(), MOUSE_REPORT_MAP);
}

#[test]
fn long_read_honours_offset() {
    let app = build_application(&HidOptions::default());
    let map = hid_char(&app, UUID_HID_REPORT_MAP);
    assert_eq!(app.read_characteristic_at(map, 10).unwrap(), &MOUSE_REPORT_MAP[10..]);
    assert!(app.read_characteristic_at(map, MOUSE_REPORT_MAP.len()).unwrap().is_empty());
    assert_eq!(
        app.read_characteristic_at(map, MOUSE_REPORT_MAP.len() + 1),
        Err(GattError::InvalidOffset {
            offset: MOUSE_REPORT_MAP.len() + 1,
            len: MOUSE_REPORT_MAP.len()
        })
    );
}

#[test]
fn stop_notify_discards_queued_notifications() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    subscribe(&mut app, report);
    assert_eq!(app.send_mouse(RID_MOUSE, 0, 1, 1, 0), Ok(Delivery::Sent));
    assert_eq!(app.send_mouse(RID_MOUSE, 0, 2, 2, 0), Ok(Delivery::Sent));
    assert_eq!(app.pending_notifications(), 2);

    let cccd = app.cccd(report).unwrap();
    app.write_descriptor(cccd, &[0x00, 0x00], WriteOptions::request()).unwrap();
    assert_eq!(app.pending_notifications(), 0);
    assert_eq!(app.drain_notifications().count(), 0);
}

#[test]
fn discovery_lists_every_object_once() {
    let app = build_application(&HidOptions {
        battery: Some(90),
        ..Default::default()
    });
    let objects = app.managed_objects();
    assert_eq!(objects.len(), app.object_count());
    assert!(objects.contains_key(APP_PATH));
    assert!(objects.keys().all(|p| p.starts_with(APP_PATH)));

    // Paths do not move between calls
    let again: Vec<_> = app.managed_objects().into_keys().collect();
    assert_eq!(objects.keys().cloned().collect::<Vec<_>>(), again);

    let cp = hid_char(&app, UUID_HID_CONTROL_POINT);
    let cp_props = &objects[app.characteristic(cp).unwrap().path()][IFACE_GATT_CHRC];
    assert!(!cp_props.contains_key("Value"));
    assert!(!cp_props.contains_key("Notifying"));
    assert_eq!(
        cp_props["Flags"],
        PropertyValue::Strs(vec!["write-without-response".to_owned()])
    );
}

#[test]
fn discovery_reflects_current_state() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    subscribe(&mut app, report);
    app.send_mouse(RID_MOUSE, 1, 3, 4, 0).unwrap();

    let objects = app.managed_objects();
    let chrc = app.characteristic(report).unwrap();
    let props = &objects[chrc.path()][IFACE_GATT_CHRC];
    assert_eq!(props["Notifying"], PropertyValue::Bool(true));
    assert_eq!(props["Value"], PropertyValue::Bytes(vec![0x01, 0x03, 0x04, 0x00]));

    let cccd = app.cccd(report).unwrap();
    let desc = app.descriptor(cccd).unwrap();
    assert_eq!(desc.kind(), DescriptorKind::Cccd);
    let desc_props = &objects[desc.path()][IFACE_GATT_DESC];
    assert_eq!(desc_props["Characteristic"], PropertyValue::Path(chrc.path().to_owned()));
    assert_eq!(desc_props["Value"], PropertyValue::Bytes(vec![0x01, 0x00]));
}

#[test]
fn lookup_by_path() {
    let app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    let path = app.characteristic(report).unwrap().path().to_owned();
    assert_eq!(app.characteristic_by_path(&path), Some(report));
    let cccd = app.cccd(report).unwrap();
    assert_eq!(app.descriptor_by_path(app.descriptor(cccd).unwrap().path()), Some(cccd));
    assert_eq!(app.characteristic_by_path("/nope"), None);
}

#[test]
fn cccd_indicate_bit_is_stored_but_ignored() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();
    let cccd = app.cccd(report).unwrap();

    assert_eq!(app.write_descriptor(cccd, &[0x02, 0x00], WriteOptions::request()), Ok(()));
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x02, 0x00]);
    assert!(!app.characteristic(report).unwrap().notifying());

    assert_eq!(app.write_descriptor(cccd, &[0x03, 0x00], WriteOptions::request()), Ok(()));
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x03, 0x00]);
    assert!(app.characteristic(report).unwrap().notifying());

    assert_eq!(app.write_descriptor(cccd, &[0x02, 0x00], WriteOptions::request()), Ok(()));
    assert_eq!(app.read_descriptor(cccd).unwrap(), vec![0x02, 0x00]);
    assert!(!app.characteristic(report).unwrap().notifying());
}

#[test]
fn unknown_control_point_command_is_ignored() {
    let mut app = build_application(&HidOptions::default());
    let cp = hid_char(&app, UUID_HID_CONTROL_POINT);

    assert_eq!(app.write_characteristic(cp, &[0x7F], WriteOptions::command()), Ok(()));
    assert!(!app.is_suspended());

    app.write_characteristic(cp, &[CONTROL_POINT_SUSPEND], WriteOptions::command()).unwrap();
    assert_eq!(app.write_characteristic(cp, &[0x7F], WriteOptions::command()), Ok(()));
    assert!(app.is_suspended());
}

#[test]
fn redundant_start_and_stop_notify_are_no_ops() {
    let mut app = build_application(&HidOptions::default());
    let report = app.report_characteristic(RID_MOUSE).unwrap();

    assert_eq!(app.stop_notify(report), Ok(()));
    assert!(!app.characteristic(report).unwrap().notifying());

    assert_eq!(app.start_notify(report), Ok(()));
    assert_eq!(app.start_notify(report), Ok(()));
    assert!(app.characteristic(report).unwrap().notifying());

    // A queued report survives a redundant start
    app.send_mouse(RID_MOUSE, 0, 1, 1, 0).unwrap();
    assert_eq!(app.start_notify(report), Ok(()));
    assert_eq!(app.pending_notifications(), 1);

    assert_eq!(app.stop_notify(report), Ok(()));
    assert_eq!(app.stop_notify(report), Ok(()));
    assert!(!app.characteristic(report).unwrap().notifying());
    assert_eq!(app.pending_notifications(), 0);
}

#[test]
fn reliable_write_is_validated_like_a_request() {
    let mut app = build_application(&HidOptions::default());
    let pm = hid_char(&app, UUID_HID_PROTOCOL_MODE);
    let reliable = WriteOptions {
        offset: 0,
        write_type: WriteType::Reliable,
    };

    assert!(matches!(
        app.write_characteristic(pm, &[0x02], reliable),
        Err(GattError::InvalidArgs(_))
    ));
    assert_eq!(app.protocol_mode(), Some(PROTOCOL_MODE_REPORT));
    app.write_characteristic(pm, &[PROTOCOL_MODE_BOOT], reliable).unwrap();
    assert_eq!(app.protocol_mode(), Some(PROTOCOL_MODE_BOOT));
}

#[test]
fn descriptor_write_past_end_is_rejected() {
    let mut builder = ApplicationBuilder::new(APP_PATH);
    let service = builder.add_service(Uuid::from_short(UUID_DIS_SERVICE), true);
    let chrc = builder.add_characteristic(
        service,
        Uuid::from_short(UUID_MODEL_NUM),
        &[Flag::Read],
        CharacteristicKind::Generic,
        b"m".to_vec(),
    );
    let desc = builder.add_descriptor(
        chrc,
        Uuid::from_short(0x2901),
        &[Flag::Read, Flag::Write],
        DescriptorKind::Generic,
        vec![0xAA, 0xBB],
    );
    let mut app = builder.build();

    let at = |offset| WriteOptions {
        offset,
        ..WriteOptions::request()
    };
    assert_eq!(
        app.write_descriptor(desc, &[0xCC], at(10)),
        Err(GattError::InvalidOffset { offset: 10, len: 2 })
    );
    assert_eq!(app.read_descriptor(desc).unwrap(), vec![0xAA, 0xBB]);

    app.write_descriptor(desc, &[0xCC], at(2)).unwrap();
    assert_eq!(app.read_descriptor(desc).unwrap(), vec![0xAA, 0xBB, 0xCC]);
    app.write_descriptor(desc, &[0xDD], at(1)).unwrap();
    assert_eq!(app.read_descriptor(desc).unwrap(), vec![0xAA, 0xDD]);
}
