use std::collections::HashSet;

use anyhow::Context;
use thiserror::Error;
use tokio::{select, sync::mpsc};
use uuid::Uuid;

use ble_peripheral_rust::{
    Peripheral, PeripheralImpl,
    gatt::{
        characteristic::Characteristic,
        descriptor::Descriptor,
        peripheral_event::{
            PeripheralEvent, ReadRequestResponse, RequestResponse, WriteRequestResponse,
        },
        properties::{AttributePermission, CharacteristicProperty},
        service::Service,
    },
};

use crate::advertisement::Advertisement;
use crate::error::GattError;
use crate::gatt::{Application, DescriptorKind, Flag, Notification, WriteOptions, WriteType};
use crate::input::AppCmd;
use crate::report::{InputReport, KeyboardReport, KeyboardState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("characteristic {characteristic} appears more than once in service {service}")]
    DuplicateCharacteristic { service: Uuid, characteristic: Uuid },
}

fn export_flags(flags: &[Flag]) -> (Vec<CharacteristicProperty>, Vec<AttributePermission>) {
    let mut properties = Vec::new();
    let mut permissions = Vec::new();
    for flag in flags {
        match flag {
            Flag::Read => {
                properties.push(CharacteristicProperty::Read);
                permissions.push(AttributePermission::Readable);
            }
            Flag::Write => properties.push(CharacteristicProperty::Write),
            Flag::WriteWithoutResponse => {
                properties.push(CharacteristicProperty::WriteWithoutResponse)
            }
            Flag::Notify => properties.push(CharacteristicProperty::Notify),
        }
    }
    if flags.contains(&Flag::Write) || flags.contains(&Flag::WriteWithoutResponse) {
        permissions.push(AttributePermission::Writeable);
    }
    (properties, permissions)
}

/// Translate the tree into the backend's service descriptions.
///
/// Characteristic values are left unset so every host read comes back to
/// the tree. CCCDs stay behind: the host stack owns the ATT-level CCCD and
/// reports changes as subscription events instead.
pub fn export_services(app: &Application) -> Result<Vec<Service>, ExportError> {
    let mut services = Vec::new();
    for service_id in app.service_ids() {
        let Some(service) = app.service(service_id) else {
            continue;
        };
        let mut seen = HashSet::new();
        let mut characteristics = Vec::new();
        for &chrc_id in service.characteristics() {
            let Some(chrc) = app.characteristic(chrc_id) else {
                continue;
            };
            if !seen.insert(chrc.uuid()) {
                return Err(ExportError::DuplicateCharacteristic {
                    service: service.uuid(),
                    characteristic: chrc.uuid(),
                });
            }
            let descriptors = chrc
                .descriptors()
                .iter()
                .filter_map(|&d| app.descriptor(d))
                .filter(|d| d.kind() != DescriptorKind::Cccd)
                .map(|d| {
                    let (properties, permissions) = export_flags(d.flags());
                    Descriptor {
                        uuid: d.uuid(),
                        properties,
                        permissions,
                        value: Some(d.value().to_vec()),
                    }
                })
                .collect();
            let (properties, permissions) = export_flags(chrc.flags());
            characteristics.push(Characteristic {
                uuid: chrc.uuid(),
                properties,
                permissions,
                value: None,
                descriptors,
            });
        }
        services.push(Service {
            uuid: service.uuid(),
            primary: service.primary(),
            characteristics,
        });
    }
    Ok(services)
}

pub fn response_for(err: &GattError) -> RequestResponse {
    match err {
        GattError::NotSupported(_) => RequestResponse::RequestNotSupported,
        GattError::InvalidOffset { .. } => RequestResponse::InvalidOffset,
        GattError::UnknownObject(_) => RequestResponse::InvalidHandle,
        _ => RequestResponse::UnlikelyError,
    }
}

pub fn handle_read(
    app: &Application,
    service: Uuid,
    characteristic: Uuid,
    offset: u64,
) -> Result<Vec<u8>, RequestResponse> {
    let id = app
        .find_characteristic(service, characteristic)
        .ok_or(RequestResponse::InvalidHandle)?;
    let offset = usize::try_from(offset).map_err(|_| RequestResponse::InvalidOffset)?;
    app.read_characteristic_at(id, offset).map_err(|e| {
        tracing::debug!(%characteristic, error = %e, "Read rejected");
        response_for(&e)
    })
}

pub fn handle_write(
    app: &mut Application,
    service: Uuid,
    characteristic: Uuid,
    offset: u64,
    value: &[u8],
) -> RequestResponse {
    let Some(id) = app.find_characteristic(service, characteristic) else {
        return RequestResponse::InvalidHandle;
    };
    let Ok(offset) = usize::try_from(offset) else {
        return RequestResponse::InvalidOffset;
    };
    // The backend does not say which ATT opcode carried the write; a
    // characteristic without `write` can only have received a command.
    let write_type = match app.characteristic(id) {
        Some(c) if !c.has(Flag::Write) => WriteType::Command,
        _ => WriteType::Request,
    };
    match app.write_characteristic(id, value, WriteOptions { offset, write_type }) {
        Ok(()) => RequestResponse::Success,
        Err(e) => {
            tracing::debug!(%characteristic, error = %e, "Write rejected");
            response_for(&e)
        }
    }
}

/// Host subscription change, replayed as a CCCD write so the descriptor
/// stays the single source of subscription state.
pub fn handle_subscription(
    app: &mut Application,
    service: Uuid,
    characteristic: Uuid,
    subscribed: bool,
) -> Result<(), GattError> {
    let id = app
        .find_characteristic(service, characteristic)
        .ok_or_else(|| GattError::UnknownObject(characteristic.to_string()))?;
    match app.cccd(id) {
        Some(cccd) => {
            let value = if subscribed { [0x01, 0x00] } else { [0x00, 0x00] };
            app.write_descriptor(cccd, &value, WriteOptions::request())
        }
        None if subscribed => app.start_notify(id),
        None => app.stop_notify(id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Exit,
}

fn send_keyboard(app: &mut Application, report: KeyboardReport) {
    let report = InputReport::Keyboard(report);
    let Some(report_id) = app.default_report_id(&report) else {
        tracing::warn!("No keyboard report in this profile");
        return;
    };
    if let Err(e) = app.send_report(report_id, &report) {
        tracing::warn!(error = %e, "Keyboard report rejected");
    }
}

/// Apply one producer command to the tree. Notifications it causes are
/// left in the outbox for the caller to flush.
pub fn apply_command(app: &mut Application, keyboard: &mut KeyboardState, cmd: AppCmd) -> LoopAction {
    match cmd {
        AppCmd::Input(event) => {
            if let Err(e) = app.send_input(&event) {
                tracing::warn!(error = %e, ?event, "Input rejected");
            }
        }
        AppCmd::KeyDown(usage) => {
            let report = keyboard.key_down(usage);
            tracing::trace!(mods = %format!("{:#010b}", report.modifiers), keycodes = ?report.keycodes, "TX keybd DOWN");
            send_keyboard(app, report);
        }
        AppCmd::KeyUp(usage) => {
            let report = keyboard.key_up(usage);
            tracing::trace!(mods = %format!("{:#010b}", report.modifiers), keycodes = ?report.keycodes, "TX keybd UP");
            send_keyboard(app, report);
        }
        AppCmd::Battery(level) => {
            if let Err(e) = app.set_battery_level(level) {
                tracing::debug!(error = %e, "Battery update ignored");
            }
        }
        AppCmd::Exit => return LoopAction::Exit,
    }
    LoopAction::Continue
}

async fn flush(app: &mut Application, peripheral: &mut Peripheral) {
    let pending: Vec<Notification> = app.drain_notifications().collect();
    for n in pending {
        if let Err(e) = peripheral.update_characteristic(n.uuid, n.value.into()).await {
            tracing::error!(error = %format!("{e:#}"), path = %n.path, "notify error");
        }
    }
}

async fn advertise(peripheral: &mut Peripheral, advert: &Advertisement) -> anyhow::Result<()> {
    peripheral
        .start_advertising(
            advert.local_name(),
            advert.service_uuids(),
            Some(advert.appearance()),
        )
        .await?;
    Ok(())
}

pub async fn ble_owner_task(
    mut app: Application,
    advert: Advertisement,
    mut cmd_rx: mpsc::Receiver<AppCmd>,
    mut evt_rx: mpsc::Receiver<PeripheralEvent>,
    evt_tx: mpsc::Sender<PeripheralEvent>,
) -> anyhow::Result<()> {
    let services = export_services(&app).context("exporting GATT application")?;

    let mut peripheral = Peripheral::new(evt_tx)
        .await
        .context("connecting to the Bluetooth stack")?;

    // Backoff until powered
    let mut delay_ms = 50u64;
    loop {
        if peripheral.is_powered().await? {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        delay_ms = (delay_ms * 2).min(1000);
    }

    for service in &services {
        peripheral
            .add_service(service)
            .await
            .with_context(|| format!("registering service {}", service.uuid))?;
    }
    tracing::info!(path = %app.path(), objects = app.object_count(), "GATT application registered");

    advertise(&mut peripheral, &advert)
        .await
        .context("registering advertisement")?;
    let mut advertising = true;
    tracing::info!(name = %advert.local_name(), appearance = %format!("{:#06x}", advert.appearance()), "Advertising");

    let mut keyboard = KeyboardState::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        select! {
            ev = evt_rx.recv() => {
                match ev {
                    Some(PeripheralEvent::StateUpdate { is_powered }) => {
                        tracing::info!(%is_powered, "Adapter powered");
                        if is_powered {
                            if !advertising {
                                match advertise(&mut peripheral, &advert).await {
                                    Ok(()) => advertising = true,
                                    Err(e) => tracing::error!(error = %format!("{e:#}"), "advertise start error"),
                                }
                            }
                        } else if advertising {
                            advert.release();
                            if let Err(e) = peripheral.stop_advertising().await {
                                tracing::error!(error = %format!("{e:#}"), "advertise stop error");
                            }
                            advertising = false;
                        }
                    }
                    Some(PeripheralEvent::CharacteristicSubscriptionUpdate { request, subscribed }) => {
                        tracing::info!(%subscribed, characteristic = %request.characteristic, "Subscription update");
                        if let Err(e) = handle_subscription(&mut app, request.service, request.characteristic, subscribed) {
                            tracing::warn!(error = %e, ?request, "Subscription rejected");
                        }
                    }
                    Some(PeripheralEvent::ReadRequest { request, offset, responder }) => {
                        tracing::debug!(?request, %offset, "ReadRequest");
                        let response = match handle_read(&app, request.service, request.characteristic, offset) {
                            Ok(value) => ReadRequestResponse { value: value.into(), response: RequestResponse::Success },
                            Err(response) => ReadRequestResponse { value: Vec::<u8>::new().into(), response },
                        };
                        let _ = responder.send(response);
                    }
                    Some(PeripheralEvent::WriteRequest { request, offset, value, responder }) => {
                        tracing::debug!(?request, %offset, ?value, "WriteRequest");
                        let response = handle_write(&mut app, request.service, request.characteristic, offset, &value);
                        let _ = responder.send(WriteRequestResponse { response });
                    }
                    None => break,
                }
            }
            cmd = cmd_rx.recv() => {
                tracing::trace!(?cmd, "Received command");
                let Some(cmd) = cmd else { break };
                if apply_command(&mut app, &mut keyboard, cmd) == LoopAction::Exit {
                    break;
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Interrupted");
                break;
            }
        }
        flush(&mut app, &mut peripheral).await;
    }

    tracing::info!("Shutting down");
    if advertising {
        if let Err(e) = peripheral.stop_advertising().await {
            tracing::warn!(error = %format!("{e:#}"), "advertise stop error during shutdown");
        }
        advert.release();
    }
    Ok(())
}
