//! BlueZ D-Bus backend.
//!
//! Uses the `bluer` crate to talk to the BlueZ daemon. Unlike a filtered
//! monitor, this backend runs plain device discovery and forwards every
//! sighting; deciding which devices matter is the classifier's job.

use super::{EVENT_CHANNEL_BUFFER_SIZE, EventError, EventResult, PermissionStatus, ScanError};
use crate::advert::{AdvertEvent, AdvertPayload};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

fn init_err(err: bluer::Error) -> ScanError {
    ScanError::Init(err.to_string())
}

/// Start scanning for BLE devices using the BlueZ D-Bus backend.
///
/// Powers the default adapter, starts device discovery, and emits one
/// [`AdvertEvent`] per discovered device. Discovery runs until the returned
/// receiver is dropped; the spawned task then exits and dropping the
/// discovery stream asks BlueZ to cease scanning.
///
/// # Arguments
/// * `verbose` - If true, per-device read errors are sent as Err values;
///   otherwise they're silently dropped.
pub async fn start_scan(verbose: bool) -> Result<mpsc::Receiver<EventResult>, ScanError> {
    let session = Session::new().await.map_err(init_err)?;
    let adapter = session.default_adapter().await.map_err(init_err)?;
    adapter
        .set_powered(true)
        .await
        .map_err(|e| ScanError::PermissionDenied(e.to_string()))?;

    let discover = adapter
        .discover_devices()
        .await
        .map_err(|e| ScanError::StartFailed(e.to_string()))?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        let mut discover = discover;

        while let Some(event) = discover.next().await {
            if tx.is_closed() {
                break;
            }
            if let AdapterEvent::DeviceAdded(address) = event
                && let Err(e) = process_device(&adapter, address, &tx).await
                && verbose
            {
                let _ = tx.send(Err(EventError::Bluetooth(e.to_string()))).await;
            }
        }
    });

    Ok(rx)
}

/// Read a discovered device's advertised properties and forward them as an
/// advertisement event.
async fn process_device(
    adapter: &Adapter,
    address: Address,
    tx: &mpsc::Sender<EventResult>,
) -> bluer::Result<()> {
    let device = adapter.device(address)?;

    // No RSSI means BlueZ handed us a cached entry rather than a live
    // advertisement; skip it.
    let Some(rssi) = device.rssi().await? else {
        return Ok(());
    };

    let name = device.name().await?;

    // BlueZ already splits off the company identifier; keep the vendor
    // bytes of the lowest company id for a deterministic choice.
    let manufacturer_data = device.manufacturer_data().await?.and_then(|data| {
        data.into_iter()
            .min_by_key(|(id, _)| *id)
            .map(|(_, bytes)| bytes)
    });

    let service_data: BTreeMap<String, Vec<u8>> = device
        .service_data()
        .await?
        .map(|data| {
            data.into_iter()
                .map(|(uuid, bytes)| (uuid.to_string(), bytes))
                .collect()
        })
        .unwrap_or_default();

    let event = AdvertEvent {
        mac: address.into(),
        name,
        rssi,
        payload: AdvertPayload {
            manufacturer_data,
            service_data,
        },
    };
    let _ = tx.send(Ok(event)).await;

    Ok(())
}

/// Report whether the BlueZ backend could scan right now.
///
/// A missing adapter or a power-on refusal is a status, not an error, so
/// the CLI can print what the user needs to fix.
pub async fn check_permissions() -> Result<PermissionStatus, ScanError> {
    let session = Session::new().await.map_err(init_err)?;

    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            return Ok(PermissionStatus {
                adapter_present: false,
                scan_allowed: false,
                detail: Some(e.to_string()),
            });
        }
    };

    if adapter.is_powered().await.map_err(init_err)? {
        return Ok(PermissionStatus {
            adapter_present: true,
            scan_allowed: true,
            detail: None,
        });
    }

    match adapter.set_powered(true).await {
        Ok(()) => Ok(PermissionStatus {
            adapter_present: true,
            scan_allowed: true,
            detail: None,
        }),
        Err(e) => Ok(PermissionStatus {
            adapter_present: true,
            scan_allowed: false,
            detail: Some(e.to_string()),
        }),
    }
}
