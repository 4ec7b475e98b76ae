//! WinRT BLE Transport
//!
//! Advertisement watching, GATT discovery and notification subscription on
//! the Windows Bluetooth stack. Every request runs as a detached task and
//! reports back through the [`EventSink`].

use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::links::LinkTable;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{EventSink, Transport, TransportError};
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothAdapter, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, IBuffer};

/// An open GATT link to one controller
struct Link {
    device: BluetoothLEDevice,
    characteristics: Vec<GattCharacteristic>,
}

impl Link {
    fn close(self, id: &DeviceId) {
        info!("Closing link to {}", id);
        let _ = self.device.Close();
    }
}

type Links = Arc<Mutex<LinkTable<Link>>>;

fn lock_links(links: &Links) -> Result<MutexGuard<'_, LinkTable<Link>>, TransportError> {
    links
        .lock()
        .map_err(|_| TransportError::Rejected("link table poisoned".to_string()))
}

pub struct WinRtTransport {
    sink: EventSink,
    service_uuid: GUID,
    client_config_uuid: GUID,
    available: bool,
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    links: Links,
}

impl WinRtTransport {
    /// Probe the default adapter once; the result backs `is_available`
    pub fn new(sink: EventSink, service_uuid: &str, client_config_uuid: &str) -> Result<Self> {
        let service_uuid = GUID::from_u128(protocol::parse_uuid(service_uuid)?);
        let client_config_uuid = GUID::from_u128(protocol::parse_uuid(client_config_uuid)?);
        let available = Self::probe_adapter();
        info!("BLE adapter available: {}", available);

        Ok(Self {
            sink,
            service_uuid,
            client_config_uuid,
            available,
            watcher: None,
            links: Arc::new(Mutex::new(LinkTable::new())),
        })
    }

    fn probe_adapter() -> bool {
        BluetoothAdapter::GetDefaultAsync()
            .and_then(|op| op.get())
            .and_then(|adapter| adapter.IsLowEnergySupported())
            .unwrap_or(false)
    }

    fn address_of(device: &DeviceId) -> Result<u64, TransportError> {
        device
            .to_bluetooth_address()
            .ok_or_else(|| TransportError::Rejected(format!("not a BLE address: {}", device)))
    }

    fn runtime() -> Result<tokio::runtime::Handle, TransportError> {
        tokio::runtime::Handle::try_current().map_err(|e| TransportError::Rejected(e.to_string()))
    }
}

impl Transport for WinRtTransport {
    fn is_available(&self) -> bool {
        self.available
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        // Stop any existing scan
        self.stop_scan()?;

        info!("Starting BLE scan for service {:?}", self.service_uuid);
        let reject = |e: windows::core::Error| TransportError::Rejected(e.to_string());

        let watcher = BluetoothLEAdvertisementWatcher::new().map_err(reject)?;
        watcher
            .SetScanningMode(BluetoothLEScanningMode::Active)
            .map_err(reject)?;

        let sink = self.sink.clone();
        let target_uuid = self.service_uuid;

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let service_uuids = args.Advertisement()?.ServiceUuids()?;

                    let mut found = false;
                    for i in 0..service_uuids.Size()? {
                        if service_uuids.GetAt(i)? == target_uuid {
                            found = true;
                            break;
                        }
                    }

                    if found {
                        let address = args.BluetoothAddress()?;
                        let rssi = args.RawSignalStrengthInDBm().ok();
                        sink.discovered(DeviceId::from_bluetooth_address(address), rssi);
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler).map_err(reject)?;
        watcher.Start().map_err(reject)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher
                .Stop()
                .map_err(|e| TransportError::Rejected(e.to_string()))?;
        }
        Ok(())
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        let address = Self::address_of(device)?;
        let runtime = Self::runtime()?;

        let (attempt, stale) = lock_links(&self.links)?.begin(device);
        if let Some(link) = stale {
            link.close(device);
        }

        let sink = self.sink.clone();
        let links = Arc::clone(&self.links);
        let service_uuid = self.service_uuid;

        runtime.spawn(async move {
            let id = attempt.device().clone();
            let link = match bind(address, &id, service_uuid, &sink).await {
                Ok(link) => link,
                Err(e) => {
                    if let Ok(mut links) = links.lock() {
                        links.abandon(&attempt);
                    }
                    sink.bind_failed(id, e.to_string());
                    return;
                }
            };

            let uuids = link
                .characteristics
                .iter()
                .filter_map(|c| c.Uuid().ok())
                .map(|guid| guid.to_u128())
                .collect();

            let stored = match links.lock() {
                Ok(mut links) => links.complete(&attempt, link),
                Err(_) => Err(link),
            };
            match stored {
                Ok(()) => sink.services_ready(id, uuids),
                Err(link) => {
                    debug!("Connect to {} was released before it finished", id);
                    link.close(&id);
                }
            }
        });
        Ok(())
    }

    fn disconnect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        let mut links = lock_links(&self.links)?;
        if links.is_pending(device) {
            debug!("Cancelling pending connect to {}", device);
        }
        if let Some(link) = links.release(device) {
            link.close(device);
        }
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        device: &DeviceId,
        characteristic: u128,
    ) -> Result<(), TransportError> {
        let target = GUID::from_u128(characteristic);
        let data_char = lock_links(&self.links)?
            .get(device)
            .and_then(|link| {
                link.characteristics
                    .iter()
                    .find(|c| c.Uuid().map(|u| u == target).unwrap_or(false))
                    .cloned()
            })
            .ok_or_else(|| TransportError::Rejected(format!("no open link to {}", device)))?;

        let runtime = Self::runtime()?;
        let sink = self.sink.clone();
        let id = device.clone();
        let client_config_uuid = self.client_config_uuid;

        runtime.spawn(async move {
            match subscribe(&data_char, client_config_uuid, &id, &sink).await {
                Ok(()) => sink.subscribed(id),
                Err(e) => sink.bind_failed(id, e.to_string()),
            }
        });
        Ok(())
    }
}

impl Drop for WinRtTransport {
    fn drop(&mut self) {
        let _ = self.stop_scan();
    }
}

/// Open the device and resolve the controller service's characteristics
async fn bind(address: u64, id: &DeviceId, service_uuid: GUID, sink: &EventSink) -> Result<Link> {
    info!("Connecting to Bluetooth device: {:#X}", address);
    let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;

    let status_sink = sink.clone();
    let status_id = id.clone();
    device.ConnectionStatusChanged(&TypedEventHandler::new(
        move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
            if let Some(dev) = dev.as_ref() {
                if dev.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                    status_sink.disconnected(status_id.clone());
                }
            }
            Ok(())
        },
    ))?;
    sink.connected(id.clone());

    let services_result = device.GetGattServicesForUuidAsync(service_uuid)?.await?;
    if services_result.Status()? != GattCommunicationStatus::Success {
        anyhow::bail!("Failed to get GATT services: {:?}", services_result.Status()?);
    }

    let services = services_result.Services()?;
    if services.Size()? == 0 {
        anyhow::bail!("Controller service not found");
    }
    let service = services.GetAt(0)?;

    let chars_result = service.GetCharacteristicsAsync()?.await?;
    if chars_result.Status()? != GattCommunicationStatus::Success {
        anyhow::bail!("Failed to get characteristics");
    }

    let list = chars_result.Characteristics()?;
    let mut characteristics = Vec::new();
    for i in 0..list.Size()? {
        characteristics.push(list.GetAt(i)?);
    }
    debug!("Found {} characteristics", characteristics.len());

    Ok(Link {
        device,
        characteristics,
    })
}

/// Route value changes to the sink, then write the client configuration
/// descriptor
async fn subscribe(
    data_char: &GattCharacteristic,
    client_config_uuid: GUID,
    id: &DeviceId,
    sink: &EventSink,
) -> Result<()> {
    let descriptors = data_char
        .GetDescriptorsForUuidAsync(client_config_uuid)?
        .await?;
    if descriptors.Status()? != GattCommunicationStatus::Success
        || descriptors.Descriptors()?.Size()? == 0
    {
        anyhow::bail!("Data characteristic has no client configuration descriptor");
    }

    let value_sink = sink.clone();
    let value_id = id.clone();
    data_char.ValueChanged(&TypedEventHandler::new(
        move |_: windows::core::Ref<GattCharacteristic>,
              args: windows::core::Ref<GattValueChangedEventArgs>| {
            if let Some(args) = args.as_ref() {
                let bytes = read_buffer(&args.CharacteristicValue()?)?;
                value_sink.notification(value_id.clone(), bytes);
            }
            Ok(())
        },
    ))?;

    let status = data_char
        .WriteClientCharacteristicConfigurationDescriptorAsync(
            GattClientCharacteristicConfigurationDescriptorValue::Notify,
        )?
        .await?;

    if status != GattCommunicationStatus::Success {
        warn!("Notification subscription returned status: {:?}", status);
        anyhow::bail!("Failed to enable notifications: {:?}", status);
    }

    info!("Notifications enabled successfully");
    Ok(())
}

fn read_buffer(buffer: &IBuffer) -> windows::core::Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
