use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::future::BoxFuture;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::advertisement::{AdvertisementTracker, HrAdvertisement, PolarDeviceName};
use crate::error::PmdError;
use crate::gatt::{parse_heart_rate, parse_thermometer};
use crate::pmd_client::{ControlPointWriter, PmdClient, PmdClientConfig};
use crate::protocol::{
    PmdFeature, HR_MEASUREMENT, PMD_CONTROL_POINT, PMD_DATA, PSFTP_MTU, TEMPERATURE_MEASUREMENT,
};
use crate::types::PolarEvent;

// ── PolarDevice ───────────────────────────────────────────────────────────────

/// A Polar device discovered during a BLE scan.
///
/// Returned by [`PolarBle::scan_all`]; pass to [`PolarBle::connect_to`] to
/// open a connection.
#[derive(Clone, Debug)]
pub struct PolarDevice {
    /// Advertised local name (e.g. `"Polar H10 A1B2C3D4"`).
    pub name: String,
    /// Platform BLE identifier.
    /// • macOS / Windows — a UUID string
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    /// Model and device id parsed from `name`, when it follows the Polar
    /// naming pattern.
    pub info: Option<PolarDeviceName>,
    /// Median RSSI over the advertisements seen during the scan.
    pub rssi: Option<i16>,
    /// Heart rate broadcast in the last advertisement, if any.
    pub hr_broadcast: Option<HrAdvertisement>,
    pub(crate) peripheral: Peripheral,
    pub(crate) adapter: Adapter,
}

// ── BleConfig ─────────────────────────────────────────────────────────────────

/// Configuration for [`PolarBle`].
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// BLE scan duration in seconds. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Match devices whose advertised name starts with this string.
    /// Default: `"Polar"`.
    pub name_prefix: String,
    /// Passed to the [`PmdClient`] of every connection.
    pub pmd: PmdClientConfig,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            name_prefix: "Polar".into(),
            pmd: PmdClientConfig::default(),
        }
    }
}

// ── Control point writer ──────────────────────────────────────────────────────

struct BtleplugWriter {
    peripheral: Peripheral,
    control_point: Characteristic,
    connected: Arc<AtomicBool>,
}

impl ControlPointWriter for BtleplugWriter {
    fn write(&self, command: Vec<u8>) -> BoxFuture<'_, Result<(), PmdError>> {
        Box::pin(async move {
            self.peripheral
                .write(&self.control_point, &command, WriteType::WithResponse)
                .await
                .map_err(|e| {
                    warn!("control point write failed: {e}");
                    PmdError::Disconnected
                })
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

// ── PolarBle ──────────────────────────────────────────────────────────────────

/// BLE transport for Polar sensors.
///
/// Handles scanning, connecting and GATT subscription, then forwards every
/// PMD notification into a [`PmdClient`] and turns Heart Rate / Health
/// Thermometer notifications into [`PolarEvent`]s.
pub struct PolarBle {
    config: BleConfig,
}

async fn first_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

    // CoreBluetooth ignores scan requests until the manager reports poweredOn.
    #[cfg(target_os = "macos")]
    {
        use btleplug::api::CentralState;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(state) if tokio::time::Instant::now() >= deadline => {
                    warn!("macOS: adapter still in state {state:?} after 3 s, proceeding anyway");
                    break;
                }
                Ok(state) => debug!("macOS: adapter state = {state:?}, waiting…"),
                Err(e) => {
                    warn!("macOS: adapter_state() error: {e}");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    Ok(adapter)
}

impl PolarBle {
    pub fn new(config: BleConfig) -> Self {
        Self { config }
    }

    // ── Public: scan ─────────────────────────────────────────────────────────

    /// Scan for `config.scan_timeout_secs` seconds and return every device
    /// whose name matches `config.name_prefix`, strongest signal first.
    pub async fn scan_all(&self) -> Result<Vec<PolarDevice>> {
        let adapter = first_adapter().await?;
        let mut events = adapter.events().await?;

        info!("scan_all: scanning for {} s …", self.config.scan_timeout_secs);
        adapter.start_scan(ScanFilter::default()).await?;

        let mut trackers: HashMap<PeripheralId, AdvertisementTracker> = HashMap::new();
        let deadline = tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => {
                        let Ok(p) = adapter.peripheral(&id).await else { continue };
                        if let Ok(Some(props)) = p.properties().await {
                            trackers.entry(id).or_default().process(
                                props.local_name.as_deref(),
                                props.rssi,
                                &props.manufacturer_data,
                            );
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            let Ok(Some(props)) = p.properties().await else { continue };
            let Some(name) = props.local_name else { continue };
            if !name.starts_with(&self.config.name_prefix) {
                continue;
            }
            let tracker = trackers.remove(&p.id()).unwrap_or_default();
            let id = p.id().to_string();
            info!("scan_all: found {name}  id={id}  rssi={:?}", tracker.rssi());
            found.push(PolarDevice {
                info: tracker.name().cloned(),
                rssi: tracker.rssi().or(props.rssi),
                hr_broadcast: tracker.hr().copied(),
                name,
                id,
                peripheral: p,
                adapter: adapter.clone(),
            });
        }
        found.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    // ── Public: connect ──────────────────────────────────────────────────────

    /// Scan and connect to the strongest matching device.
    pub async fn connect(&self) -> Result<(mpsc::Receiver<PolarEvent>, PolarHandle)> {
        let device = self
            .scan_all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                anyhow!(
                    "No device named {}… found after {} s",
                    self.config.name_prefix,
                    self.config.scan_timeout_secs
                )
            })?;
        self.connect_to(device).await
    }

    /// Connect to a device returned by [`PolarBle::scan_all`], subscribe to
    /// every supported characteristic and start the notification pump.
    pub async fn connect_to(
        &self,
        device: PolarDevice,
    ) -> Result<(mpsc::Receiver<PolarEvent>, PolarHandle)> {
        let PolarDevice {
            name,
            peripheral,
            adapter,
            ..
        } = device;

        // BlueZ can block forever on Device1.Connect when the device is gone.
        tokio::time::timeout(Duration::from_secs(10), peripheral.connect())
            .await
            .map_err(|_| anyhow!("BLE connect() timed out after 10 s"))??;

        // BlueZ reports the link before its GATT cache is populated.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| anyhow!("discover_services() timed out after 15 s"))??;
        info!("Connected and services discovered: {name}");

        let chars: BTreeSet<Characteristic> = peripheral.characteristics();
        let find_char = |uuid: Uuid| chars.iter().find(|c| c.uuid == uuid).cloned();

        let control_point = find_char(PMD_CONTROL_POINT)
            .ok_or_else(|| anyhow!("PMD control point {PMD_CONTROL_POINT} not found"))?;

        let features = match peripheral.read(&control_point).await {
            Ok(raw) => match PmdFeature::parse(&raw) {
                Ok(f) => {
                    info!("{name}: PMD features {:?}", f.supported);
                    Some(f)
                }
                Err(e) => {
                    warn!("{name}: PMD feature read: {e}");
                    None
                }
            },
            Err(e) => {
                warn!("{name}: could not read PMD features: {e}");
                None
            }
        };

        peripheral.subscribe(&control_point).await?;
        for uuid in [PMD_DATA, HR_MEASUREMENT, TEMPERATURE_MEASUREMENT, PSFTP_MTU] {
            match find_char(uuid) {
                Some(c) => peripheral.subscribe(&c).await?,
                None => debug!("{name}: characteristic {uuid} not present"),
            }
        }

        let connected = Arc::new(AtomicBool::new(true));
        let writer = Arc::new(BtleplugWriter {
            peripheral: peripheral.clone(),
            control_point,
            connected: Arc::clone(&connected),
        });
        let pmd = Arc::new(PmdClient::new(writer, self.config.pmd.clone()));

        // ── Event channel ─────────────────────────────────────────────────────
        let (tx, rx) = mpsc::channel::<PolarEvent>(256);
        let _ = tx.send(PolarEvent::Connected { name: name.clone() }).await;

        // ── Disconnect watcher ────────────────────────────────────────────────
        // Fires faster than waiting for the notification stream to close.
        let disconnect_tx = tx.clone();
        let disconnect_pmd = Arc::clone(&pmd);
        let disconnect_flag = Arc::clone(&connected);
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("Disconnect watcher: device {id:?} disconnected.");
                                if disconnect_flag.swap(false, Ordering::AcqRel) {
                                    disconnect_pmd.process_connection_lost();
                                    let _ = disconnect_tx.send(PolarEvent::Disconnected).await;
                                }
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
                }
            }
        });

        // ── Notification pump ─────────────────────────────────────────────────
        let pump_peripheral = peripheral.clone();
        let pump_pmd = Arc::clone(&pmd);
        let pump_flag = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut notifications = match pump_peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("could not get notifications stream: {e}");
                    return;
                }
            };
            info!("notification stream subscribed, waiting for data…");

            while let Some(notif) = notifications.next().await {
                let uuid = notif.uuid;
                let data = &notif.value;

                if uuid == HR_MEASUREMENT {
                    match parse_heart_rate(data) {
                        Ok(hr) => {
                            let _ = tx.send(PolarEvent::HeartRate(hr)).await;
                        }
                        Err(e) => warn!("heart rate notification: {e}"),
                    }
                    continue;
                }

                if uuid == TEMPERATURE_MEASUREMENT {
                    match parse_thermometer(data) {
                        Ok(t) => {
                            let _ = tx.send(PolarEvent::Thermometer(t)).await;
                        }
                        Err(e) => warn!("temperature notification: {e}"),
                    }
                    continue;
                }

                pump_pmd.process_notification(uuid, data, 0);
            }

            info!("notification stream ended – device disconnected.");
            if pump_flag.swap(false, Ordering::AcqRel) {
                pump_pmd.process_connection_lost();
                let _ = tx.send(PolarEvent::Disconnected).await;
            }
        });

        let handle = PolarHandle {
            peripheral,
            pmd,
            features,
        };
        Ok((rx, handle))
    }
}

// ── PolarHandle ───────────────────────────────────────────────────────────────

/// A handle to an active Polar connection.
pub struct PolarHandle {
    peripheral: Peripheral,
    pmd: Arc<PmdClient>,
    features: Option<PmdFeature>,
}

impl PolarHandle {
    /// PMD orchestrator bound to this connection.
    pub fn pmd(&self) -> &Arc<PmdClient> {
        &self.pmd
    }

    /// Measurements the device advertised in its PMD feature bitmap.
    pub fn features(&self) -> Option<&PmdFeature> {
        self.features.as_ref()
    }

    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Gracefully disconnect.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
