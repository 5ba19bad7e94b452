//! # polar-pmd
//!
//! Async Rust codec and stream orchestrator for the Polar Measurement Data
//! (PMD) protocol spoken by [Polar](https://www.polar.com/) sensors over
//! Bluetooth Low Energy.
//!
//! ## Supported measurements
//!
//! | Type | Raw frame types | Delta-compressed frame types |
//! |---|---|---|
//! | ECG | 0 | |
//! | PPG | 0, 4, 6, 9 | 0 |
//! | ACC | 0, 1, 2 | 0, 1 |
//! | PPI | 0 | |
//! | Gyroscope | 0 | 0 |
//! | Magnetometer | 0 | 0 |
//! | Offline HR | 0, 1 | |
//! | Temperature / skin temperature | 0 | 0 |
//!
//! Anything outside this table is reported as
//! [`PmdError::UnsupportedFrameType`](error::PmdError::UnsupportedFrameType).
//!
//! ## Quick start
//!
//! ```no_run
//! use polar_pmd::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mut rx, handle) = PolarBle::new(BleConfig::default()).connect().await?;
//!
//!     let pmd = handle.pmd();
//!     let settings = pmd
//!         .get_settings(PmdMeasurementType::Acc, PmdRecordingType::Online)
//!         .await?
//!         .max_settings();
//!     let mut acc = pmd
//!         .start_measurement(PmdMeasurementType::Acc, &settings, None)
//!         .await?;
//!
//!     tokio::spawn(async move {
//!         while let Some(Ok(PmdSamples::Acc(samples))) = acc.recv().await {
//!             println!("{} ACC samples", samples.len());
//!         }
//!     });
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             PolarEvent::HeartRate(hr) => println!("HR {} bpm", hr.hr),
//!             PolarEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using as a library dependency
//!
//! ```toml
//! [dependencies]
//! # Codec, orchestrator and the btleplug adapter:
//! polar-pmd = "0.1"
//!
//! # Codec and orchestrator only, bring your own BLE stack:
//! polar-pmd = { version = "0.1", default-features = false }
//! ```
//!
//! Without the `ble` feature, implement
//! [`ControlPointWriter`](pmd_client::ControlPointWriter) for your transport
//! and feed notifications into
//! [`PmdClient::process_notification`](pmd_client::PmdClient::process_notification).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`pmd_client`] | Control-point commands, response matching and per-type sample streams |
//! | `ble` | btleplug scanning, connecting and notification routing (feature `ble`) |
//! | [`protocol`] | GATT UUIDs, opcodes, measurement types and control-point responses |
//! | [`frame`] | Measurement frame header and decoder dispatch |
//! | [`parse`] | Per-measurement sample decoders |
//! | [`delta`] | Delta-compressed block decoding |
//! | [`bits`] | Little-endian integer and bit helpers |
//! | [`timestamps`] | Per-sample timestamp reconstruction |
//! | [`settings`] | Measurement settings TLV codec |
//! | [`secret`] | Stream encryption keys and decryption |
//! | [`trigger`] | Offline recording trigger codec |
//! | [`rfc76`] | PSFTP fragmentation and reassembly |
//! | [`gatt`] | Standard Heart Rate and Health Thermometer characteristics |
//! | [`advertisement`] | Local name, HR broadcast and RSSI filtering |
//! | [`types`] | Sample and event types |
//! | [`error`] | The crate error type |

pub mod advertisement;
pub mod bits;
#[cfg(feature = "ble")]
pub mod ble;
pub mod delta;
pub mod error;
pub mod frame;
pub mod gatt;
pub mod parse;
pub mod pmd_client;
pub mod protocol;
pub mod rfc76;
pub mod secret;
pub mod settings;
pub mod timestamps;
pub mod trigger;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
///
/// ```no_run
/// use polar_pmd::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let ble = PolarBle::new(BleConfig::default());
/// let devices = ble.scan_all().await?;
/// for d in &devices {
///     println!("{} rssi={:?}", d.name, d.rssi);
/// }
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    #[cfg(feature = "ble")]
    pub use crate::ble::{BleConfig, PolarBle, PolarDevice, PolarHandle};
    pub use crate::pmd_client::{ControlPointWriter, PmdClient, PmdClientConfig, PmdStream};

    // ── Protocol ──────────────────────────────────────────────────────────────
    pub use crate::error::PmdError;
    pub use crate::protocol::{PmdFeature, PmdMeasurementType, PmdRecordingType};
    pub use crate::secret::{PmdSecret, PmdSecretStrategy};
    pub use crate::settings::{PmdSetting, PmdSettingType};
    pub use crate::trigger::{PmdOfflineTrigger, PmdOfflineTriggerMode, PmdOfflineTriggerStatus};

    // ── Samples and events ────────────────────────────────────────────────────
    pub use crate::types::{
        AccSample, EcgSample, HeartRateData, OfflineHrSample, PmdSamples, PolarEvent, PpgSample,
        PpiSample, TemperatureSample, ThermometerReading, XyzSample,
    };
}
