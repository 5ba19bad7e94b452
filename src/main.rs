use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{error, info, warn};

use polar_pmd::ble::{BleConfig, PolarBle};
use polar_pmd::error::PmdError;
use polar_pmd::protocol::{PmdMeasurementType, PmdRecordingType};
use polar_pmd::types::PolarEvent;

fn measurement_from_arg(arg: &str) -> Option<PmdMeasurementType> {
    use PmdMeasurementType::*;
    match arg.to_ascii_lowercase().as_str() {
        "ecg" => Some(Ecg),
        "ppg" => Some(Ppg),
        "acc" => Some(Acc),
        "ppi" => Some(Ppi),
        "gyro" => Some(Gyro),
        "mag" => Some(Magnetometer),
        "skin" => Some(SkinTemperature),
        "temp" => Some(Temperature),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=polar_pmd=debug for per-frame detail.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Arguments ─────────────────────────────────────────────────────────────
    // polar-pmd [ecg|ppg|acc|ppi|gyro|mag|skin|temp] [name prefix]
    let mut args = std::env::args().skip(1);
    let measurement = match args.next() {
        Some(arg) => Some(
            measurement_from_arg(&arg).ok_or_else(|| anyhow!("unknown measurement '{arg}'"))?,
        ),
        None => None,
    };
    let mut config = BleConfig::default();
    if let Some(prefix) = args.next() {
        config.name_prefix = prefix;
    }

    // ── Connect ───────────────────────────────────────────────────────────────
    let ble = PolarBle::new(config);
    info!("Connecting to Polar device …");
    let (mut rx, handle) = ble.connect().await?;
    let handle = Arc::new(handle);

    // ── Start PMD stream ──────────────────────────────────────────────────────
    if let Some(kind) = measurement {
        if let Some(features) = handle.features() {
            if !features.is_supported(kind) {
                warn!("{kind:?} is not in the device feature list, trying anyway");
            }
        }
        let pmd = Arc::clone(handle.pmd());
        let settings = pmd
            .get_settings(kind, PmdRecordingType::Online)
            .await?
            .max_settings();
        info!("{kind:?} settings: {:?}", settings.selected());
        let mut stream = pmd.start_measurement(kind, &settings, None).await?;

        tokio::spawn(async move {
            while let Some(item) = stream.recv().await {
                match item {
                    Ok(samples) => match serde_json::to_string(&samples) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("JSON encode error: {e}"),
                    },
                    Err(e @ (PmdError::StreamClosed(_) | PmdError::Disconnected)) => {
                        info!("{kind:?} stream ended: {e}");
                        break;
                    }
                    Err(e) => warn!("{kind:?} frame dropped: {e}"),
                }
            }
        });
    }

    info!("Commands (type + Enter):");
    info!("  q  – quit");
    info!("  s  – stop the PMD stream");
    info!("  t  – show the offline recording trigger");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on an OS thread and relayed to an async task.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let handle_cmd = Arc::clone(&handle);
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            match line.as_str() {
                "" => {}
                "q" => {
                    info!("Quit requested.");
                    handle_cmd.disconnect().await.ok();
                    std::process::exit(0);
                }
                "s" => match measurement {
                    Some(kind) => {
                        if let Err(e) = handle_cmd.pmd().stop_measurement(kind).await {
                            error!("Stop error: {e}");
                        }
                    }
                    None => info!("No PMD stream running."),
                },
                "t" => match handle_cmd.pmd().get_offline_trigger().await {
                    Ok(trigger) => match serde_json::to_string(&trigger) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!("JSON encode error: {e}"),
                    },
                    Err(e) => error!("Trigger error: {e}"),
                },
                other => warn!("Unknown command '{other}'"),
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    while let Some(event) = rx.recv().await {
        match &event {
            PolarEvent::Connected { name } => info!("✅  Connected to: {name}"),
            PolarEvent::Disconnected => {
                info!("❌  Disconnected from device.");
                break;
            }
            PolarEvent::HeartRate(_) | PolarEvent::Thermometer(_) => {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => error!("JSON encode error: {e}"),
                }
            }
        }
    }

    info!("Event loop finished – exiting.");
    Ok(())
}
