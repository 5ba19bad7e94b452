//! PMD orchestrator: control-point command/response exchange and per-type
//! measurement streams.
//!
//! The client is transport agnostic. Commands leave through a
//! [`ControlPointWriter`]; everything the device sends comes back in through
//! [`PmdClient::process_notification`], which may be called from any thread.
//!
//! ```text
//!   start_measurement ──write──▶ device
//!                                  │
//!   process_notification ◀─────────┘
//!     ├─ control point  ─▶ response slot ─▶ waiting command
//!     ├─ PMD data       ─▶ decrypt ─▶ decode ─▶ per-type stream
//!     └─ PSFTP MTU      ─▶ RFC76 reassembly ─▶ message slot
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use uuid::Uuid;

use crate::error::PmdError;
use crate::frame::{FrameContext, MeasurementFrame};
use crate::parse::decode_frame;
use crate::protocol::{
    encode_get_settings, encode_start, encode_stop, PmdControlPointCommand,
    PmdControlPointResponse, PmdControlPointStatus, PmdMeasurementType, PmdRecordingType,
    CONTROL_POINT_RESPONSE_CODE, ONLINE_MEASUREMENT_STOPPED, PMD_CONTROL_POINT, PMD_DATA,
    PSFTP_MTU,
};
use crate::rfc76::{Rfc76Frame, Rfc76Reassembler};
use crate::secret::PmdSecret;
use crate::settings::PmdSetting;
use crate::trigger::{
    encode_set_trigger_mode, encode_set_trigger_setting, PmdOfflineTrigger,
    PmdOfflineTriggerMode, PmdOfflineTriggerStatus,
};
use crate::types::PmdSamples;

/// Receiving half of a measurement stream.
///
/// Yields one item per data frame. The channel ends after
/// [`PmdError::StreamClosed`] or [`PmdError::Disconnected`] has been
/// delivered, or after [`PmdClient::stop_measurement`]. One slot is held
/// back for that final item, so it arrives even when the stream is full.
pub type PmdStream = mpsc::Receiver<Result<PmdSamples, PmdError>>;

// ── Transport seam ────────────────────────────────────────────────────────────

/// Outgoing half of the transport: writes to the PMD control point.
pub trait ControlPointWriter: Send + Sync {
    fn write(&self, command: Vec<u8>) -> BoxFuture<'_, Result<(), PmdError>>;

    /// Whether the control point is currently reachable. Commands fail fast
    /// with [`PmdError::Disconnected`] when this returns `false`.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<F> ControlPointWriter for F
where
    F: Fn(Vec<u8>) -> BoxFuture<'static, Result<(), PmdError>> + Send + Sync,
{
    fn write(&self, command: Vec<u8>) -> BoxFuture<'_, Result<(), PmdError>> {
        (self)(command)
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Configuration for [`PmdClient`].
#[derive(Debug, Clone)]
pub struct PmdClientConfig {
    /// How long a command waits for its control-point response. Default: 30 s.
    pub response_timeout: Duration,
    /// Data frames each measurement stream buffers. Frames arriving while a
    /// stream is full are dropped with a warning. Default: `256`.
    pub stream_buffer: usize,
}

impl Default for PmdClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(30),
            stream_buffer: 256,
        }
    }
}

// ── One-slot handoff ──────────────────────────────────────────────────────────

/// Capacity-one channel between the notification path and a single waiter.
struct Slot<T> {
    tx: mpsc::Sender<Result<T, PmdError>>,
    rx: AsyncMutex<mpsc::Receiver<Result<T, PmdError>>>,
    name: &'static str,
}

impl<T> Slot<T> {
    fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            name,
        }
    }

    fn offer(&self, item: Result<T, PmdError>) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(item) {
            warn!("{}: previous value not yet consumed, dropping new one", self.name);
        }
    }

    async fn drain(&self) {
        let mut rx = self.rx.lock().await;
        while rx.try_recv().is_ok() {
            debug!("{}: discarding stale value", self.name);
        }
    }
}

// ── Stream state ──────────────────────────────────────────────────────────────

struct StreamState {
    sender: mpsc::Sender<Result<PmdSamples, PmdError>>,
    previous_timestamp: u64,
    factor: f32,
    sample_rate: Option<u32>,
    secret: Option<PmdSecret>,
}

impl StreamState {
    /// Queue a data item without touching the slot kept for the close reason.
    fn deliver(
        &self,
        item: Result<PmdSamples, PmdError>,
    ) -> Result<(), TrySendError<Result<PmdSamples, PmdError>>> {
        if self.sender.is_closed() {
            return Err(TrySendError::Closed(item));
        }
        if self.sender.capacity() <= 1 {
            return Err(TrySendError::Full(item));
        }
        self.sender.try_send(item)
    }

    /// Send the close reason into the reserved slot and drop the sender.
    fn close(self, kind: PmdMeasurementType, reason: PmdError) {
        if self.sender.try_send(Err(reason)).is_err() {
            debug!("{kind:?} stream receiver already gone");
        }
    }

    fn decode(&mut self, mut frame: MeasurementFrame) -> Result<PmdSamples, PmdError> {
        if let Some(secret) = &self.secret {
            frame.payload = secret.decrypt(&frame.payload)?;
        }
        // The rate only anchors the first frame; later ones interpolate.
        let ctx = FrameContext {
            previous_timestamp: self.previous_timestamp,
            factor: self.factor,
            sample_rate: if self.previous_timestamp == 0 {
                self.sample_rate
            } else {
                None
            },
        };
        let decoded = decode_frame(&frame, &ctx);
        self.previous_timestamp = frame.timestamp;
        decoded
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── PmdClient ─────────────────────────────────────────────────────────────────

/// Orchestrates PMD commands and measurement streams for one connection.
///
/// Share it behind an [`Arc`] between the task issuing commands and the task
/// pumping notifications.
pub struct PmdClient {
    writer: Arc<dyn ControlPointWriter>,
    config: PmdClientConfig,
    /// Serialises commands so at most one waits on `responses`.
    command_lock: AsyncMutex<()>,
    responses: Slot<PmdControlPointResponse>,
    /// Response whose `more` flag is set, waiting for its continuation.
    partial_response: Mutex<Option<PmdControlPointResponse>>,
    rfc76_messages: Slot<Vec<u8>>,
    reassembler: Mutex<Rfc76Reassembler>,
    streams: Mutex<HashMap<PmdMeasurementType, StreamState>>,
    link_up: AtomicBool,
    link_lost: Notify,
}

impl PmdClient {
    pub fn new(writer: Arc<dyn ControlPointWriter>, config: PmdClientConfig) -> Self {
        Self {
            writer,
            config,
            command_lock: AsyncMutex::new(()),
            responses: Slot::new("control point"),
            partial_response: Mutex::new(None),
            rfc76_messages: Slot::new("RFC76"),
            reassembler: Mutex::new(Rfc76Reassembler::new()),
            streams: Mutex::new(HashMap::new()),
            link_up: AtomicBool::new(true),
            link_lost: Notify::new(),
        }
    }

    fn ensure_connected(&self) -> Result<(), PmdError> {
        if self.link_up.load(Ordering::Acquire) && self.writer.is_connected() {
            Ok(())
        } else {
            Err(PmdError::Disconnected)
        }
    }

    async fn wait_on<T>(&self, slot: &Slot<T>) -> Result<T, PmdError> {
        let lost = self.link_lost.notified();
        self.ensure_connected()?;
        let mut rx = slot.rx.lock().await;
        tokio::select! {
            received = tokio::time::timeout(self.config.response_timeout, rx.recv()) => {
                match received {
                    Err(_) => Err(PmdError::Timeout),
                    Ok(None) => Err(PmdError::Disconnected),
                    Ok(Some(item)) => item,
                }
            }
            _ = lost => Err(PmdError::Disconnected),
        }
    }

    /// Write `command` and wait for its (possibly multi-part) response.
    async fn send_command(&self, command: Vec<u8>) -> Result<PmdControlPointResponse, PmdError> {
        let _guard = self.command_lock.lock().await;
        self.ensure_connected()?;
        self.responses.drain().await;
        *lock(&self.partial_response) = None;

        let opcode = command.first().copied().unwrap_or_default();
        debug!("control point ← {command:02X?}");
        self.writer.write(command).await?;

        let response = self.wait_on(&self.responses).await?;
        if response.opcode != opcode {
            warn!(
                "control point answered opcode 0x{:02X} while waiting for 0x{opcode:02X}",
                response.opcode
            );
        }
        response.into_result()
    }

    // ── Public: measurement streams ───────────────────────────────────────────

    /// Available settings for `kind`.
    pub async fn get_settings(
        &self,
        kind: PmdMeasurementType,
        recording: PmdRecordingType,
    ) -> Result<PmdSetting, PmdError> {
        let response = self.send_command(encode_get_settings(kind, recording)).await?;
        PmdSetting::parse(&response.parameters)
    }

    /// Start an online measurement and return its stream.
    ///
    /// `settings` should hold one value per type (see
    /// [`PmdSetting::max_settings`]). Frames are decrypted with `secret`
    /// before decoding when one is given.
    pub async fn start_measurement(
        &self,
        kind: PmdMeasurementType,
        settings: &PmdSetting,
        secret: Option<PmdSecret>,
    ) -> Result<PmdStream, PmdError> {
        let command = encode_start(kind, PmdRecordingType::Online, settings, secret.as_ref())?;
        let (sender, receiver) = mpsc::channel(self.config.stream_buffer + 1);
        {
            let mut streams = lock(&self.streams);
            if streams.contains_key(&kind) {
                return Err(PmdError::AlreadyStreaming(kind));
            }
            // Registered before the write so no early frame is lost.
            streams.insert(
                kind,
                StreamState {
                    sender,
                    previous_timestamp: 0,
                    factor: 1.0,
                    sample_rate: settings.sample_rate(),
                    secret,
                },
            );
        }

        match self.send_command(command).await {
            Ok(_) => {
                info!("{kind:?} stream started");
                Ok(receiver)
            }
            Err(e) => {
                lock(&self.streams).remove(&kind);
                Err(e)
            }
        }
    }

    /// Stop an online measurement. Stopping a type that is not streaming
    /// succeeds.
    pub async fn stop_measurement(&self, kind: PmdMeasurementType) -> Result<(), PmdError> {
        if lock(&self.streams).remove(&kind).is_some() {
            info!("{kind:?} stream stopped");
        }
        match self.send_command(encode_stop(kind, PmdRecordingType::Online)).await {
            Ok(_) => Ok(()),
            Err(PmdError::ControlPoint { status, .. })
                if PmdControlPointStatus::from(status) == PmdControlPointStatus::AlreadyInState =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `kind` currently has an open stream.
    pub fn is_streaming(&self, kind: PmdMeasurementType) -> bool {
        lock(&self.streams).contains_key(&kind)
    }

    // ── Public: offline recording ─────────────────────────────────────────────

    /// Start recording `kind` to device storage. No stream is opened.
    pub async fn start_offline_recording(
        &self,
        kind: PmdMeasurementType,
        settings: &PmdSetting,
        secret: Option<&PmdSecret>,
    ) -> Result<(), PmdError> {
        self.send_command(encode_start(kind, PmdRecordingType::Offline, settings, secret)?)
            .await
            .map(|_| ())
    }

    pub async fn stop_offline_recording(&self, kind: PmdMeasurementType) -> Result<(), PmdError> {
        self.send_command(encode_stop(kind, PmdRecordingType::Offline))
            .await
            .map(|_| ())
    }

    pub async fn get_offline_trigger(&self) -> Result<PmdOfflineTrigger, PmdError> {
        let response = self
            .send_command(PmdControlPointCommand::GetOfflineRecordingTriggerStatus.encode(&[]))
            .await?;
        PmdOfflineTrigger::parse(&response.parameters)
    }

    pub async fn set_offline_trigger_mode(
        &self,
        mode: PmdOfflineTriggerMode,
    ) -> Result<(), PmdError> {
        self.send_command(encode_set_trigger_mode(mode)).await.map(|_| ())
    }

    pub async fn set_offline_trigger_setting(
        &self,
        kind: PmdMeasurementType,
        status: PmdOfflineTriggerStatus,
        setting: Option<&PmdSetting>,
        secret: Option<&PmdSecret>,
    ) -> Result<(), PmdError> {
        self.send_command(encode_set_trigger_setting(kind, status, setting, secret)?)
            .await
            .map(|_| ())
    }

    // ── Public: RFC76 ─────────────────────────────────────────────────────────

    /// Wait for the next complete message on the PSFTP MTU characteristic.
    pub async fn wait_rfc76_message(&self) -> Result<Vec<u8>, PmdError> {
        self.wait_on(&self.rfc76_messages).await
    }

    /// Latest RFC76 error frame the device sent, as [`PmdError::Protocol`].
    /// Error frames do not fail [`wait_rfc76_message`](Self::wait_rfc76_message).
    pub fn take_rfc76_error(&self) -> Option<PmdError> {
        lock(&self.reassembler).take_error()
    }

    // ── Public: transport input ───────────────────────────────────────────────

    /// Route one notification. A non-zero `transport_status` fails whatever
    /// is waiting on `characteristic` with [`PmdError::Transport`].
    ///
    /// Nothing is decoded while the link is down, either after
    /// [`process_connection_lost`](Self::process_connection_lost) or while
    /// [`ControlPointWriter::is_connected`] returns `false`.
    pub fn process_notification(&self, characteristic: Uuid, data: &[u8], transport_status: u8) {
        if self.ensure_connected().is_err() {
            debug!("link down, ignoring notification from {characteristic}");
            return;
        }
        if transport_status != 0 {
            self.fail_pending(characteristic, PmdError::Transport(transport_status));
            return;
        }

        if characteristic == PMD_CONTROL_POINT {
            self.route_control_point(data);
        } else if characteristic == PMD_DATA {
            self.route_data(data);
        } else if characteristic == PSFTP_MTU {
            self.route_rfc76(data);
        } else {
            debug!("ignoring notification from {characteristic}");
        }
    }

    /// Fail every pending wait and close every stream with
    /// [`PmdError::Disconnected`]. Later calls fail fast.
    pub fn process_connection_lost(&self) {
        info!("PMD link lost");
        self.link_up.store(false, Ordering::Release);
        self.link_lost.notify_waiters();
        lock(&self.reassembler).reset();
        *lock(&self.partial_response) = None;
        for (kind, stream) in lock(&self.streams).drain() {
            debug!("closing {kind:?} stream");
            stream.close(kind, PmdError::Disconnected);
        }
    }

    // ── Private: routing ──────────────────────────────────────────────────────

    fn fail_pending(&self, characteristic: Uuid, error: PmdError) {
        warn!("{characteristic}: {error}");
        if characteristic == PMD_CONTROL_POINT {
            *lock(&self.partial_response) = None;
            self.responses.offer(Err(error));
        } else if characteristic == PSFTP_MTU {
            self.rfc76_messages.offer(Err(error));
        } else if characteristic == PMD_DATA {
            for (kind, stream) in lock(&self.streams).iter() {
                if stream.deliver(Err(error.clone())).is_err() {
                    warn!("{kind:?} stream full, dropping transport error");
                }
            }
        }
    }

    fn route_control_point(&self, data: &[u8]) {
        match data.first() {
            Some(&CONTROL_POINT_RESPONSE_CODE) => match PmdControlPointResponse::parse(data) {
                Ok(response) => self.accept_response(response),
                Err(e) => self.responses.offer(Err(e)),
            },
            Some(&ONLINE_MEASUREMENT_STOPPED) => self.close_streams(&data[1..]),
            Some(other) => warn!("unknown control point notification 0x{other:02X}"),
            None => warn!("empty control point notification"),
        }
    }

    fn accept_response(&self, response: PmdControlPointResponse) {
        let mut partial = lock(&self.partial_response);
        let response = match partial.take() {
            Some(mut head) => {
                head.parameters.extend_from_slice(&response.parameters);
                head.more = response.more;
                head
            }
            None => response,
        };
        if response.more {
            *partial = Some(response);
            return;
        }
        drop(partial);

        if response.opcode == PmdControlPointCommand::RequestMeasurementStart as u8
            && response.status() == PmdControlPointStatus::Success
        {
            self.apply_start_response(&response);
        }
        self.responses.offer(Ok(response));
    }

    /// Pick the scale factor out of a start response before any frame of the
    /// new stream is decoded.
    fn apply_start_response(&self, response: &PmdControlPointResponse) {
        let Some(kind) = PmdMeasurementType::from_id(response.measurement_type) else {
            return;
        };
        if response.parameters.is_empty() {
            return;
        }
        match PmdSetting::parse(&response.parameters).map(|s| s.factor()) {
            Ok(Some(factor)) => {
                if let Some(stream) = lock(&self.streams).get_mut(&kind) {
                    debug!("{kind:?} factor {factor}");
                    stream.factor = factor;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("{kind:?} start response parameters: {e}"),
        }
    }

    fn close_streams(&self, types: &[u8]) {
        let mut streams = lock(&self.streams);
        for &id in types {
            let Some(kind) = PmdMeasurementType::from_id(id) else {
                warn!("stop notification for unknown type 0x{id:02X}");
                continue;
            };
            if let Some(stream) = streams.remove(&kind) {
                info!("{kind:?} stream stopped by device");
                stream.close(kind, PmdError::StreamClosed(kind));
            }
        }
    }

    fn route_data(&self, data: &[u8]) {
        let frame = match MeasurementFrame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping PMD data notification: {e}");
                return;
            }
        };
        let kind = frame.measurement_type;
        let mut streams = lock(&self.streams);
        let Some(stream) = streams.get_mut(&kind) else {
            debug!("{kind:?} frame with no active stream, ignoring");
            return;
        };
        let decoded = stream.decode(frame);
        if let Err(e) = &decoded {
            debug!("{kind:?} frame failed to decode: {e}");
        }
        match stream.deliver(decoded) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("{kind:?} stream full, dropping frame"),
            Err(TrySendError::Closed(_)) => {
                debug!("{kind:?} stream receiver dropped");
                streams.remove(&kind);
            }
        }
    }

    fn route_rfc76(&self, data: &[u8]) {
        let frame = match Rfc76Frame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping RFC76 notification: {e}");
                return;
            }
        };
        let complete = lock(&self.reassembler).push(frame);
        if let Some(message) = complete {
            debug!("RFC76 message of {} bytes", message.len());
            self.rfc76_messages.offer(Ok(message));
        }
    }
}
