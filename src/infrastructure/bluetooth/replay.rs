//! Capture Replay Transport
//!
//! Plays recorded controller reports through the normal scan/connect/
//! subscribe path, one frame per line of a capture file:
//!
//! ```text
//! # sync  ori ...
//! D2 CF 65 C7 FF 80 03 FF FF FE 32 CF D9 AE E2 C7 99 04 B5 00
//! d2:cf:65:c7:ff:80:03:ff:ff:fe:32:cf:d9:ae:e2:c7:99:04:b5:00
//! ```

use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::transport::{EventSink, Transport, TransportError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Address the replayed controller advertises under
pub const REPLAY_DEVICE: &str = "replay";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("capture line {line}: {reason}")]
pub struct CaptureError {
    pub line: usize,
    pub reason: String,
}

/// Parse capture text into raw frames. Frame length is not checked here so
/// malformed reports reach the decoder like they would from the radio.
pub fn parse_capture(text: &str) -> Result<Vec<Vec<u8>>, CaptureError> {
    let mut frames = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("");
        let digits: String = line
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        if digits.is_empty() {
            continue;
        }

        let error = |reason: &str| CaptureError {
            line: index + 1,
            reason: reason.to_string(),
        };

        if !digits.is_ascii() {
            return Err(error("invalid hex digit"));
        }
        if digits.len() % 2 != 0 {
            return Err(error("odd number of hex digits"));
        }

        let frame = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| error("invalid hex digit"))?;
        frames.push(frame);
    }

    Ok(frames)
}

pub fn load_capture(path: &Path) -> anyhow::Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path)?;
    let frames = parse_capture(&text)?;
    info!("Loaded {} frames from {}", frames.len(), path.display());
    Ok(frames)
}

pub struct ReplayTransport {
    sink: EventSink,
    device: DeviceId,
    frames: Arc<Vec<Vec<u8>>>,
    interval: Duration,
    data_characteristic: u128,
    exhausted: Arc<AtomicBool>,
    streaming: Option<JoinHandle<()>>,
}

impl ReplayTransport {
    pub fn new(
        sink: EventSink,
        frames: Vec<Vec<u8>>,
        interval: Duration,
        data_characteristic: u128,
    ) -> Self {
        Self {
            sink,
            device: DeviceId::new(REPLAY_DEVICE),
            frames: Arc::new(frames),
            interval,
            data_characteristic,
            exhausted: Arc::new(AtomicBool::new(false)),
            streaming: None,
        }
    }

    /// Whether every frame has been delivered
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    fn check_device(&self, device: &DeviceId) -> Result<(), TransportError> {
        if *device != self.device {
            return Err(TransportError::Rejected(format!("unknown device {}", device)));
        }
        Ok(())
    }

    fn abort_stream(&mut self) {
        if let Some(task) = self.streaming.take() {
            task.abort();
        }
    }
}

impl Transport for ReplayTransport {
    fn is_available(&self) -> bool {
        true
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        if self.is_exhausted() {
            info!("Capture exhausted, nothing left to advertise");
            return Ok(());
        }
        self.sink.discovered(self.device.clone(), None);
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        self.check_device(device)?;
        self.sink.connected(device.clone());
        self.sink
            .services_ready(device.clone(), vec![self.data_characteristic]);
        Ok(())
    }

    fn disconnect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        self.check_device(device)?;
        self.abort_stream();
        self.sink.disconnected(device.clone());
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        device: &DeviceId,
        characteristic: u128,
    ) -> Result<(), TransportError> {
        self.check_device(device)?;
        if characteristic != self.data_characteristic {
            self.sink
                .bind_failed(device.clone(), "characteristic does not notify");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        self.abort_stream();
        self.sink.subscribed(device.clone());

        let sink = self.sink.clone();
        let device = device.clone();
        let frames = Arc::clone(&self.frames);
        let exhausted = Arc::clone(&self.exhausted);
        let interval = self.interval;

        self.streaming = Some(runtime.spawn(async move {
            for frame in frames.iter() {
                tokio::time::sleep(interval).await;
                if sink.is_closed() {
                    return;
                }
                sink.notification(device.clone(), frame.clone());
            }
            debug!("Replay finished after {} frames", frames.len());
            exhausted.store(true, Ordering::SeqCst);
            sink.disconnected(device);
        }));
        Ok(())
    }
}

impl Drop for ReplayTransport {
    fn drop(&mut self) {
        self.abort_stream();
    }
}
