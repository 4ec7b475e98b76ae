//! Transport Boundary
//!
//! The supervisor talks to the radio stack only through [`Transport`]
//! (outbound requests) and [`TransportEvent`] (inbound callbacks). Requests
//! are fire-and-forget: a returned `Ok` means the request was issued, its
//! outcome arrives later as an event.

use crate::domain::models::{DeviceId, DiscoveryEvent};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable")]
    Unavailable,
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Callbacks delivered by the transport, from any thread
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Discovered(DiscoveryEvent),
    Connected(DeviceId),
    Disconnected(DeviceId),
    /// GATT discovery finished; lists the characteristic UUIDs of the
    /// controller service
    ServicesReady {
        device: DeviceId,
        characteristics: Vec<u128>,
    },
    /// Notifications enabled on the data characteristic
    Subscribed(DeviceId),
    /// Connect, discovery or subscription failed
    BindFailed {
        device: DeviceId,
        reason: String,
    },
    Notification {
        device: DeviceId,
        bytes: Vec<u8>,
    },
}

/// Outbound requests to the radio stack
pub trait Transport: Send {
    /// Whether this host can talk to the controller at all
    fn is_available(&self) -> bool;

    fn start_scan(&mut self) -> Result<(), TransportError>;

    fn stop_scan(&mut self) -> Result<(), TransportError>;

    fn connect(&mut self, device: &DeviceId) -> Result<(), TransportError>;

    fn disconnect(&mut self, device: &DeviceId) -> Result<(), TransportError>;

    /// Write the client configuration descriptor of `characteristic` to
    /// enable notifications
    fn enable_notifications(
        &mut self,
        device: &DeviceId,
        characteristic: u128,
    ) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        (**self).start_scan()
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        (**self).stop_scan()
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        (**self).connect(device)
    }

    fn disconnect(&mut self, device: &DeviceId) -> Result<(), TransportError> {
        (**self).disconnect(device)
    }

    fn enable_notifications(
        &mut self,
        device: &DeviceId,
        characteristic: u128,
    ) -> Result<(), TransportError> {
        (**self).enable_notifications(device, characteristic)
    }
}

/// Cloneable, non-blocking entry point for transport callbacks
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { sender }
    }

    /// Push an event; silently dropped once the supervisor is gone
    pub fn send(&self, event: TransportEvent) {
        let _ = self.sender.send(event);
    }

    pub fn discovered(&self, device: DeviceId, rssi: Option<i16>) {
        self.send(TransportEvent::Discovered(DiscoveryEvent {
            device,
            rssi,
            at: Instant::now(),
        }));
    }

    pub fn connected(&self, device: DeviceId) {
        self.send(TransportEvent::Connected(device));
    }

    pub fn disconnected(&self, device: DeviceId) {
        self.send(TransportEvent::Disconnected(device));
    }

    pub fn services_ready(&self, device: DeviceId, characteristics: Vec<u128>) {
        self.send(TransportEvent::ServicesReady {
            device,
            characteristics,
        });
    }

    pub fn subscribed(&self, device: DeviceId) {
        self.send(TransportEvent::Subscribed(device));
    }

    pub fn bind_failed(&self, device: DeviceId, reason: impl Into<String>) {
        self.send(TransportEvent::BindFailed {
            device,
            reason: reason.into(),
        });
    }

    pub fn notification(&self, device: DeviceId, bytes: Vec<u8>) {
        self.send(TransportEvent::Notification { device, bytes });
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Transport for hosts without a usable BLE stack
#[derive(Debug, Default)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn is_available(&self) -> bool {
        false
    }

    fn start_scan(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }

    fn stop_scan(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn connect(&mut self, _device: &DeviceId) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }

    fn disconnect(&mut self, _device: &DeviceId) -> Result<(), TransportError> {
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        _device: &DeviceId,
        _characteristic: u128,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }
}
