//! Bluetooth Module
//!
//! Connects to the motion controller and turns its notifications into
//! [`ControllerState`](crate::domain::models::ControllerState) snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ConnectionSupervisor                     │
//! │   (state machine - owns the link, publishes AppEvents)    │
//! └──────┬──────────────────┬───────────────────┬────────────┘
//!        │                  │                   │
//!        ▼                  ▼                   ▼
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Selector   │   │  Transport   │   │   Protocol    │
//! │             │   │              │   │               │
//! │ - debounce  │   │ - WinRT BLE  │   │ - UUIDs       │
//! │ - first     │   │ - replay     │   │ - 20-byte     │
//! │   wins      │   │ - events     │   │   decoder     │
//! └─────────────┘   └──────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Service identifiers and report decoding
//! - [`selector`] - Choosing a device from discovery events
//! - [`transport`] - Transport trait, inbound events and the event sink
//! - [`supervisor`] - Connection state machine and its event loop
//! - [`replay`] - Transport that plays back captured reports
//! - [`links`] - Pending and open links of a radio transport
//! - `winrt` - Windows BLE transport (Windows only)

pub mod links;
pub mod protocol;
pub mod replay;
pub mod selector;
pub mod supervisor;
pub mod transport;
#[cfg(windows)]
pub mod winrt;

pub use supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorHandle, SupervisorTask};
