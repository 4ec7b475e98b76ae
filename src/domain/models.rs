use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::time::Instant;

/// One decoded controller report plus the swipe deltas derived from it.
///
/// Every field is filled on each decode; only the swipe baseline survives
/// between frames and that lives in the gesture tracker, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    // Synchronisation counters
    pub sync_time: u16,
    pub sync_seq: u8,

    // Button states
    pub click: bool,
    pub home: bool,
    pub app: bool,
    pub vol_up: bool,
    pub vol_down: bool,

    // Raw touchpad coordinates, (0, 0) while lifted
    pub touch_x: u8,
    pub touch_y: u8,

    // Accelerometer data
    pub acc_x: i32,
    pub acc_y: i32,
    pub acc_z: i32,

    // Gyroscope data
    pub gyr_x: i32,
    pub gyr_y: i32,
    pub gyr_z: i32,

    // Orientation (axis-angle) data
    pub ori_x: i32,
    pub ori_y: i32,
    pub ori_z: i32,

    // Swipe delta relative to touch-down
    pub swipe_x: i32,
    pub swipe_y: i32,
}

/// Scale factors used by consumers of the raw 13-bit sensor fields
pub mod sensor_scale {
    use super::PI;

    /// Orientation: full 13-bit positive range spans one turn
    pub const ORIENTATION: f32 = 2.0 * PI / 4095.0;
    /// Accelerometer: ±8 g range
    pub const ACCEL: f32 = 8.0 * 9.8 / 4095.0;
    /// Gyroscope: ±2048 dps range
    pub const GYRO: f32 = 2048.0 / 180.0 * PI / 4095.0;
}

impl ControllerState {
    pub fn is_touching(&self) -> bool {
        !(self.touch_x == 0 && self.touch_y == 0)
    }

    /// Any of the five buttons held
    pub fn any_button(&self) -> bool {
        self.click || self.home || self.app || self.vol_up || self.vol_down
    }

    /// Orientation as an axis-angle vector in radians
    pub fn orientation(&self) -> [f32; 3] {
        scale([self.ori_x, self.ori_y, self.ori_z], sensor_scale::ORIENTATION)
    }

    /// Acceleration in m/s²
    pub fn acceleration(&self) -> [f32; 3] {
        scale([self.acc_x, self.acc_y, self.acc_z], sensor_scale::ACCEL)
    }

    /// Angular velocity in rad/s
    pub fn angular_velocity(&self) -> [f32; 3] {
        scale([self.gyr_x, self.gyr_y, self.gyr_z], sensor_scale::GYRO)
    }
}

fn scale(raw: [i32; 3], factor: f32) -> [f32; 3] {
    raw.map(|v| v as f32 * factor)
}

/// Opaque transport-level device address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Format a 48-bit Bluetooth address as `AA:BB:CC:DD:EE:FF`
    pub fn from_bluetooth_address(address: u64) -> Self {
        let bytes = address.to_be_bytes();
        let text = bytes[2..]
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        Self(text)
    }

    /// Inverse of [`DeviceId::from_bluetooth_address`]
    pub fn to_bluetooth_address(&self) -> Option<u64> {
        let digits: String = self.0.chars().filter(|c| *c != ':').collect();
        if digits.len() != 12 {
            return None;
        }
        u64::from_str_radix(&digits, 16).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One advertisement seen by the transport scanner
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    pub device: DeviceId,
    pub rssi: Option<i16>,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Scanning,
    Connecting,
    Ready,
    Disconnected,
}

/// Supervisor-owned connection bookkeeping
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub target: Option<DeviceId>,
    pub last_activity: Option<Instant>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            target: None,
            last_activity: None,
        }
    }
}

/// Connection changes reported to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ready,
    Disconnected,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ControllerState(ControllerState),
    ConnectionStatus(ConnectionStatus),
}
