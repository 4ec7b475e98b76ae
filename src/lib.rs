//! Motion controller link: decodes the controller's 20-byte BLE reports and
//! supervises discovery, connection and reconnection of one controller.

pub mod domain;
pub mod infrastructure;

pub use domain::models::{AppEvent, ConnectionStatus, ControllerState};
pub use infrastructure::bluetooth::protocol::{decode, DecodeError};
