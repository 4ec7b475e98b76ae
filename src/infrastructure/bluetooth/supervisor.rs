//! Connection Supervisor
//!
//! Owns the scan → connect → subscribe → stream lifecycle of one controller.
//!
//! ```text
//!   Idle ──start──▶ Scanning ──selection──▶ Connecting ──subscribed──▶ Ready
//!                      ▲                        │                        │
//!                      └──────bind failure──────┘                        │
//!                      ▲                                                 │
//!                      └──────────── Disconnected ◀───── link lost ──────┘
//! ```
//!
//! All transitions run on one task ([`SupervisorTask::run`]); transport
//! callbacks only enqueue [`TransportEvent`]s through an [`EventSink`].

use crate::domain::gestures::MotionGestureTracker;
use crate::domain::models::{
    AppEvent, ConnectionPhase, ConnectionState, ConnectionStatus, ControllerState, DeviceId,
};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::selector::{DeviceSelector, SelectorConfig};
use crate::infrastructure::bluetooth::transport::{EventSink, Transport, TransportEvent};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// How often pending connects are checked for timeout
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("BLE transport is not supported on this host")]
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub data_characteristic: u128,
    pub connect_timeout: Duration,
    pub selector: SelectorConfig,
    pub debug_raw_data_logging: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            data_characteristic: 0x00000001_1000_1000_8000_00805f9b34fb,
            connect_timeout: Duration::from_secs(10),
            selector: SelectorConfig::default(),
            debug_raw_data_logging: false,
        }
    }
}

impl SupervisorConfig {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            data_characteristic: protocol::parse_uuid(&settings.ble_data_char_uuid)?,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            selector: SelectorConfig {
                debounce: Duration::from_millis(settings.selection_debounce_ms),
                allow_list: settings
                    .device_allow_list
                    .iter()
                    .map(DeviceId::new)
                    .collect(),
            },
            debug_raw_data_logging: settings.debug_raw_data_logging,
        })
    }
}

/// Progress of the bind while `Connecting`
#[derive(Debug, Default, Clone, Copy)]
struct BindProgress {
    connected: bool,
    subscribe_requested: bool,
}

pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    config: SupervisorConfig,
    selector: DeviceSelector,
    tracker: MotionGestureTracker,
    state: ConnectionState,
    bind: BindProgress,
    updates: mpsc::UnboundedSender<AppEvent>,
    latest: Option<ControllerState>,
    scan_active: bool,
    stopped: bool,
    unsupported: bool,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(
        transport: T,
        config: SupervisorConfig,
        updates: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            transport,
            selector: DeviceSelector::new(config.selector.clone()),
            config,
            tracker: MotionGestureTracker::new(),
            state: ConnectionState::default(),
            bind: BindProgress::default(),
            updates,
            latest: None,
            scan_active: false,
            stopped: false,
            unsupported: false,
        }
    }

    /// Leave `Idle` and start scanning.
    ///
    /// Without transport capability the supervisor stays `Idle` for good and
    /// reports `Unsupported` once.
    pub fn start(&mut self, now: Instant) -> Result<(), SupervisorError> {
        if self.unsupported {
            return Err(SupervisorError::Unsupported);
        }

        if !self.transport.is_available() {
            warn!("BLE transport unavailable; controller support disabled");
            self.unsupported = true;
            self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Unsupported));
            return Err(SupervisorError::Unsupported);
        }

        if self.state.phase != ConnectionPhase::Idle {
            debug!("Supervisor already running ({:?})", self.state.phase);
            return Ok(());
        }

        info!("Starting controller supervisor");
        self.stopped = false;
        self.selector.resume();
        self.begin_scanning(now);
        Ok(())
    }

    /// Apply one transport event
    pub fn handle(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Discovered(discovery) => {
                if self.state.phase != ConnectionPhase::Scanning {
                    trace!(
                        "Ignoring discovery of {} while {:?}",
                        discovery.device,
                        self.state.phase
                    );
                    return;
                }
                if let Some(device) = self.selector.offer(&discovery) {
                    self.begin_connect(device, now);
                }
            }
            TransportEvent::Connected(device) => {
                if !self.is_connecting_to(&device) {
                    return;
                }
                info!("Connected to {}, waiting for services", device);
                self.bind.connected = true;
                self.state.last_activity = Some(now);
            }
            TransportEvent::ServicesReady {
                device,
                characteristics,
            } => {
                if !self.is_connecting_to(&device) {
                    return;
                }
                if !self.bind.connected {
                    debug!("Ignoring services of {} before the link is up", device);
                    return;
                }
                self.state.last_activity = Some(now);

                let data_char = self.config.data_characteristic;
                if !characteristics.contains(&data_char) {
                    self.fail_connect(now, "data characteristic not found");
                    return;
                }

                info!("Enabling notifications on {}", device);
                match self.transport.enable_notifications(&device, data_char) {
                    Ok(()) => self.bind.subscribe_requested = true,
                    Err(e) => self.fail_connect(now, &e.to_string()),
                }
            }
            TransportEvent::Subscribed(device) => {
                if !self.is_connecting_to(&device) || !self.bind.subscribe_requested {
                    return;
                }
                info!("Controller {} ready", device);
                self.state.phase = ConnectionPhase::Ready;
                self.state.last_activity = Some(now);
                self.tracker.reset();
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Ready));
            }
            TransportEvent::BindFailed { device, reason } => {
                if self.is_connecting_to(&device) {
                    self.fail_connect(now, &reason);
                } else {
                    debug!("Ignoring bind failure for {}: {}", device, reason);
                }
            }
            TransportEvent::Disconnected(device) => {
                if !self.is_target(&device) {
                    return;
                }
                match self.state.phase {
                    ConnectionPhase::Connecting => self.fail_connect(now, "disconnected"),
                    ConnectionPhase::Ready => self.on_link_lost(now),
                    _ => {}
                }
            }
            TransportEvent::Notification { device, bytes } => {
                if self.state.phase != ConnectionPhase::Ready || !self.is_target(&device) {
                    return;
                }
                self.state.last_activity = Some(now);
                self.on_frame(&device, &bytes);
            }
        }
    }

    /// Periodic housekeeping: abandons connects that never completed
    pub fn tick(&mut self, now: Instant) {
        if self.state.phase != ConnectionPhase::Connecting {
            return;
        }

        let Some(since) = self.state.last_activity else {
            return;
        };
        if now.saturating_duration_since(since) >= self.config.connect_timeout {
            self.fail_connect(now, "connect timed out");
        }
    }

    /// Tear down the subscription and return to `Idle`. Safe from any state
    /// and safe to repeat.
    pub fn stop(&mut self) {
        let was_ready = self.state.phase == ConnectionPhase::Ready;

        if let Some(target) = self.state.target.take() {
            info!("Releasing {}", target);
            if let Err(e) = self.transport.disconnect(&target) {
                warn!("Disconnect request failed: {}", e);
            }
        }
        self.halt_scan();

        self.stopped = true;
        self.bind = BindProgress::default();
        self.tracker.reset();

        if was_ready {
            self.state.phase = ConnectionPhase::Disconnected;
            self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        }
        if self.state.phase != ConnectionPhase::Idle {
            info!("Supervisor stopped");
        }
        self.state.phase = ConnectionPhase::Idle;
    }

    fn on_frame(&mut self, device: &DeviceId, bytes: &[u8]) {
        if self.config.debug_raw_data_logging {
            trace!("Raw packet from {}: {:02X?}", device, bytes);
        }

        let mut state = match protocol::decode(bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!("Dropping frame from {}: {}", device, e);
                return;
            }
        };
        self.tracker.apply(&mut state);

        // Discovery ends with the first good frame
        if self.selector.is_scanning() {
            debug!("First frame decoded, stopping scan");
            self.selector.halt();
            self.halt_scan();
        }

        self.latest = Some(state);
        self.publish(AppEvent::ControllerState(state));
    }

    fn begin_scanning(&mut self, now: Instant) {
        self.state.phase = ConnectionPhase::Scanning;
        self.state.target = None;
        self.state.last_activity = Some(now);
        self.bind = BindProgress::default();

        if !self.scan_active {
            match self.transport.start_scan() {
                Ok(()) => {
                    info!("Scanning for controller...");
                    self.scan_active = true;
                }
                Err(e) => error!("Failed to start scan: {}", e),
            }
        }
    }

    fn begin_connect(&mut self, device: DeviceId, now: Instant) {
        info!("Connecting to {}", device);
        self.state.phase = ConnectionPhase::Connecting;
        self.state.target = Some(device.clone());
        self.state.last_activity = Some(now);
        self.bind = BindProgress::default();

        if let Err(e) = self.transport.connect(&device) {
            self.fail_connect(now, &e.to_string());
        }
    }

    /// `Connecting → Scanning`: drop the selection and look again
    fn fail_connect(&mut self, now: Instant, reason: &str) {
        warn!(
            "Connection to {} failed: {}",
            self.state
                .target
                .as_ref()
                .map(|d| d.as_str())
                .unwrap_or("?"),
            reason
        );

        if let Some(target) = self.state.target.take() {
            if let Err(e) = self.transport.disconnect(&target) {
                debug!("Cleanup disconnect failed: {}", e);
            }
        }
        self.begin_scanning(now);
    }

    /// `Ready → Disconnected → Scanning`
    fn on_link_lost(&mut self, now: Instant) {
        if let Some(target) = self.state.target.take() {
            info!("Lost connection to {}", target);
        }
        self.state.phase = ConnectionPhase::Disconnected;
        self.state.last_activity = Some(now);
        self.bind = BindProgress::default();
        self.tracker.reset();
        self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));

        if self.stopped {
            return;
        }
        self.selector.resume();
        self.begin_scanning(now);
    }

    fn halt_scan(&mut self) {
        if !self.scan_active {
            return;
        }
        self.scan_active = false;
        if let Err(e) = self.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }
    }

    fn is_target(&self, device: &DeviceId) -> bool {
        self.state.target.as_ref() == Some(device)
    }

    fn is_connecting_to(&self, device: &DeviceId) -> bool {
        self.state.phase == ConnectionPhase::Connecting && self.is_target(device)
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.updates.send(event);
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.phase
    }

    /// Last published controller snapshot
    pub fn latest(&self) -> Option<ControllerState> {
        self.latest
    }

    pub fn is_scan_active(&self) -> bool {
        self.scan_active
    }

    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[derive(Debug, Clone, Copy)]
enum SupervisorCommand {
    Stop,
}

/// Cloneable control handle for a running supervisor
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    commands: mpsc::UnboundedSender<SupervisorCommand>,
}

impl SupervisorHandle {
    /// Request shutdown; repeated calls and calls after exit are no-ops
    pub fn stop(&self) {
        let _ = self.commands.send(SupervisorCommand::Stop);
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// Create the channel transports push their callbacks into
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink::new(tx), rx)
}

/// Single-task event loop: the only place supervisor state is mutated
pub struct SupervisorTask<T: Transport> {
    supervisor: ConnectionSupervisor<T>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SupervisorCommand>,
}

impl<T: Transport + 'static> SupervisorTask<T> {
    pub fn new(
        supervisor: ConnectionSupervisor<T>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, SupervisorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                supervisor,
                events,
                commands: rx,
            },
            SupervisorHandle { commands: tx },
        )
    }

    /// Spawn onto the current tokio runtime
    pub fn spawn(self) -> JoinHandle<ConnectionSupervisor<T>> {
        tokio::spawn(self.run())
    }

    /// Run until stopped; hands the supervisor back for inspection
    pub async fn run(mut self) -> ConnectionSupervisor<T> {
        if let Err(e) = self.supervisor.start(Instant::now()) {
            warn!("Supervisor not started: {}", e);
            return self.supervisor;
        }

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(SupervisorCommand::Stop) | None => break,
                },
                event = self.events.recv() => match event {
                    Some(event) => self.supervisor.handle(event, Instant::now()),
                    None => break,
                },
                _ = ticker.tick() => self.supervisor.tick(Instant::now()),
            }
        }

        self.supervisor.stop();
        self.supervisor
    }
}
