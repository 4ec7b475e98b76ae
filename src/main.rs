use daydream_controller::domain::gestures::SwipeDirection;
use daydream_controller::domain::models::{AppEvent, ConnectionStatus, ControllerState};
use daydream_controller::domain::settings::{Settings, SettingsService, TransportKind};
use daydream_controller::infrastructure::bluetooth::replay::{load_capture, ReplayTransport};
use daydream_controller::infrastructure::bluetooth::supervisor::event_channel;
use daydream_controller::infrastructure::bluetooth::transport::{EventSink, Transport};
use daydream_controller::infrastructure::bluetooth::{
    protocol, ConnectionSupervisor, SupervisorConfig, SupervisorTask,
};
use daydream_controller::infrastructure::logging::{self, ConsoleTarget};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Overrides the settings file location
const SETTINGS_ENV: &str = "DAYDREAM_SETTINGS";

fn main() -> anyhow::Result<()> {
    let settings_service = match std::env::var_os(SETTINGS_ENV) {
        Some(path) => SettingsService::open(PathBuf::from(path)),
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let console = if settings.emit_json_states {
        ConsoleTarget::Stderr
    } else {
        ConsoleTarget::Stdout
    };
    let _logging_guard = logging::init_logger(&settings.log_settings, console)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!(
        "Starting Daydream Controller link (settings: {})",
        settings_service.path().display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let config = SupervisorConfig::from_settings(&settings)?;
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (sink, events) = event_channel();

    let transport = build_transport(&settings, sink)?;
    let supervisor = ConnectionSupervisor::new(transport, config, updates_tx);
    let (task, handle) = SupervisorTask::new(supervisor, events);
    let join = task.spawn();

    // A replayed capture ends with a disconnect; there is nothing to rescan
    let stop_on_disconnect = settings.transport == TransportKind::Replay;
    let mut reporter = StateReporter::new(&settings);
    let mut unsupported = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            update = updates.recv() => match update {
                Some(AppEvent::ConnectionStatus(status)) => {
                    info!("Connection status: {:?}", status);
                    match status {
                        ConnectionStatus::Unsupported => {
                            unsupported = true;
                            break;
                        }
                        ConnectionStatus::Disconnected if stop_on_disconnect => break,
                        _ => {}
                    }
                }
                Some(AppEvent::ControllerState(state)) => reporter.on_state(&state)?,
                None => break,
            }
        }
    }

    handle.stop();
    let supervisor = join.await?;
    info!("Processed {} controller reports", reporter.frames);
    if let Some(latest) = supervisor.latest() {
        debug!("Last controller state: {:?}", latest);
    }

    if unsupported {
        error!("No usable Bluetooth LE transport on this host");
        anyhow::bail!("controller transport unsupported");
    }
    Ok(())
}

fn build_transport(settings: &Settings, sink: EventSink) -> anyhow::Result<Box<dyn Transport>> {
    match settings.transport {
        TransportKind::Replay => {
            let path = settings
                .replay_capture_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("replay transport needs replay_capture_path"))?;
            let frames = load_capture(Path::new(path))?;
            Ok(Box::new(ReplayTransport::new(
                sink,
                frames,
                Duration::from_millis(settings.replay_frame_interval_ms),
                protocol::parse_uuid(&settings.ble_data_char_uuid)?,
            )))
        }
        TransportKind::Ble => platform_transport(settings, sink),
    }
}

#[cfg(windows)]
fn platform_transport(settings: &Settings, sink: EventSink) -> anyhow::Result<Box<dyn Transport>> {
    use daydream_controller::infrastructure::bluetooth::winrt::WinRtTransport;

    Ok(Box::new(WinRtTransport::new(
        sink,
        &settings.ble_service_uuid,
        &settings.ble_client_config_uuid,
    )?))
}

#[cfg(not(windows))]
fn platform_transport(
    _settings: &Settings,
    _sink: EventSink,
) -> anyhow::Result<Box<dyn Transport>> {
    use daydream_controller::infrastructure::bluetooth::transport::NoTransport;

    Ok(Box::new(NoTransport))
}

/// Consumer side of the state stream: logs swipes and button edges, and
/// optionally prints every snapshot as a JSON line
struct StateReporter {
    emit_json: bool,
    swipe_threshold: i32,
    last_direction: SwipeDirection,
    last_buttons: [bool; 5],
    frames: u64,
}

impl StateReporter {
    fn new(settings: &Settings) -> Self {
        Self {
            emit_json: settings.emit_json_states,
            swipe_threshold: settings.swipe_threshold,
            last_direction: SwipeDirection::None,
            last_buttons: [false; 5],
            frames: 0,
        }
    }

    fn on_state(&mut self, state: &ControllerState) -> anyhow::Result<()> {
        self.frames += 1;

        if self.emit_json {
            println!("{}", serde_json::to_string(state)?);
        }

        let direction =
            SwipeDirection::classify(state.swipe_x, state.swipe_y, self.swipe_threshold);
        if direction != self.last_direction {
            if direction != SwipeDirection::None {
                info!("Swipe {:?} ({}, {})", direction, state.swipe_x, state.swipe_y);
            }
            self.last_direction = direction;
        }

        let buttons = [state.click, state.home, state.app, state.vol_up, state.vol_down];
        const NAMES: [&str; 5] = ["click", "home", "app", "vol_up", "vol_down"];
        for ((name, now), before) in NAMES.iter().zip(buttons).zip(self.last_buttons) {
            if now && !before {
                info!("Button {} pressed", name);
            }
        }
        self.last_buttons = buttons;
        Ok(())
    }
}
