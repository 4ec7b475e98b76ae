//! Drives the supervisor event loop end to end with a replayed capture.

use daydream_controller::domain::models::{AppEvent, ConnectionPhase, ConnectionStatus};
use daydream_controller::infrastructure::bluetooth::replay::{parse_capture, ReplayTransport};
use daydream_controller::infrastructure::bluetooth::supervisor::event_channel;
use daydream_controller::infrastructure::bluetooth::{
    ConnectionSupervisor, SupervisorConfig, SupervisorTask,
};
use std::time::Duration;
use tokio::sync::mpsc;

const CAPTURE: &str = "\
# known report: vol_up + app + click, touch (200, 37)
D2 CF 65 C7 FF 80 03 FF FF FE 32 CF D9 AE E2 C7 99 04 B5 00
# truncated report, must be dropped
D2 CF 65 C7
# touch (204, 37): swipe +4 on x
00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 19 84 a0 00
# finger lifted
00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
";

#[tokio::test]
async fn test_replayed_capture_flows_to_consumer() {
    let frames = parse_capture(CAPTURE).unwrap();
    assert_eq!(frames.len(), 4);

    let config = SupervisorConfig::default();
    let (updates_tx, mut updates) = mpsc::unbounded_channel();
    let (sink, events) = event_channel();
    let transport = ReplayTransport::new(
        sink,
        frames,
        Duration::from_millis(1),
        config.data_characteristic,
    );

    let supervisor = ConnectionSupervisor::new(transport, config, updates_tx);
    let (task, handle) = SupervisorTask::new(supervisor, events);
    let join = task.spawn();

    let mut received = Vec::new();
    let wait = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = updates.recv().await {
            let done = event == AppEvent::ConnectionStatus(ConnectionStatus::Disconnected);
            received.push(event);
            if done {
                break;
            }
        }
    });
    wait.await.expect("replay did not finish");

    handle.stop();
    let supervisor = join.await.unwrap();

    assert_eq!(
        received.first(),
        Some(&AppEvent::ConnectionStatus(ConnectionStatus::Ready))
    );
    assert_eq!(
        received.last(),
        Some(&AppEvent::ConnectionStatus(ConnectionStatus::Disconnected))
    );

    let states: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            AppEvent::ControllerState(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(states.len(), 3);

    let first = states[0];
    assert_eq!((first.touch_x, first.touch_y), (200, 37));
    assert_eq!((first.gyr_y, first.ori_z), (3000, -4096));
    assert!(first.click && first.app && first.vol_up);
    assert_eq!((first.swipe_x, first.swipe_y), (0, 0));

    let second = states[1];
    assert_eq!((second.touch_x, second.touch_y), (204, 37));
    assert_eq!((second.swipe_x, second.swipe_y), (4, 0));
    assert!(!second.any_button());

    let lifted = states[2];
    assert!(!lifted.is_touching());
    assert_eq!((lifted.swipe_x, lifted.swipe_y), (0, 0));

    assert_eq!(supervisor.latest(), Some(lifted));
    assert_eq!(supervisor.phase(), ConnectionPhase::Idle);
    assert!(supervisor.transport().is_exhausted());
}
