//! Device Selection
//!
//! Picks the controller to bind to from the stream of advertisements. The
//! first acceptable device wins; signal strength is not ranked.

use crate::domain::models::{DeviceId, DiscoveryEvent};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default minimum spacing between two accepted selections
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub debounce: Duration,
    /// Empty accepts any device
    pub allow_list: Vec<DeviceId>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            allow_list: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct DeviceSelector {
    config: SelectorConfig,
    last_accepted: Option<Instant>,
    halted: bool,
}

impl DeviceSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            halted: false,
        }
    }

    /// Offer one discovery event; returns the device to connect to if the
    /// event is accepted.
    ///
    /// Acceptance records the event's own timestamp, so an event stamped
    /// before the last acceptance always falls inside the window.
    pub fn offer(&mut self, event: &DiscoveryEvent) -> Option<DeviceId> {
        if self.halted {
            return None;
        }

        if !self.is_allowed(&event.device) {
            debug!("Ignoring {} (not in allow-list)", event.device);
            return None;
        }

        if let Some(last) = self.last_accepted {
            let elapsed = event.at.saturating_duration_since(last);
            if event.at < last || elapsed < self.config.debounce {
                debug!(
                    "Ignoring {} ({}ms since last selection)",
                    event.device,
                    elapsed.as_millis()
                );
                return None;
            }
        }

        self.last_accepted = Some(event.at);
        info!("Selected device {} (rssi {:?})", event.device, event.rssi);
        Some(event.device.clone())
    }

    fn is_allowed(&self, device: &DeviceId) -> bool {
        self.config.allow_list.is_empty() || self.config.allow_list.contains(device)
    }

    /// Stop producing selections once data is flowing
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Allow selections again after a disconnect
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// Whether the selector still wants scan results
    pub fn is_scanning(&self) -> bool {
        !self.halted
    }

    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, at: Instant) -> DiscoveryEvent {
        DiscoveryEvent {
            device: DeviceId::new(id),
            rssi: Some(-60),
            at,
        }
    }

    #[test]
    fn test_first_discovered_wins_within_window() {
        let mut selector = DeviceSelector::default();
        let t0 = Instant::now();

        assert_eq!(selector.offer(&event("a", t0)), Some(DeviceId::new("a")));
        assert_eq!(
            selector.offer(&event("b", t0 + Duration::from_millis(1999))),
            None
        );
        assert_eq!(selector.last_accepted(), Some(t0));
    }

    #[test]
    fn test_window_reopens_after_debounce() {
        let mut selector = DeviceSelector::default();
        let t0 = Instant::now();

        assert!(selector.offer(&event("a", t0)).is_some());
        assert_eq!(
            selector.offer(&event("b", t0 + Duration::from_millis(2000))),
            Some(DeviceId::new("b"))
        );
        // Window now measured from the second acceptance
        assert_eq!(
            selector.offer(&event("c", t0 + Duration::from_millis(3500))),
            None
        );
    }

    #[test]
    fn test_stale_event_ignored() {
        let mut selector = DeviceSelector::default();
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);

        assert!(selector.offer(&event("a", later)).is_some());
        assert_eq!(selector.offer(&event("b", t0)), None);
    }

    #[test]
    fn test_strong_signal_does_not_preempt() {
        let mut selector = DeviceSelector::default();
        let t0 = Instant::now();

        let weak = DiscoveryEvent {
            rssi: Some(-95),
            ..event("weak", t0)
        };
        let strong = DiscoveryEvent {
            rssi: Some(-30),
            ..event("strong", t0 + Duration::from_millis(10))
        };
        assert_eq!(selector.offer(&weak), Some(DeviceId::new("weak")));
        assert_eq!(selector.offer(&strong), None);
    }

    #[test]
    fn test_halt_and_resume() {
        let mut selector = DeviceSelector::default();
        let t0 = Instant::now();

        selector.halt();
        assert!(!selector.is_scanning());
        assert_eq!(selector.offer(&event("a", t0)), None);

        selector.resume();
        assert!(selector.is_scanning());
        assert!(selector.offer(&event("a", t0)).is_some());
    }

    #[test]
    fn test_allow_list() {
        let mut selector = DeviceSelector::new(SelectorConfig {
            allow_list: vec![DeviceId::new("mine")],
            ..Default::default()
        });
        let t0 = Instant::now();

        assert_eq!(selector.offer(&event("other", t0)), None);
        // A rejected device does not consume the window
        assert_eq!(
            selector.offer(&event("mine", t0 + Duration::from_millis(5))),
            Some(DeviceId::new("mine"))
        );
    }
}
