use crate::domain::models::ControllerState;

/// Default swipe threshold in raw touchpad units
pub const DEFAULT_SWIPE_THRESHOLD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    None,
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// Classify a swipe delta. A direction is reported only once the dominant
    /// axis exceeds `threshold`; touchpad Y grows downwards.
    pub fn classify(dx: i32, dy: i32, threshold: i32) -> Self {
        let (ax, ay) = (dx.abs(), dy.abs());
        if ax <= threshold && ay <= threshold {
            return Self::None;
        }

        if ax >= ay {
            if dx > 0 {
                Self::Right
            } else {
                Self::Left
            }
        } else if dy > 0 {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// Turns absolute touch coordinates into a swipe delta relative to the
/// touch-down point.
///
/// The first touching frame only records the baseline, so the first non-zero
/// delta shows up one frame after touch-down.
#[derive(Debug, Default)]
pub struct MotionGestureTracker {
    baseline: Option<(i32, i32)>,
}

impl MotionGestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, touch_x: u8, touch_y: u8) -> (i32, i32) {
        if touch_x == 0 && touch_y == 0 {
            self.baseline = None;
            return (0, 0);
        }

        let (x, y) = (i32::from(touch_x), i32::from(touch_y));
        match self.baseline {
            Some((init_x, init_y)) => (x - init_x, y - init_y),
            None => {
                self.baseline = Some((x, y));
                (0, 0)
            }
        }
    }

    /// Fill `swipe_x`/`swipe_y` of a freshly decoded state
    pub fn apply(&mut self, state: &mut ControllerState) {
        let (dx, dy) = self.update(state.touch_x, state.touch_y);
        state.swipe_x = dx;
        state.swipe_y = dy;
    }

    pub fn is_tracking(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_resets_baseline() {
        let mut tracker = MotionGestureTracker::new();
        assert_eq!(tracker.update(5, 5), (0, 0));
        assert_eq!(tracker.update(0, 0), (0, 0));
        assert!(!tracker.is_tracking());
        assert_eq!(tracker.update(5, 5), (0, 0));
    }

    #[test]
    fn test_delta_accumulates_from_touch_down() {
        let mut tracker = MotionGestureTracker::new();
        assert_eq!(tracker.update(5, 5), (0, 0));
        assert_eq!(tracker.update(9, 5), (4, 0));
        assert_eq!(tracker.update(12, 1), (7, -4));
        assert_eq!(tracker.update(3, 5), (-2, 0));
    }

    #[test]
    fn test_first_frame_lag() {
        let mut tracker = MotionGestureTracker::new();
        // Touch-down far from any later point still yields no delta
        assert_eq!(tracker.update(200, 200), (0, 0));
        assert_eq!(tracker.update(100, 200), (-100, 0));
    }

    #[test]
    fn test_apply_fills_state() {
        let mut tracker = MotionGestureTracker::new();
        let mut state = ControllerState {
            touch_x: 40,
            touch_y: 80,
            ..Default::default()
        };
        tracker.apply(&mut state);
        assert_eq!((state.swipe_x, state.swipe_y), (0, 0));

        state.touch_x = 120;
        state.touch_y = 70;
        tracker.apply(&mut state);
        assert_eq!((state.swipe_x, state.swipe_y), (80, -10));
    }

    #[test]
    fn test_classify_swipe() {
        let t = DEFAULT_SWIPE_THRESHOLD;
        assert_eq!(SwipeDirection::classify(50, 0, t), SwipeDirection::None);
        assert_eq!(SwipeDirection::classify(51, 10, t), SwipeDirection::Right);
        assert_eq!(SwipeDirection::classify(-60, 20, t), SwipeDirection::Left);
        assert_eq!(SwipeDirection::classify(5, 70, t), SwipeDirection::Down);
        assert_eq!(SwipeDirection::classify(0, -51, t), SwipeDirection::Up);
    }
}
