//! The playback clock.
//!
//! A [`Timer`] is the single presentation-time source for a clip: the
//! consume tick advances it, frame eviction and the decode-loop drop policy
//! compare against it, and the seek engine jumps it. Several clips can share
//! one externally owned timer to play against a common timeline.

use parking_lot::Mutex;

#[derive(Debug)]
struct TimerState {
    time: f64,
    paused: bool,
}

/// Monotonic, pausable, seekable presentation clock. Starts running at 0.
///
/// All methods take `&self` so a timer can be shared as `Arc<Timer>`.
#[derive(Debug)]
pub struct Timer {
    state: Mutex<TimerState>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                time: 0.0,
                paused: false,
            }),
        }
    }

    /// Advances the clock by `dt` seconds. No-op while paused.
    pub fn update(&self, dt: f64) {
        let mut state = self.state.lock();
        if !state.paused {
            state.time += dt;
        }
    }

    /// Jumps to an absolute presentation time, in either state.
    pub fn seek(&self, time: f64) {
        self.state.lock().time = time;
    }

    /// Current presentation time in seconds.
    pub fn time(&self) -> f64 {
        self.state.lock().time
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn play(&self) {
        self.state.lock().paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
