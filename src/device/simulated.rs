use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use super::DeviceDriver;
use crate::error::{DeviceError, DeviceErrorKind};
use crate::pixel::{Pixel, PixelBuffer};
use crate::stats::Stats;

/// A frame as seen by the simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    pub pixels: Vec<Pixel>,
    pub dirty: Option<Range<usize>>,
}

#[derive(Debug, Default)]
struct State {
    geometry: Option<(usize, usize)>,
    frames: VecDeque<RecordedFrame>,
    refreshes: u64,
    opens: u64,
    closes: u64,
    fail_refreshes: u32,
    fail_open: Option<DeviceErrorKind>,
}

/// Device backend that records frames instead of lighting anything
pub struct SimulatedDriver {
    state: Arc<Mutex<State>>,
    history: usize,
}

/// Inspection and fault injection for a [`SimulatedDriver`] owned elsewhere
#[derive(Clone)]
pub struct SimulatedHandle {
    state: Arc<Mutex<State>>,
}

impl SimulatedDriver {
    pub fn new(history: usize) -> Self {
        SimulatedDriver {
            state: Arc::new(Mutex::new(State::default())),
            history: history.max(1),
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            state: Arc::clone(&self.state),
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // a panicking test thread must not hide the recorded frames
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DeviceDriver for SimulatedDriver {
    fn open(&mut self, strands: usize, pixels_per_strand: usize) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        state.opens += 1;
        if let Some(kind) = state.fail_open {
            if kind.is_fatal() {
                return Err(DeviceError::new(kind, "simulated open failure"));
            }
            state.geometry = Some((strands, pixels_per_strand));
            return Err(DeviceError::new(kind, "simulated degraded open"));
        }
        state.geometry = Some((strands, pixels_per_strand));
        debug!("Simulated device open: {} strands x {} pixels", strands, pixels_per_strand);
        Ok(())
    }

    fn refresh(&mut self, buffer: &PixelBuffer, stats: &mut Stats) -> Result<(), DeviceError> {
        let mut state = lock(&self.state);
        let Some((strands, per)) = state.geometry else {
            return Err(DeviceError::new(DeviceErrorKind::NotOpen, "simulated"));
        };
        if buffer.len() != strands * per {
            return Err(DeviceError::new(
                DeviceErrorKind::Length,
                format!("expected {} pixels, got {}", strands * per, buffer.len()),
            ));
        }
        if state.fail_refreshes > 0 {
            state.fail_refreshes -= 1;
            return Err(DeviceError::new(DeviceErrorKind::Write, "simulated write failure"));
        }

        if state.frames.len() == self.history {
            state.frames.pop_front();
        }
        state.frames.push_back(RecordedFrame {
            pixels: buffer.as_slice().to_vec(),
            dirty: buffer.dirty(),
        });
        state.refreshes += 1;
        stats.record_sent(buffer.len() * 3);
        trace!("Simulated refresh #{}", state.refreshes);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        if state.geometry.take().is_some() {
            state.closes += 1;
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl SimulatedHandle {
    /// Successful refreshes so far
    pub fn refreshes(&self) -> u64 {
        lock(&self.state).refreshes
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        lock(&self.state).frames.iter().cloned().collect()
    }

    pub fn last_frame(&self) -> Option<RecordedFrame> {
        lock(&self.state).frames.back().cloned()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).geometry.is_some()
    }

    pub fn opens(&self) -> u64 {
        lock(&self.state).opens
    }

    pub fn closes(&self) -> u64 {
        lock(&self.state).closes
    }

    /// Make the next `count` refresh calls fail with a write error
    pub fn fail_next_refreshes(&self, count: u32) {
        lock(&self.state).fail_refreshes = count;
    }

    /// Make every following open report `kind`
    pub fn fail_open(&self, kind: DeviceErrorKind) {
        lock(&self.state).fail_open = Some(kind);
    }
}
