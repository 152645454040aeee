/// Length of one 60 Hz reference frame, in milliseconds.
pub const REFERENCE_FRAME_MS: f64 = 1000.0 / 60.0;
/// Elapsed time above this is treated as a stall and clamped.
pub const CLAMP_MS: f64 = 100.0;

/// Largest `dt_factor` a single tick can produce.
pub const MAX_DT_FACTOR: f32 = (CLAMP_MS / REFERENCE_FRAME_MS) as f32;

/// Converts wall-clock elapsed milliseconds into a 60 Hz-relative step.
#[inline(always)]
pub fn dt_factor(elapsed_ms: f64) -> f32 {
    let elapsed = if elapsed_ms.is_finite() { elapsed_ms } else { 0.0 };
    (elapsed.clamp(0.0, CLAMP_MS) / REFERENCE_FRAME_MS) as f32
}

/// Remembers the previous frame timestamp so every tick integrates the real
/// elapsed time instead of a frame count.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last_frame_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts measuring from `now_ms`; the next `advance` sees only the time
    /// since this call.
    pub fn reset(&mut self, now_ms: f64) {
        self.last_frame_ms = Some(now_ms);
    }

    /// Returns the clamped step since the previous call. The first call after
    /// construction yields 0.
    pub fn advance(&mut self, now_ms: f64) -> f32 {
        let factor = match self.last_frame_ms {
            Some(last) => dt_factor(now_ms - last),
            None => 0.0,
        };
        self.last_frame_ms = Some(now_ms);
        factor
    }

    pub fn last_frame_ms(&self) -> Option<f64> {
        self.last_frame_ms
    }
}
