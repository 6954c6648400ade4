// DSP utilities - Output hygiene and gain ramping for the click mixer
//
// Everything here runs inside the render callback: no allocation, no locking.

/// Flush denormals to zero
///
/// Decaying click tails end up as tiny values that are slow on some CPUs.
/// Threshold: 1e-15, far below 32-bit float noise.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh
///
/// Overlapping accented clicks can sum above 1.0; tanh bends them back into
/// [-1, 1] and stays near-linear around 0.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Linear gain ramp
///
/// Moves from the current value to a target over a fixed number of samples,
/// then holds. Retargeting mid-ramp starts from wherever the ramp currently is,
/// so there is never a discontinuity.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Ramp to `target` over `samples` samples (0 = jump immediately)
    pub fn ramp_to(&mut self, target: f32, samples: u32) {
        self.target = target;
        if samples == 0 {
            self.current = target;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / samples as f32;
            self.remaining = samples;
        }
    }

    /// Advance one sample and return the gain to apply to it
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }
}
