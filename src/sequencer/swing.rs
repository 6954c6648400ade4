// Step duration - Subdivision length with swing
//
// Swing couples subdivisions in pairs inside a beat: the on-beat member is
// lengthened and the off-beat member shortened by the same amount, so a pair
// always lasts exactly two plain subdivisions.

/// Duration in seconds of one subdivision without swing
#[inline]
pub fn base_step_duration(subdivisions: u32, bpm: f64) -> f64 {
    (60.0 / bpm) / subdivisions.max(1) as f64
}

/// Duration in seconds of step `step_in_measure` of a measure with `subdivisions`
/// subdivisions per beat, at `bpm` with swing amount `swing` in [0, 1)
///
/// # Example
/// ```
/// use metronome_engine::sequencer::swing::step_duration;
/// // 120 BPM, eighth notes, swing 0.5
/// assert!((step_duration(2, 0, 120.0, 0.5) - 0.375).abs() < 1e-12);
/// assert!((step_duration(2, 1, 120.0, 0.5) - 0.125).abs() < 1e-12);
/// ```
pub fn step_duration(subdivisions: u32, step_in_measure: usize, bpm: f64, swing: f64) -> f64 {
    let base = base_step_duration(subdivisions, bpm);
    if swing <= 0.0 || subdivisions < 2 {
        return base;
    }

    let subdivisions = subdivisions as usize;
    let index_in_beat = step_in_measure % subdivisions;

    // Trailing subdivision of an odd grid has no partner
    if subdivisions % 2 == 1 && index_in_beat == subdivisions - 1 {
        return base;
    }

    if index_in_beat % 2 == 0 {
        base * (1.0 + swing)
    } else {
        base * (1.0 - swing)
    }
}
