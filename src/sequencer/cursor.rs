// Sequence cursor - Measure/step state machine
// Tracks the playing position across the whole sequence, including loop wrap
// and count-in skipping

use super::settings::Settings;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorState {
    #[default]
    Idle,
    Playing,
    /// Non-looping sequence ended, or nothing playable is left
    Finished,
}

/// Position of the next step to schedule
#[derive(Debug, Clone, Default)]
pub struct SequenceCursor {
    state: CursorState,
    measure_index: usize,
    step_in_measure: usize,
    global_step: u64,
}

impl SequenceCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == CursorState::Playing
    }

    pub fn is_finished(&self) -> bool {
        self.state == CursorState::Finished
    }

    pub fn measure_index(&self) -> usize {
        self.measure_index
    }

    pub fn step_in_measure(&self) -> usize {
        self.step_in_measure
    }

    /// Loop-scoped absolute step index, used to correlate audio and UI
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Position the cursor at the start of `start_measure` (clamped into range)
    ///
    /// The global step counts every step of the preceding measures so that a
    /// mid-sequence start reports its absolute position.
    /// Returns false when the sequence has nothing playable.
    pub fn reset(&mut self, settings: &Settings, start_measure: usize) -> bool {
        let len = settings.measures.len();
        if len == 0 {
            self.state = CursorState::Finished;
            return false;
        }

        self.measure_index = start_measure.min(len - 1);
        self.step_in_measure = 0;
        self.global_step = settings.steps_before(self.measure_index);
        self.state = CursorState::Playing;

        if settings.measures[self.measure_index].step_count() == 0 {
            self.advance_measure(settings);
        }
        self.is_playing()
    }

    /// Back to idle (transport stopped)
    pub fn stop(&mut self) {
        self.state = CursorState::Idle;
        self.measure_index = 0;
        self.step_in_measure = 0;
        self.global_step = 0;
    }

    /// Move to the next step, rolling over into the next measure at the end of the pattern
    pub fn advance_step(&mut self, settings: &Settings) {
        if !self.is_playing() {
            return;
        }

        self.step_in_measure += 1;
        self.global_step += 1;

        let step_count = settings
            .measures
            .get(self.measure_index)
            .map_or(0, |m| m.step_count());
        if self.step_in_measure >= step_count {
            self.advance_measure(settings);
        }
    }

    /// Move to the first step of the next playable measure
    ///
    /// Past the end: finish when not looping, otherwise wrap to the loop restart
    /// index (skipping the count-in) with the global step rebased on it.
    /// Empty measures are skipped; one full pass without a playable measure finishes.
    pub fn advance_measure(&mut self, settings: &Settings) {
        let len = settings.measures.len();

        for _ in 0..=len {
            self.measure_index += 1;
            self.step_in_measure = 0;

            if self.measure_index >= len {
                if !settings.defaults.looping || len == 0 {
                    self.state = CursorState::Finished;
                    return;
                }
                let restart = settings.loop_restart_index();
                self.measure_index = restart;
                self.global_step = settings.steps_before(restart);
            }

            if settings.measures[self.measure_index].step_count() > 0 {
                return;
            }
        }

        log::warn!("No playable measure left in sequence, finishing");
        self.state = CursorState::Finished;
    }

    /// Bring the cursor back onto a playable step after the sequence changed under it
    ///
    /// Returns the (measure, step) to schedule next, or None once finished.
    pub fn normalize(&mut self, settings: &Settings) -> Option<(usize, usize)> {
        if !self.is_playing() {
            return None;
        }

        let in_range = settings
            .measures
            .get(self.measure_index)
            .is_some_and(|m| self.step_in_measure < m.step_count());
        if !in_range {
            self.advance_measure(settings);
        }

        if self.is_playing() {
            Some((self.measure_index, self.step_in_measure))
        } else {
            None
        }
    }
}
