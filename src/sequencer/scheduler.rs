// Note scheduler - Lookahead loop
//
// On every wake-up, queue each not-yet-scheduled step that starts before
// `audio_now + lookahead`, one at a time and in strictly increasing time order.
// Nothing happens between wake-ups: the timing source must call back at a
// period shorter than the lookahead.

use std::time::Duration;

use crate::audio::output::{AudioOutput, NoteEvent};
use crate::sequencer::cursor::SequenceCursor;
use crate::sequencer::settings::{EffectiveParams, Settings};
use crate::sequencer::swing::step_duration;
use crate::timing::dispatcher::{StepSignal, StepSink};

/// Everything one scheduling pass reads or mutates
pub struct ScheduleContext<'a> {
    pub settings: &'a Settings,
    /// Effective parameters per measure, same length as `settings.measures`
    pub params: &'a [EffectiveParams],
    pub cursor: &'a mut SequenceCursor,
    pub output: &'a mut dyn AudioOutput,
    pub steps: &'a mut dyn StepSink,
    /// Playback session the UI signals belong to
    pub session: u64,
}

#[derive(Debug, Clone)]
pub struct NoteScheduler {
    lookahead: f64,
    next_note_time: f64,
}

impl NoteScheduler {
    pub fn new(lookahead_secs: f64) -> Self {
        Self {
            lookahead: lookahead_secs,
            next_note_time: 0.0,
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Audio time of the next unscheduled step
    pub fn next_note_time(&self) -> f64 {
        self.next_note_time
    }

    pub fn set_next_note_time(&mut self, time: f64) {
        self.next_note_time = time;
    }

    /// Schedule the step under the cursor at `next_note_time`, then advance
    ///
    /// The renderer gets the note (silent steps excepted), the UI sink gets the
    /// pre-advance global step delayed until the note sounds. Renderer failures
    /// are logged and skipped. Returns false when nothing is left to schedule.
    pub fn schedule_one(&mut self, ctx: &mut ScheduleContext<'_>, audio_now: f64) -> bool {
        let Some((measure_index, step)) = ctx.cursor.normalize(ctx.settings) else {
            return false;
        };
        let measure = &ctx.settings.measures[measure_index];
        let Some(kind) = measure.step_kind(step) else {
            return false;
        };
        let Some(params) = ctx.params.get(measure_index) else {
            log::error!("No effective parameters for measure {}", measure_index);
            return false;
        };

        let time = self.next_note_time;
        if time < audio_now {
            log::debug!(
                "Step {} scheduled {:.1}ms late",
                ctx.cursor.global_step(),
                (audio_now - time) * 1000.0
            );
        }

        if kind.is_audible() {
            let note = NoteEvent {
                sound_id: params.sound_for(kind),
                kind,
                time,
                volume: params.volume_for(kind),
            };
            if let Err(e) = ctx.output.render_note(&note) {
                log::warn!(
                    "Dropped note (measure {}, step {}): {}",
                    measure_index,
                    step,
                    e
                );
            }
        }

        ctx.steps.send(StepSignal::Step {
            global_step: ctx.cursor.global_step(),
            delay: Duration::from_secs_f64((time - audio_now).max(0.0)),
            session: ctx.session,
        });

        self.next_note_time += step_duration(measure.subdivisions, step, params.bpm, params.swing);
        ctx.cursor.advance_step(ctx.settings);
        true
    }

    /// Schedule everything inside the lookahead window; returns the number of steps queued
    pub fn fill(&mut self, ctx: &mut ScheduleContext<'_>, audio_now: f64) -> usize {
        let horizon = audio_now + self.lookahead;
        let mut scheduled = 0;
        while self.next_note_time < horizon && self.schedule_one(ctx, audio_now) {
            scheduled += 1;
        }
        scheduled
    }
}
