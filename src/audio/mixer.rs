// Click mixer - Sample-accurate voice pool rendered by the audio callback
//
// Voices are pre-allocated; triggering a click only fills a slot. A voice stays
// silent until the frame index reaches its start position, which is how notes
// scheduled ahead of time land on the exact frame.

use crate::audio::dsp_utils::{GainRamp, flush_denormals_to_zero, soft_clip};
use crate::messaging::command::AudioCommand;
use crate::synth::click::{ClickBank, ClickSound};

#[derive(Debug, Clone, Copy, Default)]
struct ClickVoice {
    active: bool,
    table_id: usize,
    start_sample: u64,
    position: usize,
    gain: f32,
}

pub struct ClickMixer {
    bank: ClickBank,
    voices: Vec<ClickVoice>,
    master: GainRamp,
    /// Frame following the last rendered one
    next_frame: u64,
    sample_rate: f32,
}

impl ClickMixer {
    /// Master gain starts at 0 so the first fade-in ramps up from silence
    pub fn new(sample_rate: f32, max_voices: usize) -> Self {
        Self {
            bank: ClickBank::new(sample_rate),
            voices: vec![ClickVoice::default(); max_voices.max(1)],
            master: GainRamp::new(0.0),
            next_frame: 0,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Apply one queued command
    pub fn handle(&mut self, command: AudioCommand) {
        match command {
            AudioCommand::TriggerClick {
                start_sample,
                sound,
                accent,
                gain,
            } => self.trigger(start_sample, sound, accent, gain),
            AudioCommand::RampGain {
                target,
                ramp_samples,
            } => self.master.ramp_to(target, ramp_samples),
            AudioCommand::CancelPending => {
                let next_frame = self.next_frame;
                for voice in self.voices.iter_mut() {
                    if voice.start_sample >= next_frame {
                        voice.active = false;
                    }
                }
            }
            AudioCommand::Silence => {
                for voice in self.voices.iter_mut() {
                    voice.active = false;
                }
            }
        }
    }

    /// Claim a free voice; when the pool is full the voice that started first is stolen
    pub fn trigger(&mut self, start_sample: u64, sound: ClickSound, accent: bool, gain: f32) {
        let slot = match self.voices.iter().position(|v| !v.active) {
            Some(free) => free,
            None => self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.start_sample)
                .map_or(0, |(i, _)| i),
        };

        self.voices[slot] = ClickVoice {
            active: true,
            table_id: ClickBank::table_id(sound, accent),
            start_sample,
            position: 0,
            gain,
        };
    }

    /// Render the mono sample at absolute frame `sample_index`
    #[inline]
    pub fn next_sample(&mut self, sample_index: u64) -> f32 {
        let mut mix = 0.0f32;
        self.next_frame = sample_index + 1;

        for voice in self.voices.iter_mut().filter(|v| v.active) {
            if sample_index < voice.start_sample {
                continue;
            }
            let table = self.bank.table(voice.table_id);
            match table.get(voice.position) {
                Some(&sample) => {
                    mix += sample * voice.gain;
                    voice.position += 1;
                }
                None => voice.active = false,
            }
        }

        let gain = self.master.next_value();
        soft_clip(flush_denormals_to_zero(mix) * gain)
    }

    /// Render consecutive frames starting at `first_sample`
    pub fn render(&mut self, first_sample: u64, output: &mut [f32]) {
        for (offset, out) in output.iter_mut().enumerate() {
            *out = self.next_sample(first_sample + offset as u64);
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master.current()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn open_mixer() -> ClickMixer {
        let mut mixer = ClickMixer::new(SR, 8);
        mixer.handle(AudioCommand::RampGain {
            target: 1.0,
            ramp_samples: 0,
        });
        mixer
    }

    fn first_non_silent(buffer: &[f32]) -> Option<usize> {
        buffer.iter().position(|s| s.abs() > 1e-6)
    }

    #[test]
    fn test_click_starts_on_exact_frame() {
        let mut mixer = open_mixer();
        mixer.trigger(1234, ClickSound::Rim, false, 1.0);

        let mut out = vec![0.0; 4800];
        mixer.render(0, &mut out);
        // Rim mixes noise in from the very first sample
        assert_eq!(first_non_silent(&out), Some(1234));
    }

    #[test]
    fn test_late_click_plays_immediately() {
        let mut mixer = open_mixer();
        mixer.trigger(100, ClickSound::Rim, true, 1.0);

        let mut out = vec![0.0; 64];
        mixer.render(500, &mut out);
        assert_eq!(first_non_silent(&out), Some(0));
    }

    #[test]
    fn test_voice_frees_after_table_ends() {
        let mut mixer = open_mixer();
        mixer.trigger(0, ClickSound::Click, false, 0.5);
        assert_eq!(mixer.active_voices(), 1);

        // Click table is 15ms = 720 frames
        let mut out = vec![0.0; 800];
        mixer.render(0, &mut out);
        assert_eq!(mixer.active_voices(), 0);
        assert!(out[750..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_master_gain_scales_output() {
        let mut silent = ClickMixer::new(SR, 4);
        silent.trigger(0, ClickSound::Beep, false, 1.0);
        let mut out = vec![0.0; 256];
        silent.render(0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        silent.handle(AudioCommand::RampGain {
            target: 0.8,
            ramp_samples: 480,
        });
        let mut out = vec![0.0; 480];
        silent.render(256, &mut out);
        assert!((silent.master_gain() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_full_pool_steals_oldest_voice() {
        let mut mixer = ClickMixer::new(SR, 2);
        mixer.trigger(0, ClickSound::Cowbell, false, 1.0);
        mixer.trigger(10, ClickSound::Cowbell, false, 1.0);
        mixer.trigger(20, ClickSound::Cowbell, false, 1.0);
        assert_eq!(mixer.active_voices(), 2);
        assert!(mixer.voices.iter().all(|v| v.start_sample != 0));
    }

    #[test]
    fn test_cancel_pending_keeps_sounding_voices() {
        let mut mixer = open_mixer();
        mixer.trigger(0, ClickSound::Click, false, 1.0);
        mixer.trigger(2000, ClickSound::Cowbell, false, 1.0);

        let mut out = vec![0.0; 100];
        mixer.render(0, &mut out);
        mixer.handle(AudioCommand::CancelPending);
        assert_eq!(mixer.active_voices(), 1);

        let mut out = vec![0.0; 2500];
        mixer.render(100, &mut out);
        // The 720-frame click has ended and the cowbell never starts
        assert!(out[1000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_cuts_voices() {
        let mut mixer = open_mixer();
        mixer.trigger(0, ClickSound::Cowbell, false, 1.0);
        mixer.trigger(100, ClickSound::Hihat, false, 1.0);
        mixer.handle(AudioCommand::Silence);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_output_is_bounded_when_voices_pile_up() {
        let mut mixer = open_mixer();
        for _ in 0..8 {
            mixer.trigger(0, ClickSound::Cowbell, true, 1.0);
        }
        let mut out = vec![0.0; 1000];
        mixer.render(0, &mut out);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }
}
