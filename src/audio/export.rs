// Audio Export - Offline rendering of a sequence to a buffer or WAV file
//
// Runs the real transport, command queue and click mixer against a simulated
// audio clock: each block first ticks the scheduler, then renders one tick
// interval worth of frames. Timing is therefore identical to live playback,
// just without waiting.

use hound::{WavSpec, WavWriter};
use ringbuf::traits::Consumer;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use crate::audio::clock::AudioClock;
use crate::audio::mixer::ClickMixer;
use crate::audio::output::{AudioBackend, AudioError, AudioOutput, CommandOutput};
use crate::config::EngineConfig;
use crate::messaging::channels::{CommandConsumer, create_command_channel};
use crate::sequencer::settings::{Settings, SettingsError};
use crate::sequencer::transport::{EngineError, Transport};
use crate::timing::dispatcher::{NullSink, StepSink};

/// Decay time rendered after a non-looping sequence ends
const TAIL_SECS: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Number of channels; the mono mix is copied to each
    pub channels: u16,
    /// Seconds to render; None renders a non-looping sequence to its end
    pub duration: Option<f64>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            duration: None,
        }
    }
}

/// Progress callback for export (reports 0.0 to 1.0)
pub type ProgressCallback = Box<dyn FnMut(f32) + Send>;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid duration {0}: must be a finite value > 0")]
    InvalidDuration(f64),

    #[error("A looping sequence needs an explicit export duration")]
    UnboundedLoop,

    #[error("Invalid sample rate {0}: must be > 0")]
    InvalidSampleRate(u32),
}

/// Hands the pre-built command output to the transport on its first start
struct OfflineBackend {
    output: Option<CommandOutput>,
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, AudioError> {
        self.output
            .take()
            .map(|output| Box::new(output) as Box<dyn AudioOutput>)
            .ok_or(AudioError::InitAborted)
    }
}

/// Transport + mixer on a simulated clock
pub struct OfflineRenderer {
    transport: Transport,
    consumer: CommandConsumer,
    mixer: ClickMixer,
    clock: AudioClock,
    block_frames: usize,
}

impl OfflineRenderer {
    pub fn new(
        config: &EngineConfig,
        sample_rate: u32,
        steps: Box<dyn StepSink>,
    ) -> Result<Self, ExportError> {
        if sample_rate == 0 {
            return Err(ExportError::InvalidSampleRate(sample_rate));
        }
        config.validate().map_err(EngineError::from)?;

        let clock = AudioClock::new(sample_rate as f32);
        let (producer, consumer) = create_command_channel(config.audio.command_capacity);
        let backend = OfflineBackend {
            output: Some(CommandOutput::new(producer, clock.clone())),
        };
        let transport = Transport::new(
            config.clone(),
            Box::new(backend),
            steps,
            Arc::new(AtomicU64::new(0)),
        );
        let block_frames = clock
            .seconds_to_samples(config.tick_interval().as_secs_f64())
            .max(1) as usize;

        Ok(Self {
            transport,
            consumer,
            mixer: ClickMixer::new(sample_rate as f32, config.audio.max_voices),
            clock,
            block_frames,
        })
    }

    /// Frames rendered per scheduler tick
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// Tick the scheduler, then render `out.len()` frames and advance the clock
    pub fn render_block(&mut self, out: &mut [f32]) {
        self.transport.tick();

        while let Some(command) = self.consumer.try_pop() {
            self.mixer.handle(command);
        }
        self.mixer.render(self.clock.current_sample(), out);
        self.clock.advance(out.len());
    }

    /// Render `frames` frames in tick-sized blocks
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames];
        for block in buffer.chunks_mut(self.block_frames) {
            self.render_block(block);
        }
        buffer
    }
}

/// Render a sequence from measure 0, handing each block to `write`
///
/// Returns the number of frames rendered.
pub fn render_offline<F>(
    settings: Settings,
    config: &EngineConfig,
    export: &ExportSettings,
    mut write: F,
    mut progress: Option<&mut ProgressCallback>,
) -> Result<u64, ExportError>
where
    F: FnMut(&[f32]) -> Result<(), ExportError>,
{
    if export.sample_rate == 0 {
        return Err(ExportError::InvalidSampleRate(export.sample_rate));
    }
    let sample_rate = export.sample_rate as f64;
    let total_frames = match export.duration {
        Some(d) if d.is_finite() && d > 0.0 => Some((d * sample_rate).round() as u64),
        Some(d) => return Err(ExportError::InvalidDuration(d)),
        None if settings.defaults.looping => return Err(ExportError::UnboundedLoop),
        None => None,
    };

    let mut renderer = OfflineRenderer::new(config, export.sample_rate, Box::new(NullSink))?;
    renderer.transport_mut().update_settings(settings)?;
    renderer.transport_mut().start(0)?;

    let block = renderer.block_frames();
    let mut buffer = vec![0.0f32; block];
    let mut tail_left = (TAIL_SECS * sample_rate) as u64;
    let report_every = export.sample_rate as u64;
    let mut next_report = report_every;
    let mut written: u64 = 0;

    log::info!(
        "Exporting audio at {} Hz ({})",
        export.sample_rate,
        total_frames.map_or_else(
            || "until the sequence ends".to_string(),
            |frames| format!("{:.2}s", frames as f64 / sample_rate)
        )
    );

    loop {
        let frames = match total_frames {
            Some(total) if written >= total => break,
            Some(total) => block.min((total - written) as usize),
            None if renderer.is_running() => block,
            None if tail_left == 0 => break,
            None => {
                let frames = block.min(tail_left as usize);
                tail_left -= frames as u64;
                frames
            }
        };

        renderer.render_block(&mut buffer[..frames]);
        write(&buffer[..frames])?;
        written += frames as u64;

        if written >= next_report {
            next_report += report_every;
            if let (Some(callback), Some(total)) = (progress.as_mut(), total_frames) {
                callback(written as f32 / total as f32);
            }
        }
    }

    if let Some(callback) = progress.as_mut() {
        callback(1.0);
    }
    log::info!("Export complete: {} frames", written);
    Ok(written)
}

/// Render a sequence into a mono buffer
pub fn render_to_buffer(
    settings: Settings,
    config: &EngineConfig,
    export: &ExportSettings,
) -> Result<Vec<f32>, ExportError> {
    let mut samples = Vec::new();
    render_offline(
        settings,
        config,
        export,
        |block| {
            samples.extend_from_slice(block);
            Ok(())
        },
        None,
    )?;
    Ok(samples)
}

/// Render a sequence into a 16-bit WAV file; returns the number of frames written
pub fn export_wav(
    path: &Path,
    settings: Settings,
    config: &EngineConfig,
    export: &ExportSettings,
    mut progress_callback: Option<ProgressCallback>,
) -> Result<u64, ExportError> {
    if export.sample_rate == 0 {
        return Err(ExportError::InvalidSampleRate(export.sample_rate));
    }
    let spec = WavSpec {
        channels: export.channels.max(1),
        sample_rate: export.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let frames = render_offline(
        settings,
        config,
        export,
        |block| {
            for &sample in block {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                for _ in 0..spec.channels {
                    writer.write_sample(value)?;
                }
            }
            Ok(())
        },
        progress_callback.as_mut(),
    )?;

    writer.finalize()?;
    log::info!("Exported {}", path.display());
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::settings::{Measure, PlaybackDefaults};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn finite(measures: Vec<Measure>) -> Settings {
        Settings::new(
            PlaybackDefaults {
                looping: false,
                ..PlaybackDefaults::default()
            },
            measures,
        )
    }

    #[test]
    fn test_export_settings_default() {
        let settings = ExportSettings::default();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.channels, 1);
        assert_eq!(settings.duration, None);
    }

    #[test]
    fn test_non_looping_sequence_renders_to_its_end() {
        let export = ExportSettings {
            sample_rate: 48000,
            ..ExportSettings::default()
        };
        // 4 beats at 120 BPM = 2s, first note after the 50ms start buffer
        let samples = render_to_buffer(
            finite(vec![Measure::with_default_pattern(4, 1)]),
            &EngineConfig::default(),
            &export,
        )
        .unwrap();

        let seconds = samples.len() as f64 / 48000.0;
        assert!(seconds > 2.05 && seconds < 2.5, "rendered {}s", seconds);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_looping_sequence_needs_duration() {
        let settings = Settings::new(
            PlaybackDefaults::default(),
            vec![Measure::with_default_pattern(4, 1)],
        );
        assert!(matches!(
            render_to_buffer(settings.clone(), &EngineConfig::default(), &ExportSettings::default()),
            Err(ExportError::UnboundedLoop)
        ));

        let export = ExportSettings {
            duration: Some(-1.0),
            ..ExportSettings::default()
        };
        assert!(matches!(
            render_to_buffer(settings, &EngineConfig::default(), &export),
            Err(ExportError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_zero_sample_rate_is_rejected() {
        let export = ExportSettings {
            sample_rate: 0,
            duration: Some(1.0),
            ..ExportSettings::default()
        };
        let settings = finite(vec![Measure::with_default_pattern(4, 1)]);
        assert!(matches!(
            render_to_buffer(settings, &EngineConfig::default(), &export),
            Err(ExportError::InvalidSampleRate(0))
        ));

        let dir = tempdir().unwrap();
        let path = dir.path().join("never.wav");
        let result = export_wav(
            &path,
            finite(vec![Measure::with_default_pattern(4, 1)]),
            &EngineConfig::default(),
            &export,
            None,
        );
        assert!(matches!(result, Err(ExportError::InvalidSampleRate(0))));
        assert!(!path.exists());

        assert!(matches!(
            OfflineRenderer::new(&EngineConfig::default(), 0, Box::new(NullSink)),
            Err(ExportError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn test_empty_sequence_is_an_engine_error() {
        let export = ExportSettings {
            duration: Some(1.0),
            ..ExportSettings::default()
        };
        assert!(matches!(
            render_to_buffer(finite(vec![]), &EngineConfig::default(), &export),
            Err(ExportError::Engine(EngineError::NothingToPlay))
        ));
    }

    #[test]
    fn test_export_wav_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        let export = ExportSettings {
            sample_rate: 22050,
            channels: 2,
            duration: Some(1.0),
        };

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let frames = export_wav(
            &path,
            finite(vec![Measure::with_default_pattern(2, 2)]),
            &EngineConfig::default(),
            &export,
            Some(Box::new(move |p: f32| sink.lock().unwrap().push(p))),
        )
        .unwrap();
        assert_eq!(frames, 22050);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 2 * 22050);
        assert_eq!(reports.lock().unwrap().last(), Some(&1.0));
    }
}
