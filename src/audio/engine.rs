// Audio engine - cpal output stream driving the click mixer
//
// # Format Support
//
// The device's preferred sample format is detected via `sample_format()`:
// - **F32**: native, no conversion
// - **I16**: common on Windows/WASAPI
// - **U16**: rare
// Mixing is done in f32 and converted when writing the output frame, without
// allocation.
//
// # Stream Thread
//
// On macOS (CoreAudio) the Stream is not Send, so it is built, played and
// dropped on a dedicated host thread. `AudioEngine::start` waits for that
// thread to report either a running stream or an error, which lets start()
// fail loudly when the device cannot be opened.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use ringbuf::traits::Consumer;
use std::thread::{self, JoinHandle};

use crate::audio::clock::AudioClock;
use crate::audio::device::AudioDeviceManager;
use crate::audio::mixer::ClickMixer;
use crate::audio::output::{AudioBackend, AudioError, AudioOutput, CommandOutput, NoteEvent, RenderError};
use crate::audio::status::{DeviceStatus, StreamHealth};
use crate::config::AudioConfig;
use crate::messaging::channels::{CommandConsumer, create_command_channel};
use crate::messaging::command::AudioCommand;

/// Writes a mono sample to every channel of an interleaved frame
#[inline]
fn write_mono_to_interleaved_frame<T>(sample: f32, frame: &mut [T])
where
    T: Sample + FromSample<f32>,
{
    for channel_sample in frame.iter_mut() {
        *channel_sample = Sample::from_sample::<f32>(sample);
    }
}

/// Running output stream; dropping it stops the stream
pub struct AudioEngine {
    output: CommandOutput,
    health: StreamHealth,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Reported by the host thread once the stream is playing
struct StreamReady {
    clock: AudioClock,
    channels: usize,
}

impl AudioEngine {
    /// Open the configured device and start the stream
    pub fn start(config: &AudioConfig) -> Result<Self, AudioError> {
        let (producer, consumer) = create_command_channel(config.command_capacity);
        let (ready_tx, ready_rx) = bounded::<Result<StreamReady, AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let health = StreamHealth::new();

        let thread = {
            let config = config.clone();
            let health = health.clone();
            thread::Builder::new()
                .name("audio-stream".to_string())
                .spawn(move || stream_thread(config, consumer, health, ready_tx, shutdown_rx))?
        };

        let ready = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::InitAborted);
            }
        };

        log::info!(
            "Audio engine started: {} Hz, {} channels",
            ready.clock.sample_rate(),
            ready.channels
        );

        Ok(Self {
            output: CommandOutput::new(producer, ready.clock),
            health,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Build an output stream for any supported sample type
    ///
    /// The callback owns the mixer and the command consumer: it drains queued
    /// commands, mixes one frame at a time and advances the shared clock.
    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut consumer: CommandConsumer,
        mut mixer: ClickMixer,
        clock: AudioClock,
        health: StreamHealth,
    ) -> Result<Stream, AudioError>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let channels = config.channels as usize;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no locks past this point
                    while let Some(command) = consumer.try_pop() {
                        mixer.handle(command);
                    }

                    let block_start = clock.current_sample();
                    let mut frames = 0;
                    for frame in data.chunks_mut(channels) {
                        let sample = mixer.next_sample(block_start + frames as u64);
                        write_mono_to_interleaved_frame(sample, frame);
                        frames += 1;
                    }

                    clock.advance(frames);
                },
                move |err| {
                    if health.mark_failed() {
                        log::error!("Audio stream error: {}", err);
                    }
                },
                None,
            )
            .map_err(|e| AudioError::BuildStream(e.to_string()))
    }
}

/// Owns the stream for its whole life
fn stream_thread(
    config: AudioConfig,
    consumer: CommandConsumer,
    health: StreamHealth,
    ready_tx: Sender<Result<StreamReady, AudioError>>,
    shutdown_rx: Receiver<()>,
) {
    let stream = match open_stream(&config, consumer, &health) {
        Ok((stream, ready)) => {
            health.mark_running();
            if ready_tx.send(Ok(ready)).is_err() {
                return;
            }
            stream
        }
        Err(e) => {
            health.mark_failed();
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Park until the engine is dropped (message or disconnect)
    let _ = shutdown_rx.recv();
    drop(stream);
    health.mark_closed();
    log::info!("Audio stream closed");
}

fn open_stream(
    config: &AudioConfig,
    consumer: CommandConsumer,
    health: &StreamHealth,
) -> Result<(Stream, StreamReady), AudioError> {
    let device = AudioDeviceManager::new().resolve_output_device(config.device_name.as_deref())?;
    log::info!(
        "Audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let supported_config = device
        .default_output_config()
        .map_err(|e| AudioError::Config(e.to_string()))?;
    let sample_format = supported_config.sample_format();
    log::debug!("Audio config: {:?}", supported_config);

    let sample_rate = supported_config.sample_rate().0 as f32;
    let stream_config: StreamConfig = supported_config.into();
    let channels = stream_config.channels as usize;

    let clock = AudioClock::new(sample_rate);
    let mixer = ClickMixer::new(sample_rate, config.max_voices);

    let stream = match sample_format {
        SampleFormat::F32 => AudioEngine::build_stream::<f32>(
            &device,
            &stream_config,
            consumer,
            mixer,
            clock.clone(),
            health.clone(),
        ),
        SampleFormat::I16 => AudioEngine::build_stream::<i16>(
            &device,
            &stream_config,
            consumer,
            mixer,
            clock.clone(),
            health.clone(),
        ),
        SampleFormat::U16 => AudioEngine::build_stream::<u16>(
            &device,
            &stream_config,
            consumer,
            mixer,
            clock.clone(),
            health.clone(),
        ),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::PlayStream(e.to_string()))?;

    Ok((stream, StreamReady { clock, channels }))
}

impl AudioOutput for AudioEngine {
    fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    fn render_note(&mut self, note: &NoteEvent<'_>) -> Result<(), RenderError> {
        self.output.render_note(note)
    }

    fn ramp_master_gain(&mut self, target: f32, ramp_secs: f64) -> Result<(), RenderError> {
        self.output.ramp_master_gain(target, ramp_secs)
    }

    fn cancel_pending(&mut self) -> Result<(), RenderError> {
        self.output.cancel_pending()
    }

    fn device_status(&self) -> DeviceStatus {
        self.health.status()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.output.send(AudioCommand::Silence);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Backend that opens the system output device through cpal
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    config: AudioConfig,
}

impl CpalBackend {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl AudioBackend for CpalBackend {
    fn open(&mut self) -> Result<Box<dyn AudioOutput>, AudioError> {
        Ok(Box::new(AudioEngine::start(&self.config)?))
    }
}
