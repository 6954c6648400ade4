// Metronome Engine - Demo player and WAV export

use clap::Parser;
use metronome_engine::audio::device::AudioDeviceManager;
use metronome_engine::{
    EngineConfig, ExportSettings, Measure, PlaybackController, PlaybackDefaults, STOPPED_STEP,
    Settings, export_wav,
};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metronome_engine")]
#[command(about = "Play a measure sequence with sample-accurate clicks, or render it to WAV")]
struct Args {
    /// Settings file (.json or .ron); plays a built-in demo when omitted
    settings: Option<PathBuf>,

    /// Engine configuration file (.ron or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Measure to start from
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Render to this WAV file instead of playing
    #[arg(long)]
    export: Option<PathBuf>,

    /// Export duration in seconds (required for looping sequences)
    #[arg(long)]
    seconds: Option<f64>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

/// Two bars of 4/4 eighths after a one-bar count-in
fn demo_settings() -> Settings {
    Settings::new(
        PlaybackDefaults {
            count_in: true,
            ..PlaybackDefaults::default()
        },
        vec![
            Measure::count_in(4),
            Measure::with_default_pattern(4, 2),
            Measure::with_default_pattern(4, 2).with_swing(0.2),
        ],
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_devices {
        for device in AudioDeviceManager::new().list_output_devices() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{}", device.name, marker);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.device.is_some() {
        config.audio.device_name = args.device.clone();
    }

    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => demo_settings(),
    };
    println!(
        "{} measures, {} steps ({} per loop)",
        settings.measures.len(),
        settings.total_steps(),
        settings.loop_steps()
    );

    if let Some(out) = &args.export {
        let export = ExportSettings {
            duration: args.seconds,
            ..ExportSettings::default()
        };
        let frames = export_wav(
            out,
            settings,
            &config,
            &export,
            Some(Box::new(|progress: f32| log::debug!("export {:.0}%", progress * 100.0))),
        )?;
        println!(
            "Wrote {} ({:.2}s)",
            out.display(),
            frames as f64 / export.sample_rate as f64
        );
        return Ok(());
    }

    let controller = PlaybackController::new(config, |step| {
        if step == STOPPED_STEP {
            println!("stopped");
        } else {
            println!("step {}", step);
        }
    })?;
    controller.update_settings(settings)?;
    controller.start(args.start)?;

    println!("Playing, press Enter to stop");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    controller.stop();

    Ok(())
}
