use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use voxsynth::core::oscillator::Waveform;
use voxsynth::core::recorder::{parse_note_log, NoteEvent, Take};
use voxsynth::core::synth::preset::SynthPreset;
use voxsynth::utils::helpers::{amplitude_to_db, format_frequency, format_time, freq_to_midi_note, note_name};
use voxsynth::{AudioEngine, EngineConfig, MessageBus, SpectrumAnalyzer, SynthMessage};

#[derive(Parser)]
#[command(name = "voxsynth")]
#[command(author, version, about = "Polyphonic software synthesizer", long_about = None)]
struct Cli {
    /// Engine config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preset file to apply before playing
    #[arg(long, global = true)]
    preset: Option<PathBuf>,

    /// Override the preset waveform (name or index 0-4)
    #[arg(long, global = true)]
    waveform: Option<Waveform>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a note log (or a demo arpeggio) on the default output device
    Play {
        /// Note log in the text export format
        log: Option<PathBuf>,

        /// Record the performance and export it here when done (.wav, .mid, or text)
        #[arg(long)]
        record: Option<PathBuf>,

        /// Seconds to keep the stream open after the last note
        #[arg(long, default_value_t = 2.0)]
        tail: f32,
    },

    /// Render a note log offline and export it (.wav, .mid, or text)
    Render {
        log: PathBuf,
        output: PathBuf,
    },

    /// Render a note log offline and print the dominant frequency over time
    Spectrum {
        log: PathBuf,

        /// Seconds between analysis frames
        #[arg(long, default_value_t = 0.25)]
        interval: f32,
    },

    /// List presets saved in the user preset directory
    Presets,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref());
    let preset = load_preset(cli.preset.as_deref(), cli.waveform)?;

    match cli.command {
        Commands::Play { log, record, tail } => play(config, &preset, log.as_deref(), record.as_deref(), tail),
        Commands::Render { log, output } => render(config, &preset, &log, &output),
        Commands::Spectrum { log, interval } => spectrum(config, &preset, &log, interval),
        Commands::Presets => list_presets(),
    }
}

fn load_preset(path: Option<&Path>, waveform: Option<Waveform>) -> Result<SynthPreset> {
    let mut preset = match path {
        Some(path) => SynthPreset::load_from_file(path)?,
        None => SynthPreset::default(),
    };
    if let Some(waveform) = waveform {
        preset.waveform = waveform;
    }
    Ok(preset)
}

fn read_note_log(path: &Path) -> Result<Vec<NoteEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read note log {}", path.display()))?;
    let events = parse_note_log(&text)
        .with_context(|| format!("Failed to parse note log {}", path.display()))?;
    info!("Loaded {} note events from {}", events.len(), path.display());
    Ok(events)
}

/// C major arpeggio, up and back down
fn demo_events() -> Vec<NoteEvent> {
    let notes = [60u8, 64, 67, 72, 67, 64, 60];
    let step = 0.3;
    let mut events = Vec::with_capacity(notes.len() * 2);
    for (i, &note) in notes.iter().enumerate() {
        let start = i as f64 * step;
        events.push(NoteEvent { timestamp: start, note, velocity: 0.8, is_note_on: true });
        events.push(NoteEvent { timestamp: start + step * 0.8, note, velocity: 0.0, is_note_on: false });
    }
    events.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    events
}

fn play(config: EngineConfig, preset: &SynthPreset, log: Option<&Path>, record: Option<&Path>, tail: f32) -> Result<()> {
    let events = match log {
        Some(path) => read_note_log(path)?,
        None => demo_events(),
    };

    let mut engine = AudioEngine::headless(config.clone());
    engine.initialize(config.sample_rate, config.frames_per_buffer)?;
    engine.apply_preset(preset);

    let bus = MessageBus::new();
    let sender = bus.sender();

    if record.is_some() {
        bus.send(SynthMessage::StartRecording)?;
    }
    engine.start()?;

    // Sequencer thread: sends each event when its timestamp comes due
    let sequencer = thread::spawn(move || {
        let started = Instant::now();
        for event in events {
            let due = Duration::from_secs_f64(event.timestamp);
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
            let msg = if event.is_note_on {
                SynthMessage::NoteOn(event.note, event.velocity)
            } else {
                SynthMessage::NoteOff(event.note)
            };
            if sender.send(msg).is_err() {
                break;
            }
        }
    });

    while !sequencer.is_finished() || bus.pending() > 0 {
        bus.process_messages(&engine, 64);
        thread::sleep(Duration::from_millis(2));
    }
    if sequencer.join().is_err() {
        warn!("Sequencer thread panicked");
    }

    engine.all_notes_off();
    thread::sleep(Duration::from_secs_f32(tail.max(0.0)));

    if let Some(path) = record {
        engine.stop_recording();
        engine.export_to_file(path)?;
    }

    engine.shutdown();
    Ok(())
}

/// Replay `events` through a headless engine, handing each rendered block to `on_block`
fn render_offline(
    config: &EngineConfig,
    preset: &SynthPreset,
    events: Vec<NoteEvent>,
    mut on_block: impl FnMut(&AudioEngine, &[f32]),
) -> Vec<f32> {
    let engine = AudioEngine::headless(config.clone());
    engine.apply_preset(preset);
    engine.load_performance(events);
    engine.start_playback();

    let mut block = vec![0.0; (config.frames_per_buffer as usize).max(1)];
    let mut samples = Vec::new();
    while engine.is_playing() {
        engine.render(&mut block);
        samples.extend_from_slice(&block);
        on_block(&engine, &block);
    }
    samples
}

fn render(config: EngineConfig, preset: &SynthPreset, log: &Path, output: &Path) -> Result<()> {
    let events = read_note_log(log)?;
    let samples = render_offline(&config, preset, events.clone(), |_, _| {});

    let take = Take { sample_rate: config.sample_rate, events, samples };
    let format = take.export_to_file(output, config.midi_delta_encoding)?;
    info!(
        "Rendered {} of audio to {} ({:?})",
        format_time(take.duration() as f32),
        output.display(),
        format
    );
    Ok(())
}

fn spectrum(config: EngineConfig, preset: &SynthPreset, log: &Path, interval: f32) -> Result<()> {
    let events = read_note_log(log)?;
    let mut analyzer = SpectrumAnalyzer::new(config.fft_size);
    let interval_samples = ((interval.max(0.01) * config.sample_rate as f32) as usize).max(1);
    let bin_frequencies = analyzer.bin_frequencies(config.sample_rate);

    let mut rendered = 0usize;
    let mut next_frame = interval_samples;
    let mut result = Ok(());

    render_offline(&config, preset, events, |engine, block| {
        rendered += block.len();
        if rendered < next_frame || result.is_err() {
            return;
        }
        next_frame += interval_samples;

        let peak_level = block.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        if let Err(err) = engine.spectrum(&mut analyzer) {
            result = Err(err);
            return;
        }
        let peak = bin_frequencies[analyzer.peak_bin()];
        let time = rendered as f32 / config.sample_rate as f32;
        if peak_level > 1e-4 {
            println!(
                "{:>8}  {:>10}  {:<4}  {:6.1} dB",
                format_time(time),
                format_frequency(peak),
                note_name(freq_to_midi_note(peak)),
                amplitude_to_db(peak_level)
            );
        } else {
            println!("{:>8}  silence", format_time(time));
        }
    });

    result
}

fn list_presets() -> Result<()> {
    let Some(dir) = EngineConfig::preset_dir() else {
        warn!("No config directory on this platform");
        return Ok(());
    };
    let presets = SynthPreset::list_presets(&dir)?;
    if presets.is_empty() {
        println!("No presets in {}", dir.display());
    }
    for name in presets {
        println!("{}", name);
    }
    Ok(())
}
