use voxsynth::core::recorder::{encode_midi, parse_note_log, DeltaEncoding};
use voxsynth::core::synth::preset::SynthPreset;
use voxsynth::core::oscillator::Waveform;
use voxsynth::{AudioEngine, EngineConfig, MessageBus, SpectrumAnalyzer, SynthMessage};

const BLOCK: usize = 256;

fn render_seconds(engine: &AudioEngine, seconds: f32) -> Vec<f32> {
    let blocks = (seconds * engine.sample_rate() as f32 / BLOCK as f32).ceil() as usize;
    let mut out = vec![0.0; BLOCK];
    let mut all = Vec::with_capacity(blocks * BLOCK);
    for _ in 0..blocks {
        engine.render(&mut out);
        all.extend_from_slice(&out);
    }
    all
}

#[test]
fn recorded_take_exports_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let engine = AudioEngine::headless(EngineConfig::default());

    engine.start_recording();
    engine.note_on(69, 0.5);
    render_seconds(&engine, 0.1);
    engine.note_off(69);
    render_seconds(&engine, 0.1);
    engine.stop_recording();

    let samples = engine.with_state(|s| s.recorder.samples().len());
    assert!(samples > 0);

    let wav = dir.path().join("take.wav");
    engine.export_to_file(&wav).unwrap();
    assert_eq!(std::fs::metadata(&wav).unwrap().len(), 44 + 2 * samples as u64);

    let midi = dir.path().join("take.midi");
    engine.export_to_file(&midi).unwrap();
    let events = engine.with_state(|s| s.recorder.events().to_vec());
    assert_eq!(std::fs::read(&midi).unwrap(), encode_midi(&events, DeltaEncoding::SingleByte));

    let log = dir.path().join("take.txt");
    engine.export_to_file(&log).unwrap();
    let text = std::fs::read_to_string(&log).unwrap();
    let event_lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(event_lines.len(), 2);
    assert_eq!(event_lines[0], "0.000000 69 0.5 on");
    assert!(event_lines[1].ends_with(" 69 0 off"));

    let parsed = parse_note_log(&text).unwrap();
    assert_eq!(parsed.len(), events.len());
    for (read, recorded) in parsed.iter().zip(&events) {
        assert!((read.timestamp - recorded.timestamp).abs() < 1e-6);
        assert_eq!((read.note, read.velocity, read.is_note_on), (recorded.note, recorded.velocity, recorded.is_note_on));
    }
}

#[test]
fn exported_log_replays_to_the_same_audio() {
    let config = EngineConfig::default();
    let performer = AudioEngine::headless(config.clone());
    performer.set_vibrato_depth(0.0);

    performer.start_recording();
    performer.note_on(60, 0.9);
    render_seconds(&performer, 0.05);
    performer.note_on(64, 0.7);
    render_seconds(&performer, 0.05);
    performer.note_off(60);
    performer.note_off(64);
    performer.stop_recording();

    let events = performer.with_state(|s| s.recorder.events().to_vec());
    assert_eq!(events.len(), 4);

    let replay = AudioEngine::headless(config);
    replay.set_vibrato_depth(0.0);
    replay.load_performance(events);
    replay.start_playback();
    assert!(replay.is_playing());

    let mut peak = 0.0f32;
    let mut out = vec![0.0; BLOCK];
    let mut blocks = 0;
    while replay.is_playing() {
        replay.render(&mut out);
        peak = out.iter().fold(peak, |acc, s| acc.max(s.abs()));
        blocks += 1;
        assert!(blocks < 2000, "playback never stopped");
    }
    assert!(peak > 0.05);
    assert!(peak <= 1.0);
}

#[test]
fn pool_stays_bounded_under_a_flood_of_notes() {
    let engine = AudioEngine::headless(EngineConfig::default());
    for i in 0..100u8 {
        engine.note_on(30 + (i % 60), 1.0);
        assert!(engine.with_state(|s| s.synth.voice_count()) <= 16);
    }
    let out = render_seconds(&engine, 0.05);
    assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn bus_driven_session_produces_an_analyzable_spectrum() {
    let engine = AudioEngine::headless(EngineConfig::default());
    let bus = MessageBus::new();
    let sender = bus.sender();

    let mut preset = SynthPreset::new("Pure");
    preset.waveform = Waveform::Sine;
    preset.oscillator_count = 1;
    preset.vibrato_depth = 0.0;
    preset.reverb_mix = 0.0;
    preset.delay_mix = 0.0;
    preset.attack = 0.005;

    sender.send(SynthMessage::ApplyPreset(Box::new(preset))).unwrap();
    sender.send(SynthMessage::NoteOn(69, 1.0)).unwrap();
    assert_eq!(bus.process_messages(&engine, 16), 2);

    render_seconds(&engine, 0.1);

    let mut analyzer = SpectrumAnalyzer::new(1024);
    engine.spectrum(&mut analyzer).unwrap();
    let freqs = analyzer.bin_frequencies(engine.sample_rate());
    let peak = freqs[analyzer.peak_bin()];
    assert!((peak - 440.0).abs() <= 44100.0 / 1024.0);
    assert_eq!(engine.fft_data().len(), 1024);
}

#[test]
fn config_file_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "sample_rate": 22050, "max_voices": 4, "midi_delta_encoding": "variable_length" }"#).unwrap();

    let config = EngineConfig::load_or_default(Some(&path));
    assert_eq!(config.sample_rate, 22050);
    assert_eq!(config.midi_delta_encoding, DeltaEncoding::VariableLength);

    let engine = AudioEngine::headless(config);
    for note in 60..70 {
        engine.note_on(note, 1.0);
    }
    assert_eq!(engine.with_state(|s| s.synth.voice_count()), 4);

    engine.start_recording();
    engine.note_on(72, 1.0);
    render_seconds(&engine, 1.0);
    engine.note_off(72);
    engine.stop_recording();

    // a one second gap is 480 ticks, kept as a two-byte quantity
    let midi = dir.path().join("take.mid");
    engine.export_to_file(&midi).unwrap();
    let bytes = std::fs::read(&midi).unwrap();
    assert_eq!(&bytes[22..26], &[0, 0x90, 72, 127]);
    assert_eq!(bytes[26] & 0x80, 0x80);
}
