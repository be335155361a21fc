use crate::core::oscillator::Waveform;
use crate::core::synth::preset::SynthPreset;
use crate::core::synth::StealPolicy;
use std::path::PathBuf;

/// Message types for communication between a control surface and the audio engine
#[derive(Debug, Clone)]
pub enum SynthMessage {
    NoteOn(u8, f32), // (note, velocity 0..1)
    NoteOff(u8),
    AllNotesOff,
    SetEnvelope(f32, f32, f32, f32), // (attack, decay, sustain, release)
    SetAttack(f32),
    SetDecay(f32),
    SetSustain(f32),
    SetRelease(f32),
    SetWaveform(Waveform),
    SetOscillatorCount(usize),
    SetVibrato(f32, f32), // (rate Hz, depth)
    SetReverb(f32, f32, f32), // (mix, room_size, damping)
    SetReverbMix(f32),
    SetDelay(f32, f32, f32), // (mix, time, feedback)
    SetDelayMix(f32),
    SetStealPolicy(StealPolicy),
    StartRecording,
    StopRecording,
    StartPlayback,
    StopPlayback,
    ClearRecording,
    Export(PathBuf),
    ApplyPreset(Box<SynthPreset>),
}
