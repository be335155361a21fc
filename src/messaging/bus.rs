use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};
use crate::core::engine::AudioEngine;
use super::SynthMessage;

/// MessageBus carries control-surface messages to the audio engine
pub struct MessageBus {
    pub(crate) sender: Sender<SynthMessage>,
    pub(crate) receiver: Receiver<SynthMessage>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();

        MessageBus {
            sender,
            receiver,
        }
    }

    /// Get a sender that can be cloned and passed to UI components
    pub fn sender(&self) -> Sender<SynthMessage> {
        self.sender.clone()
    }

    /// Apply up to `max_messages` pending messages to `engine`, returning how many were handled
    pub fn process_messages(&self, engine: &AudioEngine, max_messages: usize) -> usize {
        let mut count = 0;

        while count < max_messages {
            let Ok(msg) = self.receiver.try_recv() else {
                break;
            };
            count += 1;

            Self::handle_message(engine, msg);
        }

        count
    }

    /// Handle an individual message
    fn handle_message(engine: &AudioEngine, msg: SynthMessage) {
        debug!("Handling {:?}", msg);
        match msg {
            SynthMessage::NoteOn(note, velocity) => engine.note_on(note, velocity),
            SynthMessage::NoteOff(note) => engine.note_off(note),
            SynthMessage::AllNotesOff => engine.all_notes_off(),
            SynthMessage::SetEnvelope(attack, decay, sustain, release) => {
                engine.with_state(|state| {
                    state.synth.set_sustain(sustain);
                    state.synth.set_attack(attack);
                    state.synth.set_decay(decay);
                    state.synth.set_release(release);
                });
            },
            SynthMessage::SetAttack(attack) => engine.set_attack(attack),
            SynthMessage::SetDecay(decay) => engine.set_decay(decay),
            SynthMessage::SetSustain(sustain) => engine.set_sustain(sustain),
            SynthMessage::SetRelease(release) => engine.set_release(release),
            SynthMessage::SetWaveform(waveform) => engine.set_waveform(waveform),
            SynthMessage::SetOscillatorCount(count) => engine.set_oscillator_count(count),
            SynthMessage::SetVibrato(rate, depth) => {
                engine.with_state(|state| {
                    state.synth.set_vibrato_rate(rate);
                    state.synth.set_vibrato_depth(depth);
                });
            },
            SynthMessage::SetReverb(mix, room_size, damping) => {
                engine.with_state(|state| {
                    state.synth.set_reverb_mix(mix);
                    state.synth.set_reverb_room_size(room_size);
                    state.synth.set_reverb_damping(damping);
                });
            },
            SynthMessage::SetReverbMix(mix) => engine.set_reverb_mix(mix),
            SynthMessage::SetDelay(mix, time, feedback) => {
                engine.with_state(|state| {
                    state.synth.set_delay_mix(mix);
                    state.synth.set_delay_time(time);
                    state.synth.set_delay_feedback(feedback);
                });
            },
            SynthMessage::SetDelayMix(mix) => engine.set_delay_mix(mix),
            SynthMessage::SetStealPolicy(policy) => engine.set_steal_policy(policy),
            SynthMessage::StartRecording => engine.start_recording(),
            SynthMessage::StopRecording => engine.stop_recording(),
            SynthMessage::StartPlayback => engine.start_playback(),
            SynthMessage::StopPlayback => engine.stop_playback(),
            SynthMessage::ClearRecording => engine.clear_recording(),
            SynthMessage::Export(path) => {
                if let Err(err) = engine.export_to_file(&path) {
                    error!("{:#}", err);
                }
            },
            SynthMessage::ApplyPreset(preset) => engine.apply_preset(&preset),
        }
    }

    /// Number of messages waiting to be processed
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Public method to try to receive a message
    pub fn try_receive(&self) -> Result<SynthMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Public method to send a message
    pub fn send(&self, msg: SynthMessage) -> Result<(), crossbeam_channel::SendError<SynthMessage>> {
        self.sender.send(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::oscillator::Waveform;
    use crate::core::synth::preset::SynthPreset;

    #[test]
    fn messages_reach_the_engine() {
        let engine = AudioEngine::headless(EngineConfig::default());
        let bus = MessageBus::new();
        let sender = bus.sender();

        sender.send(SynthMessage::SetWaveform(Waveform::Square)).unwrap();
        sender.send(SynthMessage::NoteOn(60, 1.0)).unwrap();
        sender.send(SynthMessage::NoteOn(64, 1.0)).unwrap();

        assert_eq!(bus.process_messages(&engine, 16), 3);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(engine.current_preset("x").waveform, Waveform::Square);
    }

    #[test]
    fn message_budget_leaves_the_rest_queued() {
        let engine = AudioEngine::headless(EngineConfig::default());
        let bus = MessageBus::new();
        for note in 60..65 {
            bus.send(SynthMessage::NoteOn(note, 0.8)).unwrap();
        }

        assert_eq!(bus.process_messages(&engine, 2), 2);
        assert_eq!(engine.active_voice_count(), 2);
        assert_eq!(bus.process_messages(&engine, 10), 3);
        assert_eq!(engine.active_voice_count(), 5);
        assert_eq!(bus.pending(), 0);
        assert!(bus.try_receive().is_err());
    }

    #[test]
    fn grouped_parameter_messages() {
        let engine = AudioEngine::headless(EngineConfig::default());
        let bus = MessageBus::new();
        bus.send(SynthMessage::SetEnvelope(0.5, 0.4, 0.3, 0.2)).unwrap();
        bus.send(SynthMessage::SetVibrato(7.0, 0.05)).unwrap();
        bus.send(SynthMessage::SetDelay(0.2, 0.25, 2.0)).unwrap();
        bus.process_messages(&engine, 8);

        let preset = engine.current_preset("x");
        assert_eq!((preset.attack, preset.decay, preset.sustain, preset.release), (0.5, 0.4, 0.3, 0.2));
        assert_eq!((preset.vibrato_rate, preset.vibrato_depth), (7.0, 0.05));
        assert_eq!(preset.delay_time, 0.25);
        assert_eq!(preset.delay_feedback, 0.95);
    }

    #[test]
    fn preset_and_recording_messages() {
        let engine = AudioEngine::headless(EngineConfig::default());
        let bus = MessageBus::new();
        let mut preset = SynthPreset::new("Bells");
        preset.oscillator_count = 3;

        bus.send(SynthMessage::ApplyPreset(Box::new(preset))).unwrap();
        bus.send(SynthMessage::StartRecording).unwrap();
        bus.send(SynthMessage::NoteOn(72, 0.9)).unwrap();
        bus.send(SynthMessage::NoteOff(72)).unwrap();
        bus.send(SynthMessage::StopRecording).unwrap();
        bus.process_messages(&engine, 16);

        assert_eq!(engine.current_preset("x").oscillator_count, 3);
        assert!(!engine.is_recording());
        assert_eq!(engine.with_state(|s| s.recorder.events().len()), 2);
    }
}
