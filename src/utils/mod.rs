pub mod helpers;

pub use helpers::{amplitude_to_db, midi_note_to_freq};
