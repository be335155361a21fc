/// Lowest magnitude handed to `amplitude_to_db`, keeps silent bins finite
pub const MIN_MAGNITUDE: f32 = 1e-10;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Convert a MIDI note number to its frequency in Hz
pub fn midi_note_to_freq(note: u8) -> f32 {
    // A4 (note 69) is 440 Hz
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Convert a frequency in Hz to the closest MIDI note number
pub fn freq_to_midi_note(freq: f32) -> u8 {
    if freq <= 0.0 {
        return 0;
    }
    let note = 69.0 + 12.0 * (freq / 440.0).log2();
    note.round().clamp(0.0, 127.0) as u8
}

/// Scientific pitch name for a MIDI note, e.g. 69 -> "A4"
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

/// Linear magnitude to decibels, floored at `MIN_MAGNITUDE`
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(MIN_MAGNITUDE).log10()
}

/// Format a frequency value with appropriate unit suffix (Hz, kHz)
pub fn format_frequency(freq: f32) -> String {
    if freq >= 1000.0 {
        format!("{:.2} kHz", freq / 1000.0)
    } else {
        format!("{:.1} Hz", freq)
    }
}

/// Format a time value with appropriate unit suffix (ms, s)
pub fn format_time(time_in_seconds: f32) -> String {
    if time_in_seconds >= 1.0 {
        format!("{:.2} s", time_in_seconds)
    } else {
        format!("{:.0} ms", time_in_seconds * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((midi_note_to_freq(69) - 440.0).abs() < 1e-3);
        assert!((midi_note_to_freq(81) - 880.0).abs() < 1e-2);
        assert_eq!(freq_to_midi_note(261.63), 60);
    }

    #[test]
    fn db_floor_keeps_silence_finite() {
        assert!((amplitude_to_db(0.0) + 200.0).abs() < 1e-3);
        assert!((amplitude_to_db(1.0)).abs() < 1e-6);
    }

    #[test]
    fn names_and_units() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(format_frequency(440.0), "440.0 Hz");
        assert_eq!(format_frequency(2500.0), "2.50 kHz");
        assert_eq!(format_time(0.25), "250 ms");
    }
}
