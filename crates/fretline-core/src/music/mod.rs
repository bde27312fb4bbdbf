//! Note and tuning helpers
//!
//! Turns note names such as `"A2"` into the frequencies the pitch detector
//! is asked about, and tells the detector how high an instrument can go so
//! it can ignore everything above.

use serde::{Deserialize, Serialize};

/// Frequency of A4, MIDI note 69
pub const CONCERT_A_HZ: f32 = 440.0;

const CONCERT_A_MIDI: i32 = 69;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// An equal-tempered note, identified by its MIDI number (C4 = 60)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note {
    midi: u8,
}

impl Note {
    pub const fn from_midi(midi: u8) -> Self {
        Self { midi }
    }

    pub fn midi(&self) -> u8 {
        self.midi
    }

    /// Parse scientific pitch notation like "A2", "C#4", "Bb1", "e2"
    ///
    /// Supported formats:
    /// - Letter: C, D, E, F, G, A, B (either case)
    /// - Optional sharp `#` or flat `b`
    /// - Octave number, may be negative ("C-1" is MIDI 0)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars().peekable();

        let base = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let accidental = match chars.peek() {
            Some('#') => {
                chars.next();
                1
            }
            Some('b') => {
                chars.next();
                -1
            }
            _ => 0,
        };

        let octave: i32 = chars.collect::<String>().parse().ok()?;
        let midi = (octave + 1) * 12 + base + accidental;
        u8::try_from(midi).ok().filter(|m| *m <= 127).map(Self::from_midi)
    }

    /// Nearest note to `frequency`, if it falls inside the MIDI range
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        let midi = frequency_to_midi(frequency)?.round();
        (0.0..=127.0).contains(&midi).then(|| Self::from_midi(midi as u8))
    }

    /// Equal-tempered frequency relative to A4 = 440Hz
    pub fn frequency(&self) -> f32 {
        midi_to_frequency(self.midi as f32)
    }

    /// This note moved by `semitones`, saturating at the MIDI range
    pub fn transpose(&self, semitones: i32) -> Self {
        Self::from_midi((self.midi as i32 + semitones).clamp(0, 127) as u8)
    }

    pub fn octave(&self) -> i32 {
        self.midi as i32 / 12 - 1
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.midi as usize % 12], self.octave())
    }
}

impl std::str::FromStr for Note {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid note name: {:?}", s))
    }
}

pub fn midi_to_frequency(midi: f32) -> f32 {
    CONCERT_A_HZ * 2f32.powf((midi - CONCERT_A_MIDI as f32) / 12.0)
}

/// Fractional MIDI number of `frequency`; `None` for non-positive input
pub fn frequency_to_midi(frequency: f32) -> Option<f32> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    Some(CONCERT_A_MIDI as f32 + 12.0 * (frequency / CONCERT_A_HZ).log2())
}

/// Open-string notes, lowest string first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    name: &'static str,
    strings: Vec<Note>,
}

impl Tuning {
    /// E2 A2 D3 G3 B3 E4
    pub fn guitar_standard() -> Self {
        Self::from_midi("Standard", &[40, 45, 50, 55, 59, 64])
    }

    /// D2 A2 D3 G3 B3 E4
    pub fn guitar_drop_d() -> Self {
        Self::from_midi("Drop D", &[38, 45, 50, 55, 59, 64])
    }

    /// E1 A1 D2 G2
    pub fn bass_standard() -> Self {
        Self::from_midi("Bass standard", &[28, 33, 38, 43])
    }

    /// D1 A1 D2 G2
    pub fn bass_drop_d() -> Self {
        Self::from_midi("Bass drop D", &[26, 33, 38, 43])
    }

    fn from_midi(name: &'static str, midi: &[u8]) -> Self {
        Self {
            name,
            strings: midi.iter().copied().map(Note::from_midi).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn strings(&self) -> &[Note] {
        &self.strings
    }

    /// Note at `fret` on `string` (0 = lowest string)
    pub fn fretted_note(&self, string: usize, fret: u8) -> Option<Note> {
        self.strings
            .get(string)
            .map(|open| open.transpose(fret as i32))
    }

    pub fn string_frequency(&self, string: usize, fret: u8) -> Option<f32> {
        self.fretted_note(string, fret).map(|n| n.frequency())
    }

    /// Highest note reachable with `frets` frets
    pub fn highest_frequency(&self, frets: u8) -> f32 {
        self.strings
            .iter()
            .map(|open| open.transpose(frets as i32).frequency())
            .fold(0.0, f32::max)
    }
}

/// Which part of the song the player practises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentPart {
    #[default]
    Guitar,
    Bass,
}

impl InstrumentPart {
    pub fn tuning(&self) -> Tuning {
        match self {
            InstrumentPart::Guitar => Tuning::guitar_standard(),
            InstrumentPart::Bass => Tuning::bass_standard(),
        }
    }

    pub fn frets(&self) -> u8 {
        match self {
            InstrumentPart::Guitar => 22,
            InstrumentPart::Bass => 20,
        }
    }

    /// Upper bound for the detector's peak search: the highest fretted note
    /// plus one semitone
    pub fn max_frequency(&self) -> f32 {
        self.tuning().highest_frequency(self.frets()) * 2f32.powf(1.0 / 12.0)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guitar" => Some(InstrumentPart::Guitar),
            "bass" => Some(InstrumentPart::Bass),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstrumentPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstrumentPart::Guitar => write!(f, "guitar"),
            InstrumentPart::Bass => write!(f, "bass"),
        }
    }
}
