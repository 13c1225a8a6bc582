// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// The highest valid MIDI note number.
const MAX_MIDI_NOTE: u8 = 127;

/// A YAML representation of a sound bank: a set of samples that each cover a
/// range of MIDI notes, allowing a full instrument with only a few samples.
#[derive(Deserialize, Clone, Serialize, Debug)]
pub struct SoundBank {
    /// The name of the sound bank.
    name: String,

    /// The samples making up the instrument.
    #[serde(default)]
    samples: Vec<BankSample>,
}

impl SoundBank {
    /// Gets the name of the sound bank.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the sample entries. Entries later in the list win where note
    /// ranges overlap.
    pub fn samples(&self) -> &[BankSample] {
        &self.samples
    }

    /// Validates the descriptor without touching the referenced files.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples.is_empty() {
            return Err(ConfigError::EmptyBank(self.name.clone()));
        }
        for sample in &self.samples {
            sample.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl SoundBank {
    /// Creates a new sound bank descriptor (test only).
    pub fn new(name: &str, samples: Vec<BankSample>) -> Self {
        Self {
            name: name.to_string(),
            samples,
        }
    }
}

/// One sample entry: an audio file, the MIDI note it was recorded at, the
/// range of notes it should cover, and its stereo placement.
#[derive(Deserialize, Clone, Serialize, Debug)]
pub struct BankSample {
    /// The audio file for this sample, relative to the descriptor.
    file: String,

    /// The MIDI note the sample was recorded at.
    root_note: u8,

    /// The [low, high] range of MIDI notes covered, inclusive.
    note_range: [u8; 2],

    /// Stereo placement, -1 (left) to 1 (right). Defaults to center.
    #[serde(default)]
    panning: f32,
}

impl BankSample {
    /// Gets the audio file path.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Gets the MIDI note the sample was recorded at.
    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    /// Gets the covered note range as (low, high), inclusive.
    pub fn note_range(&self) -> (u8, u8) {
        (self.note_range[0], self.note_range[1])
    }

    /// Gets the stereo placement.
    pub fn panning(&self) -> f32 {
        self.panning
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.root_note > MAX_MIDI_NOTE {
            return Err(ConfigError::InvalidRootNote {
                file: self.file.clone(),
                note: self.root_note,
            });
        }
        let (low, high) = self.note_range();
        if low > high || high > MAX_MIDI_NOTE {
            return Err(ConfigError::InvalidNoteRange {
                file: self.file.clone(),
                low,
                high,
            });
        }
        if !(-1.0..=1.0).contains(&self.panning) {
            return Err(ConfigError::InvalidPanning {
                file: self.file.clone(),
                panning: self.panning,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
impl BankSample {
    /// Creates a new sample entry (test only).
    pub fn new(file: &str, root_note: u8, note_range: [u8; 2], panning: f32) -> Self {
        Self {
            file: file.to_string(),
            root_note,
            note_range,
            panning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sound_bank() {
        let yaml = r#"
name: Piano
samples:
  - file: piano_c3.wav
    root_note: 48
    note_range: [36, 54]
    panning: -0.5
  - file: piano_c5.wav
    root_note: 72
    note_range: [55, 96]
    panning: 0.5
"#;
        let bank: SoundBank = serde_yml::from_str(yaml).expect("parse");
        bank.validate().expect("valid");

        assert_eq!(bank.name(), "Piano");
        assert_eq!(bank.samples().len(), 2);
        assert_eq!(bank.samples()[0].file(), "piano_c3.wav");
        assert_eq!(bank.samples()[0].root_note(), 48);
        assert_eq!(bank.samples()[0].note_range(), (36, 54));
        assert_eq!(bank.samples()[0].panning(), -0.5);
    }

    #[test]
    fn test_panning_defaults_to_center() {
        let yaml = r#"
name: Organ
samples:
  - file: organ.wav
    root_note: 60
    note_range: [0, 127]
"#;
        let bank: SoundBank = serde_yml::from_str(yaml).expect("parse");
        bank.validate().expect("valid");
        assert_eq!(bank.samples()[0].panning(), 0.0);
    }

    #[test]
    fn test_empty_bank_rejected() {
        let bank = SoundBank::new("Empty", vec![]);
        assert!(matches!(bank.validate(), Err(ConfigError::EmptyBank(_))));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let bank = SoundBank::new(
            "Bad",
            vec![BankSample::new("a.wav", 60, [72, 48], 0.0)],
        );
        assert!(matches!(
            bank.validate(),
            Err(ConfigError::InvalidNoteRange {
                low: 72,
                high: 48,
                ..
            })
        ));
    }

    #[test]
    fn test_out_of_range_panning_rejected() {
        let bank = SoundBank::new(
            "Bad",
            vec![BankSample::new("a.wav", 60, [48, 72], 1.5)],
        );
        assert!(matches!(
            bank.validate(),
            Err(ConfigError::InvalidPanning { .. })
        ));
    }
}
