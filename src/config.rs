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
use std::fs;
use std::path::Path;

mod audio;
mod bank;
mod error;

pub use audio::Audio;
pub use bank::{BankSample, SoundBank};
pub use error::ConfigError;

/// Parses and validates a sound bank descriptor from a YAML file. The
/// referenced sample files are not opened; that happens when the bank is
/// loaded into the player.
pub fn parse_sound_bank<P: AsRef<Path>>(file: P) -> Result<SoundBank, ConfigError> {
    let bank: SoundBank = serde_yml::from_str(&fs::read_to_string(file)?)?;
    bank.validate()?;
    Ok(bank)
}

/// Parses an audio configuration from a YAML file.
pub fn parse_audio<P: AsRef<Path>>(file: P) -> Result<Audio, ConfigError> {
    Ok(serde_yml::from_str(&fs::read_to_string(file)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_sound_bank_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bank.yaml");
        let mut file = fs::File::create(&path).expect("create");
        write!(
            file,
            r#"
name: Melodica
samples:
  - file: melodica.wav
    root_note: 60
    note_range: [36, 84]
"#
        )
        .expect("write");

        let bank = parse_sound_bank(&path).expect("parse");
        assert_eq!(bank.name(), "Melodica");
        assert_eq!(bank.samples().len(), 1);
    }

    #[test]
    fn test_parse_sound_bank_missing_file() {
        assert!(matches!(
            parse_sound_bank("/nonexistent/bank.yaml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_parse_sound_bank_malformed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bank.yaml");
        fs::write(&path, "name: [not a string").expect("write");

        assert!(matches!(
            parse_sound_bank(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
