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
use serde::Deserialize;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// How many mixing voices we use by default. Each voice plays a single
/// buffer, so this effectively determines the maximum polyphony.
const DEFAULT_VOICES: usize = 32;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone)]
pub struct Audio {
    /// The audio device. "default" (or empty) picks the system default
    /// output; names starting with "mock" resolve to the mock backend.
    device: String,

    /// Target output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Output stream buffer size in frames. Lower values reduce trigger
    /// latency but are more sensitive to callback jitter.
    buffer_size: Option<usize>,

    /// The number of mixing voices, i.e. the maximum polyphony.
    voices: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration for the given device.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            buffer_size: None,
            voices: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the target sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the stream buffer size in frames (default: 1024).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Returns the number of mixing voices (default: 32).
    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICES).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::new("default");
        assert_eq!(audio.device(), "default");
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.buffer_size(), 1024);
        assert_eq!(audio.voices(), 32);
    }

    #[test]
    fn test_parse() {
        let yaml = r#"
device: "Scarlett 2i2"
sample_rate: 48000
buffer_size: 256
voices: 16
"#;
        let audio: Audio = serde_yml::from_str(yaml).expect("parse");
        assert_eq!(audio.device(), "Scarlett 2i2");
        assert_eq!(audio.sample_rate(), 48000);
        assert_eq!(audio.buffer_size(), 256);
        assert_eq!(audio.voices(), 16);
    }

    #[test]
    fn test_voices_floor() {
        let yaml = "device: default\nvoices: 0\n";
        let audio: Audio = serde_yml::from_str(yaml).expect("parse");
        assert_eq!(audio.voices(), 1);
    }
}
