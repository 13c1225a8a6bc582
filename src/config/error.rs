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

use crate::samples::DecodeError;

/// Typed error for sound bank load failures so callers can distinguish e.g.
/// a malformed descriptor from an undecodable sample without string matching.
/// A failed load never disturbs the previously active sound bank.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Sound bank read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sound bank parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Sound bank {0:?} declares no samples")]
    EmptyBank(String),

    #[error("Invalid root note {note} for {file}, must be within [0, 127]")]
    InvalidRootNote { file: String, note: u8 },

    #[error("Invalid note range [{low}, {high}] for {file}")]
    InvalidNoteRange { file: String, low: u8, high: u8 },

    #[error("Invalid panning {panning} for {file}, must be within [-1, 1]")]
    InvalidPanning { file: String, panning: f32 },

    #[error("Failed to load sample {file}: {source}")]
    Sample {
        file: String,
        #[source]
        source: DecodeError,
    },
}
