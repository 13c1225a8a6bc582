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

//! Polyphonic sound-bank sample playback.
//!
//! This module provides:
//! - Decoding of sound bank samples to mono PCM (in-memory, zero-latency)
//! - A note map resolving MIDI note numbers to buffers, pitch, and panning
//! - A fixed voice pool with oldest-bound stealing
//! - The playback scheduler tying the pieces to an audio backend

mod decode;
mod engine;
mod notes;
mod store;
mod voice;

pub use engine::SoundBankPlayer;

// These types are exported for potential external use and testing
#[allow(unused_imports)]
pub use decode::{DecodeError, DecodedSample};
#[allow(unused_imports)]
pub use notes::{note_frequency, Note, NoteMap};
#[allow(unused_imports)]
pub use store::{Buffer, BufferStore};
#[allow(unused_imports)]
pub use voice::VoicePool;
