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

//! The note map: how each MIDI note will be played.

use crate::audio::BufferId;

/// How many notes we track. We can handle the entire MIDI range (0-127).
pub const NUM_NOTES: usize = 128;

/// Returns the frequency in Hz of a MIDI note (equal temperament, A4 = 440).
pub fn note_frequency(midi: u8) -> f32 {
    440.0 * 2f32.powf((midi as f32 - 69.0) / 12.0)
}

/// Returns the playback rate in Hz that pitch-shifts a sample recorded at
/// `root_pitch` Hz up or down to the given MIDI note.
pub fn playback_rate(sample_rate: u32, root_pitch: f32, midi: u8) -> f64 {
    sample_rate as f64 * (note_frequency(midi) as f64 / root_pitch as f64)
}

/// Describes how one MIDI note will be played.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    buffer: BufferId,
    panning: f32,
}

impl Note {
    /// The buffer assigned to this note.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// Stereo placement, -1 (left) to 1 (right).
    pub fn panning(&self) -> f32 {
        self.panning
    }
}

/// Maps each of the 128 MIDI note numbers to a buffer and panning. Built once
/// per sound-bank load and immutable until the next load; the player swaps in
/// a fully built map so a failed load never corrupts the active one.
pub struct NoteMap {
    notes: [Option<Note>; NUM_NOTES],
}

impl NoteMap {
    /// Creates a note map with every note unassigned.
    pub fn new() -> NoteMap {
        NoteMap {
            notes: [None; NUM_NOTES],
        }
    }

    /// Assigns a buffer to an inclusive range of notes. Later assignments win
    /// where ranges overlap, matching "closest declared sample" semantics.
    pub fn assign(&mut self, low: u8, high: u8, buffer: BufferId, panning: f32) {
        for note in low..=high.min((NUM_NOTES - 1) as u8) {
            self.notes[note as usize] = Some(Note { buffer, panning });
        }
    }

    /// Looks up a note. None means the note is unassigned, which is a
    /// legitimate gap in the instrument, not an error.
    pub fn lookup(&self, midi: u8) -> Option<Note> {
        self.notes.get(midi as usize).copied().flatten()
    }

    /// Returns the MIDI numbers of all assigned notes.
    pub fn assigned(&self) -> Vec<u8> {
        (0..NUM_NOTES as u8)
            .filter(|n| self.notes[*n as usize].is_some())
            .collect()
    }
}

impl Default for NoteMap {
    fn default() -> Self {
        NoteMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_frequency() {
        assert!((note_frequency(69) - 440.0).abs() < 1e-3);
        assert!((note_frequency(57) - 220.0).abs() < 1e-3);
        assert!((note_frequency(81) - 880.0).abs() < 1e-3);
        // Middle C.
        assert!((note_frequency(60) - 261.626).abs() < 1e-2);
    }

    #[test]
    fn test_playback_rate() {
        let root = note_frequency(60);

        // Playing the root note plays the sample at its native rate.
        assert!((playback_rate(44100, root, 60) - 44100.0).abs() < 1e-6);
        // An octave up doubles the rate, an octave down halves it.
        assert!((playback_rate(44100, root, 72) - 88200.0).abs() < 1e-2);
        assert!((playback_rate(44100, root, 48) - 22050.0).abs() < 1e-2);
    }

    #[test]
    fn test_assign_and_lookup() {
        let mut map = NoteMap::new();
        let buffer = BufferId::next();
        map.assign(48, 72, buffer, -0.5);

        assert!(map.lookup(47).is_none());
        assert!(map.lookup(73).is_none());

        let note = map.lookup(60).expect("assigned");
        assert_eq!(note.buffer(), buffer);
        assert_eq!(note.panning(), -0.5);

        // Lookup is idempotent.
        assert_eq!(map.lookup(60), map.lookup(60));
        assert_eq!(map.assigned().len(), 25);
    }

    #[test]
    fn test_overlap_last_write_wins() {
        let mut map = NoteMap::new();
        let first = BufferId::next();
        let second = BufferId::next();
        map.assign(40, 60, first, 0.0);
        map.assign(50, 70, second, 0.25);

        assert_eq!(map.lookup(45).expect("assigned").buffer(), first);
        assert_eq!(map.lookup(55).expect("assigned").buffer(), second);
        assert_eq!(map.lookup(55).expect("assigned").panning(), 0.25);
        assert_eq!(map.lookup(65).expect("assigned").buffer(), second);
    }

    #[test]
    fn test_full_range_assignment() {
        let mut map = NoteMap::new();
        map.assign(0, 127, BufferId::next(), 0.0);
        assert_eq!(map.assigned().len(), NUM_NOTES);
    }
}
