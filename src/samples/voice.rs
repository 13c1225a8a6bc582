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

//! Voice pool bookkeeping for polyphonic sample playback.
//!
//! The pool tracks which voice is bound to which note and when; it performs
//! no audio I/O itself. All backend calls are issued by the scheduler, which
//! keeps pool state and backend state in step.

use std::time::Instant;

use crate::audio::{BufferId, VoiceId};

/// Bookkeeping for one mixing voice.
#[derive(Clone, Debug)]
struct Voice {
    /// The MIDI note this voice is bound to, or None if idle.
    note: Option<u8>,
    /// The buffer the voice was bound with.
    buffer: Option<BufferId>,
    /// Whether the voice is fully configured but waiting for a synchronized
    /// start.
    pending: bool,
    /// Whether the voice sustains until an explicit release.
    looping: bool,
    /// When this voice was bound. Drives the oldest-bound steal policy.
    bound_at: Instant,
}

impl Voice {
    fn idle() -> Voice {
        Voice {
            note: None,
            buffer: None,
            pending: false,
            looping: false,
            bound_at: Instant::now(),
        }
    }

    fn is_bound(&self) -> bool {
        self.note.is_some()
    }
}

/// A fixed-size pool of mixing voices. Voice ids are indices into the pool
/// and double as backend voice ids.
pub struct VoicePool {
    voices: Vec<Voice>,
}

impl VoicePool {
    /// Creates a new pool with the given number of voices, all idle.
    pub fn new(size: usize) -> VoicePool {
        VoicePool {
            voices: vec![Voice::idle(); size],
        }
    }

    /// Returns the number of voices in the pool.
    pub fn size(&self) -> usize {
        self.voices.len()
    }

    /// Finds the lowest-numbered idle voice.
    pub fn find_free(&self) -> Option<VoiceId> {
        self.voices.iter().position(|v| !v.is_bound())
    }

    /// Finds the voice that has been bound the longest, breaking ties by the
    /// lowest voice id so stealing is reproducible.
    pub fn find_oldest_bound(&self) -> Option<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_bound())
            .min_by_key(|(id, v)| (v.bound_at, *id))
            .map(|(id, _)| id)
    }

    /// Binds a voice to a note. The bind timestamp is recorded here so the
    /// steal policy sees the true binding order.
    pub fn bind(&mut self, voice: VoiceId, note: u8, buffer: BufferId, looping: bool) {
        let v = &mut self.voices[voice];
        v.note = Some(note);
        v.buffer = Some(buffer);
        v.pending = false;
        v.looping = looping;
        v.bound_at = Instant::now();
    }

    /// Returns a voice to the idle state.
    pub fn unbind(&mut self, voice: VoiceId) {
        self.voices[voice] = Voice::idle();
    }

    /// Returns true if the voice is bound to a note.
    pub fn is_bound(&self, voice: VoiceId) -> bool {
        self.voices.get(voice).map(|v| v.is_bound()).unwrap_or(false)
    }

    /// Returns the note a voice is bound to.
    pub fn note(&self, voice: VoiceId) -> Option<u8> {
        self.voices.get(voice).and_then(|v| v.note)
    }

    /// Marks or unmarks a bound voice as waiting for a synchronized start.
    pub fn set_pending(&mut self, voice: VoiceId, pending: bool) {
        self.voices[voice].pending = pending;
    }

    /// Returns true if the voice is waiting for a synchronized start.
    pub fn is_pending(&self, voice: VoiceId) -> bool {
        self.voices.get(voice).map(|v| v.pending).unwrap_or(false)
    }

    /// Returns true if the voice sustains until an explicit release.
    pub fn is_looping(&self, voice: VoiceId) -> bool {
        self.voices.get(voice).map(|v| v.looping).unwrap_or(false)
    }

    /// Returns the ids of all bound voices.
    pub fn bound_voices(&self) -> Vec<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_bound())
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns the ids of all voices waiting for a synchronized start.
    pub fn pending_voices(&self) -> Vec<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.pending)
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns the ids of all voices bound to the given note. A note may be
    /// bound to several voices at once when it is re-struck while an earlier
    /// strike is still sounding.
    pub fn voices_for_note(&self, note: u8) -> Vec<VoiceId> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.note == Some(note))
            .map(|(id, _)| id)
            .collect()
    }

    /// Returns true if any bound voice references the given buffer.
    pub fn uses_buffer(&self, buffer: BufferId) -> bool {
        self.voice_using_buffer(buffer).is_some()
    }

    /// Returns the first voice that references the given buffer.
    pub fn voice_using_buffer(&self, buffer: BufferId) -> Option<VoiceId> {
        self.voices.iter().position(|v| v.buffer == Some(buffer))
    }

    /// Returns every voice to the idle state.
    pub fn clear(&mut self) {
        for v in self.voices.iter_mut() {
            *v = Voice::idle();
        }
    }
}

impl std::fmt::Debug for VoicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePool")
            .field("size", &self.voices.len())
            .field("bound", &self.bound_voices().len())
            .field("pending", &self.pending_voices().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_lowest_first() {
        let mut pool = VoicePool::new(3);
        assert_eq!(pool.find_free(), Some(0));

        pool.bind(0, 60, BufferId::next(), false);
        assert_eq!(pool.find_free(), Some(1));

        pool.bind(1, 61, BufferId::next(), false);
        pool.bind(2, 62, BufferId::next(), false);
        assert_eq!(pool.find_free(), None);

        pool.unbind(1);
        assert_eq!(pool.find_free(), Some(1));
    }

    #[test]
    fn test_oldest_bound_in_bind_order() {
        let mut pool = VoicePool::new(3);
        assert_eq!(pool.find_oldest_bound(), None);

        let buffer = BufferId::next();
        pool.bind(0, 60, buffer, false);
        pool.bind(1, 61, buffer, false);
        pool.bind(2, 62, buffer, false);

        assert_eq!(pool.find_oldest_bound(), Some(0));

        // Rebinding refreshes the timestamp, making voice 1 the oldest.
        pool.unbind(0);
        pool.bind(0, 63, buffer, false);
        assert_eq!(pool.find_oldest_bound(), Some(1));
    }

    #[test]
    fn test_same_note_on_multiple_voices() {
        let mut pool = VoicePool::new(3);
        let buffer = BufferId::next();
        pool.bind(0, 60, buffer, false);
        pool.bind(2, 60, buffer, false);

        assert_eq!(pool.voices_for_note(60), vec![0, 2]);
        assert_eq!(pool.voices_for_note(61), Vec::<VoiceId>::new());
    }

    #[test]
    fn test_pending_tracking() {
        let mut pool = VoicePool::new(2);
        let buffer = BufferId::next();
        pool.bind(0, 60, buffer, false);
        pool.set_pending(0, true);
        pool.bind(1, 61, buffer, false);

        assert!(pool.is_pending(0));
        assert!(!pool.is_pending(1));
        assert_eq!(pool.pending_voices(), vec![0]);

        // Unbinding clears the pending mark.
        pool.unbind(0);
        assert!(pool.pending_voices().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut pool = VoicePool::new(2);
        let buffer = BufferId::next();
        pool.bind(0, 60, buffer, true);
        pool.bind(1, 61, buffer, false);
        pool.set_pending(1, true);

        pool.clear();
        assert!(pool.bound_voices().is_empty());
        assert!(pool.pending_voices().is_empty());
        assert!(!pool.uses_buffer(buffer));
    }
}
