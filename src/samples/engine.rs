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

//! The playback scheduler: binds notes to voices and drives the backend.
//!
//! All operations run to completion on the caller's thread; the player holds
//! no locks of its own. A host with multiple threads must serialize calls
//! onto one of them, including the periodic [SoundBankPlayer::reconcile]
//! poll.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::notes::{note_frequency, playback_rate, NoteMap};
use super::store::BufferStore;
use super::voice::VoicePool;
use crate::audio::{Backend, BackendError, BufferId, VoiceId};
use crate::config::{self, ConfigError};

/// A sample-based polyphonic note player. It employs a "sound bank", a set of
/// samples that each cover one or more notes, allowing a full instrument with
/// only a few samples. Notes are panned to achieve a stereo effect; samples
/// must always be mono.
pub struct SoundBankPlayer {
    /// The mixing backend all playback goes through.
    backend: Arc<dyn Backend>,
    /// Owner of the active bank's decoded sample buffers.
    store: BufferStore,
    /// How each MIDI note will be played.
    notes: NoteMap,
    /// Which voice is bound to which note.
    pool: VoicePool,
    /// Voices configured by queue_note and waiting for play_queued.
    pending: Vec<VoiceId>,
    /// Whether notes sustain until note_off instead of decaying naturally.
    /// Captured into each voice at bind time.
    loop_notes: bool,
    /// The name of the active sound bank.
    bank_name: Option<String>,
}

impl SoundBankPlayer {
    /// Creates a player with no sound bank loaded. The voice pool size comes
    /// from the backend.
    pub fn new(backend: Arc<dyn Backend>, loop_notes: bool) -> SoundBankPlayer {
        let pool = VoicePool::new(backend.voice_count());
        let store = BufferStore::new(backend.clone());
        SoundBankPlayer {
            backend,
            store,
            notes: NoteMap::new(),
            pool,
            pending: Vec::new(),
            loop_notes,
            bank_name: None,
        }
    }

    /// For continuous tone instruments (such as an organ sound) set this to
    /// true and call [SoundBankPlayer::note_off] to quiet a playing note.
    /// For sounds that naturally decay to silence leave it false; the note
    /// terminates itself at the end of the sample.
    pub fn set_loop_notes(&mut self, loop_notes: bool) {
        self.loop_notes = loop_notes;
    }

    /// Loads the sound bank described by the given YAML descriptor, replacing
    /// the current one. The replacement is built completely before the active
    /// bank is touched, so any error leaves the current bank playable.
    pub fn load_sound_bank<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let bank = config::parse_sound_bank(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut store = BufferStore::new(self.backend.clone());
        let mut notes = NoteMap::new();
        for sample in bank.samples() {
            let file = if Path::new(sample.file()).is_absolute() {
                PathBuf::from(sample.file())
            } else {
                base.join(sample.file())
            };
            let buffer = store
                .load(&file, note_frequency(sample.root_note()))
                .map_err(|e| ConfigError::Sample {
                    file: sample.file().to_string(),
                    source: e,
                })?;
            let (low, high) = sample.note_range();
            notes.assign(low, high, buffer, sample.panning());
        }

        // Swap: silence the pool, then retire the old bank's buffers.
        self.all_notes_off();
        let mut old = std::mem::replace(&mut self.store, store);
        if let Err(e) = old.clear(&self.pool) {
            warn!(err = %e, "Failed to release the previous sound bank cleanly.");
        }
        self.notes = notes;
        self.bank_name = Some(bank.name().to_string());

        info!(
            bank = bank.name(),
            buffers = self.store.len(),
            notes = self.notes.assigned().len(),
            memory_kb = self.store.total_memory_usage() / 1024,
            "Sound bank loaded."
        );
        Ok(())
    }

    /// Plays the note with the specified MIDI note number immediately.
    ///
    /// If no free voice is found, the voice that has been bound the longest
    /// is stolen to make room. An unassigned note is a silent no-op; the
    /// instrument may legitimately have gaps.
    ///
    /// The gain is an attenuation factor. When playing multiple notes at the
    /// same time, keep it at 0.5 or lower to prevent clipping.
    pub fn note_on(&mut self, midi: u8, gain: f32) {
        let Some(voice) = self.start_note(midi, gain) else {
            return;
        };
        if let Err(e) = self.backend.play(voice) {
            warn!(voice, note = midi, err = %e, "Backend refused to start voice.");
            self.pool.unbind(voice);
            return;
        }
        debug!(voice, note = midi, gain, "Note triggered.");
    }

    /// Binds and fully configures a voice for the note, but defers the start
    /// until [SoundBankPlayer::play_queued]. To play a chord, queue its notes
    /// and then start them all at once.
    pub fn queue_note(&mut self, midi: u8, gain: f32) {
        let Some(voice) = self.start_note(midi, gain) else {
            return;
        };
        self.pool.set_pending(voice, true);
        self.pending.push(voice);
        debug!(voice, note = midi, queued = self.pending.len(), "Note queued.");
    }

    /// Starts every queued voice. Simultaneity is best-effort: there is no
    /// cross-voice timestamp API, so the loop does nothing between
    /// consecutive play calls but the calls themselves.
    pub fn play_queued(&mut self) {
        let voices = self.pool.pending_voices();
        for &voice in &voices {
            if let Err(e) = self.backend.play(voice) {
                // The rest of the chord still plays.
                warn!(voice, err = %e, "Backend refused to start queued voice.");
                self.pool.unbind(voice);
                continue;
            }
            self.pool.set_pending(voice, false);
        }
        if !voices.is_empty() {
            debug!(voices = voices.len(), "Queued notes started.");
        }
        self.pending.clear();
    }

    /// Stops a sustained note. Only useful when loop notes are enabled;
    /// naturally decaying voices unbind themselves on completion, so
    /// releasing them (or a note that is not playing) does nothing.
    pub fn note_off(&mut self, midi: u8) {
        for voice in self.pool.voices_for_note(midi) {
            if !self.pool.is_looping(voice) {
                continue;
            }
            if let Err(e) = self.backend.stop(voice) {
                warn!(voice, note = midi, err = %e, "Failed to stop voice.");
            }
            self.pending.retain(|v| *v != voice);
            self.pool.unbind(voice);
            debug!(voice, note = midi, "Note released.");
        }
    }

    /// Stops all playing notes and abandons any queued ones.
    pub fn all_notes_off(&mut self) {
        let voices = self.pool.bound_voices();
        for &voice in &voices {
            if let Err(e) = self.backend.stop(voice) {
                warn!(voice, err = %e, "Failed to stop voice.");
            }
        }
        self.pool.clear();
        self.pending.clear();
        if !voices.is_empty() {
            debug!(stopped = voices.len(), "All notes stopped.");
        }
    }

    /// Returns naturally finished voices to the pool. The backend cannot push
    /// "voice finished" events, so the host calls this periodically from the
    /// same thread as every other operation. Finished voices are unbound
    /// without a backend stop; they already stopped themselves.
    pub fn reconcile(&mut self) {
        for voice in self.pool.bound_voices() {
            if self.pool.is_pending(voice) || self.pool.is_looping(voice) {
                continue;
            }
            if !self.backend.is_playing(voice) {
                self.pool.unbind(voice);
                debug!(voice, "Voice finished, returning it to the pool.");
            }
        }
    }

    /// Returns the note map of the active sound bank.
    pub fn notes(&self) -> &NoteMap {
        &self.notes
    }

    /// Returns the name of the active sound bank.
    pub fn bank_name(&self) -> Option<&str> {
        self.bank_name.as_deref()
    }

    /// Returns the number of voices currently bound to notes.
    pub fn active_voices(&self) -> usize {
        self.pool.bound_voices().len()
    }

    /// Returns the number of notes queued and waiting for play_queued.
    pub fn queued_notes(&self) -> usize {
        self.pending.len()
    }

    /// Returns the total memory used by the active bank's sample buffers.
    pub fn memory_usage(&self) -> usize {
        self.store.total_memory_usage()
    }

    /// Resolves a voice for the note and fully configures it on the backend,
    /// stealing if necessary. Returns None for unassigned notes (a silent
    /// no-op with no backend traffic) and on backend refusal (a warning; the
    /// voice is left idle).
    fn start_note(&mut self, midi: u8, gain: f32) -> Option<VoiceId> {
        let note = self.notes.lookup(midi)?;
        let buffer = match self.store.get(note.buffer()) {
            Some(buffer) => buffer,
            None => {
                // The note map swap guarantees this cannot happen.
                error!(note = midi, buffer = %note.buffer(), "Note references a missing buffer.");
                return None;
            }
        };
        let buffer_id = buffer.id();
        let rate = playback_rate(buffer.sample_rate(), buffer.root_pitch(), midi);

        let voice = self.acquire_voice()?;
        if let Err(e) = self.configure_voice(voice, buffer_id, gain, note.panning(), rate) {
            warn!(voice, note = midi, err = %e, "Backend refused voice setup, leaving it idle.");
            return None;
        }
        self.pool.bind(voice, midi, buffer_id, self.loop_notes);
        Some(voice)
    }

    /// Finds a free voice, stealing the oldest bound one when the pool is
    /// exhausted. Stealing is expected under heavy polyphony, not an error.
    fn acquire_voice(&mut self) -> Option<VoiceId> {
        if let Some(voice) = self.pool.find_free() {
            return Some(voice);
        }
        let voice = self.pool.find_oldest_bound()?;
        debug!(voice, note = ?self.pool.note(voice), "No free voice, stealing the oldest.");
        if let Err(e) = self.backend.stop(voice) {
            warn!(voice, err = %e, "Failed to stop stolen voice.");
        }
        self.pool.unbind(voice);
        self.pending.retain(|v| *v != voice);
        Some(voice)
    }

    fn configure_voice(
        &self,
        voice: VoiceId,
        buffer: BufferId,
        gain: f32,
        panning: f32,
        rate: f64,
    ) -> Result<(), BackendError> {
        self.backend.bind(voice, buffer)?;
        self.backend.set_gain(voice, gain)?;
        self.backend.set_pan(voice, panning)?;
        self.backend.set_rate(voice, rate)?;
        self.backend.set_looping(voice, self.loop_notes)?;
        Ok(())
    }
}

impl std::fmt::Debug for SoundBankPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBankPlayer")
            .field("bank", &self.bank_name)
            .field("buffers", &self.store.len())
            .field("active_voices", &self.active_voices())
            .field("queued_notes", &self.queued_notes())
            .field("loop_notes", &self.loop_notes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;
    use crate::config::{BankSample, SoundBank};
    use crate::testutil;

    fn setup(voices: usize, loop_notes: bool) -> (SoundBankPlayer, Arc<mock::Backend>, tempfile::TempDir) {
        let backend = Arc::new(mock::Backend::get("mock", voices));
        let player = SoundBankPlayer::new(backend.clone(), loop_notes);
        let dir = tempfile::tempdir().expect("tempdir");
        (player, backend, dir)
    }

    fn write_bank(dir: &Path, filename: &str, bank: &SoundBank) -> PathBuf {
        let path = dir.join(filename);
        std::fs::write(&path, serde_yml::to_string(bank).expect("serialize")).expect("write");
        path
    }

    /// A single-sample piano bank: root C4, covering [48, 72], panned 0.25.
    fn piano_bank(dir: &Path) -> PathBuf {
        testutil::write_sine_wav(&dir.join("piano.wav"), 22050, 1, 1000).expect("wav");
        write_bank(
            dir,
            "piano.yaml",
            &SoundBank::new(
                "Piano",
                vec![BankSample::new("piano.wav", 60, [48, 72], 0.25)],
            ),
        )
    }

    #[test]
    fn test_load_sound_bank() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        assert_eq!(player.bank_name(), Some("Piano"));
        assert_eq!(backend.registered_buffers().len(), 1);
        assert_eq!(player.notes().assigned().len(), 25);
        assert_eq!(player.memory_usage(), 1000 * 2);
    }

    #[test]
    fn test_note_on_unassigned_is_silent_noop() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        let ops_before = backend.ops();
        player.note_on(20, 1.0);
        assert_eq!(backend.ops(), ops_before);
        assert_eq!(player.active_voices(), 0);
    }

    #[test]
    fn test_note_on_configures_and_plays() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);

        let voice = backend.voice(0);
        assert!(voice.playing);
        assert_eq!(voice.play_calls, 1);
        assert_eq!(voice.gain, 0.5);
        assert_eq!(voice.pan, 0.25);
        // The root note plays at the sample's native rate.
        assert!((voice.rate - 22050.0).abs() < 1e-6);
        assert_eq!(player.active_voices(), 1);
    }

    #[test]
    fn test_note_rate_follows_pitch() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        // An octave above the root doubles the playback rate.
        player.note_on(72, 0.5);
        assert!((backend.voice(0).rate - 44100.0).abs() < 1e-2);

        // An octave below halves it.
        player.note_on(48, 0.5);
        assert!((backend.voice(1).rate - 11025.0).abs() < 1e-2);
    }

    #[test]
    fn test_retrigger_layers_voices() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        // Re-striking a note while it still sounds layers a second voice.
        player.note_on(60, 0.5);
        player.note_on(60, 0.5);
        assert_eq!(player.active_voices(), 2);
        assert!(backend.voice(0).playing);
        assert!(backend.voice(1).playing);
    }

    #[test]
    fn test_steals_oldest_voice_when_exhausted() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);
        player.note_on(62, 0.5);
        player.note_on(64, 0.5);
        assert_eq!(player.active_voices(), 3);

        // A fourth note steals voice 0, the first one bound.
        player.note_on(65, 0.5);
        assert_eq!(player.active_voices(), 3);

        let stolen = backend.voice(0);
        assert_eq!(stolen.stop_calls, 1);
        assert_eq!(stolen.play_calls, 2);
        let expected = playback_rate(22050, note_frequency(60), 65);
        assert!((stolen.rate - expected).abs() < 1e-6);

        // The other voices were left alone.
        assert_eq!(backend.voice(1).stop_calls, 0);
        assert_eq!(backend.voice(2).stop_calls, 0);
    }

    #[test]
    fn test_queue_and_flush() {
        let (mut player, backend, dir) = setup(4, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.queue_note(60, 0.5);
        player.queue_note(64, 0.5);
        player.queue_note(67, 0.5);

        // Fully configured but nothing plays before the flush.
        assert_eq!(player.queued_notes(), 3);
        assert_eq!(player.active_voices(), 3);
        for voice in 0..3 {
            assert!(!backend.voice(voice).playing);
            assert_eq!(backend.voice(voice).play_calls, 0);
        }

        player.play_queued();

        assert_eq!(player.queued_notes(), 0);
        for voice in 0..3 {
            assert!(backend.voice(voice).playing);
            assert_eq!(backend.voice(voice).play_calls, 1);
        }
    }

    #[test]
    fn test_queue_steals_pending_voice() {
        let (mut player, backend, dir) = setup(2, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.queue_note(60, 0.5);
        player.queue_note(62, 0.5);
        // The pool is exhausted; queueing a third note steals voice 0, which
        // never gets its deferred start.
        player.queue_note(64, 0.5);

        player.play_queued();
        assert_eq!(player.queued_notes(), 0);
        assert_eq!(backend.voice(0).play_calls, 1);
        assert_eq!(backend.voice(1).play_calls, 1);
        let expected = playback_rate(22050, note_frequency(60), 64);
        assert!((backend.voice(0).rate - expected).abs() < 1e-6);
    }

    #[test]
    fn test_note_off_stops_looping_voice() {
        let (mut player, backend, dir) = setup(3, true);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);
        assert!(backend.voice(0).looping);

        player.note_off(60);
        assert_eq!(player.active_voices(), 0);
        assert!(!backend.voice(0).playing);
        assert_eq!(backend.voice(0).stop_calls, 1);
    }

    #[test]
    fn test_note_off_ignores_decaying_voice() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);
        player.note_off(60);

        // Non-looping notes decay on their own; note_off must not cut them.
        assert_eq!(player.active_voices(), 1);
        assert!(backend.voice(0).playing);
        assert_eq!(backend.voice(0).stop_calls, 0);
    }

    #[test]
    fn test_note_off_unknown_note_is_noop() {
        let (mut player, _backend, dir) = setup(3, true);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_off(60);
        player.note_off(127);
    }

    #[test]
    fn test_reconcile_unbinds_finished_without_stop() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);
        player.reconcile();
        assert_eq!(player.active_voices(), 1);

        // The voice plays to the end of its sample.
        backend.finish(0);
        player.reconcile();

        assert_eq!(player.active_voices(), 0);
        assert_eq!(backend.voice(0).stop_calls, 0);
    }

    #[test]
    fn test_reconcile_leaves_queued_voices_alone() {
        let (mut player, _backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.queue_note(60, 0.5);
        // Queued voices are bound but not playing; reconcile must not treat
        // them as finished.
        player.reconcile();
        assert_eq!(player.active_voices(), 1);
        assert_eq!(player.queued_notes(), 1);
    }

    #[test]
    fn test_all_notes_off() {
        let (mut player, backend, dir) = setup(4, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");

        player.note_on(60, 0.5);
        player.note_on(64, 0.5);
        player.queue_note(67, 0.5);

        player.all_notes_off();

        assert_eq!(player.active_voices(), 0);
        assert_eq!(player.queued_notes(), 0);
        for voice in 0..3 {
            assert!(!backend.voice(voice).playing);
        }

        // The queued voice never starts, even if flushed afterwards.
        player.play_queued();
        assert_eq!(backend.voice(2).play_calls, 0);
    }

    #[test]
    fn test_bank_round_trip_leaves_no_residue() {
        let (mut player, backend, dir) = setup(3, false);
        let piano = piano_bank(dir.path());

        testutil::write_sine_wav(&dir.path().join("organ.wav"), 44100, 1, 500).expect("wav");
        let organ = write_bank(
            dir.path(),
            "organ.yaml",
            &SoundBank::new(
                "Organ",
                vec![BankSample::new("organ.wav", 35, [30, 40], -0.5)],
            ),
        );

        player.load_sound_bank(&piano).expect("load piano");
        let piano_notes = player.notes().assigned();
        let piano_panning = player.notes().lookup(60).expect("assigned").panning();

        player.load_sound_bank(&organ).expect("load organ");
        assert_eq!(player.bank_name(), Some("Organ"));
        assert_eq!(player.notes().assigned(), (30..=40).collect::<Vec<u8>>());
        assert!(player.notes().lookup(60).is_none());
        // The piano's buffer was released from the backend.
        assert_eq!(backend.registered_buffers().len(), 1);

        player.load_sound_bank(&piano).expect("load piano again");
        assert_eq!(player.bank_name(), Some("Piano"));
        assert_eq!(player.notes().assigned(), piano_notes);
        assert_eq!(
            player.notes().lookup(60).expect("assigned").panning(),
            piano_panning
        );
        assert!(player.notes().lookup(35).is_none());
        assert_eq!(backend.registered_buffers().len(), 1);
    }

    #[test]
    fn test_failed_load_keeps_previous_bank() {
        let (mut player, backend, dir) = setup(3, false);
        player.load_sound_bank(piano_bank(dir.path())).expect("load");
        let buffers = backend.registered_buffers();

        let broken = write_bank(
            dir.path(),
            "broken.yaml",
            &SoundBank::new(
                "Broken",
                vec![BankSample::new("missing.wav", 60, [0, 127], 0.0)],
            ),
        );
        assert!(matches!(
            player.load_sound_bank(&broken),
            Err(ConfigError::Sample { .. })
        ));

        // The piano bank is still fully active.
        assert_eq!(player.bank_name(), Some("Piano"));
        assert_eq!(backend.registered_buffers(), buffers);
        player.note_on(60, 0.5);
        assert_eq!(player.active_voices(), 1);
    }

    #[test]
    fn test_load_replaces_bank_while_notes_play() {
        let (mut player, backend, dir) = setup(3, false);
        let piano = piano_bank(dir.path());
        player.load_sound_bank(&piano).expect("load");

        player.note_on(60, 0.5);
        player.note_on(64, 0.5);

        // Reloading silences the pool before releasing the old buffers.
        player.load_sound_bank(&piano).expect("reload");
        assert_eq!(player.active_voices(), 0);
        assert!(!backend.voice(0).playing);
        assert_eq!(backend.registered_buffers().len(), 1);
    }
}
