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

//! Ownership of decoded sample buffers.
//!
//! Samples are decoded entirely into memory at sound-bank load time for
//! zero-latency playback, and registered with the audio backend as they are
//! loaded. The store is the single owner of the PCM data: when it goes, the
//! backend registrations go with it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::decode::{decode_file, DecodeError};
use crate::audio::{Backend, BackendError, BufferId};
use crate::samples::voice::VoicePool;

/// A decoded sample buffer: mono signed 16-bit PCM plus the reference pitch
/// of the note that was recorded.
pub struct Buffer {
    id: BufferId,
    root_pitch: f32,
    sample_rate: u32,
    data: Arc<Vec<i16>>,
}

impl Buffer {
    /// The backend id of this buffer.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The pitch in Hz of the note recorded in the sample.
    pub fn root_pitch(&self) -> f32 {
        self.root_pitch
    }

    /// The native sample rate of the PCM data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The PCM data.
    pub fn data(&self) -> &[i16] {
        &self.data
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<i16>()
    }
}

/// Owns the decoded sample buffers of the active sound bank.
pub struct BufferStore {
    backend: Arc<dyn Backend>,
    buffers: HashMap<BufferId, Buffer>,
}

impl BufferStore {
    /// Creates an empty store that registers its buffers with the given
    /// backend.
    pub fn new(backend: Arc<dyn Backend>) -> BufferStore {
        BufferStore {
            backend,
            buffers: HashMap::new(),
        }
    }

    /// Decodes a sample file, registers it with the backend, and takes
    /// ownership of the PCM data. Only mono sources are accepted; stereo
    /// input is rejected, not downmixed.
    pub fn load<P: AsRef<Path>>(
        &mut self,
        path: P,
        root_pitch: f32,
    ) -> Result<BufferId, DecodeError> {
        let path = path.as_ref();
        let decoded = decode_file(path)?;
        if decoded.channels() != 1 {
            return Err(DecodeError::NotMono(decoded.channels()));
        }

        let sample_rate = decoded.sample_rate();
        let data = Arc::new(decoded.into_samples());
        let id = BufferId::next();
        self.backend.register_buffer(id, &data, sample_rate)?;

        debug!(
            path = ?path,
            buffer = %id,
            sample_rate,
            memory_kb = data.len() * 2 / 1024,
            "Sample loaded."
        );

        self.buffers.insert(
            id,
            Buffer {
                id,
                root_pitch,
                sample_rate,
                data,
            },
        );
        Ok(id)
    }

    /// Gets a buffer by id.
    pub fn get(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    /// Returns the number of buffers in the store.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if the store holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the total memory used by the stored buffers.
    pub fn total_memory_usage(&self) -> usize {
        self.buffers.values().map(|b| b.memory_size()).sum()
    }

    /// Releases every buffer from the backend and drops the PCM data. Fails
    /// closed: a voice still bound to one of these buffers must be stopped
    /// and unbound before the store can be cleared.
    pub fn clear(&mut self, pool: &VoicePool) -> Result<(), BackendError> {
        for id in self.buffers.keys() {
            if let Some(voice) = pool.voice_using_buffer(*id) {
                return Err(BackendError::BufferInUse(*id, voice));
            }
        }

        let count = self.buffers.len();
        self.release_all();
        if count > 0 {
            info!(buffers = count, "Sample buffers released.");
        }
        Ok(())
    }

    /// Releases every registered buffer, logging rather than propagating
    /// failures so one bad handle cannot leak the rest.
    fn release_all(&mut self) {
        for (id, _) in self.buffers.drain() {
            if let Err(e) = self.backend.release_buffer(id) {
                warn!(buffer = %id, err = %e, "Failed to release backend buffer.");
            }
        }
    }
}

impl Drop for BufferStore {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for BufferStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferStore")
            .field("buffers", &self.buffers.len())
            .field("total_memory_kb", &(self.total_memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock;
    use crate::samples::notes::note_frequency;
    use crate::testutil;

    fn mock_backend() -> Arc<mock::Backend> {
        Arc::new(mock::Backend::get("mock", 4))
    }

    #[test]
    fn test_load_mono() {
        let backend = mock_backend();
        let mut store = BufferStore::new(backend.clone());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.wav");
        testutil::write_sine_wav(&path, 22050, 1, 2205).expect("write wav");

        let id = store.load(&path, note_frequency(60)).expect("load");
        assert_eq!(store.len(), 1);
        assert_eq!(backend.registered_buffers(), vec![id]);

        let buffer = store.get(id).expect("buffer");
        assert_eq!(buffer.id(), id);
        assert_eq!(buffer.sample_rate(), 22050);
        assert_eq!(buffer.data().len(), 2205);
        assert_eq!(store.total_memory_usage(), 2205 * 2);
    }

    #[test]
    fn test_load_stereo_rejected() {
        let backend = mock_backend();
        let mut store = BufferStore::new(backend.clone());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");
        testutil::write_sine_wav(&path, 44100, 2, 100).expect("write wav");

        assert!(matches!(
            store.load(&path, note_frequency(60)),
            Err(DecodeError::NotMono(2))
        ));
        assert!(store.is_empty());
        assert!(backend.registered_buffers().is_empty());
    }

    #[test]
    fn test_clear_fails_closed_with_bound_voice() {
        let backend = mock_backend();
        let mut store = BufferStore::new(backend.clone());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.wav");
        testutil::write_sine_wav(&path, 44100, 1, 100).expect("write wav");
        let id = store.load(&path, note_frequency(60)).expect("load");

        let mut pool = VoicePool::new(2);
        pool.bind(1, 60, id, false);

        assert!(matches!(
            store.clear(&pool),
            Err(BackendError::BufferInUse(_, 1))
        ));
        assert_eq!(store.len(), 1);

        pool.unbind(1);
        store.clear(&pool).expect("clear");
        assert!(store.is_empty());
        assert!(backend.registered_buffers().is_empty());
    }

    #[test]
    fn test_drop_releases_buffers() {
        let backend = mock_backend();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.wav");
        testutil::write_sine_wav(&path, 44100, 1, 100).expect("write wav");

        {
            let mut store = BufferStore::new(backend.clone());
            store.load(&path, note_frequency(60)).expect("load");
            assert_eq!(backend.registered_buffers().len(), 1);
        }

        assert!(backend.registered_buffers().is_empty());
    }
}
