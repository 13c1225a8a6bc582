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
use std::{collections::HashMap, fmt, sync::Arc};

#[cfg(test)]
use std::error::Error;

use parking_lot::Mutex;

use super::{Backend as AudioBackend, BackendError, BufferId, VoiceId};

const MOCK_SAMPLE_RATE: u32 = 44100;

/// The state of one mock voice.
#[derive(Clone, Debug, Default)]
pub struct MockVoice {
    /// The buffer currently attached, if any.
    pub buffer: Option<BufferId>,
    /// The last gain that was set.
    pub gain: f32,
    /// The last pan that was set.
    pub pan: f32,
    /// The last playback rate that was set.
    pub rate: f64,
    /// Whether the voice loops at the end of its buffer.
    pub looping: bool,
    /// Whether the voice is currently playing.
    pub playing: bool,
    /// How many times play was called on this voice.
    pub play_calls: u32,
    /// How many times stop was called on this voice.
    pub stop_calls: u32,
}

struct MockState {
    voices: Vec<MockVoice>,
    buffers: HashMap<BufferId, (usize, u32)>,
    ops: u64,
}

/// A mock backend. Doesn't actually play anything, but records every call so
/// tests can assert on backend interactions.
#[derive(Clone)]
pub struct Backend {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl Backend {
    /// Gets the given mock backend with the given number of voices.
    pub fn get(name: &str, voices: usize) -> Backend {
        Backend {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState {
                voices: vec![MockVoice::default(); voices],
                buffers: HashMap::new(),
                ops: 0,
            })),
        }
    }

    fn with_voice<T>(
        &self,
        voice: VoiceId,
        f: impl FnOnce(&mut MockVoice) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut state = self.state.lock();
        state.ops += 1;
        match state.voices.get_mut(voice) {
            Some(v) => f(v),
            None => Err(BackendError::NoSuchVoice(voice)),
        }
    }

    /// Returns a snapshot of the given voice's state.
    #[cfg(test)]
    pub fn voice(&self, voice: VoiceId) -> MockVoice {
        self.state.lock().voices[voice].clone()
    }

    /// Returns the ids of all registered buffers.
    #[cfg(test)]
    pub fn registered_buffers(&self) -> Vec<BufferId> {
        let mut ids: Vec<BufferId> = self.state.lock().buffers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns the total number of backend calls made so far.
    #[cfg(test)]
    pub fn ops(&self) -> u64 {
        self.state.lock().ops
    }

    /// Simulates a voice playing to the end of its buffer.
    #[cfg(test)]
    pub fn finish(&self, voice: VoiceId) {
        self.state.lock().voices[voice].playing = false;
    }
}

impl AudioBackend for Backend {
    fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn register_buffer(
        &self,
        id: BufferId,
        data: &[i16],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.ops += 1;
        state.buffers.insert(id, (data.len(), sample_rate));
        Ok(())
    }

    fn release_buffer(&self, id: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.ops += 1;
        if let Some(voice) = state
            .voices
            .iter()
            .position(|v| v.playing && v.buffer == Some(id))
        {
            return Err(BackendError::BufferInUse(id, voice));
        }
        if state.buffers.remove(&id).is_none() {
            return Err(BackendError::NoSuchBuffer(id));
        }
        for voice in state.voices.iter_mut() {
            if voice.buffer == Some(id) {
                voice.buffer = None;
            }
        }
        Ok(())
    }

    fn bind(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        {
            let state = self.state.lock();
            if !state.buffers.contains_key(&buffer) {
                return Err(BackendError::NoSuchBuffer(buffer));
            }
        }
        self.with_voice(voice, |v| {
            v.buffer = Some(buffer);
            v.playing = false;
            Ok(())
        })
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            v.gain = gain;
            Ok(())
        })
    }

    fn set_pan(&self, voice: VoiceId, pan: f32) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            v.pan = pan;
            Ok(())
        })
    }

    fn set_rate(&self, voice: VoiceId, rate: f64) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            v.rate = rate;
            Ok(())
        })
    }

    fn set_looping(&self, voice: VoiceId, looping: bool) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            v.looping = looping;
            Ok(())
        })
    }

    fn play(&self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            if v.buffer.is_none() {
                return Err(BackendError::NoBufferBound(voice));
            }
            v.playing = true;
            v.play_calls += 1;
            Ok(())
        })
    }

    fn stop(&self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice(voice, |v| {
            v.playing = false;
            v.stop_calls += 1;
            Ok(())
        })
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.state
            .lock()
            .voices
            .get(voice)
            .map(|v| v.playing)
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Backend>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_requires_registered_buffer() {
        let backend = Backend::get("mock", 2);
        let id = BufferId::next();

        assert!(matches!(
            backend.bind(0, id),
            Err(BackendError::NoSuchBuffer(_))
        ));

        backend.register_buffer(id, &[0i16; 4], 44100).unwrap();
        backend.bind(0, id).unwrap();
        assert_eq!(backend.voice(0).buffer, Some(id));
    }

    #[test]
    fn test_play_requires_bound_buffer() {
        let backend = Backend::get("mock", 1);
        assert!(matches!(
            backend.play(0),
            Err(BackendError::NoBufferBound(0))
        ));
    }

    #[test]
    fn test_release_fails_while_playing() {
        let backend = Backend::get("mock", 1);
        let id = BufferId::next();
        backend.register_buffer(id, &[0i16; 4], 44100).unwrap();
        backend.bind(0, id).unwrap();
        backend.play(0).unwrap();

        assert!(matches!(
            backend.release_buffer(id),
            Err(BackendError::BufferInUse(_, 0))
        ));

        backend.stop(0).unwrap();
        backend.release_buffer(id).unwrap();
        assert_eq!(backend.voice(0).buffer, None);
    }

    #[test]
    fn test_stop_after_finish_is_noop() {
        let backend = Backend::get("mock", 1);
        let id = BufferId::next();
        backend.register_buffer(id, &[0i16; 4], 44100).unwrap();
        backend.bind(0, id).unwrap();
        backend.play(0).unwrap();

        backend.finish(0);
        assert!(!backend.is_playing(0));
        backend.stop(0).unwrap();
    }
}
