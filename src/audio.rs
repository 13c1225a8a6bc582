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
use std::{
    error::Error,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    sync::Arc,
};

use crate::config;

pub mod cpal;
mod error;
pub mod mock;

pub use error::BackendError;

/// Identifies one mixing voice on the backend. Voices are a fixed, small
/// resource; ids index the backend's slot array.
pub type VoiceId = usize;

/// Identifies a PCM block registered with the backend. Ids are unique for the
/// lifetime of the process so a reloaded sound bank can never alias a stale id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

/// Global atomic counter for generating unique buffer IDs.
static BUFFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl BufferId {
    /// Allocates the next unique buffer id.
    pub fn next() -> BufferId {
        BufferId(BUFFER_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The contract the playback engine expects from a mixing backend.
///
/// A backend owns a fixed pool of voices, each of which plays at most one
/// registered buffer at a time. The engine issues all calls from a single
/// thread; implementations only need interior synchronization against their
/// own output machinery (e.g. an audio callback).
pub trait Backend: fmt::Display + Send + Sync {
    /// The number of mixing voices this backend provides.
    fn voice_count(&self) -> usize;

    /// The output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Registers a mono 16-bit PCM block under the given id.
    fn register_buffer(
        &self,
        id: BufferId,
        data: &[i16],
        sample_rate: u32,
    ) -> Result<(), BackendError>;

    /// Releases a previously registered buffer. Fails with
    /// [BackendError::BufferInUse] while a voice is still playing it.
    fn release_buffer(&self, id: BufferId) -> Result<(), BackendError>;

    /// Attaches a buffer to a voice, replacing any previous attachment. The
    /// voice is left stopped and rewound.
    fn bind(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError>;

    /// Sets the voice's gain. Callers are expected to stay at or below 1.0
    /// when layering notes to avoid clipping.
    fn set_gain(&self, voice: VoiceId, gain: f32) -> Result<(), BackendError>;

    /// Sets the voice's stereo position, -1 (left) to 1 (right).
    fn set_pan(&self, voice: VoiceId, pan: f32) -> Result<(), BackendError>;

    /// Sets the voice's playback rate in Hz. Playing the buffer at a rate
    /// other than its native sample rate pitch-shifts it.
    fn set_rate(&self, voice: VoiceId, rate: f64) -> Result<(), BackendError>;

    /// Sets whether the voice wraps around at the end of its buffer.
    fn set_looping(&self, voice: VoiceId, looping: bool) -> Result<(), BackendError>;

    /// Starts the voice from the beginning of its bound buffer.
    fn play(&self, voice: VoiceId) -> Result<(), BackendError>;

    /// Stops the voice. Stopping a voice that already ran to completion is a
    /// no-op, not an error.
    fn stop(&self, voice: VoiceId) -> Result<(), BackendError>;

    /// Returns true while the voice is producing audio. Non-looping voices
    /// report false once they run off the end of their buffer.
    fn is_playing(&self, voice: VoiceId) -> bool;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Backend>, Box<dyn Error>>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Backend::list()
}

/// Gets a backend for the configured device. Device names starting with
/// "mock" resolve to the mock backend.
pub fn get_backend(config: &config::Audio) -> Result<Arc<dyn Backend>, BackendError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Backend::get(device, config.voices())));
    }

    Ok(Arc::new(cpal::Backend::open(config)?))
}
