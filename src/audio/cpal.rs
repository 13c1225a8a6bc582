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
use std::{collections::HashMap, error::Error, fmt, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info};

use super::{Backend as AudioBackend, BackendError, BufferId, VoiceId};
use crate::config;

/// A registered PCM block, converted to f32 once at registration time so the
/// mixing callback never touches integer samples.
struct BufferPcm {
    data: Vec<f32>,
    sample_rate: u32,
}

/// Per-voice mixing state. Only ever touched with the mix lock held.
struct VoiceSlot {
    buffer: Option<(BufferId, Arc<BufferPcm>)>,
    /// Fractional read position into the buffer, in source frames.
    position: f64,
    /// Source frames consumed per output frame.
    step: f64,
    gain: f32,
    gain_left: f32,
    gain_right: f32,
    looping: bool,
    playing: bool,
}

impl VoiceSlot {
    fn new() -> VoiceSlot {
        let (gain_left, gain_right) = pan_gains(0.0);
        VoiceSlot {
            buffer: None,
            position: 0.0,
            step: 1.0,
            gain: 1.0,
            gain_left,
            gain_right,
            looping: false,
            playing: false,
        }
    }
}

struct MixState {
    buffers: HashMap<BufferId, Arc<BufferPcm>>,
    voices: Vec<VoiceSlot>,
    output_rate: u32,
}

/// Equal power panning: -1 is full left, 0 is center, 1 is full right.
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// A mixing backend on top of a cpal output stream. The stream lives on a
/// dedicated thread (cpal streams are not Send); all voice state is shared
/// with the audio callback through a single mutex.
pub struct Backend {
    name: String,
    host_id: cpal::HostId,
    sample_rate: u32,
    state: Arc<Mutex<MixState>>,
    shutdown_tx: crossbeam_channel::Sender<()>,
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl Backend {
    /// Opens the configured output device and starts the output stream.
    pub fn open(config: &config::Audio) -> Result<Backend, BackendError> {
        let voices = config.voices();
        let host = cpal::default_host();
        let wanted = config.device();
        let device = if wanted.is_empty() || wanted == "default" {
            host.default_output_device()
                .ok_or_else(|| BackendError::NoDevice(wanted.to_string()))?
        } else {
            host.output_devices()?
                .find(|d| d.name().map(|name| name == wanted).unwrap_or(false))
                .ok_or_else(|| BackendError::NoDevice(wanted.to_string()))?
        };
        let name = device.name()?;

        let state = Arc::new(Mutex::new(MixState {
            buffers: HashMap::new(),
            voices: (0..voices).map(|_| VoiceSlot::new()).collect(),
            output_rate: config.sample_rate(),
        }));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let stream_thread = {
            let state = state.clone();
            let desired_rate = config.sample_rate();
            let buffer_size = config.buffer_size() as u32;
            thread::spawn(move || {
                stream_main(
                    device,
                    desired_rate,
                    buffer_size,
                    state,
                    ready_tx,
                    shutdown_rx,
                )
            })
        };

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BackendError::StreamClosed),
        };
        state.lock().output_rate = sample_rate;

        info!(
            device = name,
            sample_rate, voices, "Opened audio output stream."
        );

        Ok(Backend {
            name,
            host_id: host.id(),
            sample_rate,
            state,
            shutdown_tx,
            stream_thread: Some(stream_thread),
        })
    }

    /// Lists output devices known to cpal.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();
        for device in host.output_devices()? {
            let name = device.name()?;
            match device.default_output_config() {
                Ok(config) => devices.push(format!(
                    "{} (Channels={}, Rate={}) ({})",
                    name,
                    config.channels(),
                    config.sample_rate().0,
                    host.id().name()
                )),
                Err(_) => devices.push(format!("{} ({})", name, host.id().name())),
            }
        }
        Ok(devices)
    }

    fn with_voice<T>(
        &self,
        voice: VoiceId,
        f: impl FnOnce(&mut VoiceSlot) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut state = self.state.lock();
        match state.voices.get_mut(voice) {
            Some(slot) => f(slot),
            None => Err(BackendError::NoSuchVoice(voice)),
        }
    }
}

impl AudioBackend for Backend {
    fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn register_buffer(
        &self,
        id: BufferId,
        data: &[i16],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let pcm = Arc::new(BufferPcm {
            data: data.iter().map(|s| *s as f32 / 32768.0).collect(),
            sample_rate,
        });
        self.state.lock().buffers.insert(id, pcm);
        Ok(())
    }

    fn release_buffer(&self, id: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if let Some(voice) = state
            .voices
            .iter()
            .position(|slot| slot.playing && slot.buffer.as_ref().is_some_and(|(b, _)| *b == id))
        {
            return Err(BackendError::BufferInUse(id, voice));
        }
        if state.buffers.remove(&id).is_none() {
            return Err(BackendError::NoSuchBuffer(id));
        }
        for slot in state.voices.iter_mut() {
            if slot.buffer.as_ref().is_some_and(|(b, _)| *b == id) {
                slot.buffer = None;
                slot.playing = false;
            }
        }
        Ok(())
    }

    fn bind(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let pcm = state
            .buffers
            .get(&buffer)
            .cloned()
            .ok_or(BackendError::NoSuchBuffer(buffer))?;
        let output_rate = state.output_rate;
        let slot = state
            .voices
            .get_mut(voice)
            .ok_or(BackendError::NoSuchVoice(voice))?;
        slot.step = pcm.sample_rate as f64 / output_rate as f64;
        slot.buffer = Some((buffer, pcm));
        slot.position = 0.0;
        slot.playing = false;
        Ok(())
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        self.with_voice(voice, |slot| {
            slot.gain = gain.max(0.0);
            Ok(())
        })
    }

    fn set_pan(&self, voice: VoiceId, pan: f32) -> Result<(), BackendError> {
        self.with_voice(voice, |slot| {
            let (left, right) = pan_gains(pan);
            slot.gain_left = left;
            slot.gain_right = right;
            Ok(())
        })
    }

    fn set_rate(&self, voice: VoiceId, rate: f64) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let output_rate = state.output_rate as f64;
        let slot = state
            .voices
            .get_mut(voice)
            .ok_or(BackendError::NoSuchVoice(voice))?;
        slot.step = (rate / output_rate).max(0.0);
        Ok(())
    }

    fn set_looping(&self, voice: VoiceId, looping: bool) -> Result<(), BackendError> {
        self.with_voice(voice, |slot| {
            slot.looping = looping;
            Ok(())
        })
    }

    fn play(&self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice(voice, |slot| {
            if slot.buffer.is_none() {
                return Err(BackendError::NoBufferBound(voice));
            }
            slot.position = 0.0;
            slot.playing = true;
            Ok(())
        })
    }

    fn stop(&self, voice: VoiceId) -> Result<(), BackendError> {
        self.with_voice(voice, |slot| {
            slot.playing = false;
            Ok(())
        })
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.state
            .lock()
            .voices
            .get(voice)
            .map(|slot| slot.playing)
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Backend>, Box<dyn Error>> {
        Err("not a mock backend".into())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(thread) = self.stream_thread.take() {
            let _ = thread.join();
        }
    }
}

/// Owns the cpal stream for its whole lifetime. Reports the negotiated sample
/// rate (or the open error) through ready_tx, then parks until shutdown.
fn stream_main(
    device: cpal::Device,
    desired_rate: u32,
    buffer_size: u32,
    state: Arc<Mutex<MixState>>,
    ready_tx: crossbeam_channel::Sender<Result<u32, BackendError>>,
    shutdown_rx: crossbeam_channel::Receiver<()>,
) {
    let default_config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    let channels = default_config.channels();
    let sample_format = default_config.sample_format();
    let mut stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(desired_rate),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };

    // Try the requested rate and buffer size first, then fall back to the
    // device defaults rather than failing outright.
    let stream = match build_stream(&device, &stream_config, sample_format, state.clone()) {
        Ok(stream) => stream,
        Err(_) => {
            stream_config.sample_rate = default_config.sample_rate();
            stream_config.buffer_size = cpal::BufferSize::Default;
            match build_stream(&device, &stream_config, sample_format, state) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            }
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }
    let _ = ready_tx.send(Ok(stream_config.sample_rate.0));

    // Keep the stream alive until the backend is dropped.
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    state: Arc<Mutex<MixState>>,
) -> Result<cpal::Stream, BackendError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream_typed::<f32>(device, config, state),
        cpal::SampleFormat::I16 => build_stream_typed::<i16>(device, config, state),
        cpal::SampleFormat::U16 => build_stream_typed::<u16>(device, config, state),
        other => Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: Arc<Mutex<MixState>>,
) -> Result<cpal::Stream, BackendError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            mix_into(&state, data, channels);
        },
        |e| error!(err = %e, "Audio stream error."),
        None,
    )?;
    Ok(stream)
}

/// Mixes every playing voice into the output buffer. Linear interpolation is
/// used for rate conversion, which is sufficient for one-shot samples.
fn mix_into<T>(state: &Mutex<MixState>, data: &mut [T], channels: usize)
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut state = state.lock();

    for frame in data.chunks_mut(channels) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;

        for slot in state.voices.iter_mut() {
            if !slot.playing {
                continue;
            }
            let Some((_, pcm)) = &slot.buffer else {
                slot.playing = false;
                continue;
            };
            let len = pcm.data.len();
            if len == 0 {
                slot.playing = false;
                continue;
            }

            let mut position = slot.position;
            if position >= len as f64 {
                if slot.looping {
                    position %= len as f64;
                } else {
                    slot.playing = false;
                    continue;
                }
            }

            let index = position as usize;
            let s0 = pcm.data[index];
            let s1 = if index + 1 < len {
                pcm.data[index + 1]
            } else if slot.looping {
                pcm.data[0]
            } else {
                s0
            };
            let frac = (position - index as f64) as f32;
            let sample = (s0 + (s1 - s0) * frac) * slot.gain;

            left += sample * slot.gain_left;
            right += sample * slot.gain_right;
            slot.position = position + slot.step;
        }

        left = left.clamp(-1.0, 1.0);
        right = right.clamp(-1.0, 1.0);

        match frame.len() {
            0 => {}
            1 => frame[0] = T::from_sample((left + right) * 0.5),
            _ => {
                frame[0] = T::from_sample(left);
                frame[1] = T::from_sample(right);
                for sample in frame.iter_mut().skip(2) {
                    *sample = T::from_sample(0.0f32);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_gains() {
        let (left, right) = pan_gains(0.0);
        assert!((left - right).abs() < 1e-6);
        assert!((left - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);

        let (left, right) = pan_gains(-1.0);
        assert!((left - 1.0).abs() < 1e-6);
        assert!(right.abs() < 1e-6);

        let (left, right) = pan_gains(1.0);
        assert!(left.abs() < 1e-6);
        assert!((right - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_gains_clamp() {
        assert_eq!(pan_gains(-5.0), pan_gains(-1.0));
        assert_eq!(pan_gains(5.0), pan_gains(1.0));
    }
}
