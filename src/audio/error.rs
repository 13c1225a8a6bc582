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
use crate::audio::{BufferId, VoiceId};

/// Error types for audio backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("No such voice: {0}")]
    NoSuchVoice(VoiceId),

    #[error("No such buffer: {0}")]
    NoSuchBuffer(BufferId),

    #[error("No buffer bound to voice {0}")]
    NoBufferBound(VoiceId),

    #[error("Buffer {0} is still playing on voice {1}")]
    BufferInUse(BufferId, VoiceId),

    #[error("No output device matching {0:?}")]
    NoDevice(String),

    #[error("Unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Output stream closed unexpectedly")]
    StreamClosed,

    #[error("Device enumeration error: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Device name error: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("Stream config error: {0}")]
    StreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Stream build error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Stream play error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}
