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

//! Decoding of sample files to signed 16-bit PCM.
//!
//! This uses symphonia to decode whatever formats it supports (WAV, FLAC,
//! MP3, ...). Decoding happens at sound-bank load time only and is allowed to
//! block the caller.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

/// Ceiling on the decoded size of a single sample. Sound banks hold short
/// instrument samples; anything past this is almost certainly a mistake.
const MAX_SAMPLE_BYTES: usize = 16 * 1024 * 1024;

/// Error types for sample decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Audio file error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Sample rate not specified")]
    UnknownSampleRate,

    #[error("Channel count not specified")]
    UnknownChannelCount,

    #[error("Unsupported channel count {0}, channel count is greater than stereo")]
    UnsupportedChannels(usize),

    #[error("Sample has {0} channels, sound bank samples must be mono")]
    NotMono(usize),

    #[error("Sample is {0} bytes decoded, exceeding the {1} byte limit")]
    TooLarge(usize, usize),

    #[error("Backend rejected sample: {0}")]
    Backend(#[from] crate::audio::BackendError),
}

/// A fully decoded sample: interleaved signed 16-bit PCM.
pub struct DecodedSample {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: usize,
}

impl DecodedSample {
    /// Returns the number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the sample rate of the PCM data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the PCM data.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Consumes the decoded sample, returning the PCM data.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Decodes an audio file into 16-bit PCM. Sources with more than two channels
/// are rejected; whether the result must be mono is the caller's contract.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<DecodedSample, DecodeError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // A hint helps the format registry guess the container.
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = &track.codec_params;

    let sample_rate = params.sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
    let mut channels = params.channels.map(|c| c.count());
    if let Some(count) = channels {
        if count > 2 {
            return Err(DecodeError::UnsupportedChannels(count));
        }
    }

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs().make(params, &decoder_opts)?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Recoverable per the symphonia contract, skip the packet.
                warn!(path = ?path, err = e, "Skipping undecodable packet.");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if channels.is_none() {
            let count = spec.channels.count();
            if count > 2 {
                return Err(DecodeError::UnsupportedChannels(count));
            }
            channels = Some(count);
        }

        if sample_buf.is_none() {
            sample_buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        let bytes = samples.len() * std::mem::size_of::<i16>();
        if bytes > MAX_SAMPLE_BYTES {
            return Err(DecodeError::TooLarge(bytes, MAX_SAMPLE_BYTES));
        }
    }

    let channels = channels.ok_or(DecodeError::UnknownChannelCount)?;

    Ok(DecodedSample {
        samples,
        sample_rate,
        channels,
    })
}
