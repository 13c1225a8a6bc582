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
use std::error::Error;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use rand::Rng;
use tracing::info;

use soundbank::audio;
use soundbank::config::{self, Audio};
use soundbank::samples::SoundBankPlayer;

/// How long one beat of the demo performance lasts.
const DEMO_BEAT: Duration = Duration::from_millis(400);

/// The demo chord progression: C, Am, F, G with a bass note.
const DEMO_CHORDS: &[&[u8]] = &[
    &[48, 60, 64, 67],
    &[45, 57, 60, 64],
    &[41, 53, 57, 60],
    &[43, 55, 59, 62],
];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sound bank player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Verifies a sound bank descriptor, decoding every referenced sample.
    Verify {
        /// The path to the sound bank descriptor.
        bank: String,
    },
    /// Plays a short demo performance using the given sound bank.
    Play {
        /// The path to the sound bank descriptor.
        bank: String,
        /// The audio device to play through.
        #[clap(long)]
        device: Option<String>,
        /// The path to a YAML audio configuration. Overrides --device.
        #[clap(long)]
        config: Option<String>,
        /// Sustain notes until released rather than letting them decay.
        /// Use with banks whose samples wrap cleanly (e.g. an organ).
        #[clap(long)]
        loop_notes: bool,
        /// Per-note gain. Keep at 0.5 or lower to avoid clipping on chords.
        #[clap(long, default_value_t = 0.5)]
        gain: f32,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { bank } => {
            // Load against the mock backend: full parse, decode, and note
            // resolution without touching an audio device.
            let backend = audio::get_backend(&Audio::new("mock-verify"))?;
            let mut player = SoundBankPlayer::new(backend, false);
            player.load_sound_bank(&bank)?;

            println!("Sound bank {:?} is valid.", player.bank_name().unwrap_or(""));
            println!("- Assigned notes: {}", player.notes().assigned().len());
            println!("- Sample memory: {}kB", player.memory_usage() / 1024);
        }
        Commands::Play {
            bank,
            device,
            config,
            loop_notes,
            gain,
        } => {
            let audio_config = match config {
                Some(path) => config::parse_audio(path)?,
                None => Audio::new(device.as_deref().unwrap_or("default")),
            };
            let backend = audio::get_backend(&audio_config)?;
            info!(
                backend = %backend,
                sample_rate = backend.sample_rate(),
                "Using audio backend."
            );

            let mut player = SoundBankPlayer::new(backend, loop_notes);
            player.load_sound_bank(&bank)?;
            run_demo(&mut player, gain);
        }
    }

    Ok(())
}

/// Strums through the demo progression, arpeggiating on top of each chord.
/// This doubles as the reconciliation driver: every beat returns finished
/// voices to the pool on this same thread.
fn run_demo(player: &mut SoundBankPlayer, gain: f32) {
    let mut rng = rand::thread_rng();
    let sleeper = spin_sleep::SpinSleeper::default();
    let mut sounding: Vec<u8> = Vec::new();

    for chord in DEMO_CHORDS.iter().cycle().take(8) {
        for &note in *chord {
            player.queue_note(note, gain);
            sounding.push(note);
        }
        player.play_queued();

        for _ in 0..4 {
            sleeper.sleep(DEMO_BEAT);
            player.reconcile();

            // A random chord tone, an octave up.
            let note = chord[rng.gen_range(0..chord.len())].saturating_add(12);
            player.note_on(note, gain * 0.8);
            sounding.push(note);
        }

        sleeper.sleep(DEMO_BEAT);
        player.reconcile();

        // Sustained notes ring until released; decaying notes ignore the
        // release and fade out on their own.
        for note in sounding.drain(..) {
            player.note_off(note);
        }
    }

    // Let the last notes ring out before tearing the voices down.
    sleeper.sleep(DEMO_BEAT * 2);
    player.all_notes_off();
}
