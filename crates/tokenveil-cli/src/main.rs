//! Tokenveil command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Create both ends of a channel from OS entropy
//! tokenveil pair --dir ./channel
//!
//! # Encode with the encoder end, decode with the decoder end
//! tokenveil encode --state ./channel/encoder.state -i note.txt -o note.tok
//! tokenveil decode --state ./channel/decoder.state -i note.tok -o note.out
//!
//! # Same, as Base64 text with Managed-Key Encryption
//! tokenveil encode --mke --b64 --state ./channel/encoder.state -i note.txt
//!
//! # Buffer sizes for a 1 KiB payload
//! tokenveil sizes --payload-len 1024
//! ```
//!
//! Channel settings (`--drbg`, `--token-bytes`, `--verifiers`, ...) are not
//! stored in the state files and must match on every invocation.

mod channel;
mod commands;
mod error;

use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    channel::ChannelArgs,
    commands::{DECODER_STATE, ENCODER_STATE, PairSeed},
};

/// Tokenveil channel tool
#[derive(Parser, Debug)]
#[command(name = "tokenveil")]
#[command(about = "Tokenizing message encoder and decoder")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Instantiate both ends of a channel and write their state files
    Pair {
        /// Directory for the state files
        #[arg(long)]
        dir: PathBuf,

        /// Agreed secret entropy in hex (OS entropy if omitted)
        #[arg(long)]
        entropy_hex: Option<String>,

        /// Agreed nonce in hex (OS randomness if omitted)
        #[arg(long)]
        nonce_hex: Option<String>,

        /// Personalization string
        #[arg(long, default_value = "")]
        personalization: String,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Encode one payload
    Encode {
        /// Encoder state file, updated in place
        #[arg(long, default_value = ENCODER_STATE)]
        state: PathBuf,

        /// Payload file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Token file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the token as Base64 text
        #[arg(long)]
        b64: bool,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Decode one token
    Decode {
        /// Decoder state file, updated in place
        #[arg(long, default_value = DECODER_STATE)]
        state: PathBuf,

        /// Token file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Payload file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read the token as Base64 text
        #[arg(long)]
        b64: bool,

        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Print buffer and state sizes
    Sizes {
        /// Payload length in bytes
        #[arg(long, default_value = "0")]
        payload_len: usize,

        #[command(flatten)]
        channel: ChannelArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Logs go to stderr; stdout carries tokens and payloads
    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match args.command {
        Command::Pair { dir, entropy_hex, nonce_hex, personalization, channel } => {
            let seed = PairSeed {
                entropy_hex: entropy_hex.as_deref(),
                nonce_hex: nonce_hex.as_deref(),
                personalization: &personalization,
            };
            commands::pair(&dir, &seed, &channel)?;
        },
        Command::Encode { state, input, output, b64, channel } => {
            commands::encode(&state, input.as_deref(), output.as_deref(), b64, &channel)?;
        },
        Command::Decode { state, input, output, b64, channel } => {
            commands::decode(&state, input.as_deref(), output.as_deref(), b64, &channel)?;
        },
        Command::Sizes { payload_len, channel } => {
            commands::sizes(payload_len, &channel, &mut io::stdout().lock())?;
        },
    }

    Ok(())
}
