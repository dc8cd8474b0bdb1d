//! Subcommand implementations.
//!
//! Channel state lives in Base64 text files. Every command that moves the
//! stream writes the new state back before it releases any output.

use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
};

use tokenveil_core::{
    Decoded, Decoder, Encoded, Encoder, FlenEncoder, MkeDecoder, MkeEncoder, Status, SystemClock,
    TokenError, b64,
};
use tokenveil_crypto::{EntropyRequest, EntropySource, OsEntropy, wipe::wipe};

use crate::{
    channel::{ChannelArgs, Mode},
    error::CliError,
};

/// Entropy drawn for a new channel when no secret is given.
const PAIR_ENTROPY_BYTES: usize = 48;

/// Nonce drawn for a new channel when none is given.
const PAIR_NONCE_BYTES: usize = 16;

/// Encoder state file written by `pair`.
pub const ENCODER_STATE: &str = "encoder.state";

/// Decoder state file written by `pair`.
pub const DECODER_STATE: &str = "decoder.state";

/// Sending end of a channel, whichever engine it runs.
trait SendEnd {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError>;
    fn save_b64(&self) -> Result<Vec<u8>, TokenError>;
    fn buffer_bytes(&self, payload_len: usize, b64: bool) -> usize;
    fn encode_message(&mut self, payload: &[u8], b64: bool) -> Result<Vec<u8>, TokenError>;
    fn next_sequence(&self) -> u64;
}

/// Receiving end of a channel.
trait ReceiveEnd {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError>;
    fn save_b64(&self) -> Result<Vec<u8>, TokenError>;
    fn buffer_bytes(&self, encoded_len: usize, b64: bool) -> usize;
    fn decode_message(&mut self, encoded: &[u8], b64: bool)
    -> Result<(Vec<u8>, Status), TokenError>;
    fn base_sequence(&self) -> u64;
}

fn collect(
    len: usize,
    save: impl FnOnce(&mut [u8]) -> Result<usize, TokenError>,
) -> Result<Vec<u8>, TokenError> {
    let mut buf = vec![0u8; len];
    let written = save(&mut buf)?;
    buf.truncate(written);
    Ok(buf)
}

fn encoded(
    len: usize,
    encode: impl FnOnce(&mut [u8]) -> Result<Encoded, TokenError>,
) -> Result<Vec<u8>, TokenError> {
    let mut buf = vec![0u8; len];
    let encoded = encode(&mut buf)?;
    Ok(encoded.slice(&buf).to_vec())
}

fn decoded(
    len: usize,
    decode: impl FnOnce(&mut [u8]) -> Result<Decoded, TokenError>,
) -> Result<(Vec<u8>, Status), TokenError> {
    let mut buf = vec![0u8; len];
    let result = decode(&mut buf).map(|d| (d.slice(&buf).to_vec(), d.status));
    wipe(&mut buf);
    result
}

impl SendEnd for Encoder {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.restore_state_b64(saved)
    }

    fn save_b64(&self) -> Result<Vec<u8>, TokenError> {
        collect(self.save_bytes_b64()?, |buf| self.save_state_b64(buf))
    }

    fn buffer_bytes(&self, payload_len: usize, b64: bool) -> usize {
        if b64 {
            self.encode_buffer_bytes_b64(payload_len)
        } else {
            self.encode_buffer_bytes(payload_len)
        }
    }

    fn encode_message(&mut self, payload: &[u8], b64: bool) -> Result<Vec<u8>, TokenError> {
        let len = SendEnd::buffer_bytes(self, payload.len(), b64);
        if b64 {
            encoded(len, |buf| self.encode_b64(&SystemClock, payload, buf))
        } else {
            encoded(len, |buf| self.encode(&SystemClock, payload, buf))
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence()
    }
}

impl SendEnd for FlenEncoder {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.restore_state_b64(saved)
    }

    fn save_b64(&self) -> Result<Vec<u8>, TokenError> {
        collect(self.save_bytes_b64()?, |buf| self.save_state_b64(buf))
    }

    fn buffer_bytes(&self, _payload_len: usize, b64: bool) -> usize {
        if b64 { self.encode_buffer_bytes_b64() } else { self.encode_buffer_bytes() }
    }

    fn encode_message(&mut self, payload: &[u8], b64: bool) -> Result<Vec<u8>, TokenError> {
        let len = SendEnd::buffer_bytes(self, payload.len(), b64);
        if b64 {
            encoded(len, |buf| self.encode_b64(&SystemClock, payload, buf))
        } else {
            encoded(len, |buf| self.encode(&SystemClock, payload, buf))
        }
    }

    fn next_sequence(&self) -> u64 {
        self.inner().sequence()
    }
}

impl SendEnd for MkeEncoder {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.restore_state_b64(saved)
    }

    fn save_b64(&self) -> Result<Vec<u8>, TokenError> {
        collect(self.save_bytes_b64()?, |buf| self.save_state_b64(buf))
    }

    fn buffer_bytes(&self, payload_len: usize, b64: bool) -> usize {
        if b64 {
            self.encode_buffer_bytes_b64(payload_len)
        } else {
            self.encode_buffer_bytes(payload_len)
        }
    }

    fn encode_message(&mut self, payload: &[u8], b64: bool) -> Result<Vec<u8>, TokenError> {
        let len = SendEnd::buffer_bytes(self, payload.len(), b64);
        if b64 {
            encoded(len, |buf| self.encode_b64(&SystemClock, payload, buf))
        } else {
            encoded(len, |buf| self.encode(&SystemClock, payload, buf))
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence()
    }
}

impl ReceiveEnd for Decoder {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.restore_state_b64(saved)
    }

    fn save_b64(&self) -> Result<Vec<u8>, TokenError> {
        collect(self.save_bytes_b64()?, |buf| self.save_state_b64(buf))
    }

    fn buffer_bytes(&self, encoded_len: usize, b64: bool) -> usize {
        if b64 {
            self.decode_buffer_bytes_b64(encoded_len)
        } else {
            self.decode_buffer_bytes(encoded_len)
        }
    }

    fn decode_message(
        &mut self,
        encoded: &[u8],
        b64: bool,
    ) -> Result<(Vec<u8>, Status), TokenError> {
        let len = ReceiveEnd::buffer_bytes(self, encoded.len(), b64);
        if b64 {
            decoded(len, |buf| self.decode_b64(&SystemClock, encoded, buf))
        } else {
            decoded(len, |buf| self.decode(&SystemClock, encoded, buf))
        }
    }

    fn base_sequence(&self) -> u64 {
        Decoder::base_sequence(self)
    }
}

impl ReceiveEnd for MkeDecoder {
    fn restore_b64(&mut self, saved: &[u8]) -> Result<(), TokenError> {
        self.restore_state_b64(saved)
    }

    fn save_b64(&self) -> Result<Vec<u8>, TokenError> {
        collect(self.save_bytes_b64()?, |buf| self.save_state_b64(buf))
    }

    fn buffer_bytes(&self, encoded_len: usize, b64: bool) -> usize {
        if b64 {
            self.decode_buffer_bytes_b64(encoded_len)
        } else {
            self.decode_buffer_bytes(encoded_len)
        }
    }

    fn decode_message(
        &mut self,
        encoded: &[u8],
        b64: bool,
    ) -> Result<(Vec<u8>, Status), TokenError> {
        let len = ReceiveEnd::buffer_bytes(self, encoded.len(), b64);
        if b64 {
            decoded(len, |buf| self.decode_b64(&SystemClock, encoded, buf))
        } else {
            decoded(len, |buf| self.decode(&SystemClock, encoded, buf))
        }
    }

    fn base_sequence(&self) -> u64 {
        MkeDecoder::base_sequence(self)
    }
}

fn sender(channel: &ChannelArgs) -> Result<Box<dyn SendEnd>, TokenError> {
    let config = channel.channel_config();
    Ok(match channel.mode() {
        Mode::Plain => Box::new(Encoder::new(&config)?),
        Mode::Flen(flen) => Box::new(FlenEncoder::new(&config, flen)?),
        Mode::Mke(mke) => Box::new(MkeEncoder::new(&config, mke)?),
    })
}

fn receiver(channel: &ChannelArgs) -> Result<Box<dyn ReceiveEnd>, TokenError> {
    let config = channel.channel_config();
    let options = channel.decoder_options()?;
    Ok(match channel.mode() {
        Mode::Plain | Mode::Flen(_) => Box::new(Decoder::new(&config, options)?),
        Mode::Mke(mke) => Box::new(MkeDecoder::new(&config, options, mke)?),
    })
}

fn os_bytes(len: usize) -> Result<Vec<u8>, CliError> {
    let mut out = vec![0u8; len];
    let request = EntropyRequest { min_entropy: len, min_len: len, max_len: len };
    let written = OsEntropy.fill_entropy(request, &mut out)?;
    out.truncate(written);
    Ok(out)
}

fn read_state(path: &Path) -> Result<Vec<u8>, CliError> {
    let text = fs::read(path).map_err(CliError::file(path))?;
    Ok(text.trim_ascii().to_vec())
}

fn write_state(path: &Path, text: &[u8]) -> Result<(), CliError> {
    let mut contents = Vec::with_capacity(text.len() + 1);
    contents.extend_from_slice(text);
    contents.push(b'\n');
    fs::write(path, contents).map_err(CliError::file(path))
}

fn read_input(input: Option<&Path>) -> Result<Vec<u8>, CliError> {
    match input {
        Some(path) => fs::read(path).map_err(CliError::file(path)),
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf)?;
            Ok(buf)
        },
    }
}

fn write_output(output: Option<&Path>, bytes: &[u8], newline: bool) -> Result<(), CliError> {
    match output {
        Some(path) => {
            let mut file = fs::File::create(path).map_err(CliError::file(path))?;
            file.write_all(bytes).map_err(CliError::file(path))?;
            if newline {
                file.write_all(b"\n").map_err(CliError::file(path))?;
            }
        },
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            if newline {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
        },
    }
    Ok(())
}

/// Seed material for `pair`.
#[derive(Debug, Clone, Default)]
pub struct PairSeed<'a> {
    /// Agreed secret; OS entropy when absent
    pub entropy_hex: Option<&'a str>,
    /// Agreed nonce; OS randomness when absent
    pub nonce_hex: Option<&'a str>,
    /// Personalization string
    pub personalization: &'a str,
}

/// Instantiate both ends of a channel and write their state files into `dir`.
pub fn pair(dir: &Path, seed: &PairSeed<'_>, channel: &ChannelArgs) -> Result<(), CliError> {
    let mut entropy = match seed.entropy_hex {
        Some(text) => hex::decode(text)?,
        None => os_bytes(PAIR_ENTROPY_BYTES)?,
    };
    let nonce = match seed.nonce_hex {
        Some(text) => hex::decode(text)?,
        None => os_bytes(PAIR_NONCE_BYTES)?,
    };

    // Every engine of a channel shares the base state layout
    let config = channel.channel_config();
    let mut encoder = Encoder::new(&config)?;
    let mut decoder = Decoder::new(&config, channel.decoder_options()?)?;
    let personalization = seed.personalization.as_bytes();
    let seeded = encoder
        .instantiate(&mut entropy.as_slice(), &mut nonce.as_slice(), personalization)
        .and_then(|()| {
            decoder.instantiate(&mut entropy.as_slice(), &mut nonce.as_slice(), personalization)
        });
    wipe(&mut entropy);
    seeded?;

    fs::create_dir_all(dir).map_err(CliError::file(dir))?;
    write_state(&dir.join(ENCODER_STATE), &SendEnd::save_b64(&encoder)?)?;
    write_state(&dir.join(DECODER_STATE), &ReceiveEnd::save_b64(&decoder)?)?;
    tracing::info!(dir = %dir.display(), drbg = ?config.drbg, "channel paired");
    Ok(())
}

/// Encode one payload with the encoder state in `state`.
pub fn encode(
    state: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    b64: bool,
    channel: &ChannelArgs,
) -> Result<(), CliError> {
    let mut end = sender(channel)?;
    end.restore_b64(&read_state(state)?)?;
    let payload = read_input(input)?;
    let token = end.encode_message(&payload, b64)?;
    write_state(state, &end.save_b64()?)?;
    write_output(output, &token, b64)?;
    tracing::info!(next_sequence = end.next_sequence(), bytes = token.len(), "encoded");
    Ok(())
}

/// Decode one token with the decoder state in `state`.
///
/// State is written back after every non-catastrophic outcome: rejected
/// tokens leave it unchanged, and a mandatory timestamp failure still
/// advances it.
pub fn decode(
    state: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
    b64: bool,
    channel: &ChannelArgs,
) -> Result<(), CliError> {
    let mut end = receiver(channel)?;
    end.restore_b64(&read_state(state)?)?;
    let raw = read_input(input)?;
    let encoded = if b64 { raw.trim_ascii() } else { raw.as_slice() };

    let result = end.decode_message(encoded, b64);
    if !matches!(&result, Err(err) if err.is_catastrophic()) {
        write_state(state, &end.save_b64()?)?;
    }
    let (mut payload, status) = result.inspect_err(|err| {
        tracing::warn!(error = %err, base = end.base_sequence(), "decode failed");
    })?;

    if status.is_warning() {
        tracing::warn!(?status, base = end.base_sequence(), "decoded with warning");
    } else {
        tracing::info!(base = end.base_sequence(), bytes = payload.len(), "decoded");
    }
    let written = write_output(output, &payload, false);
    wipe(&mut payload);
    written
}

/// Report buffer and state sizes for a payload of `payload_len` bytes.
pub fn sizes(
    payload_len: usize,
    channel: &ChannelArgs,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let send = sender(channel)?;
    let receive = receiver(channel)?;

    let token = send.buffer_bytes(payload_len, false);
    let text = b64::encoded_len(token);
    writeln!(out, "encode_buffer_bytes      {token}")?;
    writeln!(out, "encode_buffer_bytes_b64  {}", send.buffer_bytes(payload_len, true))?;
    writeln!(out, "decode_buffer_bytes      {}", receive.buffer_bytes(token, false))?;
    writeln!(out, "decode_buffer_bytes_b64  {}", receive.buffer_bytes(text, true))?;
    writeln!(out, "encoder_state_buffer_b64 {}", send_state_len(channel)?)?;
    writeln!(out, "decoder_state_buffer_b64 {}", receive_state_len(channel)?)?;
    Ok(())
}

fn send_state_len(channel: &ChannelArgs) -> Result<usize, TokenError> {
    Encoder::new(&channel.channel_config())?.save_bytes_b64()
}

fn receive_state_len(channel: &ChannelArgs) -> Result<usize, TokenError> {
    Decoder::new(&channel.channel_config(), channel.decoder_options()?)?.save_bytes_b64()
}
