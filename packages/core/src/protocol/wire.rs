// Wire format
//
// Envelope:        [version: u8][mode: u8][epoch: u32 BE][sealed]
// Sealed (direct): AEAD(step key, frame)
// Sealed (managed):AEAD(step key, message key) || AEAD(message key, frame)
// Plaintext frame: [len: u32 BE][payload][zero padding up to fixed length]
//
// Порядковый номер шага не передаётся: он входит в associated data,
// поэтому сообщение открывается только ключами ожидаемого шага.
// Epoch передаётся открыто, чтобы пир узнал о перезапуске обмена.

use crate::status::StatusCode;
use zeroize::Zeroizing;

pub const WIRE_VERSION: u8 = 1;

/// Largest fixed frame body a session may be configured with.
pub const MAX_FIXED_LENGTH: usize = 1 << 20;

const LEN_PREFIX: usize = 4;
const HEADER_LEN: usize = 1 + 1 + 4;
const AAD_DOMAIN: &[u8] = b"sealchannel";

/// How the sealed part of an envelope is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Frame sealed directly under the step key.
    Direct,
    /// Frame sealed under a one-time message key, which is sealed under the step key.
    ManagedKey,
}

impl FrameMode {
    fn to_byte(self) -> u8 {
        match self {
            FrameMode::Direct => 0,
            FrameMode::ManagedKey => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FrameMode::Direct),
            1 => Some(FrameMode::ManagedKey),
            _ => None,
        }
    }
}

/// Parsed envelope header plus a view of the sealed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub mode: FrameMode,
    pub epoch: u32,
    pub sealed: &'a [u8],
}

/// Wrap a plaintext into a length-prefixed frame.
///
/// With `fixed_length`, the frame is padded so that every message of the
/// session has the same size; a longer plaintext, or a limit above
/// [`MAX_FIXED_LENGTH`], is refused.
pub fn frame_plaintext(
    plaintext: &[u8],
    fixed_length: Option<usize>,
) -> Result<Zeroizing<Vec<u8>>, StatusCode> {
    let len = u32::try_from(plaintext.len()).map_err(|_| StatusCode::BufferTooSmall)?;
    let body_len = match fixed_length {
        Some(limit) if limit > MAX_FIXED_LENGTH || plaintext.len() > limit => {
            return Err(StatusCode::BufferTooSmall)
        }
        Some(limit) => limit,
        None => plaintext.len(),
    };
    let frame_len = LEN_PREFIX
        .checked_add(body_len)
        .ok_or(StatusCode::BufferTooSmall)?;

    let mut frame = Zeroizing::new(Vec::with_capacity(frame_len));
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(plaintext);
    frame.resize(frame_len, 0);
    Ok(frame)
}

/// Extract the payload from a frame produced by [`frame_plaintext`].
pub fn unframe_plaintext(frame: &[u8]) -> Result<Vec<u8>, StatusCode> {
    if frame.len() < LEN_PREFIX {
        return Err(StatusCode::InvalidEncoding);
    }
    let (prefix, body) = frame.split_at(LEN_PREFIX);
    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(prefix);
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > body.len() {
        return Err(StatusCode::InvalidEncoding);
    }
    Ok(body[..len].to_vec())
}

/// Prefix sealed bytes with the envelope header.
pub fn pack_envelope(mode: FrameMode, epoch: u32, sealed: &[u8]) -> Vec<u8> {
    let mut envelope = Vec::with_capacity(HEADER_LEN + sealed.len());
    envelope.push(WIRE_VERSION);
    envelope.push(mode.to_byte());
    envelope.extend_from_slice(&epoch.to_be_bytes());
    envelope.extend_from_slice(sealed);
    envelope
}

/// Validate the envelope header and return it with the sealed part.
///
/// `overhead` is the backend's seal overhead and `key_len` its key size;
/// anything shorter than a sealed empty frame (plus a wrapped key in managed
/// mode) cannot be genuine.
pub fn unpack_envelope(data: &[u8], overhead: usize, key_len: usize) -> Result<Envelope<'_>, StatusCode> {
    if data.len() < HEADER_LEN || data[0] != WIRE_VERSION {
        return Err(StatusCode::InvalidEncoding);
    }
    let mode = FrameMode::from_byte(data[1]).ok_or(StatusCode::InvalidEncoding)?;
    let mut epoch_bytes = [0u8; 4];
    epoch_bytes.copy_from_slice(&data[2..HEADER_LEN]);
    let sealed = &data[HEADER_LEN..];

    let min_sealed = match mode {
        FrameMode::Direct => LEN_PREFIX + overhead,
        FrameMode::ManagedKey => wrapped_key_len(key_len, overhead) + LEN_PREFIX + overhead,
    };
    if sealed.len() < min_sealed {
        return Err(StatusCode::InvalidEncoding);
    }

    Ok(Envelope {
        mode,
        epoch: u32::from_be_bytes(epoch_bytes),
        sealed,
    })
}

/// Epoch of an envelope, without any other validation.
pub fn peek_epoch(data: &[u8]) -> Option<u32> {
    match data.get(..HEADER_LEN) {
        Some([WIRE_VERSION, _, a, b, c, d]) => Some(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Length of a message key once sealed under the step key.
pub fn wrapped_key_len(key_len: usize, overhead: usize) -> usize {
    key_len + overhead
}

/// Associated data for one step: domain || version || mode || epoch || identifier || step.
pub fn associated_data(identifier: &str, epoch: u32, mode: FrameMode, step: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_DOMAIN.len() + 2 + 4 + 2 + identifier.len() + 8);
    aad.extend_from_slice(AAD_DOMAIN);
    aad.push(WIRE_VERSION);
    aad.push(mode.to_byte());
    aad.extend_from_slice(&epoch.to_be_bytes());
    aad.extend_from_slice(&(identifier.len() as u16).to_be_bytes());
    aad.extend_from_slice(identifier.as_bytes());
    aad.extend_from_slice(&step.to_be_bytes());
    aad
}
