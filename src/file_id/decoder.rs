use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use tracing::debug;

use super::error::DecodeError;
use super::kind::FileKind;

/// Smallest decoded buffer that can hold the fixed part of the layout.
pub const MIN_DECODED_LEN: usize = 20;

/// Upper bound on the decoded buffer. Known identifiers are far below this;
/// anything larger means the layout has drifted and must not be misread.
pub const MAX_DECODED_LEN: usize = 1024;

const TYPE_MASK: u32 = 0b111;

const FLAGS_OFFSET: usize = 0;
const DC_ID_OFFSET: usize = 4;
const PRIMARY_ID_OFFSET: usize = 8;
const SECONDARY_ID_OFFSET: usize = 16;
const ACCESS_HASH_OFFSET: usize = 24;

// Identifiers come from lenient encoders: the last symbol may carry
// non-zero trailing bits.
const IDENTIFIER_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Fields extracted from a bot-interface file identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Low three bits of `type_flags_raw`.
    pub file_type: u8,
    /// Full leading field. Bits above the discriminant are unused today
    /// but kept so newer identifiers can be inspected.
    pub type_flags_raw: u32,
    pub dc_id: u32,
    pub primary_id: u64,
    /// Zero when the payload is too short to carry a second id.
    pub secondary_id: u64,
    /// Zero means "absent"; it never authorizes a fetch.
    pub access_hash: u64,
    pub raw_bytes: Vec<u8>,
}

impl DecodedRecord {
    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_discriminant(self.file_type)
    }

    /// Flag bits above the type discriminant.
    pub fn extra_flags(&self) -> u32 {
        self.type_flags_raw & !TYPE_MASK
    }

    pub fn raw_len(&self) -> usize {
        self.raw_bytes.len()
    }
}

/// Decode a bot-interface file identifier.
///
/// Missing `=` padding is restored before decoding. All fields are
/// little-endian.
///
/// # Errors
///
/// - [`DecodeError::InvalidEncoding`] if the string is not URL-safe base64
/// - [`DecodeError::TooShort`] if fewer than [`MIN_DECODED_LEN`] bytes decode
/// - [`DecodeError::TooLong`] if more than [`MAX_DECODED_LEN`] bytes decode
pub fn decode(identifier: &str) -> Result<DecodedRecord, DecodeError> {
    let trimmed = identifier.trim();

    let mut padded = String::with_capacity(trimmed.len() + 3);
    padded.push_str(trimmed);
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let raw_bytes = IDENTIFIER_ENGINE
        .decode(padded.as_bytes())
        .map_err(|_| DecodeError::InvalidEncoding)?;

    let len = raw_bytes.len();
    if len < MIN_DECODED_LEN {
        return Err(DecodeError::TooShort(len));
    }
    if len > MAX_DECODED_LEN {
        return Err(DecodeError::TooLong(len));
    }

    let type_flags_raw = read_u32(&raw_bytes, FLAGS_OFFSET).ok_or(DecodeError::TooShort(len))?;
    let dc_id = read_u32(&raw_bytes, DC_ID_OFFSET).ok_or(DecodeError::TooShort(len))?;
    let primary_id =
        read_u64(&raw_bytes, PRIMARY_ID_OFFSET).ok_or(DecodeError::TooShort(len))?;
    let secondary_id = read_u64(&raw_bytes, SECONDARY_ID_OFFSET).unwrap_or(0);
    let access_hash = read_access_hash(raw_bytes.get(ACCESS_HASH_OFFSET..).unwrap_or(&[]));

    let file_type = (type_flags_raw & TYPE_MASK) as u8;

    debug!(
        "Decoded file identifier: type={} dc_id={} access_hash={} ({} bytes)",
        file_type, dc_id, access_hash, len
    );

    Ok(DecodedRecord {
        file_type,
        type_flags_raw,
        dc_id,
        primary_id,
        secondary_id,
        access_hash,
        raw_bytes,
    })
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(chunk.try_into().ok()?))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let chunk = bytes.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(chunk.try_into().ok()?))
}

/// First eight bytes of the region, zero-extended when shorter.
fn read_access_hash(region: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = region.len().min(buf.len());
    buf[..n].copy_from_slice(&region[..n]);
    u64::from_le_bytes(buf)
}
