use thiserror::Error;

/// Failure to turn an identifier string into a [`DecodedRecord`](super::DecodedRecord).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("identifier is not valid base64")]
    InvalidEncoding,
    #[error("identifier decodes to {0} bytes, below the minimum layout size")]
    TooShort(usize),
    #[error("identifier decodes to {0} bytes, beyond any known layout")]
    TooLong(usize),
}

/// Failure to turn an identifier string into a [`Locator`](super::Locator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("identifier carries a zero access hash")]
    InvalidAccessHash,
    #[error("unsupported file type {0}")]
    UnsupportedFileType(u8),
}
