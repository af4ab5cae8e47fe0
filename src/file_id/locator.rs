use std::fmt;
use tracing::debug;

use super::decoder::{decode, DecodedRecord};
use super::error::SynthesisError;

/// Address of a file in the full client protocol.
///
/// `file_reference` is always empty: identifiers of this layout predate
/// file references, so the fetch side has to accept an empty one or fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub id: u64,
    pub access_hash: u64,
    pub file_reference: Vec<u8>,
}

/// Locator accepted by the full protocol's file fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Photo(FileLocation),
    /// Stickers, audio, video and generic documents share one shape.
    Document(FileLocation),
}

impl Locator {
    /// Build a locator from an already decoded record.
    ///
    /// The access hash is checked before the type, so a zero hash is
    /// rejected for every file type.
    pub fn from_record(record: &DecodedRecord) -> Result<Self, SynthesisError> {
        if record.access_hash == 0 {
            return Err(SynthesisError::InvalidAccessHash);
        }

        let kind = record
            .kind()
            .ok_or(SynthesisError::UnsupportedFileType(record.file_type))?;

        let location = FileLocation {
            id: record.primary_id,
            access_hash: record.access_hash,
            file_reference: Vec::new(),
        };

        Ok(if kind.is_photo() {
            Locator::Photo(location)
        } else {
            Locator::Document(location)
        })
    }

    pub fn location(&self) -> &FileLocation {
        match self {
            Locator::Photo(location) | Locator::Document(location) => location,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Locator::Photo(_) => "photo",
            Locator::Document(_) => "document",
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.location();
        write!(
            f,
            "{} locator (id={}, access_hash={})",
            self.variant_name(),
            location.id,
            location.access_hash
        )
    }
}

/// Decode `identifier` and map it to a [`Locator`].
///
/// Failures are deterministic for a given identifier; callers should
/// report them rather than retry.
pub fn synthesize(identifier: &str) -> Result<Locator, SynthesisError> {
    let record = decode(identifier)?;
    let locator = Locator::from_record(&record)?;

    debug!(
        "Synthesized {} locator for {} identifier (dc_id={})",
        locator.variant_name(),
        record.kind().map(|kind| kind.as_str()).unwrap_or("unknown"),
        record.dc_id
    );

    Ok(locator)
}
