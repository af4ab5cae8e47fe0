use serde::{Serialize, Serializer};
use std::fmt;

use super::decoder::decode;
use super::error::DecodeError;

/// Operator-facing summary of an identifier.
///
/// Produced by [`analyze`], which never fails: a malformed identifier
/// yields [`AnalysisReport::Invalid`] carrying the decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisReport {
    Valid {
        file_type: u8,
        file_type_name: &'static str,
        type_flags_raw: u32,
        dc_id: u32,
        access_hash: u64,
        raw_length: usize,
    },
    Invalid {
        #[serde(serialize_with = "serialize_display")]
        error: DecodeError,
    },
}

impl AnalysisReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, AnalysisReport::Valid { .. })
    }
}

/// Decode `identifier` and summarize the outcome without synthesizing a locator.
pub fn analyze(identifier: &str) -> AnalysisReport {
    match decode(identifier) {
        Ok(record) => AnalysisReport::Valid {
            file_type: record.file_type,
            file_type_name: record.kind().map(|kind| kind.as_str()).unwrap_or("unknown"),
            type_flags_raw: record.type_flags_raw,
            dc_id: record.dc_id,
            access_hash: record.access_hash,
            raw_length: record.raw_len(),
        },
        Err(error) => AnalysisReport::Invalid { error },
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisReport::Valid {
                file_type,
                file_type_name,
                type_flags_raw,
                dc_id,
                access_hash,
                raw_length,
            } => {
                writeln!(f, "File ID is valid")?;
                writeln!(f, "  File type: {} ({})", file_type_name, file_type)?;
                if type_flags_raw & !0b111 != 0 {
                    writeln!(f, "  Flags: {:#010x}", type_flags_raw)?;
                }
                writeln!(f, "  DC ID: {}", dc_id)?;
                writeln!(f, "  Access hash: {}", access_hash)?;
                write!(f, "  Data length: {} bytes", raw_length)
            }
            AnalysisReport::Invalid { error } => write!(f, "File ID is invalid: {}", error),
        }
    }
}

fn serialize_display<S: Serializer>(value: &DecodeError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
