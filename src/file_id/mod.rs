//! Translation of bot-interface file identifiers into full-protocol locators.
//!
//! A bot-interface identifier is an undocumented base64 blob. Decoding it
//! yields the file's identity and access hash, which is enough to address
//! the file directly through the full client protocol and sidestep the bot
//! interface's download ceiling.
//!
//! Everything here is pure computation over the identifier string: no I/O,
//! no shared state, no retries.

mod analysis;
mod decoder;
mod error;
mod kind;
mod locator;


pub use analysis::{analyze, AnalysisReport};
pub use decoder::{decode, DecodedRecord, MAX_DECODED_LEN, MIN_DECODED_LEN};
pub use error::{DecodeError, SynthesisError};
pub use kind::FileKind;
pub use locator::{synthesize, FileLocation, Locator};
