//! Event model and normalization.
//!
//! Producers send either a ready-made event or a template code with
//! parameters; [`EventNormalizer`] turns both into a [`NormalizedEvent`].

mod normalizer;
mod types;

pub use normalizer::{EventNormalizer, NormalizeError, MISSING_CODE_MESSAGE};
pub use types::{
    EventLevel, IncomingEvent, NormalizedEvent, MESSAGE_MAX_CHARS, TITLE_MAX_CHARS,
};
