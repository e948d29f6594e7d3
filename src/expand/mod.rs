//! Streamed explanation requests: cancellation, decoding, prefetch and the
//! service that ties them to the slide cache

mod backend;
mod cancel;
mod decoder;
mod prefetch;
mod request;
mod service;
mod state;
mod stream;

pub use backend::{ExpansionBackend, HttpBackend};
pub use cancel::CancelScope;
pub use decoder::{DecodeError, Utf8Decoder};
pub use prefetch::{DEFAULT_LOOKAHEAD, InFlight, PrefetchBatch};
pub use request::{ExpandRequest, GenerationEvent, GenerationPreferences, RequestId, RequestKind};
pub use service::{
    DisplayState, ERROR_DOCUMENT, ExpansionConfig, ExpansionService, NavigationError,
    NavigationOutcome, Update,
};
pub use state::{Command, Effect, ExpansionState, RequestState};
pub use stream::{ByteStream, StreamError, consume_stream, fragments};
