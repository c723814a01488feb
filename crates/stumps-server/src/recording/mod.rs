//! Recording of request/response exchanges.
//!
//! Module structure:
//! - `types` - Immutable recorded request, response and exchange
//! - `body` - Body snapshot: decoding, classification and MD5 digest
//! - `store` - Bounded, thread-safe list of recordings per server

mod body;
mod store;
mod types;

pub use body::{decode_body, is_text, md5_hex, BodyClassification, RecordedBody};
pub use store::{Recordings, DEFAULT_MAX_RECORDINGS};
pub use types::{RecordedContext, RecordedRequest, RecordedResponse};
