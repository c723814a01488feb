//! HTTP exchange model shared by the pipeline, the recorder and the server.
//!
//! Module structure:
//! - `headers` - Case-insensitive header collection
//! - `status` - Status codes and standard descriptions used by the handlers
//! - `context` - Request, response and the per-exchange context

mod context;
mod headers;
mod status;

pub use context::{ResponseOrigin, StumpsHttpContext, StumpsHttpRequest, StumpsHttpResponse};
pub use headers::HttpHeaders;
pub use status::{status_description, HttpStatus};
