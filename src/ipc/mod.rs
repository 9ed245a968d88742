mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::bad_json;
pub use helpers::flush_writes;
pub use router::handle_request;
pub use types::{AppState, Request};
