pub mod http;
pub mod range;

pub use http::{create_router, AppState};
