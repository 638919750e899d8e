//! Model adapters and provider response handling.

pub mod http;
pub mod response;

pub use http::HttpModel;
pub use response::completion_text;
