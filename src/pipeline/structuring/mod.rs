pub mod types;
pub mod prompt;
pub mod parser;
pub mod patterns;
pub mod metadata;
pub mod client;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use patterns::*;
pub use metadata::*;
pub use client::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Analysis service is not reachable at {0}")]
    Connection(String),

    #[error("Analysis service returned error (status {status}): {body}")]
    ServiceError { status: u16, body: String },

    #[error("Analysis service is not configured")]
    NotConfigured,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No text to analyze")]
    EmptyInput,
}
