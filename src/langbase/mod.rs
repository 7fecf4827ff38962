//! Langbase Pipes client.
//!
//! Every AI collaborator of the field is a Langbase pipe returning JSON.

mod client;
mod types;

pub use client::LangbaseClient;
pub use types::{
    extract_json_from_completion, CreatePipeRequest, CreatePipeResponse, Message, MessageRole,
    PipeRequest, PipeResponse, RawResponse, Usage,
};
