//! Generation backends available to the server.
//!
//! - [`ollama`] - Chat completion against a local or remote Ollama server.

pub mod ollama;

pub use ollama::{OllamaBackend, OllamaConfig};
