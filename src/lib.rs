//! Legato Server Library
//!
//! Turns ABC notation into rendered audio over HTTP. The library exposes the
//! internal modules for the binary and the end-to-end tests.

pub mod config;
pub mod server;
pub mod synthesis;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use synthesis::{AudioFormat, PipelineError, SynthesisPipeline, Synthesizer};
