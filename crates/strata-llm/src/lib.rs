//! # strata-llm
//!
//! The compression-provider boundary for the Strata engine.
//!
//! The engine consumes exactly one capability from a language model: rewrite
//! a block of raw conversation text into a substantially shorter form. This
//! crate defines that boundary:
//!
//! - [`Compressor`]: the async trait the engine is generic over
//! - [`CompressorError`]: the error taxonomy with a retryable split
//! - [`COMPRESSION_INSTRUCTION`]: the fixed instruction sent with every call
//! - [`HttpCompressor`]: a non-streaming client for OpenAI-compatible
//!   chat-completions endpoints with Bearer auth

#![deny(unsafe_code)]

pub mod compressor;
pub mod http;

pub use compressor::{COMPRESSION_INSTRUCTION, Compressor, CompressorError, CompressorResult};
pub use http::{HttpCompressor, HttpCompressorConfig};
