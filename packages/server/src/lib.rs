// Webpage Summarizer - API Core
//
// This crate provides the backend API for asynchronous webpage summarization.
// Large inputs are chunked, summarized per chunk with resumable persisted
// state, and aggregated into a final artifact; clients submit and poll with
// the same idempotent request.

pub mod common;
pub mod config;
pub mod kernel;
pub mod server;
pub mod summarize;
pub mod testing;

pub use config::*;
