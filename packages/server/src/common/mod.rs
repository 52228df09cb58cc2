// Common types and utilities shared across the application

pub mod utils;

pub use utils::{generate_content_hash, job_fingerprint};
