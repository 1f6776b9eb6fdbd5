//! ocifit CLI - compatibility specs for container images.

pub mod commands;
pub mod output;
