//! Business logic services

pub mod artifact_compressor;
pub mod pipeline;
pub mod quantizer;
