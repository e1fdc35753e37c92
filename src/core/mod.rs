//! Behavior: generation seam, prompt assembly, sampling, expansion, persistence.

pub mod engine;
pub mod events;
pub mod generator;
pub mod premise;
pub mod sampler;
pub mod snapshot;
pub mod transcript;
