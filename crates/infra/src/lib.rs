//! Infrastructure layer: job stores, shell execution and background workers.

pub mod jobs;
pub mod workers;
