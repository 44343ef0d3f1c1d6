//! Agent wiring: configuration, the evaluation pipeline, the admin API
//! and its CLI client.

pub mod api;
pub mod client;
pub mod config;
pub mod runtime;

#[cfg(test)]
mod tests;
