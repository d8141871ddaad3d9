//! Sentinel API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Jupiter: reference token prices quoted in SOL

mod jupiter;

pub use jupiter::JupiterPriceClient;
