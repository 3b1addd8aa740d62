//! Upstream API clients
//!
//! Google Business Profile (accounts, locations, reviews and replies) and the
//! Gemini generative-language endpoint used for review analysis.

pub mod auth;
pub mod client;
pub mod gemini;
pub mod models;
pub mod provider;
pub mod resilience;

pub use client::GoogleBusinessClient;
