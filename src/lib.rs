//! Outpost dashboard backend
//!
//! Library behind the `outpost` cache server: a timezone-anchored daily
//! cache, a generative-search content provider client, and the background
//! refresh scheduler that keeps a long-lived process fresh across the day
//! boundary.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod provider;
pub mod refresh;
pub mod server;
