//! Gadfly: a dependent query cache and command-line client for the
//! meeting-summary API.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
