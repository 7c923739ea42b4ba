//! Crawlwatch Core
//!
//! Core types shared by the crawlwatch client, synchronization layer and CLI.
//!
//! This crate contains:
//! - Domain types: jobs, statuses, progress and the synchronized job state
//! - DTOs: wire messages from the scraping backend and their normalization

pub mod domain;
pub mod dto;
