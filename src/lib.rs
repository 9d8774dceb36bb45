//! Shelf ingestion library - shared modules for the pipeline and analysis binaries.

pub mod assets;
pub mod card;
pub mod classify;
pub mod config;
pub mod error;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod safety;
pub mod schedule;
pub mod stats;
pub mod store;
