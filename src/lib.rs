//! EOAcquire - Earth observation scene acquisition and cataloguing system.
//!
//! Automates discovery, download, ARD (analysis-ready-data) conversion and
//! cataloguing of satellite scenes into a per-sensor relational catalogue,
//! with optional hand-off into an external spatial data cube.
//!
//! The core of the crate is the scene lifecycle state tracker: one row per
//! discovered scene, recording progress through a fixed pipeline
//! (queried, downloaded, ARD-processed, quicklooked/tile-cached,
//! datacube-loaded, plugin-analyzed) with idempotent, resumable,
//! multi-worker-safe transitions.

pub mod adapters;
pub mod archive;
pub mod cli;
pub mod config;
pub mod migrations;
pub mod models;
pub mod plugins;
pub mod repository;
pub mod schema;
pub mod sensors;
pub mod services;
