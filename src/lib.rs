//! Stem Separator Service
//!
//! Runs audio source separation (Demucs, Open-Unmix) as tracked background
//! jobs. A job is submitted over HTTP, the separation process runs without
//! blocking the request, and clients poll the job status, subscribe to its
//! state changes, or download the separated stems once it completes.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
