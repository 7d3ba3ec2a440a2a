//! Vegetable photo analysis service.
//!
//! Photos are dispatched to connected worker peers over WebSocket when worker
//! mode is on, fall back to a direct call to an OpenAI-compatible vision
//! endpoint, and degrade to a fixed answer when neither is available. Model
//! output of any shape is normalized into an [`models::verdict::AnalysisVerdict`].

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
