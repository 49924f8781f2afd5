//! Mastery backend: milestone progression, mini-course generation, formative gating,
//! mastery debates and academic-freeze scaffolding for assignment learning plans.
//!
//! The binary (`main.rs`) serves this over HTTP + WebSocket; everything with state or
//! rules lives here so it can be driven without a UI.

pub mod config;
pub mod debate;
pub mod domain;
pub mod error;
pub mod gate;
pub mod generator;
pub mod mastery;
pub mod minicourse;
pub mod openai;
pub mod protocol;
pub mod roadmap;
pub mod routes;
pub mod scaffolding;
pub mod seeds;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

pub use error::{CoreError, Result};
pub use state::AppState;
