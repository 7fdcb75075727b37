//! Core library for the AI Orchestrator client.
//!
//! - `auth`: credential bundle, JWT refresh lifecycle and session persistence
//! - `api`: authenticated request gateway and typed resource calls
//! - `models`: projects, jobs, results, profiles and settings
//! - `dashboard`: job statistics
//! - `config`: backend URL, timeouts and storage selection

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse, Auth};
pub use auth::{RefreshResult, SessionState, SessionStore, Verification};
pub use config::Config;
