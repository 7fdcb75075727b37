//! REST API client module for the AI Orchestrator backend.
//!
//! `ApiClient` is the authenticated request gateway: generic verbs plus
//! typed calls for projects, jobs, job results, profiles and settings.
//!
//! The API uses JWT bearer tokens issued by the `/token/` endpoints; token
//! state lives in `auth::SessionStore`.

pub mod client;
pub mod error;
mod resources;

pub use client::{ApiClient, ApiResponse, Auth};
pub use error::ApiError;
