//! Data models for AI Orchestrator backend resources.
//!
//! - `UserProfile`, `UserSummary`: the signed-in user and nested user records
//! - `Project`: a container for jobs
//! - `Job`, `NewJob`, `JobType`, `JobStatus`: submitted AI jobs
//! - `JobResult`: output of a finished job
//! - `Profile`, `Setting`: account role and platform settings
//! - `Page`: list responses, either a bare array or a paginated envelope

pub mod job;
pub mod page;
pub mod profile;
pub mod project;
pub mod user;

pub use job::{Job, JobResult, JobStatus, JobType, NewJob};
pub use page::Page;
pub use profile::{Profile, Setting, SettingValueType, UserRole};
pub use project::Project;
pub use user::{UserProfile, UserSummary};
