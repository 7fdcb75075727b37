//! Typed calls for the backend resource endpoints.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::client::{ApiClient, Auth};
use super::ApiError;
use crate::models::{Job, JobResult, JobStatus, NewJob, Page, Profile, Project, Setting};

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 50;

const TEST_PATH: &str = "/test/";
const PROJECTS_PATH: &str = "/projects/";
const JOBS_PATH: &str = "/jobs/";
const JOB_RESULTS_PATH: &str = "/job-results/";
const PROFILES_PATH: &str = "/profiles/";
const SETTINGS_PATH: &str = "/settings/";

impl ApiClient {
    /// Public connectivity check; needs no session.
    pub async fn test_connection(&self) -> Result<Value, ApiError> {
        let response = self.get(TEST_PATH, Auth::Public).await?;
        Ok(response.into_value().unwrap_or(Value::Null))
    }

    /// Fetch every item of a listing, following `next` links.
    pub async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        let mut pages = 0;

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(&url).await?;
            pages += 1;
            next = page.next.as_deref().map(|link| self.page_link(link)).transpose()?;
            items.extend(page.into_vec());

            if pages >= MAX_PAGES {
                if next.is_some() {
                    warn!(path, pages, "Stopping pagination at page limit");
                }
                break;
            }
        }

        debug!(path, pages, count = items.len(), "Fetched listing");
        Ok(items)
    }

    /// Reduce a `next` link to a path under the backend base URL.
    ///
    /// Bearer tokens only go to the configured backend, so an absolute link
    /// naming anywhere else is refused.
    fn page_link(&self, link: &str) -> Result<String, ApiError> {
        if !(link.starts_with("http://") || link.starts_with("https://")) {
            return Ok(link.to_string());
        }
        match link.strip_prefix(self.base_url()) {
            Some(rest) if rest.starts_with('/') => Ok(rest.to_string()),
            _ => {
                warn!(link, base_url = self.base_url(), "Pagination link leaves the backend");
                Err(ApiError::InvalidRequest(format!(
                    "pagination link {} is outside {}",
                    link,
                    self.base_url()
                )))
            }
        }
    }

    // ===== Projects =====

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.fetch_all(PROJECTS_PATH).await
    }

    // ===== Jobs =====

    pub async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.fetch_all(JOBS_PATH).await
    }

    pub async fn get_job(&self, id: i64) -> Result<Job, ApiError> {
        self.get_json(&format!("{}{}/", JOBS_PATH, id)).await
    }

    /// Submit a job. The payload is validated before it is sent.
    pub async fn create_job(&self, job: &NewJob) -> Result<Job, ApiError> {
        job.validate().map_err(ApiError::InvalidRequest)?;
        let created: Job = self.post_json(JOBS_PATH, job).await?;
        debug!(job_id = created.id, job_type = %created.job_type, "Job submitted");
        Ok(created)
    }

    pub async fn update_job_progress(&self, id: i64, progress: u8) -> Result<Job, ApiError> {
        if progress > crate::models::job::MAX_PROGRESS {
            return Err(ApiError::InvalidRequest(format!(
                "Progress must be between 0 and 100 (got {})",
                progress
            )));
        }
        self.patch_json(&format!("{}{}/", JOBS_PATH, id), &json!({ "progress": progress }))
            .await
    }

    pub async fn cancel_job(&self, id: i64) -> Result<Job, ApiError> {
        self.patch_json(
            &format!("{}{}/", JOBS_PATH, id),
            &json!({ "status": JobStatus::Cancelled }),
        )
        .await
    }

    pub async fn delete_job(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("{}{}/", JOBS_PATH, id), Auth::Required)
            .await?;
        Ok(())
    }

    // ===== Results, profiles, settings =====

    pub async fn list_job_results(&self) -> Result<Vec<JobResult>, ApiError> {
        self.fetch_all(JOB_RESULTS_PATH).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ApiError> {
        self.fetch_all(PROFILES_PATH).await
    }

    pub async fn list_settings(&self) -> Result<Vec<Setting>, ApiError> {
        self.fetch_all(SETTINGS_PATH).await
    }

    /// Create a setting, or update it in place when it already has an id.
    pub async fn save_setting(&self, setting: &Setting) -> Result<Setting, ApiError> {
        match setting.id {
            Some(id) => {
                self.patch_json(&format!("{}{}/", SETTINGS_PATH, id), setting)
                    .await
            }
            None => self.post_json(SETTINGS_PATH, setting).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use crate::config::Config;

    fn client() -> ApiClient {
        let config = Config {
            api_url: "http://127.0.0.1:8000/api".to_string(),
            ..Config::default()
        };
        ApiClient::new(&config, Box::new(MemoryStorage::new())).unwrap()
    }

    #[test]
    fn test_page_link_stays_on_backend() {
        let api = client();
        assert_eq!(
            api.page_link("http://127.0.0.1:8000/api/jobs/?page=2").unwrap(),
            "/jobs/?page=2"
        );
        assert_eq!(api.page_link("/jobs/?page=3").unwrap(), "/jobs/?page=3");

        for foreign in [
            "http://evil.example.com/api/jobs/?page=2",
            "http://127.0.0.1:80001/api/jobs/?page=2",
            "http://127.0.0.1:8000/apix/jobs/",
            "https://127.0.0.1:8000/api/jobs/?page=2",
        ] {
            assert!(
                matches!(api.page_link(foreign), Err(ApiError::InvalidRequest(_))),
                "followed {}",
                foreign
            );
        }
    }
}
