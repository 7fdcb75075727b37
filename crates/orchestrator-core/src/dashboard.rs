//! Job statistics for the dashboard view.

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::{Job, JobStatus};

/// Number of most recent jobs shown
const RECENT_JOBS: usize = 6;

/// Days covered by the activity series, including today
const ACTIVITY_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub total: usize,
    /// Pending or running
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Jobs created on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayActivity {
    pub date: NaiveDate,
    /// Short weekday name, e.g. "Mon"
    pub label: String,
    pub jobs: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub counts: JobCounts,
    pub recent: Vec<Job>,
    pub activity: Vec<DayActivity>,
}

impl JobCounts {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        jobs.iter().fold(JobCounts::default(), |mut counts, job| {
            counts.total += 1;
            if job.status.is_active() {
                counts.active += 1;
            }
            match job.status {
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                _ => {}
            }
            counts
        })
    }

    /// Completed share of finished (completed + failed) jobs, in percent.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.completed + self.failed;
        if finished == 0 {
            None
        } else {
            Some(self.completed as f64 * 100.0 / finished as f64)
        }
    }
}

impl DashboardStats {
    /// Summarize `jobs` as seen at `now`; days are counted in `now`'s time zone.
    pub fn compute<Tz: TimeZone>(jobs: &[Job], now: &DateTime<Tz>) -> Self {
        let mut recent: Vec<Job> = jobs.to_vec();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(RECENT_JOBS);

        let tz = now.timezone();
        let today = now.date_naive();
        let activity = (0..ACTIVITY_DAYS)
            .rev()
            .map(|days_ago| {
                let date = today - Duration::days(days_ago);
                let day_jobs: Vec<&Job> = jobs
                    .iter()
                    .filter(|job| job.created_at.with_timezone(&tz).date_naive() == date)
                    .collect();
                DayActivity {
                    date,
                    label: date.format("%a").to_string(),
                    jobs: day_jobs.len(),
                    success: day_jobs
                        .iter()
                        .filter(|j| j.status == JobStatus::Completed)
                        .count(),
                    failed: day_jobs
                        .iter()
                        .filter(|j| j.status == JobStatus::Failed)
                        .count(),
                }
            })
            .collect();

        Self {
            counts: JobCounts::from_jobs(jobs),
            recent,
            activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobType;
    use chrono::{TimeZone, Utc};

    fn job(id: i64, status: JobStatus, created: &str) -> Job {
        Job {
            id,
            project: Some("Demo".to_string()),
            job_type: JobType::TextToSpeech,
            status,
            input_url: None,
            input_file: None,
            progress: 0,
            created_by: None,
            meta: None,
            created_at: created.parse().unwrap(),
            has_result: false,
        }
    }

    fn sample() -> Vec<Job> {
        vec![
            job(1, JobStatus::Completed, "2025-03-10T08:00:00Z"),
            job(2, JobStatus::Failed, "2025-03-10T09:00:00Z"),
            job(3, JobStatus::Running, "2025-03-09T10:00:00Z"),
            job(4, JobStatus::Pending, "2025-03-08T10:00:00Z"),
            job(5, JobStatus::Cancelled, "2025-03-01T10:00:00Z"),
            job(6, JobStatus::Completed, "2025-03-04T23:30:00Z"),
            job(7, JobStatus::Completed, "2025-03-05T00:30:00Z"),
        ]
    }

    #[test]
    fn test_counts() {
        let counts = JobCounts::from_jobs(&sample());
        assert_eq!(
            counts,
            JobCounts {
                total: 7,
                active: 2,
                completed: 3,
                failed: 1
            }
        );
        assert_eq!(counts.success_rate(), Some(75.0));
        assert_eq!(JobCounts::default().success_rate(), None);
    }

    #[test]
    fn test_recent_jobs_newest_first() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let stats = DashboardStats::compute(&sample(), &now);
        let ids: Vec<i64> = stats.recent.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 1, 3, 4, 7, 6]);
    }

    #[test]
    fn test_seven_day_activity() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let stats = DashboardStats::compute(&sample(), &now);
        assert_eq!(stats.activity.len(), 7);

        let first = &stats.activity[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
        assert_eq!(first.label, "Tue");
        assert_eq!(first.jobs, 1);

        let today = &stats.activity[6];
        assert_eq!(today.date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!((today.jobs, today.success, today.failed), (2, 1, 1));

        // The job from 2025-03-01 is outside the window
        let in_window: usize = stats.activity.iter().map(|d| d.jobs).sum();
        assert_eq!(in_window, 6);
    }

    #[test]
    fn test_activity_uses_callers_time_zone() {
        let tz = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let stats = DashboardStats::compute(&sample(), &now);
        // 2025-03-04T23:30Z is already March 5th at UTC+2
        let march_5 = stats
            .activity
            .iter()
            .find(|d| d.date == NaiveDate::from_ymd_opt(2025, 3, 5).unwrap())
            .unwrap();
        assert_eq!(march_5.jobs, 2);
        assert_eq!(stats.activity[0].jobs, 0);
    }
}
