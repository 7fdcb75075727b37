use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde_json::Value;
use tracing::{info, warn};

use orchestrator_core::auth::CredentialStore;
use orchestrator_core::dashboard::DashboardStats;
use orchestrator_core::models::{JobStatus, NewJob};
use orchestrator_core::{ApiClient, ApiError, Config, SessionState};

use crate::format::{bar, format_optional, format_timestamp, progress_bar, truncate_string};
use crate::Command;

pub async fn run(
    command: Command,
    api: &ApiClient,
    config: &mut Config,
    config_path: &Path,
) -> Result<()> {
    match command {
        Command::Login { username, remember } => {
            login(api, config, config_path, username, remember).await
        }
        Command::Logout { forget } => logout(api, config, forget),
        Command::Whoami => whoami(api),
        Command::Status => status(api).await,
        Command::Ping => {
            let reply = api.test_connection().await?;
            println!("Backend at {} is up", api.base_url());
            if let Some(message) = reply.get("message").and_then(Value::as_str) {
                println!("  {}", message);
            }
            Ok(())
        }
        Command::Projects => projects(api).await,
        Command::Jobs { status, limit } => jobs(api, status, limit).await,
        Command::Job { id } => job(api, id).await,
        Command::Results => results(api).await,
        Command::Submit {
            project,
            job_type,
            input_url,
            meta,
        } => {
            let mut new_job = NewJob::new(project, job_type);
            if let Some(url) = input_url {
                new_job = new_job.with_input_url(url);
            }
            for (key, raw) in meta {
                new_job = new_job.with_meta(key, meta_value(&raw));
            }
            if let Some(role) = api.session().user_profile().and_then(|u| u.role) {
                if !role.can_submit_jobs() {
                    warn!(%role, "Submitting a job with a read-only role");
                }
            }
            let created = api.create_job(&new_job).await?;
            println!(
                "Submitted job #{} ({}) in {}",
                created.id,
                created.job_type,
                created.project_name()
            );
            Ok(())
        }
        Command::Cancel { id } => {
            let job = api.cancel_job(id).await?;
            println!("Job #{} is now {}", job.id, job.status);
            Ok(())
        }
        Command::Delete { id } => {
            api.delete_job(id).await?;
            println!("Deleted job #{}", id);
            Ok(())
        }
        Command::Dashboard => dashboard(api).await,
    }
}

/// Values that parse as JSON (numbers, booleans, arrays) are sent typed.
fn meta_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_string() => value,
        _ => Value::String(raw.to_string()),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("{} is required", label.trim_end_matches(": "));
    }
    Ok(value)
}

async fn login(
    api: &ApiClient,
    config: &mut Config,
    config_path: &Path,
    username: Option<String>,
    remember: bool,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username or e-mail: ")?,
    };

    let remembered = CredentialStore::get_password(&username).unwrap_or_else(|e| {
        warn!(error = %e, "Keychain unavailable");
        None
    });
    let used_remembered = remembered.is_some();
    let password = match remembered {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    let user = match api.session().login(&username, &password).await {
        Ok(user) => user,
        Err(ApiError::InvalidCredentials) if used_remembered => {
            CredentialStore::delete(&username)?;
            bail!("The remembered password was rejected and has been forgotten. Run `orchestrator login` again.");
        }
        Err(e) => return Err(e.into()),
    };

    if remember {
        CredentialStore::store(&username, &password)?;
        info!(username = %username, "Password remembered");
    }
    config.last_username = Some(username.clone());
    config
        .save_to(config_path)
        .with_context(|| format!("Failed to save {}", config_path.display()))?;

    match user {
        Some(user) => println!("Logged in as {}", user.display_name()),
        None => println!("Logged in as {}", username),
    }
    Ok(())
}

fn logout(api: &ApiClient, config: &Config, forget: bool) -> Result<()> {
    api.session().logout()?;
    if forget {
        if let Some(ref username) = config.last_username {
            CredentialStore::delete(username)?;
        }
    }
    println!("Logged out");
    Ok(())
}

fn whoami(api: &ApiClient) -> Result<()> {
    if !api.session().has_session() {
        println!("Not logged in");
        return Ok(());
    }
    match api.session().user_profile() {
        Some(user) => {
            println!("{} ({})", user.display_name(), user.username);
            println!("  Email: {}", format_optional(user.email.as_deref(), "-"));
            if let Some(role) = user.role {
                println!("  Role:  {}", role);
            }
        }
        None => println!("Logged in (no user profile stored)"),
    }
    Ok(())
}

async fn status(api: &ApiClient) -> Result<()> {
    let session = api.session();
    println!("Backend: {}", api.base_url());
    if session.state() == SessionState::NoSession {
        println!("Session: {}", SessionState::NoSession);
        return Ok(());
    }

    let verification = session.verify_access_token().await;
    match (verification.valid, session.state()) {
        (true, state) => println!("Session: {} (access token valid)", state),
        (false, SessionState::Expired) => {
            println!("Session: Expired (will refresh on the next request)")
        }
        (false, state) => println!("Session: {} (could not verify with the backend)", state),
    }
    Ok(())
}

async fn projects(api: &ApiClient) -> Result<()> {
    let projects = api.list_projects().await?;
    if projects.is_empty() {
        println!("No projects");
        return Ok(());
    }
    println!(
        "{:<6} {:<32} {:<16} {:>5}  {}",
        "ID", "NAME", "OWNER", "JOBS", "CREATED"
    );
    for project in &projects {
        println!(
            "{:<6} {:<32} {:<16} {:>5}  {}",
            project.id,
            truncate_string(&project.name, 32),
            truncate_string(project.owner_name(), 16),
            project.jobs_count,
            format_timestamp(&project.created_at)
        );
    }
    Ok(())
}

async fn jobs(api: &ApiClient, status: Option<String>, limit: usize) -> Result<()> {
    let filter = status.map(|s| JobStatus::from(s.trim().to_ascii_lowercase()));
    let mut jobs = api.list_jobs().await?;
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let shown: Vec<_> = jobs
        .iter()
        .filter(|job| filter.as_ref().map_or(true, |f| &job.status == f))
        .take(limit)
        .collect();

    if shown.is_empty() {
        println!("No jobs");
        return Ok(());
    }
    println!(
        "{:<6} {:<18} {:<10} {:<17} {:<24} {}",
        "ID", "TYPE", "STATUS", "PROGRESS", "PROJECT", "CREATED"
    );
    for job in shown {
        println!(
            "{:<6} {:<18} {:<10} {:<17} {:<24} {}",
            job.id,
            truncate_string(job.job_type.label(), 18),
            job.status.to_string(),
            progress_bar(job.progress, 10),
            truncate_string(job.project_name(), 24),
            format_timestamp(&job.created_at)
        );
    }
    Ok(())
}

async fn job(api: &ApiClient, id: i64) -> Result<()> {
    let job = api.get_job(id).await?;
    println!("Job #{}", job.id);
    println!("  Type:     {}", job.job_type);
    println!("  Status:   {}", job.status);
    println!("  Progress: {}", progress_bar(job.progress, 20));
    println!("  Project:  {}", job.project_name());
    println!(
        "  Input:    {}",
        format_optional(job.input_file.as_deref().or(job.input_url.as_deref()), "-")
    );
    if let Some(ref creator) = job.created_by {
        println!("  By:       {}", creator.username);
    }
    println!("  Created:  {}", format_timestamp(&job.created_at));
    println!("  Result:   {}", if job.has_result { "yes" } else { "no" });
    if let Some(meta) = job.meta.as_ref().filter(|m| !m.is_null()) {
        println!("  Meta:     {}", serde_json::to_string_pretty(meta)?);
    }
    Ok(())
}

async fn results(api: &ApiClient) -> Result<()> {
    let results = api.list_job_results().await?;
    if results.is_empty() {
        println!("No results");
        return Ok(());
    }
    println!(
        "{:<6} {:<28} {:<18} {:<10} {}",
        "ID", "JOB", "FINISHED", "STATUS", "OUTPUT"
    );
    for result in &results {
        println!(
            "{:<6} {:<28} {:<18} {:<10} {}",
            result.id,
            truncate_string(&format_optional(result.job.as_deref(), "-"), 28),
            format_timestamp(&result.finished_at),
            result
                .job_status
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            format_optional(result.output_location(), "-")
        );
    }
    Ok(())
}

async fn dashboard(api: &ApiClient) -> Result<()> {
    let (jobs, projects) = tokio::try_join!(api.list_jobs(), api.list_projects())?;
    let stats = DashboardStats::compute(&jobs, &Local::now());

    println!("Projects:  {}", projects.len());
    println!("Jobs:      {}", stats.counts.total);
    println!("  Active:    {}", stats.counts.active);
    println!("  Completed: {}", stats.counts.completed);
    println!("  Failed:    {}", stats.counts.failed);
    match stats.counts.success_rate() {
        Some(rate) => println!("  Success:   {:.1}%", rate),
        None => println!("  Success:   -"),
    }

    println!();
    println!("Last 7 days");
    let busiest = stats.activity.iter().map(|d| d.jobs).max().unwrap_or(0);
    for day in &stats.activity {
        println!(
            "  {} {:>3} {}",
            day.label,
            day.jobs,
            bar(day.jobs, busiest, 30)
        );
    }

    if !stats.recent.is_empty() {
        println!();
        println!("Recent jobs");
        for job in &stats.recent {
            println!(
                "  #{:<5} {:<18} {:<10} {}",
                job.id,
                truncate_string(job.job_type.label(), 18),
                job.status.to_string(),
                format_timestamp(&job.created_at)
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_meta_value_keeps_types() {
        assert_eq!(meta_value("es"), json!("es"));
        assert_eq!(meta_value("42"), json!(42));
        assert_eq!(meta_value("true"), json!(true));
        assert_eq!(meta_value(r#"["a","b"]"#), json!(["a", "b"]));
        // A quoted value is kept verbatim
        assert_eq!(meta_value(r#""quoted""#), json!(r#""quoted""#));
    }
}
