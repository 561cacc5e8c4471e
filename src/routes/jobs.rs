use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{dsl::count_star, pg::Pg, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Application, Job, Milestone, NewJob, NewMilestone, User},
    schema::{applications, jobs, milestones},
    state::AppState,
    status::{JobStatus, MilestoneStatus},
    utils::pagination::{PageQuery, Paginated},
};

use super::applications::{to_application_response, ApplicationResponse};
use super::milestones::{load_milestones_for_jobs, MilestoneResponse};
use super::users::{load_users, to_iso, UserSummary};

#[derive(Deserialize)]
pub struct JobListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(flatten)]
    pub page: PageQuery,
}

#[derive(Deserialize)]
pub struct CreateMilestoneRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub category: Option<String>,
    pub milestones: Option<Vec<CreateMilestoneRequest>>,
}

#[derive(Deserialize)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
    pub category: Option<String>,
    pub status: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = jobs)]
struct JobChangeset<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    budget: Option<f64>,
    category: Option<&'a str>,
    status: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub category: String,
    pub status: String,
    pub client_id: Uuid,
    pub freelancer_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freelancer: Option<UserSummary>,
    pub milestones: Vec<MilestoneResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applications: Option<Vec<ApplicationResponse>>,
}

fn to_job_response(
    job: Job,
    milestones: Vec<Milestone>,
    users: &HashMap<Uuid, User>,
) -> JobResponse {
    JobResponse {
        client: users.get(&job.client_id).map(UserSummary::from_user),
        freelancer: job
            .freelancer_id
            .and_then(|id| users.get(&id))
            .map(UserSummary::from_user),
        id: job.id,
        title: job.title,
        description: job.description,
        budget: job.budget,
        category: job.category,
        status: job.status,
        client_id: job.client_id,
        freelancer_id: job.freelancer_id,
        created_at: to_iso(job.created_at),
        updated_at: to_iso(job.updated_at),
        milestones: milestones.into_iter().map(MilestoneResponse::from).collect(),
        application_count: None,
        applications: None,
    }
}

/// Escapes `LIKE` metacharacters so user input matches literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

struct JobFilters {
    category: Option<String>,
    status: Option<JobStatus>,
    pattern: Option<String>,
}

impl JobFilters {
    fn from_query(query: &JobListQuery) -> AppResult<Self> {
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<JobStatus>()?),
        };
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| format!("%{}%", escape_like(value)));

        Ok(Self {
            category,
            status,
            pattern,
        })
    }

    fn apply(&self) -> jobs::BoxedQuery<'_, Pg> {
        let mut query = jobs::table.into_boxed();
        if let Some(category) = &self.category {
            query = query.filter(jobs::category.eq(category));
        }
        if let Some(status) = self.status {
            query = query.filter(jobs::status.eq(status.as_str()));
        }
        if let Some(pattern) = &self.pattern {
            query = query.filter(
                jobs::title
                    .ilike(pattern)
                    .or(jobs::description.ilike(pattern)),
            );
        }
        query
    }
}

fn count_applications_for_jobs(
    conn: &mut PgConnection,
    job_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, i64>> {
    if job_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, i64)> = applications::table
        .filter(applications::job_id.eq_any(job_ids))
        .group_by(applications::job_id)
        .select((applications::job_id, count_star()))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

fn user_ids_for_jobs(jobs: &[Job]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = jobs
        .iter()
        .flat_map(|job| std::iter::once(job.client_id).chain(job.freelancer_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub(crate) fn find_job(conn: &mut PgConnection, job_id: Uuid) -> AppResult<Job> {
    jobs::table
        .find(job_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("job not found"))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    query: Result<Query<JobListQuery>, QueryRejection>,
) -> AppResult<Json<Paginated<JobResponse>>> {
    let Query(query) = query?;
    let filters = JobFilters::from_query(&query)?;
    let page = query.page.resolve();
    let mut conn = state.db()?;

    let total: i64 = filters
        .apply()
        .select(count_star())
        .first(&mut conn)?;

    let rows: Vec<Job> = filters
        .apply()
        .order((jobs::created_at.desc(), jobs::id.desc()))
        .offset(page.offset())
        .limit(page.limit)
        .load(&mut conn)?;

    let job_ids: Vec<Uuid> = rows.iter().map(|job| job.id).collect();
    let mut milestones_map = load_milestones_for_jobs(&mut conn, &job_ids)?;
    let counts = count_applications_for_jobs(&mut conn, &job_ids)?;
    let users = load_users(&mut conn, &user_ids_for_jobs(&rows))?;

    let data = rows
        .into_iter()
        .map(|job| {
            let job_id = job.id;
            let milestones = milestones_map.remove(&job_id).unwrap_or_default();
            let mut response = to_job_response(job, milestones, &users);
            response.application_count = Some(counts.get(&job_id).copied().unwrap_or(0));
            response
        })
        .collect();

    Ok(Json(Paginated::new(data, total, page)))
}

pub async fn get_job(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<JobResponse>> {
    let Path(job_id) = path?;
    let mut conn = state.db()?;

    let job = find_job(&mut conn, job_id)?;
    let milestones = load_milestones_for_jobs(&mut conn, &[job_id])?
        .remove(&job_id)
        .unwrap_or_default();
    let job_applications: Vec<Application> = applications::table
        .filter(applications::job_id.eq(job_id))
        .order((applications::created_at.desc(), applications::id.desc()))
        .load(&mut conn)?;

    let mut user_ids = user_ids_for_jobs(std::slice::from_ref(&job));
    user_ids.extend(job_applications.iter().map(|app| app.freelancer_id));
    let users = load_users(&mut conn, &user_ids)?;

    let applications = job_applications
        .into_iter()
        .map(|application| to_application_response(application, &users, false))
        .collect::<AppResult<Vec<_>>>()?;

    let mut response = to_job_response(job, milestones, &users);
    response.client = users.get(&response.client_id).map(UserSummary::with_bio);
    response.freelancer = response
        .freelancer_id
        .and_then(|id| users.get(&id))
        .map(UserSummary::with_bio);
    response.application_count = Some(applications.len() as i64);
    response.applications = Some(applications);

    Ok(Json(response))
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{field} is required")))
}

fn positive_amount(value: Option<f64>, field: &str) -> AppResult<f64> {
    match value {
        Some(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        Some(_) => Err(AppError::bad_request(format!("{field} must be a positive number"))),
        None => Err(AppError::bad_request(format!("{field} is required"))),
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let Json(payload) = payload?;

    let title = required_text(payload.title, "title")?;
    let category = required_text(payload.category, "category")?;
    let budget = positive_amount(payload.budget, "budget")?;
    let description = payload.description.unwrap_or_default().trim().to_string();

    let job_id = Uuid::new_v4();
    let new_milestones = payload
        .milestones
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, milestone)| -> AppResult<NewMilestone> {
            Ok(NewMilestone {
                id: Uuid::new_v4(),
                job_id,
                title: required_text(milestone.title, "milestone title")?,
                description: milestone.description.unwrap_or_default().trim().to_string(),
                amount: positive_amount(milestone.amount, "milestone amount")?,
                status: MilestoneStatus::Pending.as_str().to_string(),
                sort_order: index as i32,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

    let new_job = NewJob {
        id: job_id,
        title,
        description,
        budget,
        category,
        status: JobStatus::Open.as_str().to_string(),
        client_id: user.user_id,
    };

    let mut conn = state.db()?;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(jobs::table)
            .values(&new_job)
            .execute(conn)?;
        if !new_milestones.is_empty() {
            diesel::insert_into(milestones::table)
                .values(&new_milestones)
                .execute(conn)?;
        }
        Ok(())
    })?;

    let job = find_job(&mut conn, job_id)?;
    let milestones = load_milestones_for_jobs(&mut conn, &[job_id])?
        .remove(&job_id)
        .unwrap_or_default();
    let users = load_users(&mut conn, &[user.user_id])?;

    info!(
        job_id = %job_id,
        client_id = %user.user_id,
        milestones = milestones.len(),
        "job created"
    );
    Ok((
        StatusCode::CREATED,
        Json(to_job_response(job, milestones, &users)),
    ))
}

pub async fn update_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateJobRequest>, JsonRejection>,
) -> AppResult<Json<JobResponse>> {
    let Path(job_id) = path?;
    let Json(payload) = payload?;
    let mut conn = state.db()?;

    let job = find_job(&mut conn, job_id)?;
    if job.client_id != user.user_id {
        return Err(AppError::forbidden("not authorized to update this job"));
    }

    let title = payload.title.map(|v| v.trim().to_string());
    let description = payload.description.map(|v| v.trim().to_string());
    let category = payload.category.map(|v| v.trim().to_string());
    if title.as_deref() == Some("") {
        return Err(AppError::bad_request("title must not be empty"));
    }
    if category.as_deref() == Some("") {
        return Err(AppError::bad_request("category must not be empty"));
    }
    let budget = match payload.budget {
        Some(_) => Some(positive_amount(payload.budget, "budget")?),
        None => None,
    };
    let status = match payload.status.as_deref() {
        Some(value) => Some(value.parse::<JobStatus>()?),
        None => None,
    };
    if status == Some(JobStatus::InProgress) && job.freelancer_id.is_none() {
        return Err(AppError::bad_request(
            "a job moves to IN_PROGRESS by accepting an application",
        ));
    }
    if status == Some(JobStatus::Open) && job.freelancer_id.is_some() {
        return Err(AppError::bad_request(
            "a job with an assigned freelancer cannot be reopened",
        ));
    }

    let changeset = JobChangeset {
        title: title.as_deref(),
        description: description.as_deref(),
        budget,
        category: category.as_deref(),
        status: status.map(JobStatus::as_str),
    };

    let now = Utc::now().naive_utc();
    diesel::update(jobs::table.find(job_id))
        .set((&changeset, jobs::updated_at.eq(now)))
        .execute(&mut conn)?;

    let updated = find_job(&mut conn, job_id)?;
    let milestones = load_milestones_for_jobs(&mut conn, &[job_id])?
        .remove(&job_id)
        .unwrap_or_default();
    let users = load_users(&mut conn, &user_ids_for_jobs(std::slice::from_ref(&updated)))?;

    info!(job_id = %job_id, status = %updated.status, "job updated");
    Ok(Json(to_job_response(updated, milestones, &users)))
}

pub async fn delete_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let Path(job_id) = path?;
    let mut conn = state.db()?;

    let job = find_job(&mut conn, job_id)?;
    if job.client_id != user.user_id {
        return Err(AppError::forbidden("not authorized to delete this job"));
    }

    let deleted = diesel::delete(jobs::table.find(job_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found_msg("job not found"));
    }

    info!(job_id = %job_id, "job deleted");
    Ok(Json(json!({ "message": "job deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("logo design"), "logo design");
    }

    #[test]
    fn filters_ignore_blank_values() {
        let query = JobListQuery {
            category: Some("  ".into()),
            status: Some("".into()),
            search: Some(" rust ".into()),
            page: PageQuery::default(),
        };
        let filters = JobFilters::from_query(&query).unwrap();
        assert!(filters.category.is_none());
        assert!(filters.status.is_none());
        assert_eq!(filters.pattern.as_deref(), Some("%rust%"));
    }

    #[test]
    fn unknown_status_filter_is_rejected() {
        let query = JobListQuery {
            category: None,
            status: Some("PAUSED".into()),
            search: None,
            page: PageQuery::default(),
        };
        let err = JobFilters::from_query(&query).err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn amounts_must_be_positive() {
        assert_eq!(positive_amount(Some(100.0), "budget").unwrap(), 100.0);
        assert!(positive_amount(Some(0.0), "budget").is_err());
        assert!(positive_amount(Some(f64::NAN), "budget").is_err());
        assert!(positive_amount(None, "budget").is_err());
    }

    #[test]
    fn collects_distinct_participants() {
        let now = Utc::now().naive_utc();
        let (client, freelancer) = (Uuid::new_v4(), Uuid::new_v4());
        let make = |freelancer_id| Job {
            id: Uuid::new_v4(),
            title: "t".into(),
            description: String::new(),
            budget: 1.0,
            category: "c".into(),
            status: "OPEN".into(),
            client_id: client,
            freelancer_id,
            created_at: now,
            updated_at: now,
        };

        let ids = user_ids_for_jobs(&[make(None), make(Some(freelancer))]);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&client));
        assert!(ids.contains(&freelancer));
    }
}
