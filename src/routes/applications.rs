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
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{is_unique_violation, AppError, AppResult},
    models::{Application, Job, NewApplication, User},
    schema::{applications, jobs},
    state::AppState,
    status::{ApplicationStatus, JobStatus},
    utils::pagination::{PageQuery, Paginated},
};

use super::jobs::find_job;
use super::users::{load_users, to_iso, JobSummary, UserSummary};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub freelancer_id: Uuid,
    pub cover_letter: String,
    pub proposed_budget: f64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freelancer: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub cover_letter: Option<String>,
    pub proposed_budget: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateApplicationStatusRequest {
    pub status: Option<String>,
}

fn base_response(application: Application) -> ApplicationResponse {
    ApplicationResponse {
        id: application.id,
        job_id: application.job_id,
        freelancer_id: application.freelancer_id,
        cover_letter: application.cover_letter,
        proposed_budget: application.proposed_budget,
        status: application.status,
        created_at: to_iso(application.created_at),
        updated_at: to_iso(application.updated_at),
        freelancer: None,
        job: None,
    }
}

pub(crate) fn to_application_response(
    application: Application,
    users: &HashMap<Uuid, User>,
    include_bio: bool,
) -> AppResult<ApplicationResponse> {
    let freelancer = users.get(&application.freelancer_id).ok_or_else(|| {
        AppError::internal(format!(
            "freelancer {} missing from lookup",
            application.freelancer_id
        ))
    })?;
    let summary = if include_bio {
        UserSummary::with_bio(freelancer)
    } else {
        UserSummary::from_user(freelancer)
    };

    let mut response = base_response(application);
    response.freelancer = Some(summary);
    Ok(response)
}

/// Why an apply attempt is refused before touching the store.
fn apply_precondition(job: &Job, applicant_id: Uuid) -> Option<&'static str> {
    if job.status != JobStatus::Open.as_str() {
        Some("job is not accepting applications")
    } else if job.client_id == applicant_id {
        Some("cannot apply to your own job")
    } else {
        None
    }
}

pub async fn apply_to_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ApplyRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApplicationResponse>)> {
    let Path(job_id) = path?;
    let Json(payload) = payload?;
    let mut conn = state.db()?;

    let job = find_job(&mut conn, job_id)?;
    if let Some(reason) = apply_precondition(&job, user.user_id) {
        return Err(AppError::bad_request(reason));
    }

    let proposed_budget = match payload.proposed_budget {
        Some(amount) if amount.is_finite() && amount > 0.0 => amount,
        Some(_) => return Err(AppError::bad_request("proposedBudget must be a positive number")),
        None => return Err(AppError::bad_request("proposedBudget is required")),
    };

    let new_application = NewApplication {
        id: Uuid::new_v4(),
        job_id,
        freelancer_id: user.user_id,
        cover_letter: payload.cover_letter.unwrap_or_default().trim().to_string(),
        proposed_budget,
        status: ApplicationStatus::Pending.as_str().to_string(),
    };

    match diesel::insert_into(applications::table)
        .values(&new_application)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("you have already applied to this job"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let application: Application = applications::table
        .find(new_application.id)
        .first(&mut conn)?;
    let users = load_users(&mut conn, &[user.user_id])?;

    info!(
        application_id = %application.id,
        job_id = %job_id,
        freelancer_id = %user.user_id,
        "application submitted"
    );
    Ok((
        StatusCode::CREATED,
        Json(to_application_response(application, &users, false)?),
    ))
}

pub async fn list_job_applications(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Json<Paginated<ApplicationResponse>>> {
    let Path(job_id) = path?;
    let Query(query) = query?;
    let page = query.resolve();
    let mut conn = state.db()?;

    find_job(&mut conn, job_id)?;

    let total: i64 = applications::table
        .filter(applications::job_id.eq(job_id))
        .select(count_star())
        .first(&mut conn)?;

    let rows: Vec<Application> = applications::table
        .filter(applications::job_id.eq(job_id))
        .order((applications::created_at.desc(), applications::id.desc()))
        .offset(page.offset())
        .limit(page.limit)
        .load(&mut conn)?;

    let freelancer_ids: Vec<Uuid> = rows.iter().map(|app| app.freelancer_id).collect();
    let users = load_users(&mut conn, &freelancer_ids)?;
    let data = rows
        .into_iter()
        .map(|application| to_application_response(application, &users, true))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(Paginated::new(data, total, page)))
}

pub async fn list_my_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Json<Paginated<ApplicationResponse>>> {
    let Query(query) = query?;
    let page = query.resolve();
    let mut conn = state.db()?;

    let total: i64 = applications::table
        .filter(applications::freelancer_id.eq(user.user_id))
        .select(count_star())
        .first(&mut conn)?;

    let rows: Vec<(Application, Job)> = applications::table
        .inner_join(jobs::table)
        .filter(applications::freelancer_id.eq(user.user_id))
        .order((applications::created_at.desc(), applications::id.desc()))
        .select((applications::all_columns, jobs::all_columns))
        .offset(page.offset())
        .limit(page.limit)
        .load(&mut conn)?;

    let data = rows
        .into_iter()
        .map(|(application, job)| {
            let mut response = base_response(application);
            response.job = Some(JobSummary::from(job));
            response
        })
        .collect();

    Ok(Json(Paginated::new(data, total, page)))
}

pub async fn update_application_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateApplicationStatusRequest>, JsonRejection>,
) -> AppResult<Json<ApplicationResponse>> {
    let Path(application_id) = path?;
    let Json(payload) = payload?;

    let next = match payload.status.as_deref().map(str::parse::<ApplicationStatus>) {
        Some(Ok(status @ (ApplicationStatus::Accepted | ApplicationStatus::Rejected))) => status,
        _ => return Err(AppError::bad_request("status must be ACCEPTED or REJECTED")),
    };

    let mut conn = state.db()?;
    let updated = conn.transaction::<Application, AppError, _>(|conn| {
        let (application, job): (Application, Job) = applications::table
            .inner_join(jobs::table)
            .filter(applications::id.eq(application_id))
            .select((applications::all_columns, jobs::all_columns))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found_msg("application not found"))?;

        if job.client_id != user.user_id {
            return Err(AppError::forbidden("not authorized"));
        }

        let current: ApplicationStatus = application.status.parse()?;
        if !current.can_transition_to(next) {
            return Err(AppError::bad_request(format!(
                "application is already {current}"
            )));
        }

        let now = Utc::now().naive_utc();
        diesel::update(applications::table.find(application_id))
            .set((
                applications::status.eq(next.as_str()),
                applications::updated_at.eq(now),
            ))
            .execute(conn)?;

        if next == ApplicationStatus::Accepted {
            // Guarded on OPEN so a competing acceptance cannot reassign the job.
            let assigned = diesel::update(
                jobs::table
                    .filter(jobs::id.eq(job.id))
                    .filter(jobs::status.eq(JobStatus::Open.as_str())),
            )
            .set((
                jobs::freelancer_id.eq(Some(application.freelancer_id)),
                jobs::status.eq(JobStatus::InProgress.as_str()),
                jobs::updated_at.eq(now),
            ))
            .execute(conn)?;

            if assigned == 0 {
                warn!(
                    application_id = %application_id,
                    job_id = %job.id,
                    job_status = %job.status,
                    "acceptance refused, job no longer open"
                );
                return Err(AppError::conflict("job is no longer open"));
            }
        }

        Ok(applications::table.find(application_id).first(conn)?)
    })?;

    info!(
        application_id = %application_id,
        job_id = %updated.job_id,
        status = %updated.status,
        "application decided"
    );
    let users = load_users(&mut conn, &[updated.freelancer_id])?;
    Ok(Json(to_application_response(updated, &users, false)?))
}
