use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Job, Milestone},
    schema::{jobs, milestones},
    state::AppState,
    status::{JobParty, JobStatus, MilestoneStatus},
};

use super::jobs::find_job;

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub title: String,
    pub description: String,
    pub amount: f64,
    pub status: String,
    pub order: i32,
}

impl From<Milestone> for MilestoneResponse {
    fn from(milestone: Milestone) -> Self {
        Self {
            id: milestone.id,
            job_id: milestone.job_id,
            title: milestone.title,
            description: milestone.description,
            amount: milestone.amount,
            status: milestone.status,
            order: milestone.sort_order,
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateMilestoneStatusRequest {
    pub status: Option<String>,
}

pub(crate) fn load_milestones_for_jobs(
    conn: &mut PgConnection,
    job_ids: &[Uuid],
) -> AppResult<HashMap<Uuid, Vec<Milestone>>> {
    if job_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Milestone> = milestones::table
        .filter(milestones::job_id.eq_any(job_ids))
        .order((milestones::job_id.asc(), milestones::sort_order.asc()))
        .load(conn)?;

    let mut map: HashMap<Uuid, Vec<Milestone>> = HashMap::new();
    for milestone in rows {
        map.entry(milestone.job_id).or_default().push(milestone);
    }
    Ok(map)
}

fn party_for(job: &Job, user_id: Uuid) -> Option<JobParty> {
    if job.client_id == user_id {
        Some(JobParty::Client)
    } else if job.freelancer_id == Some(user_id) {
        Some(JobParty::Freelancer)
    } else {
        None
    }
}

pub async fn list_job_milestones(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<Vec<MilestoneResponse>>> {
    let Path(job_id) = path?;
    let mut conn = state.db()?;

    find_job(&mut conn, job_id)?;
    let milestones = load_milestones_for_jobs(&mut conn, &[job_id])?
        .remove(&job_id)
        .unwrap_or_default();

    Ok(Json(
        milestones.into_iter().map(MilestoneResponse::from).collect(),
    ))
}

pub async fn update_milestone_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateMilestoneStatusRequest>, JsonRejection>,
) -> AppResult<Json<MilestoneResponse>> {
    let Path(milestone_id) = path?;
    let Json(payload) = payload?;
    let next: MilestoneStatus = payload
        .status
        .as_deref()
        .ok_or_else(|| AppError::bad_request("status is required"))?
        .parse()?;

    let mut conn = state.db()?;
    let updated = conn.transaction::<Milestone, AppError, _>(|conn| {
        let (milestone, job): (Milestone, Job) = milestones::table
            .inner_join(jobs::table)
            .filter(milestones::id.eq(milestone_id))
            .select((milestones::all_columns, jobs::all_columns))
            .for_update()
            .first(conn)
            .optional()?
            .ok_or_else(|| AppError::not_found_msg("milestone not found"))?;

        let party = party_for(&job, user.user_id)
            .ok_or_else(|| AppError::forbidden("not a participant of this job"))?;

        if job.status != JobStatus::InProgress.as_str() {
            return Err(AppError::bad_request(
                "milestones can only change while the job is in progress",
            ));
        }

        let current: MilestoneStatus = milestone.status.parse()?;
        if !current.can_transition_to(next, party) {
            let allowed_for_other = match party {
                JobParty::Client => current.can_transition_to(next, JobParty::Freelancer),
                JobParty::Freelancer => current.can_transition_to(next, JobParty::Client),
            };
            if allowed_for_other {
                return Err(AppError::forbidden(format!(
                    "only the other party may move a milestone from {current} to {next}"
                )));
            }
            return Err(AppError::bad_request(format!(
                "cannot move a milestone from {current} to {next}"
            )));
        }

        diesel::update(milestones::table.find(milestone_id))
            .set((
                milestones::status.eq(next.as_str()),
                milestones::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(milestones::table.find(milestone_id).first(conn)?)
    })?;

    info!(
        milestone_id = %milestone_id,
        job_id = %updated.job_id,
        status = %updated.status,
        "milestone status changed"
    );
    Ok(Json(MilestoneResponse::from(updated)))
}
