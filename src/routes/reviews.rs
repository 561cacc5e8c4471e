use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{is_unique_violation, AppError, AppResult},
    models::{Job, NewReview, Review, User},
    schema::{jobs, reviews, users},
    state::AppState,
    status::JobStatus,
    utils::pagination::{PageQuery, Paginated},
};

use super::users::{load_users, summary_of, to_iso, UserSummary};

const MIN_RATING: i32 = 1;
const MAX_RATING: i32 = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub reviewer_id: Uuid,
    pub reviewee_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: String,
    pub reviewer: UserSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub job_id: Option<Uuid>,
    pub reviewee_id: Option<Uuid>,
    pub rating: Option<i32>,
    #[serde(default)]
    pub comment: Option<String>,
}

pub(crate) fn to_review_response(
    review: Review,
    users: &HashMap<Uuid, User>,
) -> AppResult<ReviewResponse> {
    let reviewer = summary_of(users, review.reviewer_id)?;
    Ok(ReviewResponse {
        id: review.id,
        job_id: review.job_id,
        reviewer_id: review.reviewer_id,
        reviewee_id: review.reviewee_id,
        rating: review.rating,
        comment: review.comment,
        created_at: to_iso(review.created_at),
        reviewer,
    })
}

fn is_participant(job: &Job, user_id: Uuid) -> bool {
    job.client_id == user_id || job.freelancer_id == Some(user_id)
}

/// The party a reviewer is allowed to review on a finished job.
fn counterpart_on_job(job: &Job, reviewer_id: Uuid) -> Option<Uuid> {
    if job.client_id == reviewer_id {
        job.freelancer_id
    } else if job.freelancer_id == Some(reviewer_id) {
        Some(job.client_id)
    } else {
        None
    }
}

pub async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateReviewRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let Json(payload) = payload?;

    let job_id = payload
        .job_id
        .ok_or_else(|| AppError::bad_request("jobId is required"))?;
    let reviewee_id = payload
        .reviewee_id
        .ok_or_else(|| AppError::bad_request("revieweeId is required"))?;
    let rating = payload
        .rating
        .ok_or_else(|| AppError::bad_request("rating is required"))?;
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::bad_request(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }

    let mut conn = state.db()?;
    let job: Job = jobs::table
        .find(job_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("job not found"))?;

    if job.status != JobStatus::Completed.as_str() {
        return Err(AppError::bad_request("only completed jobs can be reviewed"));
    }

    if !is_participant(&job, user.user_id) {
        return Err(AppError::forbidden("only participants of the job can review it"));
    }
    let counterpart = counterpart_on_job(&job, user.user_id)
        .ok_or_else(|| AppError::bad_request("job has no assigned freelancer to review"))?;
    if counterpart != reviewee_id {
        return Err(AppError::bad_request(
            "reviewee must be the other participant of the job",
        ));
    }

    let new_review = NewReview {
        id: Uuid::new_v4(),
        job_id,
        reviewer_id: user.user_id,
        reviewee_id,
        rating,
        comment: payload.comment.unwrap_or_default().trim().to_string(),
    };

    match diesel::insert_into(reviews::table)
        .values(&new_review)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("you have already reviewed this job"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let review: Review = reviews::table.find(new_review.id).first(&mut conn)?;
    let reviewer: User = users::table.find(user.user_id).first(&mut conn)?;
    let lookup = HashMap::from([(reviewer.id, reviewer)]);

    info!(review_id = %review.id, job_id = %job_id, rating, "review created");
    Ok((StatusCode::CREATED, Json(to_review_response(review, &lookup)?)))
}

pub async fn list_user_reviews(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Json<Paginated<ReviewResponse>>> {
    let Path(user_id) = path?;
    let Query(query) = query?;
    let page = query.resolve();
    let mut conn = state.db()?;

    users::table
        .find(user_id)
        .select(users::id)
        .first::<Uuid>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("user not found"))?;

    let total: i64 = reviews::table
        .filter(reviews::reviewee_id.eq(user_id))
        .select(count_star())
        .first(&mut conn)?;

    let rows: Vec<Review> = reviews::table
        .filter(reviews::reviewee_id.eq(user_id))
        .order((reviews::created_at.desc(), reviews::id.desc()))
        .offset(page.offset())
        .limit(page.limit)
        .load(&mut conn)?;

    let reviewer_ids: Vec<Uuid> = rows.iter().map(|r| r.reviewer_id).collect();
    let reviewers = load_users(&mut conn, &reviewer_ids)?;
    let data = rows
        .into_iter()
        .map(|review| to_review_response(review, &reviewers))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(Paginated::new(data, total, page)))
}
