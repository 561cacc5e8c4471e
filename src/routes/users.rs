use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::{
    dsl::{count_star, sum},
    prelude::*,
    PgConnection,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{is_unique_violation, AppError, AppResult},
    models::{Job, NewUser, Review, User},
    schema::{jobs, reviews, users},
    state::AppState,
    status::UserRole,
    utils::json::classify_text_patch,
};

use super::reviews::{to_review_response, ReviewResponse};

const PROFILE_REVIEW_LIMIT: i64 = 20;
const PROFILE_JOB_LIMIT: i64 = 20;

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Public fields of a user embedded in other resources.
#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl UserSummary {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            bio: None,
        }
    }

    pub fn with_bio(user: &User) -> Self {
        Self {
            bio: user.bio.clone(),
            ..Self::from_user(user)
        }
    }
}

pub(crate) fn load_users(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<User> = users::table
        .filter(users::id.eq_any(ids))
        .load(conn)?;
    Ok(rows.into_iter().map(|user| (user.id, user)).collect())
}

/// Looks up a summary that must exist because of a foreign key.
pub(crate) fn summary_of(users: &HashMap<Uuid, User>, id: Uuid) -> AppResult<UserSummary> {
    users
        .get(&id)
        .map(UserSummary::from_user)
        .ok_or_else(|| AppError::internal(format!("user {id} missing from lookup")))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub wallet_address: String,
    pub username: String,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            wallet_address: user.wallet_address,
            username: user.username,
            email: user.email,
            bio: user.bio,
            avatar_url: user.avatar_url,
            role: user.role,
            created_at: to_iso(user.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub budget: f64,
    pub status: String,
    pub created_at: String,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            title: job.title,
            category: job.category,
            budget: job.budget,
            status: job.status,
            created_at: to_iso(job.created_at),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub reviews_received: Vec<ReviewResponse>,
    pub average_rating: f64,
    pub review_count: i64,
    pub client_jobs: Vec<JobSummary>,
    pub freelancer_jobs: Vec<JobSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub wallet_address: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UserChangeset {
    username: Option<String>,
    email: Option<Option<String>>,
    bio: Option<Option<String>>,
    avatar_url: Option<Option<String>>,
}

impl UserChangeset {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(payload) = payload?;

    let wallet_address = non_blank(payload.wallet_address)
        .ok_or_else(|| AppError::bad_request("walletAddress is required"))?
        .to_lowercase();
    let username = non_blank(payload.username)
        .ok_or_else(|| AppError::bad_request("username is required"))?;
    let role: UserRole = payload
        .role
        .as_deref()
        .ok_or_else(|| AppError::bad_request("role is required"))?
        .parse()?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        wallet_address,
        username,
        email: non_blank(payload.email),
        bio: non_blank(payload.bio),
        avatar_url: non_blank(payload.avatar_url),
        role: role.as_str().to_string(),
    };

    let mut conn = state.db()?;
    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict(
                "wallet address or username is already registered",
            ));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let user: User = users::table.find(new_user.id).first(&mut conn)?;
    info!(user_id = %user.id, role = %user.role, "registered user");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let record: User = users::table
        .find(user.user_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("user not found"))?;
    Ok(Json(UserResponse::from(record)))
}

pub async fn update_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let Json(body) = payload?;
    let mut conn = state.db()?;
    let existing: User = users::table
        .find(user.user_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("user not found"))?;

    let mut changeset = UserChangeset::default();

    match body.get("username") {
        None => {}
        Some(Value::String(name)) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(AppError::bad_request("username must not be empty"));
            }
            if trimmed != existing.username {
                changeset.username = Some(trimmed.to_string());
            }
        }
        Some(_) => return Err(AppError::bad_request("username must be a string")),
    }

    changeset.email = classify_text_patch("email", body.get("email"))
        .map_err(AppError::bad_request)?
        .into_change();
    changeset.bio = classify_text_patch("bio", body.get("bio"))
        .map_err(AppError::bad_request)?
        .into_change();
    changeset.avatar_url = classify_text_patch("avatarUrl", body.get("avatarUrl"))
        .map_err(AppError::bad_request)?
        .into_change();

    if changeset.is_empty() {
        return Ok(Json(UserResponse::from(existing)));
    }

    let now = Utc::now().naive_utc();
    match diesel::update(users::table.find(user.user_id))
        .set((&changeset, users::updated_at.eq(now)))
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("username is already taken"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let updated: User = users::table.find(user.user_id).first(&mut conn)?;
    Ok(Json(UserResponse::from(updated)))
}

pub async fn get_user_profile(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<UserProfileResponse>> {
    let Path(user_id) = path?;
    let mut conn = state.db()?;

    let user: User = users::table
        .find(user_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_msg("user not found"))?;

    let (rating_sum, review_count): (Option<i64>, i64) = reviews::table
        .filter(reviews::reviewee_id.eq(user_id))
        .select((sum(reviews::rating), count_star()))
        .first(&mut conn)?;

    let received: Vec<Review> = reviews::table
        .filter(reviews::reviewee_id.eq(user_id))
        .order((reviews::created_at.desc(), reviews::id.desc()))
        .limit(PROFILE_REVIEW_LIMIT)
        .load(&mut conn)?;
    let reviewer_ids: Vec<Uuid> = received.iter().map(|r| r.reviewer_id).collect();
    let reviewers = load_users(&mut conn, &reviewer_ids)?;
    let reviews_received = received
        .into_iter()
        .map(|review| to_review_response(review, &reviewers))
        .collect::<AppResult<Vec<_>>>()?;

    let client_jobs: Vec<Job> = jobs::table
        .filter(jobs::client_id.eq(user_id))
        .order(jobs::created_at.desc())
        .limit(PROFILE_JOB_LIMIT)
        .load(&mut conn)?;
    let freelancer_jobs: Vec<Job> = jobs::table
        .filter(jobs::freelancer_id.eq(user_id))
        .order(jobs::created_at.desc())
        .limit(PROFILE_JOB_LIMIT)
        .load(&mut conn)?;

    Ok(Json(UserProfileResponse {
        user: UserResponse::from(user),
        reviews_received,
        average_rating: average_rating(rating_sum, review_count),
        review_count,
        client_jobs: client_jobs.into_iter().map(JobSummary::from).collect(),
        freelancer_jobs: freelancer_jobs.into_iter().map(JobSummary::from).collect(),
    }))
}

fn average_rating(sum: Option<i64>, count: i64) -> f64 {
    match sum {
        Some(total) if count > 0 => {
            let raw = total as f64 / count as f64;
            (raw * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}
