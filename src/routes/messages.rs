use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use diesel::{dsl::count_star, pg::Pg, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    conversations::group_conversations,
    error::{is_foreign_key_violation, AppError, AppResult},
    models::{Message, NewMessage, User},
    schema::{jobs, messages},
    state::AppState,
};

use super::users::{load_users, summary_of, to_iso, UserSummary};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub job_id: Option<Uuid>,
    pub content: String,
    pub read: bool,
    pub created_at: String,
    pub sender: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserSummary>,
}

#[derive(Serialize)]
pub struct JobRef {
    pub id: Uuid,
    pub title: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub other_user: UserSummary,
    pub job: Option<JobRef>,
    pub last_message: MessageResponse,
    pub unread_count: i64,
}

/// `GET /messages` answers with a thread when a participant is named.
#[derive(Serialize)]
#[serde(untagged)]
pub enum MessagesView {
    Thread(Vec<MessageResponse>),
    Conversations(Vec<ConversationResponse>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub participant_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    pub job_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub content: Option<String>,
}

#[derive(Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

fn to_message_response(
    message: &Message,
    users: &HashMap<Uuid, User>,
    include_receiver: bool,
) -> AppResult<MessageResponse> {
    let receiver = if include_receiver {
        Some(summary_of(users, message.receiver_id)?)
    } else {
        None
    };

    Ok(MessageResponse {
        id: message.id,
        sender_id: message.sender_id,
        receiver_id: message.receiver_id,
        job_id: message.job_id,
        content: message.content.clone(),
        read: message.read,
        created_at: to_iso(message.created_at),
        sender: summary_of(users, message.sender_id)?,
        receiver,
    })
}

fn thread_query(
    caller_id: Uuid,
    other_id: Uuid,
    job_id: Option<Uuid>,
) -> messages::BoxedQuery<'static, Pg> {
    let mut query = messages::table
        .filter(
            messages::sender_id
                .eq(caller_id)
                .and(messages::receiver_id.eq(other_id))
                .or(messages::sender_id
                    .eq(other_id)
                    .and(messages::receiver_id.eq(caller_id))),
        )
        .into_boxed();
    if let Some(job_id) = job_id {
        query = query.filter(messages::job_id.eq(job_id));
    }
    query
}

fn load_thread(
    conn: &mut PgConnection,
    caller_id: Uuid,
    other_id: Uuid,
    job_id: Option<Uuid>,
) -> AppResult<Vec<MessageResponse>> {
    let rows: Vec<Message> = thread_query(caller_id, other_id, job_id)
        .order((messages::created_at.asc(), messages::id.asc()))
        .load(conn)?;

    let users = load_users(conn, &[caller_id, other_id])?;
    rows.iter()
        .map(|message| to_message_response(message, &users, false))
        .collect()
}

fn load_conversations(
    conn: &mut PgConnection,
    caller_id: Uuid,
) -> AppResult<Vec<ConversationResponse>> {
    let rows: Vec<Message> = messages::table
        .filter(
            messages::sender_id
                .eq(caller_id)
                .or(messages::receiver_id.eq(caller_id)),
        )
        .order((messages::created_at.desc(), messages::id.desc()))
        .load(conn)?;

    let conversations = group_conversations(caller_id, &rows);

    let mut user_ids: Vec<Uuid> = vec![caller_id];
    user_ids.extend(conversations.iter().map(|conv| conv.key.counterpart_id));
    let users = load_users(conn, &user_ids)?;

    let job_ids: Vec<Uuid> = conversations
        .iter()
        .filter_map(|conv| conv.key.job_id)
        .collect();
    let job_titles: HashMap<Uuid, String> = if job_ids.is_empty() {
        HashMap::new()
    } else {
        jobs::table
            .filter(jobs::id.eq_any(&job_ids))
            .select((jobs::id, jobs::title))
            .load::<(Uuid, String)>(conn)?
            .into_iter()
            .collect()
    };

    conversations
        .into_iter()
        .map(|conv| -> AppResult<ConversationResponse> {
            Ok(ConversationResponse {
                id: conv.key.id(),
                other_user: summary_of(&users, conv.key.counterpart_id)?,
                job: conv.key.job_id.and_then(|job_id| {
                    job_titles.get(&job_id).map(|title| JobRef {
                        id: job_id,
                        title: title.clone(),
                    })
                }),
                last_message: to_message_response(conv.last_message, &users, true)?,
                unread_count: conv.unread_count,
            })
        })
        .collect()
}

pub async fn send_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;

    let receiver_id = payload
        .receiver_id
        .ok_or_else(|| AppError::bad_request("receiverId and content are required"))?;
    let content = payload
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("receiverId and content are required"))?;

    let new_message = NewMessage {
        id: Uuid::new_v4(),
        sender_id: user.user_id,
        receiver_id,
        job_id: payload.job_id,
        content,
    };

    let mut conn = state.db()?;
    match diesel::insert_into(messages::table)
        .values(&new_message)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(err) if is_foreign_key_violation(&err) => {
            return Err(AppError::not_found_msg("receiver or job not found"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let message: Message = messages::table.find(new_message.id).first(&mut conn)?;
    let users = load_users(&mut conn, &[message.sender_id, message.receiver_id])?;

    debug!(
        message_id = %message.id,
        sender_id = %message.sender_id,
        receiver_id = %message.receiver_id,
        "message sent"
    );
    Ok((
        StatusCode::CREATED,
        Json(to_message_response(&message, &users, true)?),
    ))
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> AppResult<Json<MessagesView>> {
    let Query(query) = query?;
    let mut conn = state.db()?;

    if let Some(participant_id) = query.participant_id {
        let thread = load_thread(&mut conn, user.user_id, participant_id, query.job_id)?;
        return Ok(Json(MessagesView::Thread(thread)));
    }

    let conversations = load_conversations(&mut conn, user.user_id)?;
    Ok(Json(MessagesView::Conversations(conversations)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UnreadCountResponse>> {
    let mut conn = state.db()?;
    let count: i64 = messages::table
        .filter(messages::receiver_id.eq(user.user_id))
        .filter(messages::read.eq(false))
        .select(count_star())
        .first(&mut conn)?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Returns the thread with one user and marks their messages to the caller
/// as read.
pub async fn get_thread(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ThreadQuery>, QueryRejection>,
) -> AppResult<Json<Vec<MessageResponse>>> {
    let Path(other_id) = path?;
    let Query(query) = query?;
    let mut conn = state.db()?;

    let thread = load_thread(&mut conn, user.user_id, other_id, query.job_id)?;

    let unread = messages::table
        .filter(messages::sender_id.eq(other_id))
        .filter(messages::receiver_id.eq(user.user_id))
        .filter(messages::read.eq(false));
    let marked = match query.job_id {
        Some(job_id) => diesel::update(unread.filter(messages::job_id.eq(job_id)))
            .set(messages::read.eq(true))
            .execute(&mut conn)?,
        None => diesel::update(unread)
            .set(messages::read.eq(true))
            .execute(&mut conn)?,
    };

    if marked > 0 {
        info!(
            reader_id = %user.user_id,
            sender_id = %other_id,
            marked,
            "marked thread as read"
        );
    }
    Ok(Json(thread))
}

pub async fn mark_message_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(message_id) = path?;
    let mut conn = state.db()?;

    let updated = diesel::update(
        messages::table
            .filter(messages::id.eq(message_id))
            .filter(messages::receiver_id.eq(user.user_id)),
    )
    .set(messages::read.eq(true))
    .execute(&mut conn)?;

    if updated == 0 {
        return Err(AppError::not_found_msg("message not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}
