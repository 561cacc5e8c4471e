mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_json, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPage {
    data: Vec<JobBody>,
    total: i64,
    page: i64,
    total_pages: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobBody {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    client_id: Uuid,
    freelancer_id: Option<Uuid>,
    milestones: Vec<MilestoneBody>,
    application_count: Option<i64>,
}

#[derive(Deserialize)]
struct MilestoneBody {
    title: String,
    status: String,
    order: i32,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[tokio::test]
async fn create_list_and_filter_jobs() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let client = app.insert_user("client", "CLIENT").await?;

    let created = app
        .post_json(
            "/api/jobs",
            &json!({ "title": "Logo", "budget": 100, "category": "Design" }),
            Some(&client.token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let logo: JobBody = body_json(created).await?;
    assert_eq!(logo.status, "OPEN");
    assert_eq!(logo.client_id, client.id);
    assert_eq!(logo.description, "");
    assert!(logo.freelancer_id.is_none());
    assert!(logo.milestones.is_empty());

    let created = app
        .post_json(
            "/api/jobs",
            &json!({
                "title": "Rust API",
                "description": "Build an axum backend",
                "budget": 900.5,
                "category": "Development",
                "milestones": [
                    { "title": "Schema", "amount": 300 },
                    { "title": "Endpoints", "description": "CRUD", "amount": 600.5 }
                ]
            }),
            Some(&client.token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let api: JobBody = body_json(created).await?;
    assert_eq!(api.milestones.len(), 2);
    assert_eq!(api.milestones[0].title, "Schema");
    assert_eq!(api.milestones[0].order, 0);
    assert_eq!(api.milestones[1].order, 1);
    assert!(api.milestones.iter().all(|m| m.status == "PENDING"));

    let all: JobPage = body_json(app.get("/api/jobs", None).await?).await?;
    assert_eq!(all.total, 2);
    assert_eq!(all.page, 1);
    assert_eq!(all.total_pages, 1);
    assert!(all.data.iter().all(|job| job.application_count == Some(0)));

    let design: JobPage =
        body_json(app.get("/api/jobs?category=Design", None).await?).await?;
    assert_eq!(design.total, 1);
    assert_eq!(design.data[0].id, logo.id);

    let searched: JobPage = body_json(app.get("/api/jobs?search=AXUM", None).await?).await?;
    assert_eq!(searched.total, 1);
    assert_eq!(searched.data[0].title, "Rust API");

    let nothing: JobPage =
        body_json(app.get("/api/jobs?status=COMPLETED", None).await?).await?;
    assert_eq!(nothing.total, 0);
    assert!(nothing.data.is_empty());
    assert_eq!(nothing.total_pages, 0);

    let bad_status = app.get("/api/jobs?status=PAUSED", None).await?;
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn pagination_is_clamped() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let client = app.insert_user("client", "CLIENT").await?;

    for n in 0..3 {
        let response = app
            .post_json(
                "/api/jobs",
                &json!({ "title": format!("Job {n}"), "budget": 10, "category": "Misc" }),
                Some(&client.token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let page: JobPage = body_json(app.get("/api/jobs?page=2&limit=2", None).await?).await?;
    assert_eq!(page.total, 3);
    assert_eq!(page.page, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.data.len(), 1);

    let clamped: JobPage =
        body_json(app.get("/api/jobs?page=0&limit=500", None).await?).await?;
    assert_eq!(clamped.page, 1);
    assert_eq!(clamped.data.len(), 3);

    let fallback: JobPage =
        body_json(app.get("/api/jobs?page=abc&limit=0", None).await?).await?;
    assert_eq!(fallback.page, 1);
    assert_eq!(fallback.data.len(), 1);

    let far_away = app
        .get("/api/jobs?page=9223372036854775807", None)
        .await?;
    assert_eq!(far_away.status(), StatusCode::OK);
    let far_away: JobPage = body_json(far_away).await?;
    assert_eq!(far_away.total, 3);
    assert!(far_away.data.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn create_job_validates_input() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let client = app.insert_user("client", "CLIENT").await?;

    let unauthenticated = app
        .post_json(
            "/api/jobs",
            &json!({ "title": "Logo", "budget": 100, "category": "Design" }),
            None,
        )
        .await?;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let missing_title = app
        .post_json(
            "/api/jobs",
            &json!({ "budget": 100, "category": "Design" }),
            Some(&client.token),
        )
        .await?;
    assert_eq!(missing_title.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(missing_title).await?;
    assert!(body.error.contains("title"));

    let negative_budget = app
        .post_json(
            "/api/jobs",
            &json!({ "title": "Logo", "budget": -5, "category": "Design" }),
            Some(&client.token),
        )
        .await?;
    assert_eq!(negative_budget.status(), StatusCode::BAD_REQUEST);

    let bad_milestone = app
        .post_json(
            "/api/jobs",
            &json!({
                "title": "Logo",
                "budget": 100,
                "category": "Design",
                "milestones": [{ "title": "Draft", "amount": 0 }]
            }),
            Some(&client.token),
        )
        .await?;
    assert_eq!(bad_milestone.status(), StatusCode::BAD_REQUEST);

    let all: JobPage = body_json(app.get("/api/jobs", None).await?).await?;
    assert_eq!(all.total, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn only_owner_updates_and_deletes() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let owner = app.insert_user("owner", "CLIENT").await?;
    let other = app.insert_user("other", "FREELANCER").await?;

    let created = app
        .post_json(
            "/api/jobs",
            &json!({ "title": "Logo", "budget": 100, "category": "Design" }),
            Some(&owner.token),
        )
        .await?;
    let job: JobBody = body_json(created).await?;
    let path = format!("/api/jobs/{}", job.id);

    let forbidden = app
        .put_json(&path, &json!({ "title": "Mine now" }), Some(&other.token))
        .await?;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let updated = app
        .put_json(
            &path,
            &json!({ "title": "Logo v2", "status": "CANCELLED" }),
            Some(&owner.token),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: JobBody = body_json(updated).await?;
    assert_eq!(updated.title, "Logo v2");
    assert_eq!(updated.status, "CANCELLED");

    let no_freelancer = app
        .put_json(&path, &json!({ "status": "IN_PROGRESS" }), Some(&owner.token))
        .await?;
    assert_eq!(no_freelancer.status(), StatusCode::BAD_REQUEST);

    let delete_forbidden = app.delete(&path, Some(&other.token)).await?;
    assert_eq!(delete_forbidden.status(), StatusCode::FORBIDDEN);

    let deleted = app.delete(&path, Some(&owner.token)).await?;
    assert_eq!(deleted.status(), StatusCode::OK);

    let missing = app.get(&path, None).await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let bad_id = app.get("/api/jobs/not-a-uuid", None).await?;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}
