use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::{audio_file, document};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::pagination::{PaginatedResponse, Pagination};
use crate::services::worker::{self, TriggerOutcome};
use crate::services::{extractor, AppState};
use crate::utils::{attachment_name, unique_stored_name};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AudioInfo {
    pub id: Uuid,
    pub duration_seconds: f64,
    pub created_at: chrono::NaiveDateTime,
}

impl From<audio_file::Model> for AudioInfo {
    fn from(model: audio_file::Model) -> Self {
        Self {
            id: model.id,
            duration_seconds: model.duration_seconds,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    pub size_bytes: i64,
    pub page_count: i32,
    pub status: String,
    pub audio: Option<AudioInfo>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

fn derive_status(doc: &document::Model, audio: Option<&audio_file::Model>) -> &'static str {
    if doc.is_processing {
        "processing"
    } else if audio.is_some() {
        "converted"
    } else {
        "pending"
    }
}

fn to_response(doc: document::Model, audio: Option<audio_file::Model>) -> DocumentResponse {
    let status = derive_status(&doc, audio.as_ref()).to_string();
    DocumentResponse {
        id: doc.id,
        title: doc.title,
        filename: doc.stored_filename,
        size_bytes: doc.size_bytes,
        page_count: doc.page_count,
        status,
        audio: audio.map(AudioInfo::from),
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    }
}

// Someone else's document is indistinguishable from a missing one.
async fn find_owned(
    db: &DatabaseConnection,
    id: Uuid,
    owner_id: Uuid,
) -> Result<document::Model, AppError> {
    document::Entity::find_by_id(id)
        .filter(document::Column::OwnerId.eq(owner_id))
        .one(db)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or(AppError::NotFound("Document not found".into()))
}

async fn first_artifact(
    db: &DatabaseConnection,
    document_id: Uuid,
) -> Result<Option<audio_file::Model>, AppError> {
    audio_file::Entity::find()
        .filter(audio_file::Column::DocumentId.eq(document_id))
        .order_by_asc(audio_file::Column::CreatedAt)
        .one(db)
        .await
        .map_err(AppError::DatabaseError)
}

#[utoipa::path(
    post,
    path = "/documents",
    tag = "Documents",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document uploaded successfully", body = DocumentResponse),
        (status = 400, description = "Bad Request"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, AppError> {
    let mut title: Option<String> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;

    // 1. Read multipart fields
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Invalid multipart data".to_string()))?
    {
        match field.name() {
            Some("title") => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| AppError::BadRequest("Invalid title field".to_string()))?,
                );
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if content_type != "application/pdf" {
                    println!("Documents | POST /documents | user={} | res=400 | Not a PDF", user.email);
                    return Err(AppError::BadRequest("Only PDF files are accepted".to_string()));
                }
                let data = field.bytes().await.map_err(|_| {
                    AppError::InternalServerError("Failed to read file bytes".to_string())
                })?;
                upload = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or(AppError::BadRequest("No title field found".to_string()))?;
    let (filename, data) = upload.ok_or(AppError::BadRequest("No file field found".to_string()))?;

    // 2. Count pages; an unparseable PDF is stored with zero pages
    let (data, page_count) = tokio::task::spawn_blocking(move || {
        let pages = extractor::page_count(&data) as i32;
        (data, pages)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Task join error: {}", e)))?;

    // 3. Store the file under a collision-resistant name
    let stored_filename = unique_stored_name(&filename);
    let size_bytes = data.len() as i64;
    state.storage.store_document(&stored_filename, data).await?;

    // 4. Save to DB
    let doc = document::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.id),
        title: Set(title),
        stored_filename: Set(stored_filename),
        size_bytes: Set(size_bytes),
        page_count: Set(page_count),
        is_processing: Set(false),
        created_at: Set(chrono::Utc::now().naive_utc()),
        updated_at: Set(chrono::Utc::now().naive_utc()),
    };
    let saved = doc.insert(&state.db).await.map_err(AppError::DatabaseError)?;

    println!(
        "Documents | POST /documents | user={} | doc={} | pages={} | res=200",
        user.email, saved.id, saved.page_count
    );
    Ok(Json(to_response(saved, None)))
}

#[utoipa::path(
    get,
    path = "/documents",
    tag = "Documents",
    params(
        Pagination
    ),
    responses(
        (status = 200, description = "List of documents", body = PaginatedResponse<DocumentResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<PaginatedResponse<DocumentResponse>>, AppError> {
    let page = pagination.page();
    let limit = pagination.limit();

    // 1. Page through the caller's documents, newest first
    let paginator = document::Entity::find()
        .filter(document::Column::OwnerId.eq(user.id))
        .order_by_desc(document::Column::CreatedAt)
        .paginate(&state.db, limit);

    let total_items = paginator.num_items().await.map_err(AppError::DatabaseError)?;
    let total_pages = paginator.num_pages().await.map_err(AppError::DatabaseError)?;
    let docs = paginator
        .fetch_page(page - 1)
        .await
        .map_err(AppError::DatabaseError)?;

    // 2. Pull the artifacts for this page in one query
    let doc_ids: Vec<Uuid> = docs.iter().map(|d| d.id).collect();
    let mut audio_by_doc: HashMap<Uuid, audio_file::Model> = HashMap::new();
    if !doc_ids.is_empty() {
        let artifacts = audio_file::Entity::find()
            .filter(audio_file::Column::DocumentId.is_in(doc_ids))
            .order_by_asc(audio_file::Column::CreatedAt)
            .all(&state.db)
            .await
            .map_err(AppError::DatabaseError)?;
        for artifact in artifacts {
            audio_by_doc.entry(artifact.document_id).or_insert(artifact);
        }
    }

    let data: Vec<DocumentResponse> = docs
        .into_iter()
        .map(|doc| {
            let audio = audio_by_doc.remove(&doc.id);
            to_response(doc, audio)
        })
        .collect();

    Ok(Json(PaginatedResponse {
        data,
        total_items,
        total_pages,
        current_page: page,
        page_size: limit,
    }))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(
        ("id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document details", body = DocumentResponse),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_document(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<DocumentResponse>, AppError> {
    // 1. Get Document
    let doc = find_owned(&state.db, id, user.id).await?;

    // 2. Attach artifact info
    let audio = first_artifact(&state.db, doc.id).await?;

    Ok(Json(to_response(doc, audio)))
}

#[utoipa::path(
    post,
    path = "/documents/{id}/convert",
    tag = "Documents",
    params(
        ("id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 202, description = "Conversion queued"),
        (status = 200, description = "Already processing or already converted"),
        (status = 403, description = "Subscription required"),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn convert_document(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    // 1. Access Gate: conversion is for subscribers only
    if !user.is_subscribed() {
        println!("Documents | POST /documents/{}/convert | user={} | res=403", id, user.email);
        return Err(AppError::Forbidden(
            "An active subscription is required to convert documents".to_string(),
        ));
    }

    // 2. Get Document
    let doc = find_owned(&state.db, id, user.id).await?;

    // 3. Claim it and queue the job
    let outcome = worker::enqueue(&state.db, &doc).await?;

    let (code, status, message) = match outcome {
        TriggerOutcome::Queued => (StatusCode::ACCEPTED, "processing", "Conversion started"),
        TriggerOutcome::AlreadyProcessing => {
            (StatusCode::OK, "processing", "Conversion already in progress")
        }
        TriggerOutcome::AlreadyConverted => {
            (StatusCode::OK, "converted", "Document already converted")
        }
    };

    println!(
        "Documents | POST /documents/{}/convert | user={} | res={}",
        id,
        user.email,
        code.as_u16()
    );
    Ok((
        code,
        Json(serde_json::json!({
            "status": status,
            "message": message
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/documents/{id}/audio",
    tag = "Documents",
    params(
        ("id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "MP3 audio attachment", content_type = "audio/mpeg"),
        (status = 404, description = "Document not found or not converted yet"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_audio(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Get Document
    let doc = find_owned(&state.db, id, user.id).await?;

    // 2. Get its artifact record
    let audio = first_artifact(&state.db, doc.id)
        .await?
        .ok_or(AppError::NotFound("Document has not been converted yet".into()))?;

    // 3. Read the file; a missing or empty file here is a storage fault, not a 404
    let bytes = state.storage.read_audio(&audio.stored_filename).await?;

    // 4. Serve as an attachment named after the title
    let headers = [
        (header::CONTENT_TYPE, "audio/mpeg".to_string()),
        (header::CONTENT_LENGTH, bytes.len().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", attachment_name(&doc.title)),
        ),
    ];

    println!(
        "Documents | GET /documents/{}/audio | user={} | bytes={} | res=200",
        id,
        user.email,
        bytes.len()
    );
    Ok((headers, bytes))
}

#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "Documents",
    params(
        ("id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document deleted successfully"),
        (status = 404, description = "Document not found"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_document(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    // 1. Get Document
    let doc = find_owned(&state.db, id, user.id).await?;

    // 2. Remove the source file, then any artifact files. A filesystem failure
    //    here aborts before the row delete so no record points at nothing.
    state.storage.remove_document(&doc.stored_filename).await?;

    let artifacts = audio_file::Entity::find()
        .filter(audio_file::Column::DocumentId.eq(doc.id))
        .all(&state.db)
        .await
        .map_err(AppError::DatabaseError)?;
    for artifact in &artifacts {
        state.storage.remove_audio(&artifact.stored_filename).await?;
    }

    // 3. Delete from DB; audio and job rows cascade
    document::Entity::delete_by_id(doc.id)
        .exec(&state.db)
        .await
        .map_err(AppError::DatabaseError)?;

    println!("Documents | DELETE /documents/{} | user={} | res=200", id, user.email);
    Ok(Json(serde_json::json!({
        "message": "Document deleted successfully",
        "id": doc.id
    })))
}
