use axum::{body::Bytes, extract::State, http::HeaderMap, Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::config::get_config;
use crate::entities::user;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::billing::{StripeEvent, StripeSubscription};
use crate::services::billing::verify_webhook_signature;
use crate::services::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct SubscriptionResponse {
    pub status: String,
    pub end_date: Option<chrono::NaiveDateTime>,
    pub subscribed: bool,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CheckoutRequest {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[utoipa::path(
    get,
    path = "/billing/subscription",
    tag = "Billing",
    responses(
        (status = 200, description = "Current subscription state", body = SubscriptionResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_subscription(
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Json<SubscriptionResponse> {
    Json(SubscriptionResponse {
        subscribed: user.is_subscribed(),
        status: user.subscription_status,
        end_date: user.subscription_end_date,
    })
}

#[utoipa::path(
    post,
    path = "/billing/checkout",
    tag = "Billing",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "User has no billing account"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    // 1. Checkout needs a billing account on both sides
    let billing = state
        .billing
        .as_ref()
        .ok_or(AppError::InternalServerError("Billing is not configured".to_string()))?;
    let config = get_config();
    let price_id = config
        .stripe_price_id
        .as_deref()
        .ok_or(AppError::InternalServerError("Billing is not configured".to_string()))?;
    let customer_id = user.stripe_customer_id.as_deref().ok_or(AppError::BadRequest(
        "No billing account is attached to this user".to_string(),
    ))?;

    // 2. Create the session at the provider
    let session = billing
        .create_checkout_session(customer_id, price_id, &payload.success_url, &payload.cancel_url)
        .await
        .map_err(|e| {
            eprintln!(
                "Billing | POST /billing/checkout | user={} | provider error: {}",
                user.email, e
            );
            AppError::InternalServerError("Failed to create checkout session".to_string())
        })?;

    println!(
        "Billing | POST /billing/checkout | user={} | session={} | res=200",
        user.email, session.id
    );
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url: session.url,
    }))
}

#[utoipa::path(
    post,
    path = "/billing/cancel",
    tag = "Billing",
    responses(
        (status = 200, description = "Subscription canceled"),
        (status = 400, description = "No subscription on file"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    // 1. Nothing to cancel without a subscription on file
    let billing = state
        .billing
        .as_ref()
        .ok_or(AppError::InternalServerError("Billing is not configured".to_string()))?;
    let subscription_id = user
        .stripe_subscription_id
        .as_deref()
        .ok_or(AppError::BadRequest("No active subscription to cancel".to_string()))?;

    // 2. Cancel at the provider first; local state only changes on success
    billing.cancel_subscription(subscription_id).await.map_err(|e| {
        eprintln!(
            "Billing | POST /billing/cancel | user={} | provider error: {}",
            user.email, e
        );
        AppError::InternalServerError("Failed to cancel subscription".to_string())
    })?;

    // 3. Mark it canceled locally
    let email = user.email.clone();
    let mut active: user::ActiveModel = user.into();
    active.subscription_status = Set(user::STATUS_CANCELED.to_string());
    active.update(&state.db).await.map_err(AppError::DatabaseError)?;

    println!("Billing | POST /billing/cancel | user={} | res=200", email);
    Ok(Json(serde_json::json!({ "status": "canceled" })))
}

#[utoipa::path(
    post,
    path = "/billing/webhook",
    tag = "Billing",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Invalid signature or payload")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // 1. Verify the signature before trusting anything in the payload
    let config = get_config();
    let secret = config
        .stripe_webhook_secret
        .as_deref()
        .ok_or(AppError::BadRequest("Webhook signing secret is not configured".to_string()))?;
    let sig_header = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;
    verify_webhook_signature(&body, sig_header, secret, chrono::Utc::now().timestamp())
        .map_err(AppError::BadRequest)?;

    // 2. Parse the event envelope
    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;

    // 3. Apply subscription lifecycle events; everything else is acknowledged unread
    match event.event_type.as_str() {
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let subscription: StripeSubscription = serde_json::from_value(event.data.object)
                .map_err(|e| AppError::BadRequest(format!("Invalid payload: {}", e)))?;
            apply_subscription_event(&state.db, &event.event_type, &subscription).await?;
            println!(
                "Billing | POST /billing/webhook | event={} | customer={} | res=200",
                event.event_type, subscription.customer
            );
        }
        other => {
            println!("Billing | POST /billing/webhook | event={} | ignored", other);
        }
    }

    Ok(Json(serde_json::json!({ "status": "success" })))
}

/// Updates the local subscription fields from a provider event. An event for
/// a customer id nobody has is logged and acknowledged, never an error, so
/// the provider does not retry it forever.
async fn apply_subscription_event(
    db: &DatabaseConnection,
    event_type: &str,
    subscription: &StripeSubscription,
) -> Result<(), AppError> {
    let Some(found) = user::Entity::find()
        .filter(user::Column::StripeCustomerId.eq(subscription.customer.as_str()))
        .one(db)
        .await
        .map_err(AppError::DatabaseError)?
    else {
        println!(
            "Billing | POST /billing/webhook | unknown customer {} | ignored",
            subscription.customer
        );
        return Ok(());
    };

    let mut active: user::ActiveModel = found.into();
    if event_type == "customer.subscription.deleted" {
        active.subscription_status = Set(user::STATUS_CANCELED.to_string());
    } else {
        active.subscription_status = Set(subscription.status.clone());
        active.stripe_subscription_id = Set(Some(subscription.id.clone()));
        active.subscription_end_date = Set(subscription
            .current_period_end
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.naive_utc()));
    }
    active.update(db).await.map_err(AppError::DatabaseError)?;
    Ok(())
}
