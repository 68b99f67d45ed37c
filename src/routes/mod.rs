mod billing;
mod documents;
mod home;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::auth::auth_middleware;
use crate::services::AppState;

// Uploaded PDFs are capped at 16 MiB.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

// Define the OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // General endpoints
        home::root,
        // Document endpoints
        documents::upload_document,
        documents::list_documents,
        documents::get_document,
        documents::convert_document,
        documents::download_audio,
        documents::delete_document,
        // Billing endpoints
        billing::get_subscription,
        billing::create_checkout,
        billing::cancel_subscription,
        billing::stripe_webhook,
    ),
    components(
        schemas(
            // Home schemas
            home::RootResponse,
            // Document schemas
            documents::DocumentResponse,
            documents::AudioInfo,
            // Billing schemas
            billing::SubscriptionResponse,
            billing::CheckoutRequest,
            billing::CheckoutResponse,
        )
    ),
    tags(
        (name = "General", description = "General API information"),
        (name = "Documents", description = "PDF upload, conversion to speech, and audio download"),
        (name = "Billing", description = "Subscription state, checkout, and provider webhooks")
    ),
    info(
        title = "VoxPDF API",
        version = "0.1.0",
        description = "A Rust/Axum service that converts uploaded PDFs into speech audio, with conversion gated by a Stripe subscription",
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

// Add security scheme for JWT Bearer tokens
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer
                )
            ),
        );
    }
}

pub fn create_routes(state: AppState) -> Router {
    // Swagger UI (stateless)
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    // Protected routes that require auth
    let protected_routes = Router::new()
        .route(
            "/documents",
            post(documents::upload_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents", get(documents::list_documents))
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}", delete(documents::delete_document))
        .route("/documents/{id}/convert", post(documents::convert_document))
        .route("/documents/{id}/audio", get(documents::download_audio))
        .route("/billing/subscription", get(billing::get_subscription))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/cancel", post(billing::cancel_subscription))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Public routes (no auth required) and merge all together. The webhook
    // authenticates itself through the provider signature instead.
    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/billing/webhook", post(billing::stripe_webhook))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Merge Swagger UI (which has no state) with the rest
    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
}
