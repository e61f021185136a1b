use axum::{
    middleware as axum_mw,
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod store;


use config::Config;
use middleware::rate_limit::RateLimiter;
use services::ClanService;

#[derive(Clone)]
pub struct AppState {
    pub clans: ClanService,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimiter,
    pub write_rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let clans = ClanService::from_config(&config);
        let rate_limiter =
            RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
        let write_rate_limiter =
            RateLimiter::new(config.rate_limit.write_max, config.rate_limit.window_secs);
        Self {
            clans,
            config: Arc::new(config),
            rate_limiter,
            write_rate_limiter,
        }
    }
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- Clans: reads are public, everything else needs a session ---
    let clan_routes = Router::new()
        .route("/", get(routes::clans::list_clans))
        .route("/:id", get(routes::clans::get_clan))
        .route(
            "/",
            post(routes::clans::create_clan).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .route(
            "/:id",
            delete(routes::clans::delete_clan).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .route(
            "/:id/avatar",
            patch(routes::clans::update_avatar).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .route(
            "/:id/leave",
            post(routes::clans::leave_clan).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .route(
            "/:id/members/:memberId",
            delete(routes::clans::remove_member).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::write_rate_limit,
        ));

    let invitation_routes = Router::new()
        .route(
            "/",
            get(routes::invitations::list_my_invitations)
                .post(routes::invitations::create_invitation),
        )
        .route("/:id", post(routes::invitations::respond_invitation))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::write_rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let join_request_routes = Router::new()
        .route("/", post(routes::join_requests::create_join_request))
        .route("/my-clan", get(routes::join_requests::my_clan_requests))
        .route("/:id", patch(routes::join_requests::respond_join_request))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::write_rate_limit,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let me_routes = Router::new()
        .route("/clan", get(routes::clans::my_clan))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    let notification_routes = Router::new()
        .route("/count", get(routes::notifications::count))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::optional_auth,
        ));

    let admin_routes = Router::new()
        .route("/clans/cleanup", post(routes::admin::cleanup))
        .route("/clans/:id", delete(routes::admin::delete_clan))
        .layer(axum_mw::from_fn(middleware::admin::require_admin))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .nest("/clans", clan_routes)
        .nest("/invitations", invitation_routes)
        .nest("/join-requests", join_request_routes)
        .nest("/me", me_routes)
        .nest("/notifications", notification_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if config.log_format == "pretty" {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    init_tracing(&config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        env = %config.app_env,
        storage = ?config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        exclusive_join_requests = config.clans.exclusive_join_requests,
        "Clans API initialized"
    );

    let state = AppState::new(config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}
