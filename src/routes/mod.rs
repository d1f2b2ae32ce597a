use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{cookie::time::Duration, Expiry, MemoryStore, SessionManagerLayer};

use crate::handlers;
use crate::middleware::auth_layer;
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // Session store (in-memory, sessions are lost on restart)
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.config.session.secure)
        .with_http_only(true)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(
            state.config.session.expiry_minutes,
        )));

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    use handlers::{
        auth, client, dashboard, export, finance, order, salary, salary_config, salary_payment,
        service, setup, user,
    };

    // API routes
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Setup routes
        .route("/setup/status", get(health::setup_status))
        .route("/setup/init/owner", post(setup::init_owner))
        // Auth routes
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/user/current", get(auth::current_user))
        // User routes
        .route("/users", get(user::list_users).post(user::create_user))
        .route(
            "/users/:id",
            get(user::get_user).put(user::update_user).delete(user::delete_user),
        )
        .route("/users/:id/toggle-active", post(user::toggle_active))
        .route("/profile", put(user::update_profile))
        .route("/profile/password", post(user::change_password))
        // Client routes
        .route("/clients", get(client::list_clients).post(client::create_client))
        .route(
            "/clients/:id",
            get(client::get_client)
                .put(client::update_client)
                .delete(client::delete_client),
        )
        // Service catalog
        .route("/services", get(service::list_services).post(service::create_service))
        .route(
            "/services/:id",
            get(service::get_service)
                .put(service::update_service)
                .delete(service::delete_service),
        )
        // Order routes
        .route("/orders", get(order::list_orders).post(order::create_order))
        .route("/orders/my", get(order::my_orders))
        .route(
            "/orders/:id",
            get(order::get_order)
                .put(order::update_order)
                .delete(order::delete_order),
        )
        .route("/orders/:id/items", post(order::add_item))
        .route("/orders/:id/items/:item_id", delete(order::remove_item))
        .route("/orders/:id/status", post(order::change_status))
        // Ledger and finance views
        .route(
            "/transactions",
            get(finance::list_transactions).post(finance::create_transaction),
        )
        .route(
            "/transactions/:id",
            get(finance::get_transaction)
                .put(finance::update_transaction)
                .delete(finance::delete_transaction),
        )
        .route("/finance/balance", get(finance::get_balance))
        .route("/finance/stats", get(finance::get_stats))
        .route("/finance/expense-categories", get(finance::expense_categories))
        .route(
            "/finance/calculate-salary/:user_id",
            get(salary::calculate_user_salary),
        )
        // Salary payments
        .route(
            "/salary-payments",
            get(salary_payment::list_payments).post(salary_payment::create_payment),
        )
        .route(
            "/salary-payments/:id",
            delete(salary_payment::delete_payment),
        )
        // Salary configurations
        .route(
            "/salary-configs",
            get(salary_config::list_configs).post(salary_config::create_config),
        )
        .route("/salary-configs/default", post(salary_config::create_default_config))
        .route(
            "/salary-configs/:id",
            get(salary_config::get_config)
                .put(salary_config::update_config)
                .delete(salary_config::delete_config),
        )
        .route("/salary-configs/:id/activate", post(salary_config::activate_config))
        .route("/salary-configs/:id/copy", post(salary_config::copy_config))
        .route(
            "/salary-assignments",
            get(salary_config::list_assignments).post(salary_config::create_assignment),
        )
        .route("/salary-assignments/bulk", post(salary_config::bulk_assign))
        .route("/salary-assignments/auto", post(salary_config::auto_assign))
        .route(
            "/salary-assignments/:id",
            put(salary_config::update_assignment).delete(salary_config::delete_assignment),
        )
        .route(
            "/salary-adjustments",
            get(salary_config::list_adjustments).post(salary_config::create_adjustment),
        )
        .route(
            "/salary-adjustments/:id",
            put(salary_config::update_adjustment).delete(salary_config::delete_adjustment),
        )
        // Salary calculation
        .route("/salary/calculate", post(salary::calculate_salary))
        .route("/salary/overview", get(salary::salary_overview))
        .route("/salary/stats", get(salary::salary_stats))
        // Dashboard and analytics
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
        .route("/analytics", get(dashboard::analytics))
        // CSV exports
        .route("/export/clients", get(export::export_clients))
        .route("/export/orders", get(export::export_orders))
        .route("/export/finance", get(export::export_finance));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}
