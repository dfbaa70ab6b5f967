use std::fs;
use std::sync::{Arc, Mutex};

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::attendance::{
    handle_mark_attendance, handle_register_student, serve_admin_report, serve_student_page,
};
use crate::auth::{
    handle_login, handle_logout, handle_signup, require_auth, serve_login_page, serve_signup_page,
};
use crate::capture::{Camera, FaceCapture, FaceDetector};
use crate::config::Config;
use crate::export::AttendanceSheet;
use crate::store::Store;

/// Shared application state
///
/// The camera is exclusively owned per capture call and the workbook mirror
/// is a single writer, so both sit behind their own mutex; the store's pool
/// handles its own concurrency.
pub struct AppState {
    pub store: Store,
    pub capture: Mutex<FaceCapture>,
    pub sheet: Mutex<AttendanceSheet>,
    pub config: Config,
}

/// Build the HTTP surface.
///
/// | Path             | Method   | Auth            |
/// |------------------|----------|-----------------|
/// | /                | GET      | none            |
/// | /signup          | GET/POST | none            |
/// | /login           | GET/POST | none            |
/// | /student         | GET/POST | student session |
/// | /mark_attendance | POST     | student session |
/// | /admin           | GET      | admin session   |
/// | /logout          | GET      | any             |
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route(
            "/student",
            get(serve_student_page).post(handle_register_student),
        )
        .route("/mark_attendance", post(handle_mark_attendance))
        .route("/admin", get(serve_admin_report))
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/", get(|| async { Redirect::to("/signup") }))
        .route("/signup", get(serve_signup_page).post(handle_signup))
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/logout", get(handle_logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server.
///
/// Initializes the schema and seeds the workbook mirror from the relational
/// store before the first request is accepted.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.image_dir)?;
    fs::create_dir_all(&config.debug_dir)?;

    let store = Store::connect(&config.database_path).await?;
    store.init_schema().await?;

    let mut sheet = AttendanceSheet::new(config.workbook_path.clone());
    sheet.seed(store.export_rows().await?);

    let capture = FaceCapture::new(
        Box::new(Camera::new(config.camera_index)),
        FaceDetector::default(),
        config.image_dir.clone(),
        config.debug_dir.clone(),
    );

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        store,
        capture: Mutex::new(capture),
        sheet: Mutex::new(sheet),
        config,
    });

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
