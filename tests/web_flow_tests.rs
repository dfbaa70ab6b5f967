//! End-to-end tests for the HTTP surface, driving the router directly with
//! in-memory requests. The camera is replaced by stub frame sources.

use std::sync::{Arc, Mutex};

use attendance::app::{self, AppState};
use attendance::capture::{CaptureError, FaceCapture, FaceDetector, FrameSource};
use attendance::config::Config;
use attendance::export::AttendanceSheet;
use attendance::store::Store;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use image::{Rgb, RgbImage};
use tempfile::TempDir;
use tower::util::ServiceExt;

/// A frame with a bright face-sized block on a dark background, which the
/// contrast detector accepts as a face.
fn face_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(320, 240, Rgb([20, 20, 20]));
    for y in 60..180 {
        for x in 100..220 {
            frame.put_pixel(x, y, Rgb([200, 200, 200]));
        }
    }
    frame
}

/// A second detectable face with different pixel values, so a JPEG written
/// from it differs byte-wise from one written from [`face_frame`].
fn brighter_face_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(320, 240, Rgb([40, 40, 40]));
    for y in 60..180 {
        for x in 100..220 {
            frame.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    frame
}

struct StubSource {
    frame: RgbImage,
}

impl FrameSource for StubSource {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        Ok(self.frame.clone())
    }
}

struct DeadCamera;

impl FrameSource for DeadCamera {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        Err(CaptureError::CameraUnavailable)
    }
}

/// Serves its frames in order, one per grab.
struct SequenceSource {
    frames: Vec<RgbImage>,
}

impl FrameSource for SequenceSource {
    fn grab(&mut self) -> Result<RgbImage, CaptureError> {
        if self.frames.is_empty() {
            return Err(CaptureError::NoFrame);
        }
        Ok(self.frames.remove(0))
    }
}

async fn test_state(dir: &TempDir, source: Box<dyn FrameSource>) -> Arc<AppState> {
    let image_dir = dir.path().join("student_images");
    let debug_dir = dir.path().join("debug_frames");
    std::fs::create_dir_all(&image_dir).unwrap();
    std::fs::create_dir_all(&debug_dir).unwrap();

    let store = Store::connect(&dir.path().join("attendance.db"))
        .await
        .unwrap();
    store.init_schema().await.unwrap();

    let config = Config {
        database_path: dir.path().join("attendance.db"),
        image_dir: image_dir.clone(),
        debug_dir: debug_dir.clone(),
        workbook_path: dir.path().join("attendance.xlsx"),
        ..Config::default()
    };

    let capture = FaceCapture::new(source, FaceDetector::default(), image_dir, debug_dir);

    Arc::new(AppState {
        store,
        capture: Mutex::new(capture),
        sheet: Mutex::new(AttendanceSheet::new(config.workbook_path.clone())),
        config,
    })
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response<Body> {
    app::router(state.clone()).oneshot(request).await.unwrap()
}

fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without Location header")
        .to_str()
        .unwrap()
}

fn session_cookie(response: &Response<Body>) -> String {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("no Set-Cookie header")
        .to_str()
        .unwrap();
    raw.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Sign up and log in one user, returning the session cookie.
async fn login_as(state: &Arc<AppState>, username: &str, role: &str) -> String {
    let body = format!("username={username}&password=pw&role={role}");
    let response = send(state, form_post("/signup", &body, None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let body = format!("username={username}&password=pw");
    let response = send(state, form_post("/login", &body, None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response)
}

#[tokio::test]
async fn root_redirects_to_signup() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;

    let response = send(&state, get_req("/", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/signup");
}

#[tokio::test]
async fn signup_then_login_redirects_by_role() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;

    let response = send(
        &state,
        form_post("/signup", "username=ann&password=pw&role=student", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = send(&state, form_post("/login", "username=ann&password=pw", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/student");

    let admin_cookie = login_as(&state, "boss", "admin").await;
    assert!(admin_cookie.starts_with("session="));
    let response = send(&state, form_post("/login", "username=boss&password=pw", None)).await;
    assert_eq!(location(&response), "/admin");
}

#[tokio::test]
async fn wrong_password_yields_invalid_credentials() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;
    login_as(&state, "ann", "student").await;

    let response = send(
        &state,
        form_post("/login", "username=ann&password=wrong", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Invalid credentials");

    let response = send(
        &state,
        form_post("/login", "username=nobody&password=pw", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_username_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;
    login_as(&state, "ann", "student").await;

    let response = send(
        &state,
        form_post("/signup", "username=ann&password=other&role=admin", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Username already exists");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;

    for request in [
        get_req("/student", None),
        get_req("/admin", None),
        form_post("/mark_attendance", "reg_number=R1", None),
    ] {
        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/login");
    }
}

#[tokio::test]
async fn wrong_role_is_redirected_to_login() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;

    let student = login_as(&state, "ann", "student").await;
    let response = send(&state, get_req("/admin", Some(&student))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let admin = login_as(&state, "boss", "admin").await;
    let response = send(&state, get_req("/student", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn registration_captures_a_face_and_inserts_the_student() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(StubSource { frame: face_frame() })).await;
    let cookie = login_as(&state, "ann", "student").await;

    let response = send(
        &state,
        form_post(
            "/student",
            "name=Ann&reg_number=R100&year=2&course=CS",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Student registered successfully");

    let student = state
        .store
        .find_student_by_reg("R100")
        .await
        .unwrap()
        .expect("student row missing");
    assert_eq!(student.name, "Ann");
    assert!(student.face_image.ends_with("R100.jpg"));

    assert!(dir.path().join("student_images/R100.jpg").exists());
    assert!(dir.path().join("debug_frames/debug_R100.jpg").exists());
}

#[tokio::test]
async fn failed_capture_registers_no_student() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;
    let cookie = login_as(&state, "ann", "student").await;

    let response = send(
        &state,
        form_post(
            "/student",
            "name=Ann&reg_number=R100&year=2&course=CS",
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "Face capture failed. Ensure your face is clearly visible and well-lit."
    );

    assert!(state
        .store
        .find_student_by_reg("R100")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn duplicate_registration_number_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(StubSource { frame: face_frame() })).await;
    let cookie = login_as(&state, "ann", "student").await;

    let form = "name=Ann&reg_number=R100&year=2&course=CS";
    let response = send(&state, form_post("/student", form, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let form = "name=Ben&reg_number=R100&year=3&course=EE";
    let response = send(&state, form_post("/student", form, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Registration number already exists"
    );

    let student = state
        .store
        .find_student_by_reg("R100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(student.name, "Ann");
}

#[tokio::test]
async fn rejected_duplicate_keeps_the_original_face_image() {
    let dir = TempDir::new().unwrap();
    let source = SequenceSource {
        frames: vec![face_frame(), brighter_face_frame()],
    };
    let state = test_state(&dir, Box::new(source)).await;
    let cookie = login_as(&state, "ann", "student").await;

    let form = "name=Ann&reg_number=R100&year=2&course=CS";
    let response = send(&state, form_post("/student", form, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let image_path = dir.path().join("student_images/R100.jpg");
    let original = std::fs::read(&image_path).unwrap();

    let form = "name=Ben&reg_number=R100&year=3&course=EE";
    let response = send(&state, form_post("/student", form, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "Registration number already exists"
    );

    // Ann's image is untouched by the rejected attempt.
    assert_eq!(std::fs::read(&image_path).unwrap(), original);
}

#[tokio::test]
async fn marking_attendance_twice_writes_two_rows_in_both_stores() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(StubSource { frame: face_frame() })).await;
    let cookie = login_as(&state, "ann", "student").await;

    let form = "name=Ann&reg_number=R100&year=2&course=CS";
    send(&state, form_post("/student", form, Some(&cookie))).await;

    for _ in 0..2 {
        let response = send(
            &state,
            form_post("/mark_attendance", "reg_number=R100", Some(&cookie)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Attendance marked successfully");
    }

    let report = state.store.attendance_report().await.unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].reg_number, "R100");

    let sheet = state.sheet.lock().unwrap();
    assert_eq!(sheet.rows().len(), 2);
    assert_eq!(sheet.rows()[0].reg_number, "R100");
    assert!(dir.path().join("attendance.xlsx").exists());
}

#[tokio::test]
async fn unknown_registration_number_is_not_marked() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;
    let cookie = login_as(&state, "ann", "student").await;

    let response = send(
        &state,
        form_post("/mark_attendance", "reg_number=ghost", Some(&cookie)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Student not found");

    assert!(state.store.attendance_report().await.unwrap().is_empty());
    assert!(state.sheet.lock().unwrap().rows().is_empty());
}

#[tokio::test]
async fn admin_report_lists_attendance_joined_with_students() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(StubSource { frame: face_frame() })).await;
    let student_cookie = login_as(&state, "ann", "student").await;
    let admin_cookie = login_as(&state, "boss", "admin").await;

    let form = "name=Ann+Example&reg_number=R100&year=2&course=CS";
    send(&state, form_post("/student", form, Some(&student_cookie))).await;
    send(
        &state,
        form_post("/mark_attendance", "reg_number=R100", Some(&student_cookie)),
    )
    .await;

    let response = send(&state, get_req("/admin", Some(&admin_cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Ann Example"));
    assert!(page.contains("R100"));
    assert!(page.contains("R100.jpg"));
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let dir = TempDir::new().unwrap();
    let state = test_state(&dir, Box::new(DeadCamera)).await;
    let cookie = login_as(&state, "ann", "student").await;

    let response = send(&state, get_req("/student", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&state, get_req("/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    // The cookie is actually expired, not just blanked.
    let removal = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(removal.starts_with("session="));
    assert!(removal.contains("Max-Age=0"));

    let response = send(&state, get_req("/student", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}
