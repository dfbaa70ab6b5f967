use std::fmt::Write;
use std::sync::Arc;

use axum::{
    Extension, Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::{AuthContext, Role};
use crate::export::SheetRow;
use crate::store::StoreError;

/// Student registration form data
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    pub reg_number: String,
    pub year: String,
    pub course: String,
}

/// Attendance marking form data
#[derive(Debug, Serialize, Deserialize)]
pub struct AttendanceForm {
    pub reg_number: String,
}

pub async fn serve_student_page(Extension(ctx): Extension<AuthContext>) -> Response {
    if ctx.role != Role::Student {
        return Redirect::to("/login").into_response();
    }
    Html(include_str!("./static/student.html")).into_response()
}

/// Handle student registration
///
/// The duplicate-registration-number check runs before the capture, so a
/// rejected duplicate never touches the existing student's face image on
/// disk. The capture in turn runs before the insert, so a failed capture
/// leaves no partial state in the store; only the debug frame may exist.
pub async fn handle_register_student(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Form(form): Form<RegistrationForm>,
) -> Response {
    if ctx.role != Role::Student {
        return Redirect::to("/login").into_response();
    }

    match state.store.find_student_by_reg(&form.reg_number).await {
        Ok(None) => {}
        Ok(Some(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                "Registration number already exists",
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "student lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    }

    let captured = {
        let mut capture = state.capture.lock().unwrap();
        capture.capture_face(&form.reg_number)
    };

    let face_path = match captured {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(reg_number = %form.reg_number, error = %e, "face capture failed");
            return "Face capture failed. Ensure your face is clearly visible and well-lit."
                .into_response();
        }
    };

    match state
        .store
        .insert_student(
            &form.name,
            &form.reg_number,
            &form.year,
            &form.course,
            &face_path.to_string_lossy(),
        )
        .await
    {
        Ok(_) => "Student registered successfully".into_response(),
        Err(StoreError::DuplicateRegNumber) => (
            StatusCode::BAD_REQUEST,
            "Registration number already exists",
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "student insert failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// Handle attendance marking
///
/// Looks up the student, writes the attendance row, then mirrors it into
/// the workbook. The two writes are not transactional: a workbook failure
/// after a successful insert is logged and reported, and the stores diverge
/// until the next restart reseeds the exporter from the database.
pub async fn handle_mark_attendance(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Form(form): Form<AttendanceForm>,
) -> Response {
    if ctx.role != Role::Student {
        return Redirect::to("/login").into_response();
    }

    let student = match state.store.find_student_by_reg(&form.reg_number).await {
        Ok(Some(student)) => student,
        Ok(None) => return "Student not found".into_response(),
        Err(e) => {
            tracing::error!(error = %e, "student lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let now = chrono::Local::now();
    let date = now.format("%Y-%m-%d").to_string();
    let time = now.format("%H:%M:%S").to_string();

    if let Err(e) = state.store.insert_attendance(student.id, &date, &time).await {
        tracing::error!(error = %e, "attendance insert failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
    }

    let appended = {
        let mut sheet = state.sheet.lock().unwrap();
        sheet.append(SheetRow {
            student_id: student.id,
            reg_number: student.reg_number.clone(),
            date,
            time,
        })
    };

    if let Err(e) = appended {
        tracing::error!(error = %e, "workbook append failed after attendance insert");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Attendance recorded but spreadsheet export failed",
        )
            .into_response();
    }

    "Attendance marked successfully".into_response()
}

/// Render the admin report: every attendance row joined with its student.
pub async fn serve_admin_report(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Response {
    if ctx.role != Role::Admin {
        return Redirect::to("/login").into_response();
    }

    let rows = match state.store.attendance_report().await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "report query failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let mut table = String::new();
    for row in &rows {
        let _ = write!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&row.name),
            escape_html(&row.reg_number),
            escape_html(&row.face_image),
            escape_html(&row.date),
            escape_html(&row.time),
        );
    }

    let page = include_str!("./static/admin.html").replace("<!--ROWS-->", &table);
    Html(page).into_response()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
