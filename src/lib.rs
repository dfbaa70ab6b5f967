/*!
# Campus Attendance Application

A small campus attendance web service built in Rust.

## Overview

Users sign up and log in with a role (student or admin). Students register
themselves with a face photo captured from the default camera; attendance is
marked by registration number and written to both a single-file relational
store and an XLSX spreadsheet mirror. Admins view a report of attendance
rows joined with student details.

## Architecture

- **Web layer**: axum handlers over shared application state, with cookie
  sessions validated once per request by middleware that attaches an
  explicit authentication context.
- **Relational store**: SQLite via sqlx, three append-only tables (users,
  students, attendance) created idempotently at startup, typed records
  decoded at the store boundary.
- **Face capture**: a frame-source seam (V4L camera in production, stubs in
  tests), a multi-scale frontal-face detector, and an adapter that crops the
  first detected face and saves it keyed by registration number. The raw
  frame is always kept as a debug copy.
- **Spreadsheet mirror**: a single-writer XLSX exporter that owns its row
  set in memory, seeded from the store at startup and rewritten per append,
  so concurrent marks cannot lose rows.

## Modules

- **app**: Routing, shared state, server startup
- **attendance**: Student registration, attendance marking, admin report
- **auth**: Accounts, password hashing, sessions, auth middleware
- **capture**: Camera access and face detection
- **config**: Environment-driven runtime configuration
- **export**: The XLSX attendance mirror
- **store**: The SQLite store and its typed records
*/

pub mod app;
pub mod attendance;
pub mod auth;
pub mod capture;
pub mod config;
pub mod export;
pub mod store;

/// Re-export the commonly used types at the crate root
pub use app::AppState;
pub use auth::{AuthContext, Role};
pub use capture::{Camera, CaptureError, FaceCapture, FaceDetector, FrameSource};
pub use config::Config;
pub use export::{AttendanceSheet, ExportError, SheetRow};
pub use store::{AttendanceRecord, ReportRow, Store, StoreError, Student, User};
