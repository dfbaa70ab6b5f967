use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;

/// The two account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    /// Where a user of this role lands after login.
    pub fn landing_page(&self) -> &'static str {
        match self {
            Role::Student => "/student",
            Role::Admin => "/admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Role, String> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Per-request authentication context
///
/// Populated by [`require_auth`] from a validated session token and attached
/// to the request as an extension, so protected handlers receive an explicit
/// identity instead of poking at global session state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
    pub role: Role,
}

/// A live user session
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub expires_at: SystemTime,
}

// All active sessions, keyed by the opaque token carried in the cookie.
lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

pub const SESSION_COOKIE: &str = "session";

/// Create a session for an authenticated user and return its token.
pub fn create_session(username: &str, role: Role, ttl: Duration) -> String {
    let token = Uuid::new_v4().to_string();
    let session = Session {
        username: username.to_string(),
        role,
        expires_at: SystemTime::now() + ttl,
    };

    let mut sessions = SESSIONS.write().unwrap();
    sessions.insert(token.clone(), session);

    token
}

/// Resolve a token to an authentication context, if the session is live.
pub fn validate_session(token: &str) -> Option<AuthContext> {
    let sessions = SESSIONS.read().unwrap();

    sessions.get(token).and_then(|session| {
        if session.expires_at > SystemTime::now() {
            Some(AuthContext {
                username: session.username.clone(),
                role: session.role,
            })
        } else {
            None
        }
    })
}

/// Drop a session. A no-op for unknown tokens.
pub fn destroy_session(token: &str) {
    let mut sessions = SESSIONS.write().unwrap();
    sessions.remove(token);
}

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Verify a password against a stored Argon2 hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

// Web handler functions below

/// Signup form data
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub password: String,
    /// `student` or `admin`
    pub role: String,
}

/// Login form data
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

pub async fn serve_signup_page() -> Html<&'static str> {
    Html(include_str!("./static/signup.html"))
}

pub async fn serve_login_page() -> Html<&'static str> {
    Html(include_str!("./static/login.html"))
}

/// Handle signup form submissions
///
/// Creates the user row (unique username, hashed password) and redirects to
/// the login page.
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SignupForm>,
) -> Response {
    if form.username.is_empty() || form.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Username and password cannot be empty",
        )
            .into_response();
    }

    let role: Role = match form.role.parse() {
        Ok(role) => role,
        Err(_) => return (StatusCode::BAD_REQUEST, "Unknown role").into_response(),
    };

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "Password hashing failed").into_response();
        }
    };

    match state
        .store
        .insert_user(&form.username, &password_hash, role.as_str())
        .await
    {
        Ok(_) => Redirect::to("/login").into_response(),
        Err(crate::store::StoreError::DuplicateUsername) => {
            (StatusCode::BAD_REQUEST, "Username already exists").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "signup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// Handle login form submissions
///
/// Verifies credentials, creates a session, and redirects by role; a bad
/// username or password yields the plain "Invalid credentials" response.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match state.store.find_user(&form.username).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "user lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let Some(user) = user else {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    };

    match verify_password(&form.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response(),
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response();
        }
    }

    let role: Role = match user.role.parse() {
        Ok(role) => role,
        Err(e) => {
            tracing::error!(username = %user.username, error = %e, "stored role is invalid");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response();
        }
    };

    let ttl = Duration::from_secs(state.config.session_hours * 60 * 60);
    let token = create_session(&user.username, role, ttl);
    let cookie = Cookie::new(SESSION_COOKIE, token);

    (jar.add(cookie), Redirect::to(role.landing_page())).into_response()
}

/// Drop the session and tell the browser to discard the cookie.
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        destroy_session(cookie.value());
    }

    (jar.remove(Cookie::from(SESSION_COOKIE)), Redirect::to("/login"))
}

/// Authentication middleware for protected routes
///
/// Validates the session token once per request and attaches an
/// [`AuthContext`] extension; requests without a live session are redirected
/// to the login page. Role checks stay in the individual handlers.
pub async fn require_auth(
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(ctx) = validate_session(cookie.value()) {
            request.extensions_mut().insert(ctx);
            return next.run(request).await;
        }
    }

    Redirect::to("/login").into_response()
}
