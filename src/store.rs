use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::export::SheetRow;

/// Errors produced at the store boundary
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("username already exists")]
    DuplicateUsername,

    #[error("registration number already exists")]
    DuplicateRegNumber,
}

/// A registered application user
///
/// Created once at signup and never updated or deleted. The password is
/// stored as an Argon2 hash; the plaintext never touches the database.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    /// `student` or `admin`
    pub role: String,
}

/// A registered student
///
/// `reg_number` is the lookup key for attendance marking and is unique;
/// `face_image` is the path of the cropped face JPEG saved at registration.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub reg_number: String,
    pub year: String,
    pub course: String,
    pub face_image: String,
}

/// One attendance mark
///
/// Date and time are stored as text in `%Y-%m-%d` / `%H:%M:%S`, the same
/// shape the spreadsheet mirror uses.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub date: String,
    pub time: String,
}

/// One row of the admin report: an attendance record joined with its student
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ReportRow {
    pub name: String,
    pub reg_number: String,
    pub face_image: String,
    pub date: String,
    pub time: String,
}

/// Handle on the single-file relational store
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file at `path`.
    pub async fn connect(path: &Path) -> Result<Store, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Store { pool })
    }

    /// Idempotently create the three tables. Runs once at process start,
    /// before the server accepts requests.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                reg_number TEXT UNIQUE NOT NULL,
                year TEXT NOT NULL,
                course TEXT NOT NULL,
                face_image TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS attendance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                time TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new user row, rejecting duplicate usernames.
    ///
    /// Uniqueness rides on the UNIQUE constraint, so two concurrent signups
    /// with the same username cannot both succeed; the loser gets
    /// [`StoreError::DuplicateUsername`].
    ///
    /// # Returns
    /// * `Result<i64, StoreError>` - The id of the new row
    pub async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<i64, StoreError> {
        let result =
            sqlx::query("INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)")
                .bind(username)
                .bind(password_hash)
                .bind(role)
                .execute(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        StoreError::DuplicateUsername
                    }
                    e => StoreError::Db(e),
                })?;

        Ok(result.last_insert_rowid())
    }

    /// Look up a user by username.
    pub async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, role FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Insert a new student row, rejecting duplicate registration numbers.
    /// Atomic in the same way as [`Store::insert_user`].
    pub async fn insert_student(
        &self,
        name: &str,
        reg_number: &str,
        year: &str,
        course: &str,
        face_image: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO students (name, reg_number, year, course, face_image)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(reg_number)
        .bind(year)
        .bind(course)
        .bind(face_image)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateRegNumber
            }
            e => StoreError::Db(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Look up a student by registration number.
    pub async fn find_student_by_reg(
        &self,
        reg_number: &str,
    ) -> Result<Option<Student>, StoreError> {
        let student = sqlx::query_as::<_, Student>(
            "SELECT id, name, reg_number, year, course, face_image
             FROM students WHERE reg_number = ?",
        )
        .bind(reg_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }

    /// Insert one attendance mark. Marking twice per day for the same
    /// student is allowed; there is no deduplication.
    pub async fn insert_attendance(
        &self,
        student_id: i64,
        date: &str,
        time: &str,
    ) -> Result<i64, StoreError> {
        let result =
            sqlx::query("INSERT INTO attendance (student_id, date, time) VALUES (?, ?, ?)")
                .bind(student_id)
                .bind(date)
                .bind(time)
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    /// All attendance rows joined with their student, in insertion order.
    pub async fn attendance_report(&self) -> Result<Vec<ReportRow>, StoreError> {
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT students.name, students.reg_number, students.face_image,
                    attendance.date, attendance.time
             FROM attendance
             INNER JOIN students ON attendance.student_id = students.id
             ORDER BY attendance.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The attendance rows in the shape the spreadsheet mirror wants,
    /// used to seed the exporter at startup.
    pub async fn export_rows(&self) -> Result<Vec<SheetRow>, StoreError> {
        let rows = sqlx::query_as::<_, SheetRow>(
            "SELECT attendance.student_id, students.reg_number,
                    attendance.date, attendance.time
             FROM attendance
             INNER JOIN students ON attendance.student_id = students.id
             ORDER BY attendance.id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
