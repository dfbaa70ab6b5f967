use std::env;
use std::path::PathBuf;

/// Runtime configuration for the attendance server
///
/// Every field can be overridden through an environment variable; a `.env`
/// file in the working directory is honored as well. Defaults mirror the
/// layout the server creates on first start: a single-file database, one
/// directory of per-student face images, one directory of raw debug frames,
/// and the XLSX attendance mirror next to them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to (`ATTENDANCE_BIND`)
    pub bind_addr: String,

    /// Path of the SQLite database file (`ATTENDANCE_DB`)
    pub database_path: PathBuf,

    /// Directory holding the cropped per-student face JPEGs (`ATTENDANCE_IMAGE_DIR`)
    pub image_dir: PathBuf,

    /// Directory holding the raw per-capture debug frames (`ATTENDANCE_DEBUG_DIR`)
    pub debug_dir: PathBuf,

    /// Path of the XLSX attendance mirror (`ATTENDANCE_WORKBOOK`)
    pub workbook_path: PathBuf,

    /// Session lifetime in hours (`ATTENDANCE_SESSION_HOURS`)
    pub session_hours: u64,

    /// Index of the camera device used for face capture (`ATTENDANCE_CAMERA`)
    pub camera_index: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:3000".to_string(),
            database_path: PathBuf::from("attendance.db"),
            image_dir: PathBuf::from("student_images"),
            debug_dir: PathBuf::from("debug_frames"),
            workbook_path: PathBuf::from("attendance.xlsx"),
            session_hours: 24,
            camera_index: 0,
        }
    }
}

impl Config {
    /// Build a configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            bind_addr: env_or("ATTENDANCE_BIND", defaults.bind_addr),
            database_path: env_or("ATTENDANCE_DB", defaults.database_path),
            image_dir: env_or("ATTENDANCE_IMAGE_DIR", defaults.image_dir),
            debug_dir: env_or("ATTENDANCE_DEBUG_DIR", defaults.debug_dir),
            workbook_path: env_or("ATTENDANCE_WORKBOOK", defaults.workbook_path),
            session_hours: env::var("ATTENDANCE_SESSION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.session_hours),
            camera_index: env::var("ATTENDANCE_CAMERA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.camera_index),
        }
    }
}

fn env_or<T: From<String>>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) if !value.is_empty() => T::from(value),
        _ => default,
    }
}
