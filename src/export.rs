use std::fs;
use std::path::PathBuf;

use rust_xlsxwriter::Workbook;
use thiserror::Error;

/// Errors from the spreadsheet mirror
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One row of the attendance workbook
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SheetRow {
    pub student_id: i64,
    pub reg_number: String,
    pub date: String,
    pub time: String,
}

/// The XLSX attendance mirror
///
/// The exporter owns the full row set in memory and rewrites the workbook on
/// every append. It is driven as a single writer behind a mutex in app
/// state, so concurrent attendance marks cannot interleave their rewrites
/// and lose rows. Rows are seeded from the relational store at startup;
/// the workbook itself is never read back.
pub struct AttendanceSheet {
    path: PathBuf,
    rows: Vec<SheetRow>,
}

const HEADERS: [&str; 4] = ["Student ID", "Registration Number", "Date", "Time"];

impl AttendanceSheet {
    pub fn new(path: PathBuf) -> AttendanceSheet {
        AttendanceSheet {
            path,
            rows: Vec::new(),
        }
    }

    /// Replace the in-memory row set, without touching the file. Called once
    /// at startup with the rows already in the relational store.
    pub fn seed(&mut self, rows: Vec<SheetRow>) {
        self.rows = rows;
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }

    /// Append one row and rewrite the workbook.
    ///
    /// The file is written to a sibling temp path and renamed into place, so
    /// a crash mid-write never leaves a truncated workbook behind.
    pub fn append(&mut self, row: SheetRow) -> Result<(), ExportError> {
        self.rows.push(row);
        self.write()
    }

    fn write(&self) -> Result<(), ExportError> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();

        for (col, header) in HEADERS.iter().copied().enumerate() {
            worksheet.write_string(0, col as u16, header)?;
        }

        for (i, row) in self.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            worksheet.write_number(r, 0, row.student_id as f64)?;
            worksheet.write_string(r, 1, &row.reg_number)?;
            worksheet.write_string(r, 2, &row.date)?;
            worksheet.write_string(r, 3, &row.time)?;
        }

        let tmp = self.path.with_extension("xlsx.tmp");
        workbook.save(&tmp)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(student_id: i64, time: &str) -> SheetRow {
        SheetRow {
            student_id,
            reg_number: format!("R{student_id}"),
            date: "2026-08-30".to_string(),
            time: time.to_string(),
        }
    }

    #[test]
    fn append_creates_and_grows_the_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attendance.xlsx");
        let mut sheet = AttendanceSheet::new(path.clone());

        sheet.append(row(1, "09:00:00")).unwrap();
        assert!(path.exists());
        assert_eq!(sheet.rows().len(), 1);

        sheet.append(row(1, "09:05:00")).unwrap();
        assert_eq!(sheet.rows().len(), 2);
        assert_eq!(sheet.rows()[0].time, "09:00:00");
        assert_eq!(sheet.rows()[1].time, "09:05:00");
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn seeded_rows_come_before_appended_rows() {
        let dir = TempDir::new().unwrap();
        let mut sheet = AttendanceSheet::new(dir.path().join("attendance.xlsx"));

        sheet.seed(vec![row(1, "08:00:00"), row(2, "08:30:00")]);
        sheet.append(row(3, "09:00:00")).unwrap();

        let times: Vec<&str> = sheet.rows().iter().map(|r| r.time.as_str()).collect();
        assert_eq!(times, ["08:00:00", "08:30:00", "09:00:00"]);
    }

    #[test]
    fn no_file_is_written_until_first_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("attendance.xlsx");
        let mut sheet = AttendanceSheet::new(path.clone());

        sheet.seed(Vec::new());
        assert!(!path.exists());

        sheet.append(row(1, "09:00:00")).unwrap();
        assert!(path.exists());
    }
}
