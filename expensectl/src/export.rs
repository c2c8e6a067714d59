//! CSV and XLSX expense reports.

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use thiserror::Error;

use crate::api::models::expenses::ExpenseResponse;
use crate::errors::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER_BACKGROUND: u32 = 0x366092;
const MAX_COLUMN_WIDTH: usize = 50;

const COLUMNS: [&str; 8] = [
    "Date",
    "Vendor",
    "Bill Type",
    "Amount (INR)",
    "Status",
    "HR Notes",
    "Created At",
    "Updated At",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv writer: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv buffer: {0}")]
    Buffer(#[from] std::io::Error),

    #[error("xlsx writer: {0}")]
    Xlsx(#[from] XlsxError),
}

impl From<ExportError> for Error {
    fn from(err: ExportError) -> Self {
        Error::Internal {
            operation: format!("export expenses: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    /// `csv` in any case selects CSV; anything else, including nothing, is XLSX.
    pub fn from_query(format: Option<&str>) -> Self {
        match format {
            Some(f) if f.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Xlsx,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

/// Whose expenses a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    /// The caller's own expenses
    Own,
    /// Every user's expenses, with a leading "User Email" column
    All,
}

impl ExportScope {
    fn sheet_name(&self) -> &'static str {
        match self {
            ExportScope::Own => "Expenses",
            ExportScope::All => "All Expenses",
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            ExportScope::Own => "expenses",
            ExportScope::All => "all_expenses",
        }
    }

    fn headers(&self) -> Vec<&'static str> {
        match self {
            ExportScope::Own => COLUMNS.to_vec(),
            ExportScope::All => std::iter::once("User Email").chain(COLUMNS).collect(),
        }
    }
}

/// A rendered report ready to be sent as an attachment.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// One report row per expense, as text cells in header order.
pub fn rows(scope: ExportScope, expenses: &[ExpenseResponse]) -> Vec<Vec<String>> {
    expenses
        .iter()
        .map(|expense| {
            let bill = &expense.extracted_data;
            let mut row = Vec::with_capacity(COLUMNS.len() + 1);
            if scope == ExportScope::All {
                row.push(expense.user_email.clone().unwrap_or_default());
            }
            row.extend([
                bill.date.clone().unwrap_or_default(),
                bill.details.clone().unwrap_or_default(),
                bill.bill_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
                bill.reporting_amount(),
                expense.status.as_str().to_string(),
                expense.hr_notes.clone().unwrap_or_default(),
                timestamp(&expense.created_at),
                timestamp(&expense.updated_at),
            ]);
            row
        })
        .collect()
}

/// Render `expenses` in `format`. The file name carries `now`'s date.
pub fn render(format: ExportFormat, scope: ExportScope, expenses: &[ExpenseResponse], now: DateTime<Utc>) -> Result<Report, ExportError> {
    let headers = scope.headers();
    let rows = rows(scope, expenses);

    let bytes = match format {
        ExportFormat::Csv => write_csv(&headers, &rows)?,
        ExportFormat::Xlsx => write_xlsx(scope.sheet_name(), &headers, &rows)?,
    };

    Ok(Report {
        filename: format!("{}_{}.{}", scope.file_prefix(), now.format("%Y%m%d"), format.extension()),
        content_type: format.content_type(),
        bytes,
    })
}

fn write_csv(headers: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| ExportError::Buffer(e.into_error()))
}

fn write_xlsx(sheet_name: &str, headers: &[&str], rows: &[Vec<String>]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BACKGROUND))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);
    let cell_format = Format::new().set_align(FormatAlign::Left).set_align(FormatAlign::VerticalCenter);

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string_with_format(row_idx as u32 + 1, col as u16, value, &cell_format)?;
        }
    }

    for (col, width) in column_widths(headers, rows).into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Longest cell in each column (header included) plus two, capped.
fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let longest = rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0);
            (longest + 2).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::expenses::ExpenseStatus;
    use crate::extraction::{ExtractionDraft, normalize};
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn expense(data: serde_json::Value, status: ExpenseStatus, notes: Option<&str>) -> ExpenseResponse {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap();
        ExpenseResponse {
            expense_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            image_path: "uploads/expenses/x.png".to_string(),
            extracted_data: normalize(ExtractionDraft::from_value(data)),
            status,
            hr_notes: notes.map(str::to_string),
            created_at: at,
            updated_at: at,
            user_email: None,
        }
    }

    #[test]
    fn test_format_selection() {
        assert_eq!(ExportFormat::from_query(Some("csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_query(Some("CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_query(Some("pdf")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_query(None), ExportFormat::Xlsx);
    }

    #[test]
    fn test_row_cells() {
        let expenses = vec![
            expense(
                json!({"Date": "05-01-2024", "Bill Type": "cab", "Bill Amount": "$25", "Bill Amount (INR)": "₹2,075.00", "Details": "from: A - to: B"}),
                ExpenseStatus::Approved,
                Some("ok"),
            ),
            expense(json!({"Date": "06-01-2024"}), ExpenseStatus::Pending, None),
        ];

        let rows = rows(ExportScope::Own, &expenses);
        assert_eq!(
            rows[0],
            vec![
                "05-01-2024",
                "From: A - To: B",
                "cab",
                "2075.00",
                "approved",
                "ok",
                "2024-01-05 09:30:00",
                "2024-01-05 09:30:00"
            ]
        );
        assert_eq!(rows[1][3], "0");
        assert_eq!(rows[1][5], "");
    }

    #[test]
    fn test_csv_report() {
        let expenses = vec![expense(
            json!({"Date": "05-01-2024", "Bill Type": "food", "Bill Amount": "₹500", "Details": "XYZ Restaurant, Pune"}),
            ExpenseStatus::Pending,
            None,
        )
        .with_user_email("a@example.com")];

        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let report = render(ExportFormat::Csv, ExportScope::All, &expenses, now).unwrap();
        assert_eq!(report.filename, "all_expenses_20240201.csv");
        assert_eq!(report.content_type, "text/csv");

        let text = String::from_utf8(report.bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "User Email,Date,Vendor,Bill Type,Amount (INR),Status,HR Notes,Created At,Updated At"
        );
        assert_eq!(
            lines.next().unwrap(),
            "a@example.com,05-01-2024,\"XYZ Restaurant, Pune\",food,500,pending,,2024-01-05 09:30:00,2024-01-05 09:30:00"
        );
    }

    #[test]
    fn test_xlsx_report() {
        let expenses = vec![expense(json!({"Date": "05-01-2024", "Bill Amount": "₹500"}), ExpenseStatus::Pending, None)];
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let report = render(ExportFormat::Xlsx, ExportScope::Own, &expenses, now).unwrap();
        assert_eq!(report.filename, "expenses_20240201.xlsx");
        // xlsx files are zip archives
        assert_eq!(&report.bytes[..2], b"PK");
    }

    #[test]
    fn test_column_widths_are_capped() {
        let rows = vec![vec!["x".repeat(80), "ab".to_string()]];
        assert_eq!(column_widths(&["Long", "Vendor"], &rows), vec![50, 8]);
    }
}
