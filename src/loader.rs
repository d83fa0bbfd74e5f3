//! File acceptance and spreadsheet decoding.
//!
//! A candidate file is accepted when its MIME type mentions "sheet" or its
//! name ends in `.xls`/`.xlsx` (any case). Accepted files are decoded with
//! calamine: only the first sheet is read and its first non-empty row names
//! the columns.

use crate::dataset::{CellValue, Record};
use crate::error::IngestError;
use std::io;
use std::path::Path;

const EXCEL_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// A file offered for ingestion, as a browser would hand it over: a name, an
/// optional declared type and the raw content.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    /// Reads a file from disk. No MIME type is declared, so acceptance rests
    /// on the extension alone.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)?;
        Ok(Self::new(name, None, bytes))
    }
}

pub fn is_spreadsheet(name: &str, mime_type: Option<&str>) -> bool {
    if mime_type.is_some_and(|mime| mime.contains("sheet")) {
        return true;
    }
    let lower = name.to_lowercase();
    EXCEL_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Accepts and decodes a candidate file into ordered row records.
///
/// # Arguments
/// * `file` - The file to read
///
/// # Returns
/// * `Ok(records)` - One record per non-empty data row
/// * `Err(IngestError::Rejected)` - The file is not a spreadsheet; nothing was read
/// * `Err(IngestError::Parse)` - The decoder failed; carries its message
pub fn load_records(file: &CandidateFile) -> Result<Vec<Record>, IngestError> {
    if !is_spreadsheet(&file.name, file.mime_type.as_deref()) {
        return Err(IngestError::Rejected {
            file_name: file.name.clone(),
        });
    }

    decode_workbook(&file.bytes).map_err(|message| IngestError::Parse {
        file_name: file.name.clone(),
        message,
    })
}

#[cfg(feature = "web")]
fn decode_workbook(bytes: &[u8]) -> Result<Vec<Record>, String> {
    use calamine::{Reader, open_workbook_auto_from_rs};
    use std::io::Cursor;

    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| e.to_string())?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook contains no sheets".to_string())?
        .map_err(|e| e.to_string())?;

    let mut rows = range
        .rows()
        .skip_while(|row| row.iter().all(|cell| cell_value(cell).is_none()));

    let header = match rows.next() {
        Some(row) => header_names(row),
        None => return Ok(Vec::new()),
    };

    let records = rows
        .filter_map(|row| {
            let record: Record = header
                .iter()
                .zip(row)
                .filter_map(|(name, cell)| cell_value(cell).map(|value| (name.clone(), value)))
                .collect();
            (!record.is_empty()).then_some(record)
        })
        .collect();

    Ok(records)
}

#[cfg(not(feature = "web"))]
fn decode_workbook(_bytes: &[u8]) -> Result<Vec<Record>, String> {
    Err("Excel support requires the 'web' feature".into())
}

#[cfg(feature = "web")]
fn cell_value(cell: &calamine::Data) -> Option<CellValue> {
    use calamine::Data;

    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Text(b.to_string())),
        // Serial day number, the same value the sheet stores.
        Data::DateTime(dt) => Some(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
        Data::Error(e) => Some(CellValue::Text(e.to_string())),
    }
}

/// Column names from the header row. Blank cells become `__EMPTY`, repeats
/// get a numeric suffix (`Name`, `Name_1`, ...).
#[cfg(feature = "web")]
fn header_names(row: &[calamine::Data]) -> Vec<String> {
    use std::collections::HashSet;

    let mut used = HashSet::new();
    row.iter()
        .map(|cell| {
            let base = cell_value(cell)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "__EMPTY".to_string());

            let mut name = base.clone();
            let mut suffix = 0;
            while !used.insert(name.clone()) {
                suffix += 1;
                name = format!("{}_{}", base, suffix);
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptance_by_extension_or_mime() {
        assert!(is_spreadsheet("report.xlsx", None));
        assert!(is_spreadsheet("LEGACY.XLS", None));
        assert!(is_spreadsheet(
            "download",
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        ));
        assert!(!is_spreadsheet("notes.txt", Some("text/plain")));
        assert!(!is_spreadsheet("data.csv", None));
    }

    #[test]
    fn rejected_file_is_never_decoded() {
        let file = CandidateFile::new("notes.txt", Some("text/plain".into()), b"garbage".to_vec());
        assert_eq!(
            load_records(&file),
            Err(IngestError::Rejected {
                file_name: "notes.txt".into()
            })
        );
    }

    #[cfg(feature = "web")]
    mod decoding {
        use super::super::*;
        use rust_xlsxwriter::Workbook;

        fn xlsx(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> CandidateFile {
            let mut workbook = Workbook::new();
            build(workbook.add_worksheet());
            let bytes = workbook.save_to_buffer().unwrap();
            CandidateFile::new("fixture.xlsx", None, bytes)
        }

        #[test]
        fn rows_become_records_keyed_by_header() {
            let file = xlsx(|ws| {
                ws.write_string(0, 0, "Region").unwrap();
                ws.write_string(0, 1, "Units").unwrap();
                ws.write_string(1, 0, "North").unwrap();
                ws.write_number(1, 1, 12.0).unwrap();
                ws.write_string(2, 0, "South").unwrap();
                ws.write_number(2, 1, 7.5).unwrap();
            });

            let records = load_records(&file).unwrap();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0]["Region"], CellValue::Text("North".into()));
            assert_eq!(records[1]["Units"], CellValue::Number(7.5));
            let keys: Vec<&String> = records[0].keys().collect();
            assert_eq!(keys, vec!["Region", "Units"]);
        }

        #[test]
        fn empty_cells_are_omitted_and_blank_rows_skipped() {
            let file = xlsx(|ws| {
                ws.write_string(0, 0, "A").unwrap();
                ws.write_string(0, 1, "B").unwrap();
                ws.write_number(1, 1, 1.0).unwrap();
                // row 2 left blank
                ws.write_number(3, 0, 2.0).unwrap();
                ws.write_number(3, 1, 3.0).unwrap();
            });

            let records = load_records(&file).unwrap();
            assert_eq!(records.len(), 2);
            assert!(!records[0].contains_key("A"));
            assert_eq!(records[1]["A"], CellValue::Number(2.0));
        }

        #[test]
        fn blank_and_duplicate_headers_are_renamed() {
            let file = xlsx(|ws| {
                ws.write_string(0, 0, "Name").unwrap();
                ws.write_string(0, 2, "Name").unwrap();
                ws.write_string(0, 4, "Flag").unwrap();
                for col in 0..4 {
                    ws.write_number(1, col, col as f64 + 1.0).unwrap();
                }
                ws.write_boolean(1, 4, true).unwrap();
            });

            let records = load_records(&file).unwrap();
            let keys: Vec<&str> = records[0].keys().map(|k| k.as_str()).collect();
            assert_eq!(keys, vec!["Name", "__EMPTY", "Name_1", "__EMPTY_1", "Flag"]);
            assert_eq!(records[0]["Flag"], CellValue::Text("true".into()));
        }

        #[test]
        fn header_only_sheet_has_no_records() {
            let file = xlsx(|ws| {
                ws.write_string(0, 0, "Lonely").unwrap();
            });
            assert!(load_records(&file).unwrap().is_empty());
        }

        #[test]
        fn corrupt_content_reports_parse_error() {
            let file = CandidateFile::new("broken.xlsx", None, b"definitely not a zip".to_vec());
            match load_records(&file) {
                Err(IngestError::Parse { file_name, message }) => {
                    assert_eq!(file_name, "broken.xlsx");
                    assert!(!message.is_empty());
                }
                other => panic!("expected parse error, got {:?}", other),
            }
        }
    }
}
