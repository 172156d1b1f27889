use std::path::Path;

use crate::booth::*;

/// One voter read from a roster file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RosterEntry {
    /// The row in the file, starting at 1.
    pub lineno: usize,
    pub school_id: String,
    pub name: String,
}

impl RosterEntry {
    /// Blank rows are skipped.
    pub fn from_cells(lineno: usize, school_id: &str, name: &str) -> Option<RosterEntry> {
        if school_id.trim().is_empty() && name.trim().is_empty() {
            return None;
        }
        Some(RosterEntry {
            lineno,
            school_id: school_id.trim().to_string(),
            name: name.trim().to_string(),
        })
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn read_roster(path: &str, source: &VoterSource) -> BoothResult<Vec<RosterEntry>> {
    info!(
        "Attempting to read roster file {:?} ({})",
        simplify_file_name(path),
        source.provider
    );
    let res = match source.provider.as_str() {
        "csv" => crate::booth::io_csv::read_csv_roster(path, source)?,
        "xlsx" => crate::booth::io_xlsx::read_xlsx_roster(path, source)?,
        x => whatever!("Provider not implemented {:?}", x),
    };
    debug!("read_roster: {} entries in {:?}", res.len(), path);
    Ok(res)
}
