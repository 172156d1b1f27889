// Primitives for reading CSV rosters.

use crate::booth::{io_common::RosterEntry, *};

pub fn read_csv_roster(path: &str, source: &VoterSource) -> BoothResult<Vec<RosterEntry>> {
    let first_row = source.first_row_index()?;
    let school_id_idx = source.school_id_column_index()?;
    let name_idx = source.name_column_index()?;

    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut res: Vec<RosterEntry> = Vec::new();
    // The index starts at 1 to respect most conventions in the excel world
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        if lineno < first_row {
            continue;
        }
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_csv_roster: lineno: {:?} row: {:?}", lineno, line);
        if line.iter().all(|s| s.trim().is_empty()) {
            continue;
        }
        let school_id = line
            .get(school_id_idx)
            .context(CsvLineTooShortSnafu { lineno })?;
        let name = line.get(name_idx).context(CsvLineTooShortSnafu { lineno })?;
        if let Some(entry) = RosterEntry::from_cells(lineno, school_id, name) {
            res.push(entry);
        }
    }
    Ok(res)
}
