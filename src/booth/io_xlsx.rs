// Primitives for reading Excel rosters.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::booth::{io_common::RosterEntry, *};

pub fn read_xlsx_roster(path: &str, source: &VoterSource) -> BoothResult<Vec<RosterEntry>> {
    let wrange = get_range(path, source)?;
    let first_row = source.first_row_index()?;
    let school_id_idx = source.school_id_column_index()?;
    let name_idx = source.name_column_index()?;

    let end_row = match wrange.end() {
        Some((row, _)) => row as usize,
        None => {
            info!("read_xlsx_roster: empty worksheet in {:?}", path);
            return Ok(Vec::new());
        }
    };

    let mut res: Vec<RosterEntry> = Vec::new();
    // Positions in the range are absolute, starting at 0.
    for row in (first_row - 1)..=end_row {
        let lineno = row + 1;
        let school_id = read_cell(
            wrange.get_value((row as u32, school_id_idx as u32)),
            lineno,
        )?;
        let name = read_cell(wrange.get_value((row as u32, name_idx as u32)), lineno)?;
        debug!(
            "read_xlsx_roster: lineno: {:?} school_id: {:?} name: {:?}",
            lineno, school_id, name
        );
        if let Some(entry) = RosterEntry::from_cells(lineno, &school_id, &name) {
            res.push(entry);
        }
    }
    Ok(res)
}

fn get_range(path: &str, source: &VoterSource) -> BoothResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, &source.worksheet_name
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    let wrange_o = match source.worksheet_name.as_ref() {
        Some(worksheet_name) => workbook.worksheet_range(worksheet_name),
        None => workbook.worksheet_range_at(0),
    };
    let wrange = wrange_o
        .context(EmptyExcelSnafu { path })?
        .context(OpeningExcelSnafu { path })?;
    Ok(wrange)
}

/// School IDs are often typed as numbers in spreadsheets: integral numbers
/// are read without a decimal part.
fn read_cell(cell: Option<&DataType>, lineno: usize) -> BoothResult<String> {
    match cell {
        None | Some(DataType::Empty) => Ok("".to_string()),
        Some(DataType::String(s)) => Ok(s.clone()),
        Some(DataType::Int(i)) => Ok(i.to_string()),
        Some(DataType::Float(f)) if f.fract() == 0.0 => Ok(format!("{}", *f as i64)),
        Some(DataType::Float(f)) => Ok(f.to_string()),
        Some(x) => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", x),
        }
        .fail(),
    }
}
