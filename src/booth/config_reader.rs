use crate::booth::*;

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "voteLimit")]
    pub vote_limit: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub id: Option<String>,
    /// The name or the identifier of the position.
    pub position: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub platform: Option<String>,
    pub photo: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoterConfig {
    #[serde(rename = "schoolId")]
    pub school_id: String,
    pub name: String,
}

/// A roster file to register voters from.
///
/// Row and column indices start at 1 (as in spreadsheets) and may be given
/// as numbers or strings. By default, the first row is a header, the school
/// ID is in the first column and the name in the second one.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoterSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "firstRowIndex")]
    _first_row_index: Option<JSValue>,
    #[serde(rename = "schoolIdColumnIndex")]
    _school_id_column_index: Option<JSValue>,
    #[serde(rename = "nameColumnIndex")]
    _name_column_index: Option<JSValue>,
    #[serde(rename = "worksheetName")]
    pub worksheet_name: Option<String>,
}

impl VoterSource {
    pub fn new(provider: &str, file_path: &str, worksheet_name: Option<String>) -> VoterSource {
        VoterSource {
            provider: provider.to_string(),
            file_path: file_path.to_string(),
            _first_row_index: None,
            _school_id_column_index: None,
            _name_column_index: None,
            worksheet_name,
        }
    }

    /// The first row to read, starting at 1.
    pub fn first_row_index(&self) -> BoothResult<usize> {
        read_js_int(&self._first_row_index, 2)
    }

    /// The column of the school IDs, starting at 0.
    pub fn school_id_column_index(&self) -> BoothResult<usize> {
        let x = read_js_int(&self._school_id_column_index, 1)?;
        Ok(x - 1)
    }

    /// The column of the names, starting at 0.
    pub fn name_column_index(&self) -> BoothResult<usize> {
        let x = read_js_int(&self._name_column_index, 2)?;
        Ok(x - 1)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    #[serde(rename = "electionName")]
    pub election_name: Option<String>,
    #[serde(default)]
    pub positions: Vec<PositionConfig>,
    #[serde(default)]
    pub candidates: Vec<CandidateConfig>,
    #[serde(default)]
    pub voters: Vec<VoterConfig>,
    #[serde(rename = "voterSources", default)]
    pub voter_sources: Vec<VoterSource>,
}

pub fn read_config(path: &str) -> BoothResult<ElectionConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: ElectionConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// Reads a results report written by a previous run.
pub fn read_summary(path: &str) -> BoothResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    ensure_whatever!(
        js["results"].is_array(),
        "The reference file {} has no results",
        path
    );
    Ok(js)
}

/// A 1-based index, with a default when it is missing.
fn read_js_int(x: &Option<JSValue>, default: usize) -> BoothResult<usize> {
    let res = match x {
        None | Some(JSValue::Null) => Some(default),
        Some(JSValue::Number(n)) => n.as_u64().map(|x| x as usize),
        Some(JSValue::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    match res {
        Some(idx) if idx >= 1 => Ok(idx),
        _ => ParsingJsonNumberSnafu {}.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(js: JSValue) -> VoterSource {
        serde_json::from_value(js).unwrap()
    }

    #[test]
    fn indices_accept_numbers_and_strings() {
        let s = source(json!({
            "provider": "csv",
            "filePath": "roster.csv",
            "firstRowIndex": "3",
            "schoolIdColumnIndex": 2,
            "nameColumnIndex": " 4 "
        }));
        assert_eq!(s.first_row_index().unwrap(), 3);
        assert_eq!(s.school_id_column_index().unwrap(), 1);
        assert_eq!(s.name_column_index().unwrap(), 3);
        assert_eq!(s.worksheet_name, None);
    }

    #[test]
    fn missing_indices_use_defaults() {
        let s = VoterSource::new("xlsx", "roster.xlsx", Some("Sheet1".to_string()));
        assert_eq!(s.first_row_index().unwrap(), 2);
        assert_eq!(s.school_id_column_index().unwrap(), 0);
        assert_eq!(s.name_column_index().unwrap(), 1);
    }

    #[test]
    fn bad_indices_are_rejected() {
        for bad in [json!(0), json!("zero"), json!(-1), json!([1])] {
            let s = source(json!({
                "provider": "csv",
                "filePath": "roster.csv",
                "schoolIdColumnIndex": bad
            }));
            assert!(matches!(
                s.school_id_column_index(),
                Err(BoothError::ParsingJsonNumber {})
            ));
        }
    }

    #[test]
    fn minimal_config() {
        let config: ElectionConfig = serde_json::from_value(json!({
            "positions": [{"name": "President"}],
            "candidates": [{"position": "President", "firstName": "A", "lastName": "B"}]
        }))
        .unwrap();
        assert_eq!(config.election_name, None);
        assert_eq!(config.positions[0].vote_limit, None);
        assert_eq!(config.candidates[0].platform, None);
        assert!(config.voters.is_empty());
        assert!(config.voter_sources.is_empty());
    }

    #[test]
    fn missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nothing.json").display().to_string();
        assert!(matches!(
            read_config(&p),
            Err(BoothError::OpeningJson { .. })
        ));
        std::fs::write(dir.path().join("bad.json"), "{\"results\": 3}").unwrap();
        let p = dir.path().join("bad.json").display().to_string();
        assert!(matches!(
            read_summary(&p),
            Err(BoothError::Whatever { .. })
        ));
    }
}
