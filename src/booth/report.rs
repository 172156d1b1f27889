use std::fs;

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::booth::*;

fn tally_to_json(pt: &PositionTally) -> JSValue {
    let mut tally: Vec<JSValue> = Vec::new();
    for (candidate, count) in pt.tally.iter() {
        tally.push(json!({
            "candidate": candidate.display_name(),
            "candidateId": candidate.id,
            "votes": count,
        }));
    }
    let leaders: Vec<JSValue> = pt.leaders().iter().map(|c| json!(c.id)).collect();
    let mut js: JSMap<String, JSValue> = JSMap::new();
    js.insert("position".to_string(), json!(pt.position.name));
    js.insert("positionId".to_string(), json!(pt.position.id));
    js.insert("tally".to_string(), JSValue::Array(tally));
    js.insert("leaders".to_string(), JSValue::Array(leaders));
    // Only reported when some votes point to removed candidates.
    if pt.orphaned > 0 {
        js.insert("orphaned".to_string(), json!(pt.orphaned));
    }
    JSValue::Object(js)
}

/// The results in JSON format: the tallies in ballot order, and the turnout.
pub fn build_results_js(tallies: &[PositionTally], turnout: &Turnout) -> JSValue {
    let results: Vec<JSValue> = tallies.iter().map(tally_to_json).collect();
    json!({
        "turnout": turnout,
        "results": results,
    })
}

/// Writes the results to a file, or to the standard output when `out` is
/// empty or `stdout`. Returns the pretty-printed JSON.
pub fn write_results(result_js: &JSValue, out: Option<&str>) -> BoothResult<String> {
    let pretty_js = serde_json::to_string_pretty(result_js).context(ParsingJsonSnafu {})?;
    match out {
        None | Some("") | Some("stdout") => {
            println!("{}", pretty_js);
        }
        Some(path) => {
            fs::write(path, &pretty_js).context(WritingOutputSnafu { path })?;
            info!("Results written to {:?}", path);
        }
    }
    Ok(pretty_js)
}

/// Compares the results with a reference report, and prints the differences.
pub fn check_reference(pretty_js: &str, reference_path: &str) -> BoothResult<()> {
    let summary_ref = read_summary(reference_path)?;
    debug!("check_reference: {:?}", summary_ref);
    let pretty_js_ref = serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
    if pretty_js_ref != pretty_js {
        warn!("Found differences with the reference string");
        print_diff(pretty_js_ref.as_str(), pretty_js, "\n");
        whatever!("Difference detected between the results and the reference results")
    }
    Ok(())
}
