use log::{debug, info, warn};

use ballot_box::builder::Builder;
use ballot_box::store::{load_records, save_records, Collection, JsonDirStore, RecordStore};
use ballot_box::*;
use snafu::{prelude::*, Snafu};

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::args::{Args, Command};
use crate::booth::config_reader::*;
use crate::booth::io_common::{read_roster, RosterEntry};
use crate::booth::report::*;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_xlsx;
pub mod report;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BoothError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Excel file {path} has no worksheet to read"))]
    EmptyExcel { path: String },
    #[snafu(display("Unexpected cell on row {lineno}: {content}"))]
    ExcelWrongCellType { lineno: usize, content: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a positive index (number or string of digits)"))]
    ParsingJsonNumber {},
    #[snafu(display("Could not find the directory of the configuration file"))]
    MissingParentDir {},
    #[snafu(display("Error writing file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("CSV line {lineno} is too short"))]
    CsvLineTooShort { lineno: usize },
    #[snafu(display("{source}"))]
    Ballot { source: BallotError },
    #[snafu(display("Error accessing the election records: {source}"))]
    Storage { source: ballot_box::store::StoreError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type BoothResult<T> = Result<T, BoothError>;

/// The voter holding the booth between two invocations of the program.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CurrentSession {
    #[serde(rename = "voterId")]
    pub voter_id: VoterId,
    #[serde(rename = "schoolId")]
    pub school_id: String,
    #[serde(default)]
    pub staged: Option<CandidateId>,
}

fn read_current(store: &dyn RecordStore) -> BoothResult<Option<CurrentSession>> {
    let records: Vec<CurrentSession> =
        load_records(store, Collection::CurrentSession).context(StorageSnafu {})?;
    Ok(records.into_iter().next())
}

fn save_current(store: &dyn RecordStore, session: &BallotSession<Election>) -> BoothResult<()> {
    let snapshot = session.snapshot();
    match snapshot.voter {
        None => store
            .clear(Collection::CurrentSession)
            .context(StorageSnafu {}),
        Some(v) => {
            let current = CurrentSession {
                voter_id: v.id,
                school_id: v.school_id,
                staged: snapshot.staged_candidate_id,
            };
            save_records(store, Collection::CurrentSession, &[current]).context(StorageSnafu {})
        }
    }
}

/// Rebuilds the session of the voter holding the booth, if any.
fn restore_session(
    election: &Arc<Election>,
    store: &dyn RecordStore,
) -> BoothResult<BallotSession<Election>> {
    let mut session = election.open_session();
    if let Some(current) = read_current(store)? {
        debug!("restore_session: {:?}", current);
        match session.login(&current.school_id) {
            Ok(_) => {
                if let Some(staged) = current.staged.as_ref() {
                    if let Err(e) = session.select(staged) {
                        warn!("Dropping the staged choice {}: {}", staged, e);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Closing the session of {}: {}",
                    current.school_id, e
                );
                store
                    .clear(Collection::CurrentSession)
                    .context(StorageSnafu {})?;
            }
        }
    }
    Ok(session)
}

fn resolve_position(election: &Election, key: &str) -> BoothResult<PositionId> {
    let catalog = election.catalog();
    let pid = PositionId::from(key);
    if catalog.position(&pid).is_some() {
        return Ok(pid);
    }
    match catalog.find_position_by_name(key) {
        Some(p) => Ok(p.id.clone()),
        None => whatever!("No position found for {:?}", key),
    }
}

fn print_status(election: &Election, session: &BallotSession<Election>) {
    let snapshot = session.snapshot();
    let voter = match snapshot.voter.as_ref() {
        None => {
            println!("No voter is logged in.");
            return;
        }
        Some(v) => v,
    };
    println!("Voter: {} ({})", voter.name, voter.school_id);
    let num_positions = election.list_positions_ordered().len();
    match (snapshot.state, snapshot.current_position.as_ref()) {
        (BallotState::Active(k), Some(position)) => {
            println!(
                "Position {}/{}: {} ({})",
                k + 1,
                num_positions,
                position.name,
                position.id
            );
            for c in election.list_candidates(&position.id) {
                let staged = snapshot.staged_candidate_id.as_ref() == Some(&c.id);
                let committed = snapshot.committed_candidate_id.as_ref() == Some(&c.id);
                println!(
                    "  [{}] {} ({}){}",
                    if staged { "x" } else { " " },
                    c.display_name(),
                    c.id,
                    if committed { " *voted*" } else { "" }
                );
            }
        }
        _ => {
            println!("Ballot complete: {} positions voted.", num_positions);
        }
    }
}

/// One line per voter, followed by one line per vote. Removed positions and
/// candidates are shown by identifier.
fn voter_status_lines(election: &Election, search: Option<&str>) -> Vec<String> {
    let catalog = election.catalog();
    let mut lines: Vec<String> = Vec::new();
    for status in election.voter_statuses(search) {
        let voted = match status.last_voted {
            Some(t) => format!("Voted (last vote {})", t.format("%Y-%m-%d %H:%M:%S UTC")),
            None => "Not voted".to_string(),
        };
        lines.push(format!(
            "{} {} ({}): {}",
            status.voter.school_id, status.voter.name, status.voter.id, voted
        ));
        for vote in status.votes.iter() {
            let position = catalog
                .position(&vote.position_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| vote.position_id.to_string());
            let candidate = catalog
                .candidate(&vote.candidate_id)
                .map(|c| c.display_name())
                .unwrap_or_else(|| vote.candidate_id.to_string());
            lines.push(format!("  {}: {}", position, candidate));
        }
    }
    lines
}

fn list_voters(election: &Election, search: Option<&str>) -> BoothResult<()> {
    let lines = voter_status_lines(election, search);
    if lines.is_empty() {
        println!("No voter found.");
    }
    for line in lines.iter() {
        println!("{}", line);
    }
    Ok(())
}

fn add_roster(builder: &mut Builder, entries: &[RosterEntry]) -> usize {
    let mut skipped = 0;
    for entry in entries.iter() {
        if let Err(e) = builder.add_voter(&entry.school_id, &entry.name) {
            warn!("Skipping roster row {}: {}", entry.lineno, e);
            skipped += 1;
        }
    }
    skipped
}

fn init(store: Arc<dyn RecordStore>, config_path: Option<&str>) -> BoothResult<()> {
    store
        .clear(Collection::CurrentSession)
        .context(StorageSnafu {})?;
    let config_path = match config_path {
        None => {
            let election = Election::open(store).context(BallotSnafu {})?;
            let n = election.seed_default_positions().context(BallotSnafu {})?;
            if n == 0 {
                info!("The election already has positions, nothing to seed");
            } else {
                println!("Created {} default positions", n);
            }
            return Ok(());
        }
        Some(p) => p,
    };

    let config = read_config(config_path)?;
    info!(
        "Setting up election {:?}",
        config.election_name.clone().unwrap_or_default()
    );
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;

    let mut builder = Builder::new();
    for p in config.positions.iter() {
        builder
            .add_position(
                p.id.clone().map(PositionId::from),
                &p.name,
                p.vote_limit.unwrap_or(1),
            )
            .context(BallotSnafu {})?;
    }
    for c in config.candidates.iter() {
        builder
            .add_candidate_full(
                c.id.clone().map(CandidateId::from),
                &c.position,
                &c.first_name,
                &c.last_name,
                c.platform.as_deref().unwrap_or(""),
                c.photo.clone(),
            )
            .context(BallotSnafu {})?;
    }
    for v in config.voters.iter() {
        builder
            .add_voter(&v.school_id, &v.name)
            .context(BallotSnafu {})?;
    }
    for source in config.voter_sources.iter() {
        let p = root_p.join(&source.file_path);
        let entries = read_roster(&p.display().to_string(), source)?;
        let skipped = add_roster(&mut builder, &entries);
        info!(
            "Read {} roster rows from {:?} ({} skipped)",
            entries.len(),
            p.display(),
            skipped
        );
    }

    let election = builder.build(store).context(BallotSnafu {})?;
    if !election.ledger().is_empty() {
        let registry = election.registry();
        let unregistered = election
            .ledger()
            .snapshot()
            .iter()
            .filter(|v| !registry.contains(&v.voter_id))
            .count();
        warn!(
            "The election already holds {} votes: registered voters keep theirs and resume their ballot, {} belong to voters no longer registered",
            election.ledger().len(),
            unregistered
        );
    }
    let catalog = election.catalog();
    println!(
        "Election ready: {} positions, {} candidates, {} voters",
        catalog.positions_ordered().len(),
        catalog.candidates().len(),
        election.registry().len()
    );
    Ok(())
}

fn import_voters(
    election: &Election,
    input: &str,
    input_type: Option<&str>,
    worksheet_name: Option<String>,
) -> BoothResult<()> {
    let source = VoterSource::new(input_type.unwrap_or("csv"), input, worksheet_name);
    let entries = read_roster(input, &source)?;
    let mut added = 0;
    for entry in entries.iter() {
        match election.register_voter(&entry.school_id, &entry.name, None) {
            Ok(_) => added += 1,
            Err(e @ BallotError::DuplicateIdentifier { .. })
            | Err(e @ BallotError::InvalidField { .. }) => {
                warn!("Skipping roster row {}: {}", entry.lineno, e);
            }
            Err(e) => return Err(e).context(BallotSnafu {}),
        }
    }
    println!(
        "Registered {} voters ({} skipped)",
        added,
        entries.len() - added
    );
    Ok(())
}

fn results(
    election: &Election,
    position: Option<&str>,
    out: Option<&str>,
    reference: Option<&str>,
) -> BoothResult<()> {
    let tallies: Vec<PositionTally> = match position {
        Some(key) => {
            let pid = resolve_position(election, key)?;
            vec![election.tally(&pid).context(BallotSnafu {})?]
        }
        None => election.results().positions,
    };
    let result_js = build_results_js(&tallies, &election.turnout());
    let pretty_js = write_results(&result_js, out)?;
    if let Some(reference_p) = reference {
        check_reference(&pretty_js, reference_p)?;
    }
    Ok(())
}

fn run_booth(election: &Arc<Election>, store: &dyn RecordStore, command: &Command) -> BoothResult<()> {
    let mut session = restore_session(election, store)?;
    match command {
        Command::Login { school_id } => {
            session.login(school_id).context(BallotSnafu {})?;
        }
        Command::Status => {}
        Command::Select { candidate } => {
            session
                .select(&CandidateId::from(candidate.as_str()))
                .context(BallotSnafu {})?;
        }
        Command::Commit {
            candidate,
            position,
        } => {
            let cid = candidate.clone().map(CandidateId::from);
            let res = match position {
                Some(key) => {
                    let pid = resolve_position(election, key)?;
                    session.commit_vote_at(&pid, cid.as_ref())
                }
                None => session.commit_vote(cid.as_ref()),
            };
            res.context(BallotSnafu {})?;
        }
        Command::Back => {
            session.go_to_previous().context(BallotSnafu {})?;
        }
        Command::Restart => {
            session.restart().context(BallotSnafu {})?;
        }
        Command::Logout => {
            session.logout();
        }
        x => whatever!("Not a ballot command: {:?}", x),
    }
    save_current(store, &session)?;
    print_status(election, &session);
    Ok(())
}

pub fn run(args: &Args) -> BoothResult<()> {
    let store: Arc<dyn RecordStore> =
        Arc::new(JsonDirStore::open(&args.data).context(StorageSnafu {})?);
    debug!("run: data directory {:?}", args.data);

    if let Command::Init { config } = &args.command {
        return init(store, config.as_deref());
    }

    let election = Election::open(store.clone()).context(BallotSnafu {})?;
    match &args.command {
        Command::Init { .. } => Ok(()),
        Command::AddPosition { name, vote_limit } => {
            let p = election
                .add_position(name, *vote_limit)
                .context(BallotSnafu {})?;
            println!("{}", p.id);
            Ok(())
        }
        Command::EditPosition {
            id,
            name,
            vote_limit,
        } => {
            let pid = PositionId::from(id.as_str());
            let vote_limit = match vote_limit {
                Some(n) => *n,
                None => match election.catalog().position(&pid) {
                    Some(p) => p.vote_limit,
                    None => whatever!("No position found for {:?}", id),
                },
            };
            election
                .edit_position(&pid, name, vote_limit)
                .context(BallotSnafu {})?;
            Ok(())
        }
        Command::RemovePosition { id } => {
            let p = election
                .remove_position(&PositionId::from(id.as_str()))
                .context(BallotSnafu {})?;
            println!("Removed position {:?}", p.name);
            Ok(())
        }
        Command::MovePosition { id, ordinal } => election
            .move_position(&PositionId::from(id.as_str()), *ordinal)
            .context(BallotSnafu {}),
        Command::AddCandidate {
            position,
            first_name,
            last_name,
            platform,
        } => {
            let position_id = resolve_position(&election, position)?;
            let c = election
                .add_candidate(NewCandidate {
                    position_id,
                    first_name: first_name.clone(),
                    last_name: last_name.clone(),
                    platform: platform.clone(),
                    photo: None,
                })
                .context(BallotSnafu {})?;
            println!("{}", c.id);
            Ok(())
        }
        Command::RemoveCandidate { id } => {
            let c = election
                .remove_candidate(&CandidateId::from(id.as_str()))
                .context(BallotSnafu {})?;
            println!("Removed candidate {}", c.display_name());
            Ok(())
        }
        Command::RegisterVoter { school_id, name } => {
            let v = election
                .register_voter(school_id, name, None)
                .context(BallotSnafu {})?;
            println!("{}", v.id);
            Ok(())
        }
        Command::RemoveVoter { id } => {
            let v = election
                .remove_voter(&VoterId::from(id.as_str()))
                .context(BallotSnafu {})?;
            println!("Removed voter {} ({})", v.name, v.school_id);
            Ok(())
        }
        Command::ListVoters { search } => list_voters(&election, search.as_deref()),
        Command::ImportVoters {
            input,
            input_type,
            excel_worksheet_name,
        } => import_voters(
            &election,
            input,
            input_type.as_deref(),
            excel_worksheet_name.clone(),
        ),
        Command::Results {
            position,
            out,
            reference,
        } => results(
            &election,
            position.as_deref(),
            out.as_deref(),
            reference.as_deref(),
        ),
        booth_command => run_booth(&election, store.as_ref(), booth_command),
    }
}
