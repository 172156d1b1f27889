use snafu::Snafu;

use crate::model::{CandidateId, PositionId, RecordKind};
use crate::store::StoreError;

/// Errors reported by the ballot operations.
///
/// None of them is fatal: the election state is left untouched whenever one
/// of them is returned, except for `Store` where the in-memory state is also
/// left as it was before the call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BallotError {
    #[snafu(display("No {kind} found for {id:?}"))]
    NotFound { kind: RecordKind, id: String },

    #[snafu(display("Candidate {candidate} is not running for position {position}"))]
    InvalidSelection {
        candidate: CandidateId,
        position: PositionId,
    },

    #[snafu(display("No candidate selected for position {position}"))]
    NoSelection { position: PositionId },

    #[snafu(display("A {kind} with key {key:?} is already registered"))]
    DuplicateIdentifier { kind: RecordKind, key: String },

    #[snafu(display("Out of sequence: the ballot is at {current}, not at {requested}"))]
    OutOfSequence { current: String, requested: String },

    #[snafu(display("No voter is logged in"))]
    NotAuthenticated {},

    #[snafu(display("Invalid {field}: {reason}"))]
    InvalidField { field: &'static str, reason: String },

    #[snafu(display(
        "Candidate {candidate} is referenced by {count} votes and cannot change position"
    ))]
    ReferencedByVotes { candidate: CandidateId, count: usize },

    #[snafu(display("Record store failure: {source}"))]
    Store { source: StoreError },
}

pub type BallotResult<T> = Result<T, BallotError>;
