use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ********* Identifiers ***********

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

record_id!(
    /// Identifier of an elective position.
    PositionId
);
record_id!(
    /// Identifier of a candidate.
    CandidateId
);
record_id!(
    /// Internal identifier of a voter (not the school ID).
    VoterId
);

/// The kinds of records held by an election, used in error reports.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RecordKind {
    Position,
    Candidate,
    Voter,
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordKind::Position => "position",
            RecordKind::Candidate => "candidate",
            RecordKind::Voter => "voter",
        };
        write!(f, "{}", s)
    }
}

// ********* Records ***********

/// An elective office. Ballots visit positions in increasing `ordinal`.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub name: String,
    /// Validated to be at least 1. Commits always record a single candidate
    /// per position, whatever this limit says.
    #[serde(rename = "voteLimit")]
    pub vote_limit: u32,
    pub ordinal: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    #[serde(rename = "positionId")]
    pub position_id: PositionId,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub platform: String,
    /// Reference to a photo blob, opaque to the core.
    #[serde(default)]
    pub photo: Option<String>,
}

impl Candidate {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub id: VoterId,
    #[serde(rename = "schoolId")]
    pub school_id: String,
    pub name: String,
    #[serde(rename = "registeredAt")]
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub photo: Option<String>,
}

/// One voter's recorded choice for one position.
///
/// The ledger holds at most one vote per (voter, position) pair.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "voterId")]
    pub voter_id: VoterId,
    #[serde(rename = "positionId")]
    pub position_id: PositionId,
    #[serde(rename = "candidateId")]
    pub candidate_id: CandidateId,
    pub timestamp: DateTime<Utc>,
}

/// Saved cursor of a voter in the ordered position sequence.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BallotProgress {
    #[serde(rename = "voterId")]
    pub voter_id: VoterId,
    #[serde(rename = "currentPositionOrdinal")]
    pub current_position_ordinal: usize,
}

// ******** Session data structures *********

/// The states of a ballot session.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum BallotState {
    Unauthenticated,
    /// The voter is filling in the position at this index of the ordered
    /// position sequence.
    Active(usize),
    /// Every position has a committed vote.
    Complete,
}

/// What a rendering layer needs to draw the current ballot page.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SessionSnapshot {
    pub state: BallotState,
    pub voter: Option<Voter>,
    pub current_position: Option<Position>,
    pub staged_candidate_id: Option<CandidateId>,
    pub committed_candidate_id: Option<CandidateId>,
}

// ******** Output data structures *********

/// Vote counts for one position, in candidate registration order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PositionTally {
    pub position: Position,
    pub tally: Vec<(Candidate, u64)>,
    /// Votes pointing to candidates that are no longer registered for this
    /// position. They are not part of `tally`.
    pub orphaned: u64,
}

impl PositionTally {
    pub fn count(&self, candidate_id: &CandidateId) -> Option<u64> {
        self.tally
            .iter()
            .find(|(c, _)| c.id == *candidate_id)
            .map(|(_, n)| *n)
    }

    pub fn total(&self) -> u64 {
        self.tally.iter().map(|(_, n)| *n).sum()
    }

    /// The candidates with the highest count. Empty if nobody got a vote.
    pub fn leaders(&self) -> Vec<&Candidate> {
        let best = self.tally.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if best == 0 {
            return Vec::new();
        }
        self.tally
            .iter()
            .filter(|(_, n)| *n == best)
            .map(|(c, _)| c)
            .collect()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Turnout {
    pub registered: usize,
    pub voted: usize,
}

/// A registered voter with the votes they cast, in ballot order.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct VoterStatus {
    pub voter: Voter,
    pub votes: Vec<Vote>,
    /// When the voter last committed a vote.
    pub last_voted: Option<DateTime<Utc>>,
}

impl VoterStatus {
    pub fn has_voted(&self) -> bool {
        !self.votes.is_empty()
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionResults {
    pub positions: Vec<PositionTally>,
    pub turnout: Turnout,
}
