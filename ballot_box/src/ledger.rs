use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use snafu::ResultExt;

use crate::error::*;
use crate::model::*;
use crate::store::{load_records, save_records, Collection, RecordStore};

type VoteKey = (VoterId, PositionId);

/// The shared record of all the votes cast in the election.
///
/// There is at most one vote per (voter, position) key: a second commit for
/// the same key replaces the first one. Every mutation holds the write lock
/// while the new state is written through to the store, and the in-memory
/// state is only replaced once the store accepted it.
pub struct VoteLedger {
    store: Arc<dyn RecordStore>,
    votes: RwLock<BTreeMap<VoteKey, Vote>>,
}

impl VoteLedger {
    pub fn open(store: Arc<dyn RecordStore>) -> BallotResult<VoteLedger> {
        let records: Vec<Vote> = load_records(store.as_ref(), Collection::Votes).context(StoreSnafu {})?;
        let mut votes: BTreeMap<VoteKey, Vote> = BTreeMap::new();
        for v in records {
            // A store written by hand may hold several votes for one key: the
            // latest one wins.
            let key = (v.voter_id.clone(), v.position_id.clone());
            match votes.get(&key) {
                Some(prev) if prev.timestamp > v.timestamp => {
                    debug!("VoteLedger::open: dropping stale vote {:?}", v);
                }
                _ => {
                    votes.insert(key, v);
                }
            }
        }
        info!("Vote ledger opened with {} votes", votes.len());
        Ok(VoteLedger {
            store,
            votes: RwLock::new(votes),
        })
    }

    fn persist(&self, votes: &BTreeMap<VoteKey, Vote>) -> BallotResult<()> {
        save_records(self.store.as_ref(), Collection::Votes, votes.values()).context(StoreSnafu {})
    }

    /// Records the vote, replacing the previous vote of this voter for this
    /// position. Returns the replaced vote, if any.
    pub fn upsert(
        &self,
        voter_id: &VoterId,
        position_id: &PositionId,
        candidate_id: &CandidateId,
        timestamp: DateTime<Utc>,
    ) -> BallotResult<Option<Vote>> {
        let key = (voter_id.clone(), position_id.clone());
        let vote = Vote {
            voter_id: voter_id.clone(),
            position_id: position_id.clone(),
            candidate_id: candidate_id.clone(),
            timestamp,
        };
        let mut guard = self.votes.write();
        let mut next = guard.clone();
        let previous = next.insert(key, vote);
        self.persist(&next)?;
        *guard = next;
        debug!(
            "upsert: voter {} position {} -> {} (replaced: {:?})",
            voter_id,
            position_id,
            candidate_id,
            previous.as_ref().map(|v| &v.candidate_id)
        );
        Ok(previous)
    }

    pub fn query(&self, voter_id: &VoterId, position_id: &PositionId) -> Option<Vote> {
        self.votes
            .read()
            .get(&(voter_id.clone(), position_id.clone()))
            .cloned()
    }

    pub fn query_by_voter(&self, voter_id: &VoterId) -> Vec<Vote> {
        self.votes
            .read()
            .values()
            .filter(|v| v.voter_id == *voter_id)
            .cloned()
            .collect()
    }

    pub fn query_by_position(&self, position_id: &PositionId) -> Vec<Vote> {
        self.votes
            .read()
            .values()
            .filter(|v| v.position_id == *position_id)
            .cloned()
            .collect()
    }

    /// Removes every vote of the voter. Returns the number of removed votes.
    pub fn delete_by_voter(&self, voter_id: &VoterId) -> BallotResult<usize> {
        let mut guard = self.votes.write();
        let next: BTreeMap<VoteKey, Vote> = guard
            .iter()
            .filter(|((vid, _), _)| vid != voter_id)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let removed = guard.len() - next.len();
        if removed > 0 {
            self.persist(&next)?;
            *guard = next;
        }
        info!("Deleted {} votes of voter {}", removed, voter_id);
        Ok(removed)
    }

    /// Point-in-time copy of all the votes.
    pub fn snapshot(&self) -> Vec<Vote> {
        self.votes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.votes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.read().is_empty()
    }
}

impl std::fmt::Debug for VoteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteLedger")
            .field("votes", &self.votes.read().len())
            .finish()
    }
}
