use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::RwLock;
use snafu::{ensure, OptionExt, ResultExt};

use crate::error::*;
use crate::ledger::VoteLedger;
use crate::model::*;
use crate::store::{load_records, save_records, Collection, RecordStore};

/// The read-only view of the election that a ballot session needs.
pub trait BallotSource {
    fn lookup_voter(&self, school_id: &str) -> Option<Voter>;
    /// All the live positions, in ballot order.
    fn list_positions_ordered(&self) -> Vec<Position>;
    fn list_candidates(&self, position_id: &PositionId) -> Vec<Candidate>;
    fn find_candidate(&self, candidate_id: &CandidateId) -> Option<Candidate>;
}

/// The progress a voter's votes imply: the index of the first position (in
/// ballot order) without a vote from this voter, or the number of positions
/// if every position has one.
///
/// Votes for positions that no longer exist are ignored, so a deleted
/// position never blocks the ballot.
pub fn derive_progress(positions: &[Position], voter_votes: &[Vote]) -> usize {
    let voted: HashSet<&PositionId> = voter_votes.iter().map(|v| &v.position_id).collect();
    positions
        .iter()
        .position(|p| !voted.contains(&p.id))
        .unwrap_or(positions.len())
}

/// Combines the saved cursor with the one derived from the ledger.
///
/// The cursor only moves forward through commits, so every position before a
/// saved cursor has a vote unless the ballot changed since. Taking the
/// minimum keeps a voter who went back to revise a choice where they were,
/// and sends a voter to the first unvoted position otherwise.
pub fn reconcile_cursor(saved: Option<usize>, derived: usize) -> usize {
    match saved {
        Some(k) => k.min(derived),
        None => derived,
    }
}

/// The persisted cursors of all the voters.
pub struct ProgressBook {
    store: Arc<dyn RecordStore>,
    cursors: RwLock<HashMap<VoterId, usize>>,
}

impl ProgressBook {
    pub fn open(store: Arc<dyn RecordStore>) -> BallotResult<ProgressBook> {
        let records: Vec<BallotProgress> =
            load_records(store.as_ref(), Collection::Progress).context(StoreSnafu {})?;
        let cursors: HashMap<VoterId, usize> = records
            .into_iter()
            .map(|bp| (bp.voter_id, bp.current_position_ordinal))
            .collect();
        Ok(ProgressBook {
            store,
            cursors: RwLock::new(cursors),
        })
    }

    pub fn get(&self, voter_id: &VoterId) -> Option<usize> {
        self.cursors.read().get(voter_id).cloned()
    }

    fn persist(&self, cursors: &HashMap<VoterId, usize>) -> BallotResult<()> {
        let mut records: Vec<BallotProgress> = cursors
            .iter()
            .map(|(vid, k)| BallotProgress {
                voter_id: vid.clone(),
                current_position_ordinal: *k,
            })
            .collect();
        records.sort_by(|a, b| a.voter_id.cmp(&b.voter_id));
        save_records(self.store.as_ref(), Collection::Progress, &records).context(StoreSnafu {})
    }

    fn update<F>(&self, f: F) -> BallotResult<()>
    where
        F: FnOnce(&mut HashMap<VoterId, usize>),
    {
        let mut guard = self.cursors.write();
        let mut next = guard.clone();
        f(&mut next);
        if next != *guard {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(())
    }

    pub fn set(&self, voter_id: &VoterId, cursor: usize) -> BallotResult<()> {
        self.update(|m| {
            m.insert(voter_id.clone(), cursor);
        })
    }

    pub fn reset(&self, voter_id: &VoterId) -> BallotResult<()> {
        self.update(|m| {
            m.remove(voter_id);
        })
    }

    /// The single place where a cursor is recomputed against the ledger.
    /// Returns the reconciled cursor, which is also saved.
    pub fn recompute(
        &self,
        voter_id: &VoterId,
        positions: &[Position],
        ledger: &VoteLedger,
    ) -> BallotResult<usize> {
        let derived = derive_progress(positions, &ledger.query_by_voter(voter_id));
        let saved = self.get(voter_id);
        let cursor = reconcile_cursor(saved, derived).min(positions.len());
        debug!(
            "recompute: voter {} saved {:?} derived {} -> {}",
            voter_id, saved, derived, cursor
        );
        if saved.is_some() || cursor > 0 {
            self.set(voter_id, cursor)?;
        }
        Ok(cursor)
    }

    /// Recomputes the cursor of every voter with saved progress, after the
    /// position sequence changed. `removed_index` is the ballot index of a
    /// position that was just deleted: cursors past it move back by one so
    /// they keep pointing at the same position.
    pub fn rebase_all(
        &self,
        positions: &[Position],
        ledger: &VoteLedger,
        removed_index: Option<usize>,
    ) -> BallotResult<()> {
        if let Some(idx) = removed_index {
            self.update(|m| {
                for k in m.values_mut() {
                    if *k > idx {
                        *k -= 1;
                    }
                }
            })?;
        }
        let voters: Vec<VoterId> = self.cursors.read().keys().cloned().collect();
        for vid in voters.iter() {
            self.recompute(vid, positions, ledger)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProgressBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBook")
            .field("cursors", &*self.cursors.read())
            .finish()
    }
}

/// The ballot of one voter at a time, moving through the positions in order.
///
/// The session is created unauthenticated and becomes active with `login`.
/// The cursor lives in the shared `ProgressBook`, so a session rebuilt after
/// a `logout` (or a crash) resumes where the voter was.
pub struct BallotSession<S: BallotSource> {
    source: Arc<S>,
    ledger: Arc<VoteLedger>,
    progress: Arc<ProgressBook>,
    voter: Option<Voter>,
    staged: Option<CandidateId>,
}

impl<S: BallotSource> BallotSession<S> {
    pub fn new(
        source: Arc<S>,
        ledger: Arc<VoteLedger>,
        progress: Arc<ProgressBook>,
    ) -> BallotSession<S> {
        BallotSession {
            source,
            ledger,
            progress,
            voter: None,
            staged: None,
        }
    }

    pub fn voter(&self) -> Option<&Voter> {
        self.voter.as_ref()
    }

    fn active_voter(&self) -> BallotResult<Voter> {
        self.voter.clone().context(NotAuthenticatedSnafu {})
    }

    fn cursor(&self, voter: &Voter, positions: &[Position]) -> usize {
        self.progress
            .get(&voter.id)
            .unwrap_or(0)
            .min(positions.len())
    }

    fn state_at(cursor: usize, num_positions: usize) -> BallotState {
        if cursor >= num_positions {
            BallotState::Complete
        } else {
            BallotState::Active(cursor)
        }
    }

    /// Pre-selects the committed candidate of the position under the cursor.
    fn enter(&mut self, voter: &Voter, positions: &[Position], cursor: usize) {
        self.staged = positions
            .get(cursor)
            .and_then(|p| self.ledger.query(&voter.id, &p.id))
            .map(|v| v.candidate_id);
    }

    /// Opens the ballot of the voter with this school ID, resuming any saved
    /// progress.
    pub fn login(&mut self, school_id: &str) -> BallotResult<BallotState> {
        let voter = self
            .source
            .lookup_voter(school_id)
            .context(NotFoundSnafu {
                kind: RecordKind::Voter,
                id: school_id.trim(),
            })?;
        if let Some(prev) = self.voter.as_ref() {
            if prev.id != voter.id {
                info!("login: replacing session of voter {}", prev.id);
            }
        }
        let positions = self.source.list_positions_ordered();
        let cursor = self.progress.recompute(&voter.id, &positions, &self.ledger)?;
        info!(
            "Voter {} logged in at position {}/{}",
            voter.school_id,
            cursor,
            positions.len()
        );
        self.enter(&voter, &positions, cursor);
        self.voter = Some(voter);
        Ok(Self::state_at(cursor, positions.len()))
    }

    /// Closes the session. Votes and saved progress are kept.
    pub fn logout(&mut self) {
        if let Some(v) = self.voter.take() {
            info!("Voter {} logged out", v.school_id);
        }
        self.staged = None;
    }

    pub fn state(&self) -> BallotState {
        match self.voter.as_ref() {
            None => BallotState::Unauthenticated,
            Some(voter) => {
                let positions = self.source.list_positions_ordered();
                Self::state_at(self.cursor(voter, &positions), positions.len())
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let voter = match self.voter.as_ref() {
            None => {
                return SessionSnapshot {
                    state: BallotState::Unauthenticated,
                    voter: None,
                    current_position: None,
                    staged_candidate_id: None,
                    committed_candidate_id: None,
                }
            }
            Some(v) => v,
        };
        let positions = self.source.list_positions_ordered();
        let cursor = self.cursor(voter, &positions);
        let current_position = positions.get(cursor).cloned();
        let committed_candidate_id = current_position
            .as_ref()
            .and_then(|p| self.ledger.query(&voter.id, &p.id))
            .map(|v| v.candidate_id);
        SessionSnapshot {
            state: Self::state_at(cursor, positions.len()),
            voter: Some(voter.clone()),
            staged_candidate_id: current_position.as_ref().and(self.staged.clone()),
            current_position,
            committed_candidate_id,
        }
    }

    /// The position under the cursor, or `OutOfSequence` when the ballot is
    /// complete.
    fn current(
        &self,
        voter: &Voter,
        positions: &[Position],
        requested: &str,
    ) -> BallotResult<(usize, Position)> {
        let cursor = self.cursor(voter, positions);
        let position = positions.get(cursor).cloned().context(OutOfSequenceSnafu {
            current: "the end of the ballot",
            requested,
        })?;
        Ok((cursor, position))
    }

    fn check_cursor_at(
        &self,
        voter: &Voter,
        positions: &[Position],
        position_id: &PositionId,
    ) -> BallotResult<()> {
        let (_, position) = self.current(voter, positions, position_id.as_str())?;
        ensure!(
            position.id == *position_id,
            OutOfSequenceSnafu {
                current: position.id.as_str(),
                requested: position_id.as_str(),
            }
        );
        Ok(())
    }

    fn check_candidate(&self, position: &Position, candidate_id: &CandidateId) -> BallotResult<()> {
        let candidate = self
            .source
            .find_candidate(candidate_id)
            .context(NotFoundSnafu {
                kind: RecordKind::Candidate,
                id: candidate_id.as_str(),
            })?;
        ensure!(
            candidate.position_id == position.id,
            InvalidSelectionSnafu {
                candidate: candidate_id.clone(),
                position: position.id.clone(),
            }
        );
        Ok(())
    }

    /// Stages a choice for the current position without recording it.
    pub fn select(&mut self, candidate_id: &CandidateId) -> BallotResult<()> {
        let voter = self.active_voter()?;
        let positions = self.source.list_positions_ordered();
        let (_, position) = self.current(&voter, &positions, candidate_id.as_str())?;
        self.check_candidate(&position, candidate_id)?;
        debug!("select: voter {} stages {}", voter.id, candidate_id);
        self.staged = Some(candidate_id.clone());
        Ok(())
    }

    /// Like `select`, but fails with `OutOfSequence` unless the ballot is at
    /// `position_id`.
    pub fn select_at(
        &mut self,
        position_id: &PositionId,
        candidate_id: &CandidateId,
    ) -> BallotResult<()> {
        let voter = self.active_voter()?;
        let positions = self.source.list_positions_ordered();
        self.check_cursor_at(&voter, &positions, position_id)?;
        self.select(candidate_id)
    }

    /// Records the choice for the current position and moves to the next one.
    ///
    /// Without an explicit candidate, the staged choice is used, then the
    /// vote already recorded for this position.
    ///
    /// If the vote is recorded but the cursor cannot be saved, the error is
    /// returned and the ballot stays on this position with the new vote
    /// committed: committing again moves on.
    pub fn commit_vote(&mut self, candidate_id: Option<&CandidateId>) -> BallotResult<BallotState> {
        let voter = self.active_voter()?;
        let positions = self.source.list_positions_ordered();
        let requested = candidate_id.map(|c| c.as_str()).unwrap_or("a commit");
        let (cursor, position) = self.current(&voter, &positions, requested)?;

        let chosen: CandidateId = match candidate_id {
            Some(c) => c.clone(),
            None => self
                .staged
                .clone()
                .or_else(|| {
                    self.ledger
                        .query(&voter.id, &position.id)
                        .map(|v| v.candidate_id)
                })
                .context(NoSelectionSnafu {
                    position: position.id.clone(),
                })?,
        };
        self.check_candidate(&position, &chosen)?;

        self.ledger
            .upsert(&voter.id, &position.id, &chosen, Utc::now())?;
        let next = cursor + 1;
        if let Err(e) = self.progress.set(&voter.id, next) {
            warn!(
                "commit_vote: vote of voter {} for {} recorded, but the cursor stays at {}: {}",
                voter.id, position.id, cursor, e
            );
            self.enter(&voter, &positions, cursor);
            return Err(e);
        }
        info!(
            "Voter {} voted for {} at position {:?}",
            voter.school_id, chosen, position.name
        );
        self.enter(&voter, &positions, next);
        Ok(Self::state_at(next, positions.len()))
    }

    /// Like `commit_vote`, but fails with `OutOfSequence` unless the ballot is
    /// at `position_id`.
    pub fn commit_vote_at(
        &mut self,
        position_id: &PositionId,
        candidate_id: Option<&CandidateId>,
    ) -> BallotResult<BallotState> {
        let voter = self.active_voter()?;
        let positions = self.source.list_positions_ordered();
        self.check_cursor_at(&voter, &positions, position_id)?;
        self.commit_vote(candidate_id)
    }

    /// Moves back one position so the voter can revise it. Nothing is
    /// removed from the ledger.
    pub fn go_to_previous(&mut self) -> BallotResult<BallotState> {
        let voter = self.active_voter()?;
        let positions = self.source.list_positions_ordered();
        let cursor = self.cursor(&voter, &positions);
        ensure!(
            cursor > 0,
            OutOfSequenceSnafu {
                current: "the first position",
                requested: "the previous position",
            }
        );
        let prev = cursor - 1;
        self.progress.set(&voter.id, prev)?;
        self.enter(&voter, &positions, prev);
        Ok(BallotState::Active(prev))
    }

    /// Deletes all the votes of the voter and goes back to the first position.
    ///
    /// The cursor is reset before the votes are deleted. If the deletion
    /// fails, the voter is on the first position with their votes still
    /// recorded, which is an ordinary revision state.
    pub fn restart(&mut self) -> BallotResult<BallotState> {
        let voter = self.active_voter()?;
        self.progress.reset(&voter.id)?;
        let positions = self.source.list_positions_ordered();
        let removed = match self.ledger.delete_by_voter(&voter.id) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    "restart: votes of voter {} kept after a failed delete: {}",
                    voter.id, e
                );
                self.enter(&voter, &positions, 0);
                return Err(e);
            }
        };
        info!(
            "Voter {} restarted the ballot ({} votes removed)",
            voter.school_id, removed
        );
        self.enter(&voter, &positions, 0);
        Ok(Self::state_at(0, positions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use parking_lot::Mutex;
    use serde_json::Value as JSValue;

    fn positions(ids: &[&str]) -> Vec<Position> {
        ids.iter()
            .enumerate()
            .map(|(idx, id)| Position {
                id: PositionId::from(*id),
                name: id.to_string(),
                vote_limit: 1,
                ordinal: idx as u32,
            })
            .collect()
    }

    fn vote(pid: &str, cid: &str) -> Vote {
        Vote {
            voter_id: VoterId::from("v1"),
            position_id: PositionId::from(pid),
            candidate_id: CandidateId::from(cid),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn progress_is_the_first_gap() {
        let ps = positions(&["p1", "p2", "p3"]);
        assert_eq!(derive_progress(&ps, &[]), 0);
        assert_eq!(derive_progress(&ps, &[vote("p1", "a")]), 1);
        assert_eq!(derive_progress(&ps, &[vote("p1", "a"), vote("p3", "c")]), 1);
        assert_eq!(
            derive_progress(&ps, &[vote("p3", "c"), vote("p2", "b"), vote("p1", "a")]),
            3
        );
        // Votes for deleted positions do not count.
        assert_eq!(derive_progress(&ps, &[vote("gone", "x")]), 0);
        assert_eq!(derive_progress(&[], &[vote("p1", "a")]), 0);
    }

    #[test]
    fn reconcile_takes_the_earliest() {
        assert_eq!(reconcile_cursor(None, 2), 2);
        assert_eq!(reconcile_cursor(Some(1), 2), 1);
        assert_eq!(reconcile_cursor(Some(3), 1), 1);
    }

    #[test]
    fn progress_book_persists_and_rebases() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let ledger = VoteLedger::open(store.clone()).unwrap();
        let book = ProgressBook::open(store.clone()).unwrap();
        let v1 = VoterId::from("v1");
        for (pid, cid) in [("p1", "a"), ("p2", "b"), ("p3", "c")] {
            ledger
                .upsert(&v1, &PositionId::from(pid), &CandidateId::from(cid), Utc::now())
                .unwrap();
        }
        book.set(&v1, 3).unwrap();
        assert_eq!(ProgressBook::open(store.clone()).unwrap().get(&v1), Some(3));

        // p2 is removed: p1, p3 and a new p4 remain.
        let ps = positions(&["p1", "p3", "p4"]);
        book.rebase_all(&ps, &ledger, Some(1)).unwrap();
        assert_eq!(book.get(&v1), Some(2));

        book.reset(&v1).unwrap();
        assert_eq!(book.get(&v1), None);
        assert_eq!(book.recompute(&v1, &ps, &ledger).unwrap(), 2);
    }

    /// A fixed ballot, without a catalog or a registry behind it.
    struct StaticBallot {
        voter: Voter,
        positions: Vec<Position>,
        candidates: Vec<Candidate>,
    }

    impl BallotSource for StaticBallot {
        fn lookup_voter(&self, school_id: &str) -> Option<Voter> {
            if self.voter.school_id == school_id.trim() {
                Some(self.voter.clone())
            } else {
                None
            }
        }

        fn list_positions_ordered(&self) -> Vec<Position> {
            self.positions.clone()
        }

        fn list_candidates(&self, position_id: &PositionId) -> Vec<Candidate> {
            self.candidates
                .iter()
                .filter(|c| c.position_id == *position_id)
                .cloned()
                .collect()
        }

        fn find_candidate(&self, candidate_id: &CandidateId) -> Option<Candidate> {
            self.candidates.iter().find(|c| c.id == *candidate_id).cloned()
        }
    }

    #[test]
    fn sessions_run_on_any_source() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let source = Arc::new(StaticBallot {
            voter: Voter {
                id: VoterId::from("v1"),
                school_id: "S1".to_string(),
                name: "One".to_string(),
                registered_at: Utc::now(),
                photo: None,
            },
            positions: positions(&["p1"]),
            candidates: vec![Candidate {
                id: CandidateId::from("a"),
                position_id: PositionId::from("p1"),
                first_name: "A".to_string(),
                last_name: "A".to_string(),
                platform: "".to_string(),
                photo: None,
            }],
        });
        let ledger = Arc::new(VoteLedger::open(store.clone()).unwrap());
        let progress = Arc::new(ProgressBook::open(store).unwrap());
        let mut session = BallotSession::new(source, ledger.clone(), progress);
        assert_eq!(session.login(" S1 ").unwrap(), BallotState::Active(0));
        assert_eq!(
            session.commit_vote(Some(&CandidateId::from("a"))).unwrap(),
            BallotState::Complete
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(session.snapshot().current_position, None);
    }

    /// A memory store where writes to one collection can be made to fail.
    struct FlakyStore {
        inner: MemoryStore,
        failing: Mutex<Option<Collection>>,
    }

    impl FlakyStore {
        fn fail(&self, collection: Option<Collection>) {
            *self.failing.lock() = collection;
        }
    }

    impl RecordStore for FlakyStore {
        fn read(&self, collection: Collection) -> StoreResult<Vec<JSValue>> {
            self.inner.read(collection)
        }
        fn write(&self, collection: Collection, records: Vec<JSValue>) -> StoreResult<()> {
            if *self.failing.lock() == Some(collection) {
                return Err(StoreError::WritingCollection {
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                    path: collection.key().to_string(),
                });
            }
            self.inner.write(collection, records)
        }
        fn clear(&self, collection: Collection) -> StoreResult<()> {
            self.inner.clear(collection)
        }
    }

    fn flaky_session() -> (
        Arc<FlakyStore>,
        Arc<VoteLedger>,
        BallotSession<StaticBallot>,
    ) {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failing: Mutex::new(None),
        });
        let candidate = |id: &str, pid: &str| Candidate {
            id: CandidateId::from(id),
            position_id: PositionId::from(pid),
            first_name: id.to_string(),
            last_name: "X".to_string(),
            platform: "".to_string(),
            photo: None,
        };
        let source = Arc::new(StaticBallot {
            voter: Voter {
                id: VoterId::from("v1"),
                school_id: "S1".to_string(),
                name: "One".to_string(),
                registered_at: Utc::now(),
                photo: None,
            },
            positions: positions(&["p1", "p2"]),
            candidates: vec![candidate("a", "p1"), candidate("b", "p2")],
        });
        let dyn_store: Arc<dyn RecordStore> = store.clone();
        let ledger = Arc::new(VoteLedger::open(dyn_store.clone()).unwrap());
        let progress = Arc::new(ProgressBook::open(dyn_store).unwrap());
        let mut session = BallotSession::new(source, ledger.clone(), progress);
        session.login("S1").unwrap();
        (store, ledger, session)
    }

    #[test]
    fn failed_restarts_keep_a_consistent_ballot() {
        let (store, ledger, mut session) = flaky_session();
        session.commit_vote(Some(&CandidateId::from("a"))).unwrap();
        session.commit_vote(Some(&CandidateId::from("b"))).unwrap();

        // The cursor cannot be saved: nothing is deleted.
        store.fail(Some(Collection::Progress));
        assert!(matches!(session.restart(), Err(BallotError::Store { .. })));
        assert_eq!(ledger.len(), 2);
        assert_eq!(session.state(), BallotState::Complete);

        // The votes cannot be deleted: the voter is back on the first
        // position and the votes stay recorded.
        store.fail(Some(Collection::Votes));
        assert!(matches!(session.restart(), Err(BallotError::Store { .. })));
        assert_eq!(ledger.len(), 2);
        assert_eq!(session.state(), BallotState::Active(0));
        assert_eq!(
            session.snapshot().committed_candidate_id,
            Some(CandidateId::from("a"))
        );

        store.fail(None);
        assert_eq!(session.restart().unwrap(), BallotState::Active(0));
        assert!(ledger.is_empty());
    }

    #[test]
    fn commits_without_saved_progress_stay_on_the_position() {
        let (store, ledger, mut session) = flaky_session();
        store.fail(Some(Collection::Progress));
        assert!(matches!(
            session.commit_vote(Some(&CandidateId::from("a"))),
            Err(BallotError::Store { .. })
        ));
        // The vote is recorded and the ballot did not move.
        assert_eq!(ledger.len(), 1);
        assert_eq!(session.state(), BallotState::Active(0));
        assert_eq!(
            session.snapshot().staged_candidate_id,
            Some(CandidateId::from("a"))
        );

        store.fail(None);
        assert_eq!(session.commit_vote(None).unwrap(), BallotState::Active(1));
        assert_eq!(ledger.len(), 1);
    }
}
