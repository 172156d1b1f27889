use std::collections::HashSet;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use snafu::{ensure, OptionExt, ResultExt};

use crate::catalog::{BallotCatalog, NewCandidate};
use crate::error::*;
use crate::ledger::VoteLedger;
use crate::model::*;
use crate::registry::VoterRegistry;
use crate::session::{BallotSession, BallotSource, ProgressBook};
use crate::store::RecordStore;
use crate::tally::{election_results, tally_position, turnout, voter_statuses, voters_who_voted};

/// An election backed by a record store.
///
/// This is the entry point of the crate: it owns the catalog of positions
/// and candidates, the voter registry, the vote ledger and the saved ballot
/// progress, and hands out ballot sessions.
///
/// Administrative changes are validated on a copy, written to the store, and
/// only then made visible. Changes to the position sequence re-align the
/// saved progress of every voter.
pub struct Election {
    store: Arc<dyn RecordStore>,
    catalog: RwLock<BallotCatalog>,
    registry: RwLock<VoterRegistry>,
    ledger: Arc<VoteLedger>,
    progress: Arc<ProgressBook>,
}

impl Election {
    pub fn open(store: Arc<dyn RecordStore>) -> BallotResult<Arc<Election>> {
        let catalog = BallotCatalog::load(store.as_ref()).context(StoreSnafu {})?;
        let registry = VoterRegistry::load(store.as_ref()).context(StoreSnafu {})?;
        let ledger = VoteLedger::open(store.clone())?;
        let progress = ProgressBook::open(store.clone())?;
        info!(
            "Election opened: {} positions, {} candidates, {} voters, {} votes",
            catalog.positions_ordered().len(),
            catalog.candidates().len(),
            registry.len(),
            ledger.len()
        );
        Ok(Arc::new(Election {
            store,
            catalog: RwLock::new(catalog),
            registry: RwLock::new(registry),
            ledger: Arc::new(ledger),
            progress: Arc::new(progress),
        }))
    }

    /// A new, unauthenticated ballot session.
    pub fn open_session(self: &Arc<Self>) -> BallotSession<Election> {
        BallotSession::new(self.clone(), self.ledger.clone(), self.progress.clone())
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<VoteLedger> {
        &self.ledger
    }

    pub fn catalog(&self) -> BallotCatalog {
        self.catalog.read().clone()
    }

    pub fn registry(&self) -> VoterRegistry {
        self.registry.read().clone()
    }

    fn update_catalog<T, F>(&self, f: F) -> BallotResult<(T, Vec<Position>)>
    where
        F: FnOnce(&mut BallotCatalog) -> BallotResult<T>,
    {
        let mut guard = self.catalog.write();
        let mut next = guard.clone();
        let res = f(&mut next)?;
        next.save(self.store.as_ref()).context(StoreSnafu {})?;
        let positions = next.positions_ordered().to_vec();
        *guard = next;
        Ok((res, positions))
    }

    fn update_registry<T, F>(&self, f: F) -> BallotResult<T>
    where
        F: FnOnce(&mut VoterRegistry) -> BallotResult<T>,
    {
        let mut guard = self.registry.write();
        let mut next = guard.clone();
        let res = f(&mut next)?;
        next.save(self.store.as_ref()).context(StoreSnafu {})?;
        *guard = next;
        Ok(res)
    }

    // ********* Positions **********

    pub fn add_position(&self, name: &str, vote_limit: u32) -> BallotResult<Position> {
        let (p, positions) = self.update_catalog(|c| c.add_position(name, vote_limit))?;
        self.progress.rebase_all(&positions, &self.ledger, None)?;
        Ok(p)
    }

    pub fn edit_position(
        &self,
        id: &PositionId,
        name: &str,
        vote_limit: u32,
    ) -> BallotResult<Position> {
        let (p, _) = self.update_catalog(|c| c.edit_position(id, name, vote_limit))?;
        Ok(p)
    }

    pub fn move_position(&self, id: &PositionId, index: usize) -> BallotResult<()> {
        let (_, positions) = self.update_catalog(|c| c.move_position(id, index))?;
        self.progress.rebase_all(&positions, &self.ledger, None)
    }

    /// Removes the position. Its votes stay in the ledger as orphans and are
    /// no longer counted; ballots in progress skip it.
    pub fn remove_position(&self, id: &PositionId) -> BallotResult<Position> {
        let ((idx, p), positions) = self.update_catalog(|c| {
            let idx = c.position_index(id);
            let p = c.remove_position(id)?;
            Ok((idx, p))
        })?;
        let orphans = self.ledger.query_by_position(id).len();
        if orphans > 0 {
            warn!(
                "Position {:?} removed with {} recorded votes",
                p.name, orphans
            );
        }
        self.progress.rebase_all(&positions, &self.ledger, idx)?;
        Ok(p)
    }

    /// Fills an empty catalog with the default list of positions.
    pub fn seed_default_positions(&self) -> BallotResult<usize> {
        let (n, positions) = self.update_catalog(|c| {
            if !c.positions_ordered().is_empty() {
                return Ok(0);
            }
            *c = BallotCatalog::with_default_positions();
            Ok(c.positions_ordered().len())
        })?;
        if n > 0 {
            self.progress.rebase_all(&positions, &self.ledger, None)?;
        }
        Ok(n)
    }

    // ********* Candidates **********

    pub fn add_candidate(&self, new: NewCandidate) -> BallotResult<Candidate> {
        let (c, _) = self.update_catalog(|cat| cat.add_candidate(new))?;
        Ok(c)
    }

    /// Edits a candidate. Moving a candidate that already received votes to
    /// another position is rejected.
    pub fn edit_candidate(&self, id: &CandidateId, new: NewCandidate) -> BallotResult<Candidate> {
        let (c, _) = self.update_catalog(|cat| {
            let current = cat.candidate(id).context(NotFoundSnafu {
                kind: RecordKind::Candidate,
                id: id.as_str(),
            })?;
            if current.position_id != new.position_id {
                let count = self
                    .ledger
                    .query_by_position(&current.position_id)
                    .iter()
                    .filter(|v| v.candidate_id == *id)
                    .count();
                ensure!(
                    count == 0,
                    ReferencedByVotesSnafu {
                        candidate: id.clone(),
                        count,
                    }
                );
            }
            cat.edit_candidate(id, new)
        })?;
        Ok(c)
    }

    pub fn remove_candidate(&self, id: &CandidateId) -> BallotResult<Candidate> {
        let (c, _) = self.update_catalog(|cat| cat.remove_candidate(id))?;
        Ok(c)
    }

    // ********* Voters **********

    pub fn register_voter(
        &self,
        school_id: &str,
        name: &str,
        photo: Option<String>,
    ) -> BallotResult<Voter> {
        self.update_registry(|r| r.register(school_id, name, photo))
    }

    /// Removes the voter from the registry. Their votes stay in the ledger
    /// and keep counting in the tallies.
    pub fn remove_voter(&self, id: &VoterId) -> BallotResult<Voter> {
        let v = self.update_registry(|r| r.remove(id))?;
        self.progress.reset(id)?;
        Ok(v)
    }

    // ********* Results **********

    pub fn tally(&self, position_id: &PositionId) -> BallotResult<PositionTally> {
        let catalog = self.catalog.read().clone();
        let position = catalog.position(position_id).context(NotFoundSnafu {
            kind: RecordKind::Position,
            id: position_id.as_str(),
        })?;
        let votes = self.ledger.query_by_position(position_id);
        Ok(tally_position(position, catalog.candidates(), &votes))
    }

    pub fn voters_who_voted(&self) -> HashSet<VoterId> {
        voters_who_voted(&self.ledger.snapshot())
    }

    /// Every registered voter with the votes they cast. With a search term,
    /// only the voters whose name or school ID contains it, ignoring case.
    pub fn voter_statuses(&self, search: Option<&str>) -> Vec<VoterStatus> {
        let catalog = self.catalog.read().clone();
        let registry = self.registry.read().clone();
        let votes = self.ledger.snapshot();
        match search {
            Some(term) => voter_statuses(&catalog, registry.search(term), &votes),
            None => voter_statuses(&catalog, registry.voters(), &votes),
        }
    }

    pub fn turnout(&self) -> Turnout {
        let registry = self.registry.read().clone();
        turnout(&registry, &self.ledger.snapshot())
    }

    pub fn results(&self) -> ElectionResults {
        let catalog = self.catalog.read().clone();
        let registry = self.registry.read().clone();
        election_results(&catalog, &registry, &self.ledger.snapshot())
    }
}

impl BallotSource for Election {
    fn lookup_voter(&self, school_id: &str) -> Option<Voter> {
        self.registry
            .read()
            .find_voter_by_school_id(school_id)
            .cloned()
    }

    fn list_positions_ordered(&self) -> Vec<Position> {
        self.catalog.read().positions_ordered().to_vec()
    }

    fn list_candidates(&self, position_id: &PositionId) -> Vec<Candidate> {
        self.catalog
            .read()
            .candidates_for(position_id)
            .cloned()
            .collect()
    }

    fn find_candidate(&self, candidate_id: &CandidateId) -> Option<Candidate> {
        self.catalog.read().candidate(candidate_id).cloned()
    }
}

impl std::fmt::Debug for Election {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Election")
            .field("catalog", &*self.catalog.read())
            .field("voters", &self.registry.read().len())
            .field("ledger", &self.ledger)
            .finish()
    }
}
