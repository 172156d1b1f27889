use std::sync::Arc;

use log::info;
use snafu::{OptionExt, ResultExt};

use crate::catalog::{BallotCatalog, NewCandidate};
use crate::election::Election;
use crate::error::*;
use crate::model::*;
use crate::registry::VoterRegistry;
use crate::store::RecordStore;

/// A builder for setting up an election in one go.
///
/// Positions are placed on the ballot in the order they are added. Candidates
/// refer to their position by name, ignoring case.
///
/// ```
/// use std::sync::Arc;
/// use ballot_box::builder::Builder;
/// use ballot_box::store::MemoryStore;
/// # use ballot_box::BallotError;
///
/// let mut builder = Builder::new()
///     .positions(&["President".to_string(), "Secretary".to_string()])?;
/// builder.add_candidate("President", "Anna", "Reyes")?;
/// builder.add_candidate("Secretary", "Bob", "Santos")?;
/// builder.add_voter("2021-0001", "Clara Cruz")?;
///
/// let election = builder.build(Arc::new(MemoryStore::new()))?;
/// assert_eq!(election.turnout().registered, 1);
///
/// # Ok::<(), BallotError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub(crate) _catalog: BallotCatalog,
    pub(crate) _registry: VoterRegistry,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Adds positions with a vote limit of 1.
    pub fn positions(self, names: &[String]) -> BallotResult<Builder> {
        let mut res = self;
        for name in names.iter() {
            res.add_position(None, name, 1)?;
        }
        Ok(res)
    }

    pub fn add_position(
        &mut self,
        id: Option<PositionId>,
        name: &str,
        vote_limit: u32,
    ) -> BallotResult<Position> {
        match id {
            Some(pid) => self._catalog.insert_position(pid, name, vote_limit),
            None => self._catalog.add_position(name, vote_limit),
        }
    }

    fn position_id(&self, position: &str) -> BallotResult<PositionId> {
        let pid = PositionId::from(position);
        if self._catalog.position(&pid).is_some() {
            return Ok(pid);
        }
        self._catalog
            .find_position_by_name(position)
            .map(|p| p.id.clone())
            .context(NotFoundSnafu {
                kind: RecordKind::Position,
                id: position,
            })
    }

    /// Adds a candidate for a position given by name or identifier.
    pub fn add_candidate(
        &mut self,
        position: &str,
        first_name: &str,
        last_name: &str,
    ) -> BallotResult<CandidateId> {
        self.add_candidate_full(None, position, first_name, last_name, "", None)
            .map(|c| c.id)
    }

    pub fn add_candidate_full(
        &mut self,
        id: Option<CandidateId>,
        position: &str,
        first_name: &str,
        last_name: &str,
        platform: &str,
        photo: Option<String>,
    ) -> BallotResult<Candidate> {
        let new = NewCandidate {
            position_id: self.position_id(position)?,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            platform: platform.to_string(),
            photo,
        };
        match id {
            Some(cid) => self._catalog.insert_candidate(cid, new),
            None => self._catalog.add_candidate(new),
        }
    }

    pub fn add_voter(&mut self, school_id: &str, name: &str) -> BallotResult<VoterId> {
        self._registry.register(school_id, name, None).map(|v| v.id)
    }

    pub fn catalog(&self) -> &BallotCatalog {
        &self._catalog
    }

    pub fn registry(&self) -> &VoterRegistry {
        &self._registry
    }

    /// Writes the positions, candidates and voters to the store, replacing
    /// those already there, and opens the election. Recorded votes and saved
    /// progress are left in place.
    ///
    /// A voter whose school ID is already registered in the store keeps their
    /// identifier, so their recorded votes and progress stay theirs and they
    /// cannot vote a second time.
    pub fn build(self, store: Arc<dyn RecordStore>) -> BallotResult<Arc<Election>> {
        let mut registry = self._registry;
        let existing = VoterRegistry::load(store.as_ref()).context(StoreSnafu {})?;
        let kept = registry.adopt_identities(&existing);
        info!(
            "Builder: writing {} positions, {} candidates, {} voters ({} already registered)",
            self._catalog.positions_ordered().len(),
            self._catalog.candidates().len(),
            registry.len(),
            kept
        );
        self._catalog.save(store.as_ref()).context(StoreSnafu {})?;
        registry.save(store.as_ref()).context(StoreSnafu {})?;
        Election::open(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BallotSource;
    use crate::store::MemoryStore;

    #[test]
    fn candidates_refer_to_positions_by_name_or_id() {
        let mut b = Builder::new();
        b.add_position(Some(PositionId::from("pres")), "President", 1)
            .unwrap();
        b.add_position(None, "Secretary", 1).unwrap();
        b.add_candidate("pres", "A", "A").unwrap();
        b.add_candidate("secretary", "B", "B").unwrap();
        let err = b.add_candidate("Treasurer", "C", "C").unwrap_err();
        assert!(matches!(
            err,
            BallotError::NotFound {
                kind: RecordKind::Position,
                ..
            }
        ));
        assert_eq!(b.catalog().candidates().len(), 2);
    }

    #[test]
    fn duplicate_positions_fail_the_builder() {
        let res = Builder::new().positions(&["A".to_string(), "a".to_string()]);
        assert!(matches!(res, Err(BallotError::DuplicateIdentifier { .. })));
    }

    fn one_seat_builder() -> (Builder, CandidateId) {
        let mut b = Builder::new();
        b.add_position(Some(PositionId::from("pres")), "President", 1)
            .unwrap();
        let a = b
            .add_candidate_full(Some(CandidateId::from("a")), "pres", "Anna", "Reyes", "", None)
            .unwrap();
        b.add_voter("S1", "Voter One").unwrap();
        (b, a.id)
    }

    #[test]
    fn rebuilding_keeps_voters_who_already_voted() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let (b, a) = one_seat_builder();
        let election = b.build(store.clone()).unwrap();
        let first_id = election.lookup_voter("S1").unwrap().id;
        let mut session = election.open_session();
        session.login("S1").unwrap();
        assert_eq!(
            session.commit_vote(Some(&a)).unwrap(),
            BallotState::Complete
        );
        session.logout();

        // The same setup is loaded again over the recorded votes.
        let (b, _) = one_seat_builder();
        let election = b.build(store).unwrap();
        assert_eq!(election.lookup_voter("S1").unwrap().id, first_id);
        let mut session = election.open_session();
        assert_eq!(session.login("S1").unwrap(), BallotState::Complete);
        assert!(matches!(
            session.commit_vote(Some(&a)),
            Err(BallotError::OutOfSequence { .. })
        ));

        let pres = PositionId::from("pres");
        assert_eq!(election.tally(&pres).unwrap().count(&a), Some(1));
        assert_eq!(
            election.turnout(),
            Turnout {
                registered: 1,
                voted: 1
            }
        );
    }

    #[test]
    fn build_opens_the_election() {
        let mut b = Builder::new()
            .positions(&["President".to_string()])
            .unwrap();
        let cid = b.add_candidate("President", "Anna", "Reyes").unwrap();
        b.add_voter("S1", "Voter One").unwrap();
        let election = b.build(Arc::new(MemoryStore::new())).unwrap();
        let catalog = election.catalog();
        assert_eq!(catalog.positions_ordered().len(), 1);
        assert!(catalog.candidate(&cid).is_some());
        assert_eq!(election.registry().len(), 1);
    }
}
