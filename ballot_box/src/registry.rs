use chrono::Utc;
use log::info;
use snafu::{ensure, OptionExt};

use crate::catalog::make_id;
use crate::error::*;
use crate::model::*;
use crate::store::{load_records, save_records, Collection, RecordStore, StoreResult};

/// Snapshot of the registered voters.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct VoterRegistry {
    voters: Vec<Voter>,
}

impl VoterRegistry {
    pub fn new() -> VoterRegistry {
        VoterRegistry::default()
    }

    pub fn load(store: &dyn RecordStore) -> StoreResult<VoterRegistry> {
        let voters: Vec<Voter> = load_records(store, Collection::Voters)?;
        Ok(VoterRegistry { voters })
    }

    pub fn save(&self, store: &dyn RecordStore) -> StoreResult<()> {
        save_records(store, Collection::Voters, &self.voters)
    }

    pub fn voters(&self) -> &[Voter] {
        &self.voters
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }

    /// School IDs are matched exactly, after trimming the query.
    pub fn find_voter_by_school_id(&self, school_id: &str) -> Option<&Voter> {
        let school_id = school_id.trim();
        self.voters.iter().find(|v| v.school_id == school_id)
    }

    pub fn voter(&self, id: &VoterId) -> Option<&Voter> {
        self.voters.iter().find(|v| v.id == *id)
    }

    pub fn contains(&self, id: &VoterId) -> bool {
        self.voter(id).is_some()
    }

    /// Registers a new voter. A school ID that is already in use is rejected
    /// before anything is modified.
    pub fn register(
        &mut self,
        school_id: &str,
        name: &str,
        photo: Option<String>,
    ) -> BallotResult<Voter> {
        let school_id = school_id.trim();
        let name = name.trim();
        ensure!(
            !school_id.is_empty(),
            InvalidFieldSnafu {
                field: "school ID",
                reason: "the school ID is required",
            }
        );
        ensure!(
            !name.is_empty(),
            InvalidFieldSnafu {
                field: "voter name",
                reason: "the name is required",
            }
        );
        ensure!(
            self.find_voter_by_school_id(school_id).is_none(),
            DuplicateIdentifierSnafu {
                kind: RecordKind::Voter,
                key: school_id,
            }
        );
        let voter = Voter {
            id: VoterId(make_id("voter", school_id, self.voters.len())),
            school_id: school_id.to_string(),
            name: name.to_string(),
            registered_at: Utc::now(),
            photo,
        };
        info!("Registered voter {} ({})", voter.school_id, voter.id);
        self.voters.push(voter.clone());
        Ok(voter)
    }

    pub fn remove(&mut self, id: &VoterId) -> BallotResult<Voter> {
        let idx = self
            .voters
            .iter()
            .position(|v| v.id == *id)
            .context(NotFoundSnafu {
                kind: RecordKind::Voter,
                id: id.as_str(),
            })?;
        Ok(self.voters.remove(idx))
    }

    /// Gives every voter already registered in `existing` (same school ID)
    /// their previous identifier and registration time, so their votes and
    /// progress still belong to them. Returns how many voters were matched.
    pub fn adopt_identities(&mut self, existing: &VoterRegistry) -> usize {
        let mut matched = 0;
        for voter in self.voters.iter_mut() {
            if let Some(prev) = existing.find_voter_by_school_id(&voter.school_id) {
                voter.id = prev.id.clone();
                voter.registered_at = prev.registered_at;
                matched += 1;
            }
        }
        matched
    }

    /// Voters whose name or school ID contains the term, ignoring case.
    pub fn search(&self, term: &str) -> Vec<&Voter> {
        let term = term.to_lowercase();
        self.voters
            .iter()
            .filter(|v| {
                v.name.to_lowercase().contains(&term) || v.school_id.to_lowercase().contains(&term)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn register_and_find() {
        let mut reg = VoterRegistry::new();
        let v = reg.register("2021-0001", "Juan Dela Cruz", None).unwrap();
        assert!(v.id.as_str().starts_with("voter-"));
        assert_eq!(reg.find_voter_by_school_id(" 2021-0001 "), Some(&v));
        assert!(reg.find_voter_by_school_id("2021-0002").is_none());
        assert!(reg.contains(&v.id));
    }

    #[test]
    fn duplicate_school_id_is_rejected() {
        let mut reg = VoterRegistry::new();
        reg.register("S1", "First", None).unwrap();
        let err = reg.register("S1", "Second", None).unwrap_err();
        assert!(matches!(
            err,
            BallotError::DuplicateIdentifier {
                kind: RecordKind::Voter,
                ..
            }
        ));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.voters()[0].name, "First");
    }

    #[test]
    fn required_fields() {
        let mut reg = VoterRegistry::new();
        assert!(matches!(
            reg.register(" ", "Name", None),
            Err(BallotError::InvalidField { .. })
        ));
        assert!(matches!(
            reg.register("S1", "", None),
            Err(BallotError::InvalidField { .. })
        ));
        assert!(reg.is_empty());
    }

    #[test]
    fn search_and_remove() {
        let mut reg = VoterRegistry::new();
        let a = reg.register("S1", "Maria Clara", None).unwrap();
        reg.register("S2", "Crisostomo Ibarra", None).unwrap();
        assert_eq!(reg.search("clara").len(), 1);
        assert_eq!(reg.search("s").len(), 2);
        reg.remove(&a.id).unwrap();
        assert!(reg.find_voter_by_school_id("S1").is_none());
        assert!(matches!(reg.remove(&a.id), Err(BallotError::NotFound { .. })));
    }

    #[test]
    fn known_school_ids_keep_their_identity() {
        let mut old = VoterRegistry::new();
        let s1 = old.register("S1", "One", None).unwrap();
        old.register("S9", "Gone", None).unwrap();

        let mut reg = VoterRegistry::new();
        reg.register("S1", "One (renamed)", None).unwrap();
        let s2 = reg.register("S2", "Two", None).unwrap();
        assert_eq!(reg.adopt_identities(&old), 1);

        let v1 = reg.find_voter_by_school_id("S1").unwrap();
        assert_eq!(v1.id, s1.id);
        assert_eq!(v1.registered_at, s1.registered_at);
        assert_eq!(v1.name, "One (renamed)");
        assert_eq!(reg.find_voter_by_school_id("S2"), Some(&s2));
        assert!(reg.find_voter_by_school_id("S9").is_none());
    }

    #[test]
    fn save_and_load() {
        let store = MemoryStore::new();
        let mut reg = VoterRegistry::new();
        reg.register("S1", "One", Some("photos/s1.png".to_string()))
            .unwrap();
        reg.save(&store).unwrap();
        assert_eq!(VoterRegistry::load(&store).unwrap(), reg);
    }
}
