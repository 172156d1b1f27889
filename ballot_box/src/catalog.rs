use chrono::Utc;
use log::{debug, info};
use snafu::{ensure, OptionExt};

use crate::error::*;
use crate::model::*;
use crate::store::{load_records, save_records, Collection, RecordStore, StoreResult};

/// The positions seeded in a new election when none are configured.
pub const DEFAULT_POSITIONS: [&str; 15] = [
    "President",
    "Vice",
    "Secretary",
    "Auditor",
    "Treasurer",
    "PIO in",
    "PIO ex",
    "Senator 1",
    "Senator 2",
    "Senator 3",
    "Senator 4",
    "Senator 5",
    "Senator 6",
    "Senator 7",
    "Senator 8",
];

/// Generates an identifier `<prefix>-<16 hex digits>`.
///
/// The digest covers the natural key of the record and the current time, so
/// a record deleted and created again under the same name gets a fresh
/// identifier and never inherits the votes of its predecessor.
pub(crate) fn make_id(prefix: &str, natural_key: &str, salt: usize) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let digest = sha256::digest(format!("{}:{}:{:08}:{}", prefix, natural_key, salt, nanos));
    format!("{}-{}", prefix, &digest[..16])
}

/// The fields of a candidate as entered by an administrator.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NewCandidate {
    pub position_id: PositionId,
    pub first_name: String,
    pub last_name: String,
    pub platform: String,
    pub photo: Option<String>,
}

/// Snapshot of the positions (in ballot order) and of the candidates.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BallotCatalog {
    // Invariant: sorted by ordinal.
    positions: Vec<Position>,
    candidates: Vec<Candidate>,
}

impl BallotCatalog {
    pub fn new() -> BallotCatalog {
        BallotCatalog::default()
    }

    pub fn with_default_positions() -> BallotCatalog {
        let mut res = BallotCatalog::new();
        for name in DEFAULT_POSITIONS {
            // The default names are distinct and non-empty.
            if let Err(e) = res.add_position(name, 1) {
                debug!("with_default_positions: skipping {:?}: {}", name, e);
            }
        }
        res
    }

    pub fn load(store: &dyn RecordStore) -> StoreResult<BallotCatalog> {
        let mut positions: Vec<Position> = load_records(store, Collection::Positions)?;
        positions.sort_by_key(|p| p.ordinal);
        let candidates: Vec<Candidate> = load_records(store, Collection::Candidates)?;
        debug!(
            "BallotCatalog::load: {} positions, {} candidates",
            positions.len(),
            candidates.len()
        );
        Ok(BallotCatalog {
            positions,
            candidates,
        })
    }

    pub fn save(&self, store: &dyn RecordStore) -> StoreResult<()> {
        save_records(store, Collection::Positions, &self.positions)?;
        save_records(store, Collection::Candidates, &self.candidates)
    }

    pub fn positions_ordered(&self) -> &[Position] {
        &self.positions
    }

    pub fn position(&self, id: &PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == *id)
    }

    /// The index of the position in ballot order.
    pub fn position_index(&self, id: &PositionId) -> Option<usize> {
        self.positions.iter().position(|p| p.id == *id)
    }

    pub fn find_position_by_name(&self, name: &str) -> Option<&Position> {
        let name = name.trim().to_lowercase();
        self.positions
            .iter()
            .find(|p| p.name.to_lowercase() == name)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidates_for<'a>(
        &'a self,
        position_id: &'a PositionId,
    ) -> impl Iterator<Item = &'a Candidate> + 'a {
        self.candidates
            .iter()
            .filter(move |c| c.position_id == *position_id)
    }

    pub fn candidate(&self, id: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == *id)
    }

    fn check_position_fields(
        &self,
        name: &str,
        vote_limit: u32,
        except: Option<&PositionId>,
    ) -> BallotResult<String> {
        let name = name.trim();
        ensure!(
            !name.is_empty(),
            InvalidFieldSnafu {
                field: "position name",
                reason: "the name is required",
            }
        );
        ensure!(
            vote_limit >= 1,
            InvalidFieldSnafu {
                field: "vote limit",
                reason: format!("must be at least 1, got {}", vote_limit),
            }
        );
        if let Some(other) = self.find_position_by_name(name) {
            ensure!(
                Some(&other.id) == except,
                DuplicateIdentifierSnafu {
                    kind: RecordKind::Position,
                    key: name,
                }
            );
        }
        Ok(name.to_string())
    }

    pub fn add_position(&mut self, name: &str, vote_limit: u32) -> BallotResult<Position> {
        let name = self.check_position_fields(name, vote_limit, None)?;
        let ordinal = self
            .positions
            .iter()
            .map(|p| p.ordinal + 1)
            .max()
            .unwrap_or(0);
        let position = Position {
            id: PositionId(make_id("pos", &name.to_lowercase(), self.positions.len())),
            name,
            vote_limit,
            ordinal,
        };
        info!("Adding position {:?} ({})", position.name, position.id);
        self.positions.push(position.clone());
        Ok(position)
    }

    /// Adds a position with a caller-provided identifier, placed last on the
    /// ballot.
    pub fn insert_position(
        &mut self,
        id: PositionId,
        name: &str,
        vote_limit: u32,
    ) -> BallotResult<Position> {
        ensure!(
            self.position(&id).is_none(),
            DuplicateIdentifierSnafu {
                kind: RecordKind::Position,
                key: id.as_str(),
            }
        );
        let mut position = self.add_position(name, vote_limit)?;
        position.id = id;
        if let Some(last) = self.positions.last_mut() {
            last.id = position.id.clone();
        }
        Ok(position)
    }

    pub fn edit_position(
        &mut self,
        id: &PositionId,
        name: &str,
        vote_limit: u32,
    ) -> BallotResult<Position> {
        let name = self.check_position_fields(name, vote_limit, Some(id))?;
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == *id)
            .context(NotFoundSnafu {
                kind: RecordKind::Position,
                id: id.as_str(),
            })?;
        position.name = name;
        position.vote_limit = vote_limit;
        Ok(position.clone())
    }

    /// Moves a position to the given index of the ballot. Indices past the
    /// end place the position last. Ordinals are renumbered from 0.
    pub fn move_position(&mut self, id: &PositionId, index: usize) -> BallotResult<()> {
        let from = self.position_index(id).context(NotFoundSnafu {
            kind: RecordKind::Position,
            id: id.as_str(),
        })?;
        let position = self.positions.remove(from);
        let to = index.min(self.positions.len());
        self.positions.insert(to, position);
        for (idx, p) in self.positions.iter_mut().enumerate() {
            p.ordinal = idx as u32;
        }
        Ok(())
    }

    /// Removes the position. Its candidates stay registered but can no longer
    /// be reached from a ballot.
    pub fn remove_position(&mut self, id: &PositionId) -> BallotResult<Position> {
        let idx = self.position_index(id).context(NotFoundSnafu {
            kind: RecordKind::Position,
            id: id.as_str(),
        })?;
        let position = self.positions.remove(idx);
        info!("Removed position {:?} ({})", position.name, position.id);
        Ok(position)
    }

    fn check_candidate_fields(&self, new: &NewCandidate) -> BallotResult<()> {
        ensure!(
            !new.first_name.trim().is_empty(),
            InvalidFieldSnafu {
                field: "first name",
                reason: "the first name is required",
            }
        );
        ensure!(
            !new.last_name.trim().is_empty(),
            InvalidFieldSnafu {
                field: "last name",
                reason: "the last name is required",
            }
        );
        self.position(&new.position_id).context(NotFoundSnafu {
            kind: RecordKind::Position,
            id: new.position_id.as_str(),
        })?;
        Ok(())
    }

    pub fn add_candidate(&mut self, new: NewCandidate) -> BallotResult<Candidate> {
        self.check_candidate_fields(&new)?;
        let key = format!(
            "{}:{} {}",
            new.position_id,
            new.first_name.trim(),
            new.last_name.trim()
        );
        let candidate = Candidate {
            id: CandidateId(make_id("cand", &key, self.candidates.len())),
            position_id: new.position_id,
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            platform: new.platform,
            photo: new.photo,
        };
        info!(
            "Adding candidate {} for position {} ({})",
            candidate.display_name(),
            candidate.position_id,
            candidate.id
        );
        self.candidates.push(candidate.clone());
        Ok(candidate)
    }

    pub fn insert_candidate(
        &mut self,
        id: CandidateId,
        new: NewCandidate,
    ) -> BallotResult<Candidate> {
        ensure!(
            self.candidate(&id).is_none(),
            DuplicateIdentifierSnafu {
                kind: RecordKind::Candidate,
                key: id.as_str(),
            }
        );
        let mut candidate = self.add_candidate(new)?;
        candidate.id = id;
        if let Some(last) = self.candidates.last_mut() {
            last.id = candidate.id.clone();
        }
        Ok(candidate)
    }

    pub fn edit_candidate(&mut self, id: &CandidateId, new: NewCandidate) -> BallotResult<Candidate> {
        self.check_candidate_fields(&new)?;
        let candidate = self
            .candidates
            .iter_mut()
            .find(|c| c.id == *id)
            .context(NotFoundSnafu {
                kind: RecordKind::Candidate,
                id: id.as_str(),
            })?;
        candidate.position_id = new.position_id;
        candidate.first_name = new.first_name.trim().to_string();
        candidate.last_name = new.last_name.trim().to_string();
        candidate.platform = new.platform;
        candidate.photo = new.photo;
        Ok(candidate.clone())
    }

    pub fn remove_candidate(&mut self, id: &CandidateId) -> BallotResult<Candidate> {
        let idx = self
            .candidates
            .iter()
            .position(|c| c.id == *id)
            .context(NotFoundSnafu {
                kind: RecordKind::Candidate,
                id: id.as_str(),
            })?;
        Ok(self.candidates.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn new_candidate(pid: &PositionId, first: &str, last: &str) -> NewCandidate {
        NewCandidate {
            position_id: pid.clone(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            platform: "".to_string(),
            photo: None,
        }
    }

    #[test]
    fn positions_are_ordered_by_insertion() {
        let mut cat = BallotCatalog::new();
        let p1 = cat.add_position("President", 1).unwrap();
        let p2 = cat.add_position(" Secretary ", 1).unwrap();
        assert_eq!(p1.ordinal, 0);
        assert_eq!(p2.ordinal, 1);
        assert_eq!(p2.name, "Secretary");
        let names: Vec<&str> = cat
            .positions_ordered()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["President", "Secretary"]);
        assert!(p1.id.as_str().starts_with("pos-"));
        assert_ne!(p1.id, p2.id);
    }

    #[test]
    fn position_names_are_unique_ignoring_case() {
        let mut cat = BallotCatalog::new();
        cat.add_position("President", 1).unwrap();
        let err = cat.add_position("  PRESIDENT", 1).unwrap_err();
        assert!(matches!(
            err,
            BallotError::DuplicateIdentifier {
                kind: RecordKind::Position,
                ..
            }
        ));
        assert_eq!(cat.positions_ordered().len(), 1);
    }

    #[test]
    fn position_fields_are_validated() {
        let mut cat = BallotCatalog::new();
        assert!(matches!(
            cat.add_position("   ", 1),
            Err(BallotError::InvalidField { .. })
        ));
        assert!(matches!(
            cat.add_position("Auditor", 0),
            Err(BallotError::InvalidField { .. })
        ));
        assert!(cat.positions_ordered().is_empty());
    }

    #[test]
    fn edit_position_keeps_its_own_name() {
        let mut cat = BallotCatalog::new();
        let p = cat.add_position("President", 1).unwrap();
        cat.add_position("Vice", 1).unwrap();
        let edited = cat.edit_position(&p.id, "president", 2).unwrap();
        assert_eq!(edited.name, "president");
        assert_eq!(edited.vote_limit, 2);
        assert!(matches!(
            cat.edit_position(&p.id, "VICE", 1),
            Err(BallotError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn move_position_renumbers() {
        let mut cat = BallotCatalog::new();
        let a = cat.add_position("A", 1).unwrap();
        cat.add_position("B", 1).unwrap();
        let c = cat.add_position("C", 1).unwrap();
        cat.move_position(&c.id, 0).unwrap();
        let order: Vec<(String, u32)> = cat
            .positions_ordered()
            .iter()
            .map(|p| (p.name.clone(), p.ordinal))
            .collect();
        assert_eq!(
            order,
            vec![
                ("C".to_string(), 0),
                ("A".to_string(), 1),
                ("B".to_string(), 2)
            ]
        );
        cat.move_position(&a.id, 99).unwrap();
        assert_eq!(cat.position_index(&a.id), Some(2));
    }

    #[test]
    fn candidates_need_a_live_position() {
        let mut cat = BallotCatalog::new();
        let p = cat.add_position("President", 1).unwrap();
        let c = cat.add_candidate(new_candidate(&p.id, "Ada", "Lovelace")).unwrap();
        assert_eq!(c.display_name(), "Ada Lovelace");
        assert_eq!(cat.candidates_for(&p.id).count(), 1);

        let err = cat
            .add_candidate(new_candidate(&PositionId::from("nope"), "A", "B"))
            .unwrap_err();
        assert!(matches!(
            err,
            BallotError::NotFound {
                kind: RecordKind::Position,
                ..
            }
        ));
        assert!(matches!(
            cat.add_candidate(new_candidate(&p.id, "", "B")),
            Err(BallotError::InvalidField { .. })
        ));
        assert_eq!(cat.candidates().len(), 1);
    }

    #[test]
    fn explicit_identifiers_are_kept() {
        let mut cat = BallotCatalog::new();
        let p = cat
            .insert_position(PositionId::from("president"), "President", 1)
            .unwrap();
        assert_eq!(p.id.as_str(), "president");
        assert!(cat.position(&PositionId::from("president")).is_some());
        let c = cat
            .insert_candidate(CandidateId::from("a"), new_candidate(&p.id, "A", "A"))
            .unwrap();
        assert_eq!(cat.candidate(&CandidateId::from("a")), Some(&c));
        assert!(matches!(
            cat.insert_candidate(CandidateId::from("a"), new_candidate(&p.id, "B", "B")),
            Err(BallotError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn removing_a_position_keeps_its_candidates() {
        let mut cat = BallotCatalog::new();
        let p = cat.add_position("President", 1).unwrap();
        cat.add_candidate(new_candidate(&p.id, "A", "A")).unwrap();
        cat.remove_position(&p.id).unwrap();
        assert!(cat.positions_ordered().is_empty());
        assert_eq!(cat.candidates().len(), 1);
        assert!(matches!(
            cat.remove_position(&p.id),
            Err(BallotError::NotFound { .. })
        ));
    }

    #[test]
    fn default_positions() {
        let cat = BallotCatalog::with_default_positions();
        assert_eq!(cat.positions_ordered().len(), DEFAULT_POSITIONS.len());
        assert_eq!(cat.positions_ordered()[0].name, "President");
        assert_eq!(cat.positions_ordered()[14].name, "Senator 8");
    }

    #[test]
    fn save_and_load() {
        let store = MemoryStore::new();
        let mut cat = BallotCatalog::new();
        let a = cat.add_position("A", 1).unwrap();
        let b = cat.add_position("B", 1).unwrap();
        cat.move_position(&b.id, 0).unwrap();
        cat.add_candidate(new_candidate(&a.id, "X", "Y")).unwrap();
        cat.save(&store).unwrap();
        let loaded = BallotCatalog::load(&store).unwrap();
        assert_eq!(loaded, cat);
    }
}
