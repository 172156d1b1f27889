use std::{
    collections::{HashMap, HashSet},
    ops::AddAssign,
};

use log::{debug, info};

use crate::catalog::BallotCatalog;
use crate::model::*;
use crate::registry::VoterRegistry;

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct VoteCount(u64);

impl VoteCount {
    const EMPTY: VoteCount = VoteCount(0);
    const ONE: VoteCount = VoteCount(1);
}

impl std::iter::Sum for VoteCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        VoteCount(iter.map(|vc| vc.0).sum())
    }
}

impl AddAssign for VoteCount {
    fn add_assign(&mut self, rhs: VoteCount) {
        self.0 += rhs.0;
    }
}

/// Counts the votes of one position.
///
/// Every candidate registered for the position starts at zero, so candidates
/// without votes still show up. Votes for other positions are skipped, and
/// votes for candidates that are no longer registered for this position are
/// reported as orphaned instead of being counted.
pub fn tally_position(
    position: &Position,
    candidates: &[Candidate],
    votes: &[Vote],
) -> PositionTally {
    let running: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.position_id == position.id)
        .collect();
    let mut tally: HashMap<&CandidateId, VoteCount> = HashMap::new();
    for c in running.iter() {
        tally.insert(&c.id, VoteCount::EMPTY);
    }
    let mut orphaned = VoteCount::EMPTY;
    for v in votes.iter().filter(|v| v.position_id == position.id) {
        if let Some(vc) = tally.get_mut(&v.candidate_id) {
            *vc += VoteCount::ONE;
        } else {
            debug!(
                "tally_position: orphaned vote of {} for {} in {}",
                v.voter_id, v.candidate_id, position.id
            );
            orphaned += VoteCount::ONE;
        }
    }
    let total: VoteCount = tally.values().cloned().sum();
    info!(
        "Position {:?}: {} votes for {} candidates ({} orphaned)",
        position.name,
        total.0,
        running.len(),
        orphaned.0
    );
    PositionTally {
        position: position.clone(),
        tally: running
            .iter()
            .map(|c| {
                let n = tally.get(&c.id).cloned().unwrap_or(VoteCount::EMPTY);
                ((*c).clone(), n.0)
            })
            .collect(),
        orphaned: orphaned.0,
    }
}

/// The distinct voters with at least one vote.
pub fn voters_who_voted(votes: &[Vote]) -> HashSet<VoterId> {
    votes.iter().map(|v| v.voter_id.clone()).collect()
}

/// Registered voters, and how many of them have voted. Votes of voters
/// removed from the registry are not counted.
pub fn turnout(registry: &VoterRegistry, votes: &[Vote]) -> Turnout {
    let voted = voters_who_voted(votes)
        .iter()
        .filter(|vid| registry.contains(vid))
        .count();
    Turnout {
        registered: registry.len(),
        voted,
    }
}

/// The votes of each voter, in the order of `voters`.
///
/// Votes are sorted in ballot order. Votes for positions that were removed
/// come last.
pub fn voter_statuses<'a, I>(catalog: &BallotCatalog, voters: I, votes: &[Vote]) -> Vec<VoterStatus>
where
    I: IntoIterator<Item = &'a Voter>,
{
    let rank: HashMap<&PositionId, usize> = catalog
        .positions_ordered()
        .iter()
        .enumerate()
        .map(|(idx, p)| (&p.id, idx))
        .collect();
    let mut by_voter: HashMap<&VoterId, Vec<Vote>> = HashMap::new();
    for v in votes.iter() {
        by_voter.entry(&v.voter_id).or_default().push(v.clone());
    }
    let res: Vec<VoterStatus> = voters
        .into_iter()
        .map(|voter| {
            let mut vs = by_voter.remove(&voter.id).unwrap_or_default();
            vs.sort_by_key(|v| rank.get(&v.position_id).cloned().unwrap_or(usize::MAX));
            let last_voted = vs.iter().map(|v| v.timestamp).max();
            VoterStatus {
                voter: voter.clone(),
                votes: vs,
                last_voted,
            }
        })
        .collect();
    debug!(
        "voter_statuses: {} voters, {} voted",
        res.len(),
        res.iter().filter(|s| s.has_voted()).count()
    );
    res
}

/// The tallies of all the positions, in ballot order, with the turnout.
pub fn election_results(
    catalog: &BallotCatalog,
    registry: &VoterRegistry,
    votes: &[Vote],
) -> ElectionResults {
    let positions: Vec<PositionTally> = catalog
        .positions_ordered()
        .iter()
        .map(|p| tally_position(p, catalog.candidates(), votes))
        .collect();
    ElectionResults {
        positions,
        turnout: turnout(registry, votes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(id: &str) -> Position {
        Position {
            id: PositionId::from(id),
            name: id.to_string(),
            vote_limit: 1,
            ordinal: 0,
        }
    }

    fn candidate(id: &str, pid: &str) -> Candidate {
        Candidate {
            id: CandidateId::from(id),
            position_id: PositionId::from(pid),
            first_name: id.to_string(),
            last_name: "X".to_string(),
            platform: "".to_string(),
            photo: None,
        }
    }

    fn vote(voter: &str, pid: &str, cid: &str) -> Vote {
        Vote {
            voter_id: VoterId::from(voter),
            position_id: PositionId::from(pid),
            candidate_id: CandidateId::from(cid),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn counts_include_zero_vote_candidates() {
        let p = position("president");
        let cands = vec![
            candidate("a", "president"),
            candidate("b", "president"),
            candidate("c", "president"),
            candidate("d", "secretary"),
        ];
        let votes = vec![
            vote("v1", "president", "a"),
            vote("v2", "president", "a"),
            vote("v3", "president", "c"),
            vote("v1", "secretary", "d"),
        ];
        let t = tally_position(&p, &cands, &votes);
        let counts: Vec<(&str, u64)> = t
            .tally
            .iter()
            .map(|(c, n)| (c.id.as_str(), *n))
            .collect();
        assert_eq!(counts, vec![("a", 2), ("b", 0), ("c", 1)]);
        assert_eq!(t.count(&CandidateId::from("d")), None);
        assert_eq!(t.total(), 3);
        assert_eq!(t.orphaned, 0);
        let leaders: Vec<&str> = t.leaders().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(leaders, vec!["a"]);
    }

    #[test]
    fn orphaned_votes_are_excluded() {
        let p = position("president");
        let cands = vec![candidate("a", "president")];
        let votes = vec![
            vote("v1", "president", "a"),
            vote("v2", "president", "deleted"),
            // A candidate moved to another position after the vote.
            vote("v3", "president", "moved"),
        ];
        let mut all = cands.clone();
        all.push(candidate("moved", "secretary"));
        let t = tally_position(&p, &all, &votes);
        assert_eq!(t.count(&CandidateId::from("a")), Some(1));
        assert_eq!(t.orphaned, 2);
        assert_eq!(t.total(), 1);
    }

    #[test]
    fn tally_is_idempotent() {
        let p = position("p");
        let cands = vec![candidate("a", "p"), candidate("b", "p")];
        let votes = vec![vote("v1", "p", "b"), vote("v2", "p", "a")];
        let mut reversed = votes.clone();
        reversed.reverse();
        assert_eq!(
            tally_position(&p, &cands, &votes),
            tally_position(&p, &cands, &reversed)
        );
    }

    #[test]
    fn no_leader_without_votes() {
        let p = position("p");
        let t = tally_position(&p, &[candidate("a", "p")], &[]);
        assert!(t.leaders().is_empty());
        let t = tally_position(&p, &[], &[]);
        assert!(t.tally.is_empty());
    }

    #[test]
    fn turnout_counts_registered_voters_only() {
        let mut registry = VoterRegistry::new();
        let v1 = registry.register("S1", "One", None).unwrap();
        registry.register("S2", "Two", None).unwrap();
        let votes = vec![
            vote(v1.id.as_str(), "p1", "a"),
            vote(v1.id.as_str(), "p2", "b"),
            vote("voter-removed", "p1", "a"),
        ];
        assert_eq!(voters_who_voted(&votes).len(), 2);
        assert_eq!(
            turnout(&registry, &votes),
            Turnout {
                registered: 2,
                voted: 1
            }
        );
    }

    #[test]
    fn statuses_list_votes_in_ballot_order() {
        let mut catalog = BallotCatalog::new();
        let p1 = catalog.add_position("President", 1).unwrap();
        let p2 = catalog.add_position("Secretary", 1).unwrap();
        let mut registry = VoterRegistry::new();
        let v1 = registry.register("S1", "One", None).unwrap();
        let v2 = registry.register("S2", "Two", None).unwrap();

        let early = vote(v1.id.as_str(), p2.id.as_str(), "b");
        let mut late = vote(v1.id.as_str(), p1.id.as_str(), "a");
        late.timestamp = early.timestamp + chrono::Duration::seconds(30);
        let votes = vec![
            vote(v1.id.as_str(), "removed", "x"),
            early.clone(),
            late.clone(),
        ];

        let statuses = voter_statuses(&catalog, registry.voters(), &votes);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].voter, v1);
        assert!(statuses[0].has_voted());
        let order: Vec<&str> = statuses[0]
            .votes
            .iter()
            .map(|v| v.position_id.as_str())
            .collect();
        assert_eq!(order, vec![p1.id.as_str(), p2.id.as_str(), "removed"]);
        assert_eq!(statuses[0].last_voted, Some(late.timestamp));
        assert_eq!(statuses[1].voter, v2);
        assert!(!statuses[1].has_voted());
        assert_eq!(statuses[1].last_voted, None);
    }
}
