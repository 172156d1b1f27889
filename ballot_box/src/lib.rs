/*!
Balloting state machine, vote ledger and tally engine for multi-position
elections.

A registered voter opens a [`BallotSession`] with their school ID and walks
through the positions of the ballot in order, committing one candidate per
position. The session can go back to revise a choice, restart from scratch,
or be closed and resumed later: progress is saved after every step. All the
votes end up in a shared [`VoteLedger`] which holds at most one vote per
(voter, position) pair. Tallies and turnout are computed on demand from the
ledger.

```
use std::sync::Arc;
use ballot_box::*;
use ballot_box::builder::Builder;
use ballot_box::store::MemoryStore;

let mut builder = Builder::new()
    .positions(&["President".to_string(), "Secretary".to_string()])?;
let a = builder.add_candidate("President", "Anna", "Reyes")?;
let d = builder.add_candidate("Secretary", "Dan", "Lim")?;
builder.add_voter("2021-0001", "Clara Cruz")?;
let election = builder.build(Arc::new(MemoryStore::new()))?;

let mut session = election.open_session();
session.login("2021-0001")?;
session.commit_vote(Some(&a))?;
assert_eq!(session.commit_vote(Some(&d))?, BallotState::Complete);

let president = election.catalog().positions_ordered()[0].id.clone();
assert_eq!(election.tally(&president)?.count(&a), Some(1));
# Ok::<(), BallotError>(())
```

See the [manual] for the rules followed by the sessions.
*/

pub mod builder;
pub mod catalog;
mod election;
mod error;
pub mod ledger;
pub mod manual;
mod model;
pub mod registry;
pub mod session;
pub mod store;
pub mod tally;

pub use crate::catalog::{BallotCatalog, NewCandidate};
pub use crate::election::Election;
pub use crate::error::*;
pub use crate::ledger::VoteLedger;
pub use crate::model::*;
pub use crate::registry::VoterRegistry;
pub use crate::session::{BallotSession, BallotSource, ProgressBook};
