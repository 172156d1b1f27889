/*!

This is the long-form manual for `ballot_box` and the `ballot` command line.

## Records

An election is made of five collections, stored by a
[`RecordStore`](crate::store::RecordStore) under these keys:
* `voting-positions` the elective positions, in ballot order
* `voting-candidates` the candidates, each running for one position
* `voting-voters` the voter registry, keyed by school ID
* `voting-votes` the vote ledger
* `voting-progress` the saved cursor of each voter

The `ballot` command line adds a sixth one, `current-voter-session`, which
remembers the voter logged in at the booth between two invocations.

[`JsonDirStore`](crate::store::JsonDirStore) keeps one JSON file per
collection in a directory. A missing file is an empty collection.

## The ballot

A voter logs in with their school ID. Unknown school IDs are rejected.
The ballot then visits the positions one at a time, in ballot order:

| step          | what happens                                                        |
|---------------|---------------------------------------------------------------------|
| `select`      | stages a candidate of the current position, nothing is recorded     |
| `commit`      | records the staged (or given) candidate and moves to the next page  |
| `back`        | goes back one page, the recorded vote is shown again                |
| `restart`     | erases all the votes of the voter and goes back to the first page   |
| `logout`      | closes the session, votes and progress are kept                     |

Once every position has a vote, the ballot is complete. A complete ballot can
still go `back` to revise a choice.

A voter has at most one vote per position. Committing again on a position
replaces the previous vote.

## Resuming

The progress of each voter is saved after every step, so the ballot resumes
where it was left, even after a crash. When logging in, the saved page is
compared with the votes in the ledger and the voter lands on the earlier of:
* the saved page
* the first position without a vote

This keeps a voter who went back to revise a choice on that page, and brings
the voter back to a position that was added or moved before their current
page.

## Changing the ballot during the election

Positions and candidates can be changed at any time:
* a removed position disappears from the ballots. Voters who were past it stay
  on the same page. Its votes stay in the ledger but are no longer counted.
* a new position shows up on the ballots of voters who already went past its
  place
* a removed candidate's votes stay in the ledger as orphaned votes, reported
  apart from the counts
* a candidate who already received votes cannot move to another position

## Results

For each position, in ballot order, the number of votes of each candidate
registered for that position, including those without votes. The turnout
counts the registered voters and how many of them have at least one vote.
Votes cast by voters later removed from the registry still count in the
tallies, but not in the turnout.

`ballot list-voters [--search TERM]` lists the registered voters, whether
they voted, for whom, and when they last voted. The search matches names and
school IDs, ignoring case.

The `results` command prints the results as JSON. With `--reference`, it
compares them to a previous output and fails if they differ.

## Configuration file

`ballot init --config election.json` loads positions, candidates and voters
from a JSON file:

```json
{
  "electionName": "Student council",
  "positions": [{"name": "President", "voteLimit": 1}],
  "candidates": [
    {"position": "President", "firstName": "Anna", "lastName": "Reyes"}
  ],
  "voters": [{"schoolId": "2021-0001", "name": "Clara Cruz"}],
  "voterSources": [
    {"provider": "csv", "filePath": "roster.csv", "firstRowIndex": 2,
     "schoolIdColumnIndex": 1, "nameColumnIndex": 2}
  ]
}
```

Candidates refer to their position by name or by identifier. Row and column
indices start at 1 and can be given as numbers or as strings. Paths are
relative to the directory of the configuration file.

Running `init` again replaces the positions, candidates and voters but keeps
the recorded votes. A voter whose school ID was already registered keeps their
identifier and resumes their ballot.

Without a configuration file, `init` creates the default list of positions.
*/
