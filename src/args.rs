use clap::{Parser, Subcommand};

/// This is a voting booth for multi-position elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (directory path, default election-data) The directory where the election records are stored.
    /// It is created if it does not exist.
    #[clap(short, long, value_parser, default_value = "election-data")]
    pub data: String,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates the election. Without a configuration file, the default list of positions is used.
    Init {
        /// (file path, optional) The JSON file describing the positions, candidates and voters.
        /// For more information about the file format, read the documentation of the manual.
        #[clap(short, long, value_parser)]
        config: Option<String>,
    },
    /// Adds a position at the end of the ballot.
    AddPosition {
        #[clap(value_parser)]
        name: String,
        #[clap(long, value_parser, default_value_t = 1)]
        vote_limit: u32,
    },
    EditPosition {
        #[clap(value_parser)]
        id: String,
        #[clap(value_parser)]
        name: String,
        /// Keeps the current vote limit if not specified.
        #[clap(long, value_parser)]
        vote_limit: Option<u32>,
    },
    RemovePosition {
        #[clap(value_parser)]
        id: String,
    },
    /// Moves a position to the given place of the ballot (starting at 0).
    MovePosition {
        #[clap(value_parser)]
        id: String,
        #[clap(value_parser)]
        ordinal: usize,
    },
    AddCandidate {
        /// The identifier or the name of the position.
        #[clap(short, long, value_parser)]
        position: String,
        #[clap(long, value_parser)]
        first_name: String,
        #[clap(long, value_parser)]
        last_name: String,
        #[clap(long, value_parser, default_value = "")]
        platform: String,
    },
    RemoveCandidate {
        #[clap(value_parser)]
        id: String,
    },
    RegisterVoter {
        #[clap(short, long, value_parser)]
        school_id: String,
        #[clap(short, long, value_parser)]
        name: String,
    },
    RemoveVoter {
        #[clap(value_parser)]
        id: String,
    },
    /// Lists the registered voters, whether they voted, for whom and when.
    ListVoters {
        /// Only the voters whose name or school ID contains this term.
        #[clap(short, long, value_parser)]
        search: Option<String>,
    },
    /// Registers the voters listed in a roster file (school ID in the first column,
    /// name in the second, one header row).
    ImportVoters {
        /// (file path) The roster file.
        #[clap(short, long, value_parser)]
        input: String,
        /// (default csv) The type of the input: csv or xlsx.
        #[clap(long, value_parser)]
        input_type: Option<String>,
        /// When using an Excel file, indicates the name of the worksheet to use.
        #[clap(long, value_parser)]
        excel_worksheet_name: Option<String>,
    },
    /// Opens the ballot of a voter, resuming where they left it.
    Login {
        #[clap(value_parser)]
        school_id: String,
    },
    /// Shows the current page of the ballot.
    Status,
    /// Stages a candidate for the current position.
    Select {
        #[clap(value_parser)]
        candidate: String,
    },
    /// Records the vote for the current position and moves to the next one.
    Commit {
        /// The candidate to vote for. Defaults to the staged candidate.
        #[clap(value_parser)]
        candidate: Option<String>,
        /// If specified, the vote is only recorded if the ballot is on this position.
        #[clap(short, long, value_parser)]
        position: Option<String>,
    },
    /// Goes back to the previous position.
    Back,
    /// Erases all the votes of the voter and goes back to the first position.
    Restart,
    Logout,
    /// Tabulates the votes.
    Results {
        /// If specified, only the results of this position are reported.
        #[clap(short, long, value_parser)]
        position: Option<String>,
        /// (file path, 'stdout' or empty) If specified, the results will be written in JSON format to the given
        /// location.
        #[clap(short, long, value_parser)]
        out: Option<String>,
        /// (file path) A reference file containing the results in JSON format. If provided, the command
        /// checks that the tabulated output matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,
    },
}
