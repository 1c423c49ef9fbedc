use std::path::PathBuf;

use clap::{Parser, Subcommand};

use flightdeck_cli::client::DEFAULT_SERVER;

/// Command-line client for a flightdeck server.
///
/// Lists and describes datasets, runs serialized plans and fetches their
/// results over Arrow Flight.
#[derive(Parser, Debug)]
#[command(name = "flightdeck", version, about = "Command-line client for a flightdeck server")]
pub struct CliArgs {
    /// Server address (grpc://host:port)
    #[arg(long, env = "FLIGHTDECK_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every dataset the server exposes
    List,

    /// Show schema and size of one dataset
    Describe {
        /// Dataset name; `/` separates path segments
        name: String,
    },

    /// Submit the plan stored in a file and print its result
    Query {
        /// File holding the serialized plan (SQL text for the sql backend)
        plan_file: PathBuf,

        /// Leave the result cached on the server and print its ticket
        #[arg(long)]
        keep: bool,
    },

    /// Print the result behind a ticket
    Fetch {
        ticket: String,
    },

    /// Drop the cached result behind a ticket
    Release {
        ticket: String,
    },
}
