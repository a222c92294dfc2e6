use crate::config::BackendKind;
use crate::utils::date::MAX_GRID_DAYS;
use clap::{Parser, Subcommand};

/// Command-line interface definition for zensession
/// Track work sessions against projects, alone or as a team
#[derive(Parser, Debug)]
#[command(
    name = "zensession",
    version = env!("CARGO_PKG_VERSION"),
    about = "Track timed work sessions per project, with activity stats and an ideas board",
    long_about = None
)]
pub struct Cli {
    /// Override the store path (SQLite file, or JSON file for the local backend)
    #[arg(global = true, long = "db")]
    pub db: Option<String>,

    /// Override the configured backend
    #[arg(global = true, long = "backend", value_enum)]
    pub backend: Option<BackendKind>,

    /// Act as this actor (overrides `actor_id` from the config)
    #[arg(global = true, long = "as", value_name = "ACTOR", conflicts_with = "anonymous")]
    pub actor: Option<String>,

    /// Act signed out
    #[arg(global = true, long = "anonymous")]
    pub anonymous: bool,

    /// Universe mode: show every actor's records
    #[arg(global = true, long = "all")]
    pub all: bool,

    /// Run in test mode (no config file update, in-memory preferences)
    #[arg(global = true, long = "test", hide = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Show the configuration
    Config {
        #[arg(long = "print", help = "Print the current configuration")]
        print_config: bool,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Start a session (or log a past one with --at and --until)
    Start {
        /// Project id
        project: i64,

        /// What you are working on
        name: String,

        #[arg(long = "category", short = 'c')]
        category: Option<String>,

        /// Start time, local wall clock (YYYY-MM-DDTHH:MM)
        #[arg(long = "at")]
        at: Option<String>,

        /// End time for a backfilled session, local wall clock
        #[arg(long = "until", requires = "at")]
        until: Option<String>,
    },

    /// Stop your running session, or the given one
    Stop {
        /// Session id (defaults to your active session)
        id: Option<i64>,
    },

    /// Edit a session's name, category or time bounds
    Edit {
        id: i64,

        #[arg(long = "name")]
        name: Option<String>,

        #[arg(long = "category")]
        category: Option<String>,

        /// New start, local wall clock (YYYY-MM-DDTHH:MM)
        #[arg(long = "start")]
        start: Option<String>,

        /// New end, local wall clock (YYYY-MM-DDTHH:MM)
        #[arg(long = "end")]
        end: Option<String>,
    },

    /// Delete a session
    Rm { id: i64 },

    /// List a project's sessions, newest first
    Sessions { project: i64 },

    /// Show running sessions with their live clocks
    Active,

    /// Follow running sessions live until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long = "seconds")]
        seconds: Option<u64>,
    },

    /// Per-project totals
    Stats,

    /// Activity grid for the last days
    Grid {
        #[arg(
            long = "days",
            default_value_t = 7,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_GRID_DAYS))
        )]
        days: u32,

        /// count | duration
        #[arg(long = "metric", default_value = "count")]
        metric: String,

        /// Also summarize this day (YYYY-MM-DD)
        #[arg(long = "day")]
        day: Option<String>,
    },

    /// Ideas board
    Idea {
        #[command(subcommand)]
        action: IdeaAction,
    },

    /// Private todo list
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },

    /// Print the internal audit log
    Log {
        #[arg(long = "print", help = "Print rows from the internal log table")]
        print: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    Add {
        name: String,

        #[arg(long = "desc")]
        description: Option<String>,

        #[arg(long = "img")]
        header_img: Option<String>,

        #[arg(long = "private")]
        private: bool,

        #[arg(long = "closed")]
        closed: bool,
    },
    List,
    /// Show a project and its sessions; showing the expanded project again collapses it
    Show { id: i64 },
    Edit {
        id: i64,

        #[arg(long = "name")]
        name: Option<String>,

        #[arg(long = "desc")]
        description: Option<String>,

        #[arg(long = "img")]
        header_img: Option<String>,

        #[arg(long = "public")]
        public: Option<bool>,

        #[arg(long = "open")]
        open: Option<bool>,
    },
    Del { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum IdeaAction {
    Add { text: String },
    List,
    /// Toggle a reaction: heart, like or funny
    React { id: i64, reaction: String },
}

#[derive(Subcommand, Debug)]
pub enum TodoAction {
    Add { name: String },
    List,
    /// Mark done, or reopen a finished item
    Done { id: i64 },
    Rename { id: i64, name: String },
    /// Replace the free-text note
    Note { id: i64, text: String },
}
