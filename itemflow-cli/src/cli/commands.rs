//! Itemflow CLI commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// List workflow definitions in the repository
    Workflows,

    /// List the states of a workflow
    States {
        /// Workflow id
        workflow: String,
    },

    /// Put an item into a workflow's initial state
    ///
    /// Restarting an item clears its history.
    Start {
        /// Workflow id
        workflow: String,

        /// Item id
        item: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// Show the current workflow state of an item
    State {
        /// Item id
        item: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// List the commands available to the user for an item
    Commands {
        /// Item id
        item: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// Execute a workflow command on an item
    ///
    /// Examples:
    ///   itemflow execute article submit --comment "Ready for review"
    ///   itemflow execute article approve --param priority=high --callback log
    Execute {
        /// Item id
        item: String,

        /// Command id
        command: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,

        /// Comment recorded with the transition
        #[arg(short, long)]
        comment: Option<String>,

        /// Pipeline parameter as name=value (repeatable)
        #[arg(short, long)]
        param: Vec<String>,

        /// Completion handler to notify when the command completes
        #[arg(long)]
        callback: Option<String>,

        /// JSON payload handed to the completion handler
        #[arg(long, requires = "callback")]
        payload: Option<String>,
    },

    /// Resume a suspended pipeline in the current session
    Resume {
        /// Resume token printed by execute
        token: String,
    },

    /// List suspended pipelines of the current session
    Pending,

    /// Show the workflow history of an item
    History {
        /// Item id
        item: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// Check whether an item is approved for publishing
    Approved {
        /// Item id
        item: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,

        /// Publishing target
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Resolve a workflow access right (item:delete, item:removeversion, item:write)
    Access {
        /// Item id
        item: String,

        /// Access right name
        right: String,

        /// Item version
        #[arg(short, long, default_value = "1")]
        version: u32,
    },

    /// List the items in a workflow state
    Items {
        /// Workflow id
        workflow: String,

        /// State id
        state: String,
    },

    /// Drop every suspended pipeline and callback of the current session
    EndSession,
}
