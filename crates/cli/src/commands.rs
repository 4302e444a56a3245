use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a task config file without running it.
    Validate {
        #[arg(long, help = "Task config file path")]
        config: String,
    },
    /// Start a task and run it in the foreground until it finishes, is
    /// stopped (Ctrl+C / SIGTERM), or fails. Maps to the `start`/`stop`
    /// control actions.
    Run {
        #[arg(long, help = "Task config file path")]
        config: String,

        #[arg(long, help = "State store directory (default: ~/.dtaas/state)")]
        state_dir: Option<String>,
    },
    /// Test connectivity for a connector definition.
    TestConn {
        #[arg(long, help = "Connector JSON file path")]
        connector: String,
    },
    /// Read a table's progress for a past or in-flight execution from the
    /// embedded state store.
    Status {
        #[arg(long, help = "State store directory (default: ~/.dtaas/state)")]
        state_dir: Option<String>,

        #[arg(long, help = "Execution id to inspect")]
        execution: String,

        #[arg(long, help = "Table name within the execution")]
        table: String,

        #[arg(long, help = "Print as JSON instead of a table")]
        json: bool,
    },
}
