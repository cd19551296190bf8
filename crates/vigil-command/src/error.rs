//! Error types for command execution.

/// Ways an external command can fail.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The executable could not be spawned at all (missing, not
    /// executable, permissions).
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on a spawned child failed.
    #[error("failed waiting for {name}: {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("{name} exited with code {code}")]
    ExitNonZero { name: String, code: i32 },

    /// The command was killed by a signal before exiting.
    #[error("{name} terminated by signal")]
    Terminated { name: String },
}
