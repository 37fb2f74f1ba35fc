use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open process {pid}: {message}")]
    ProcessOpenFailed { pid: u32, message: String },

    #[error("Process exited during resolution")]
    ProcessExited,

    #[error("Required modules did not appear within {attempts} attempts")]
    ModuleWaitTimeout { attempts: u32 },

    #[error("No known FPS pattern matched (module timestamp {timestamp:#010x}); signatures need an update for this game build")]
    UnsupportedBinary { timestamp: u32 },

    #[error("Failed to read process memory at {address:#x}: {message}")]
    MemoryReadFailed { address: u64, message: String },

    #[error("Failed to write process memory at {address:#x}: {message}")]
    MemoryWriteFailed { address: u64, message: String },

    #[error("Invalid module image: {0}")]
    InvalidImage(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Foreground watcher failed to start: {0}")]
    WatcherStart(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that discard one binding attempt without implying
    /// the signature set is stale.
    pub fn is_binding_failure(&self) -> bool {
        matches!(
            self,
            Error::ProcessExited | Error::ModuleWaitTimeout { .. } | Error::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_failures_exclude_stale_signatures() {
        assert!(Error::ProcessExited.is_binding_failure());
        assert!(Error::ModuleWaitTimeout { attempts: 40 }.is_binding_failure());
        assert!(!Error::UnsupportedBinary { timestamp: 0x656F_FAF7 }.is_binding_failure());
    }
}
