use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteopsError {
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("domain not found: {0}")]
    DomainNotFound(u64),

    #[error("domain already exists: {0}")]
    DomainExists(String),

    #[error("site not found: {0}")]
    SiteNotFound(u64),

    #[error("post not found: {0}")]
    PostNotFound(u64),

    #[error("server not found: {0}")]
    ServerNotFound(u64),

    #[error("pool '{0}' already has a primary server")]
    PrimaryExists(String),

    #[error("invalid hostname '{0}'")]
    InvalidHostname(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown trigger: {0}")]
    UnknownTrigger(String),

    #[error("trigger already registered: {0}")]
    DuplicateTrigger(String),

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("store error: {0}")]
    Store(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SiteopsError {
    /// Wrap any redb error (database, transaction, table, storage, commit).
    pub(crate) fn store(e: impl std::fmt::Display) -> Self {
        SiteopsError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SiteopsError>;
