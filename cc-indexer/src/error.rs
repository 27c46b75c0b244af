use thiserror::Error;

/// Failures surfaced by the sync engine, the stores and the query facade.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Connection, timeout or unexpected RPC failure talking to bitcoind.
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The requested height is beyond the peer's tip.
    #[error("Block height {0} not found")]
    HeightNotFound(u32),

    #[error("Malformed asset metadata: {0}")]
    MalformedAssetMetadata(String),

    /// Reversal data for a block or mempool transaction is gone, the revert
    /// cannot be completed safely.
    #[error("Undo log entry missing: {0}")]
    UndoLogMissing(String),

    #[error("Store write failure: {0}")]
    StoreWriteFailure(String),

    #[error("Dependency cycle among mempool transactions: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl IndexError {
    /// Fatal errors need operator intervention, retrying will hit them again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::UndoLogMissing(_) | IndexError::DependencyCycle(_)
        )
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(IndexError::UndoLogMissing("block 10".to_string()).is_fatal());
        assert!(IndexError::DependencyCycle(vec!["aa".to_string()]).is_fatal());
        assert!(!IndexError::PeerUnavailable("timeout".to_string()).is_fatal());
        assert!(!IndexError::HeightNotFound(100).is_fatal());
        assert!(!IndexError::StoreWriteFailure("io".to_string()).is_fatal());
    }
}
