use franq_core::TableName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The change feed refused or failed to open the channel
    #[error("failed to subscribe to '{table}': {reason}")]
    Subscribe { table: TableName, reason: String },
}
