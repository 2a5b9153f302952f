//! Error taxonomy shared by every construction component.

/// Errors raised while building or scoring superpermutation candidates.
#[derive(thiserror::Error, Debug)]
pub enum ConstructError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid permutation id {id} for order {order}")]
    InvalidId { id: u64, order: usize },
    #[error("Order {0} is outside the supported range 1..=9")]
    OrderOutOfRange(usize),
    #[error("Dead end: {0}")]
    DeadEnd(String),
    #[error("Budget exhausted: {0}")]
    BudgetExhausted(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ConstructError {
    /// Dead ends and exhausted budgets can be retried with another strategy or seed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConstructError::DeadEnd(_) | ConstructError::BudgetExhausted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConstructError>;
