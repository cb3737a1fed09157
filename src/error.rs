use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("poisson rate must be finite and non-negative, got {0}")]
    InvalidRate(f64),
    #[error("unknown probability field `{0}`")]
    UnknownOutcome(String),
    #[error("bankroll must be positive and finite, got {0}")]
    InvalidBankroll(f64),
    #[error("fixed stakes total {fixed:.2} exceeds slip amount {amount:.2}")]
    SlipOverCommitted { fixed: f64, amount: f64 },
    #[error("bet slip has no item {0}")]
    UnknownSlipItem(u64),
}
