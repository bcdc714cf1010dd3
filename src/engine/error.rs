//! Error types for intent processing.

use thiserror::Error;

use crate::Amount;
use crate::ledger::LedgerError;
use crate::model::{Decision, UserId};
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Error returned by every [`Engine`](super::Engine) operation. Any error
/// means the operation left the store untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        balance: Amount,
        requested: Amount,
    },

    #[error("balance of {0} would overflow")]
    Overflow(UserId),

    #[error("cannot send coins to yourself")]
    SelfTransfer,

    #[error("{actor} is not allowed to {decision} {target}")]
    Unauthorized {
        actor: UserId,
        decision: Decision,
        target: String,
    },

    #[error("{actor} lacks the approver permission to {decision} {target}")]
    MissingPermission {
        actor: UserId,
        decision: Decision,
        target: String,
    },

    #[error("{decision} does not apply to {target}")]
    InvalidDecision {
        decision: Decision,
        target: &'static str,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::ZeroAmount => EngineError::ZeroAmount,
            LedgerError::InsufficientFunds {
                user,
                balance,
                requested,
            } => EngineError::InsufficientFunds {
                user,
                balance,
                requested,
            },
            LedgerError::SelfTransfer(_) => EngineError::SelfTransfer,
            LedgerError::Overflow(user) => EngineError::Overflow(user),
        }
    }
}

/// Coarse classification shown to users and used by callers to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientFunds,
    NotFound,
    Unauthorized,
    Conflict,
    InvalidRequest,
    StoreIoFailure,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ZeroAmount
            | EngineError::BelowMinimum { .. }
            | EngineError::Overflow(_) => ErrorKind::InvalidAmount,
            EngineError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            EngineError::Unauthorized { .. } | EngineError::MissingPermission { .. } => {
                ErrorKind::Unauthorized
            }
            EngineError::SelfTransfer | EngineError::InvalidDecision { .. } => {
                ErrorKind::InvalidRequest
            }
            EngineError::Registry(e) => match e {
                RegistryError::RequestNotFound(_) | RegistryError::RegistrationNotFound(_) => {
                    ErrorKind::NotFound
                }
                RegistryError::AlreadyDecided(..) => ErrorKind::Conflict,
                RegistryError::AlreadyRegistered(..) | RegistryError::Unavailable(_) => {
                    ErrorKind::InvalidRequest
                }
            },
            EngineError::Store(_) => ErrorKind::StoreIoFailure,
        }
    }

    /// Short message safe to show the actor. Never includes internal detail.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::ZeroAmount => "The amount must be greater than zero.".to_string(),
            EngineError::BelowMinimum { minimum, .. } => {
                format!("The minimum amount is {minimum}.")
            }
            EngineError::InsufficientFunds { .. } => {
                "Your Bee Coin balance is not enough.".to_string()
            }
            EngineError::Overflow(_) => "The amount is too large.".to_string(),
            EngineError::SelfTransfer => "You cannot send Bee Coin to yourself.".to_string(),
            EngineError::Unauthorized { .. } => {
                "You are not allowed to do that.".to_string()
            }
            EngineError::MissingPermission { .. } => {
                "Only approvers can do that.".to_string()
            }
            EngineError::InvalidDecision { .. } => {
                "That action does not apply to this request.".to_string()
            }
            EngineError::Registry(e) => match e {
                RegistryError::RequestNotFound(_) => {
                    "The request no longer exists. It may have been handled already.".to_string()
                }
                RegistryError::RegistrationNotFound(_) => {
                    "The registration does not exist.".to_string()
                }
                RegistryError::AlreadyDecided(..) => {
                    "The registration has already been reviewed.".to_string()
                }
                RegistryError::AlreadyRegistered(..) => {
                    "You already have an active registration.".to_string()
                }
                RegistryError::Unavailable(_) => "This provider is not available.".to_string(),
            },
            EngineError::Store(_) => "The operation failed. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_keep_their_kind() {
        let e: EngineError = LedgerError::InsufficientFunds {
            user: "u".into(),
            balance: Amount::new(1),
            requested: Amount::new(2),
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::InsufficientFunds);

        let e: EngineError = LedgerError::ZeroAmount.into();
        assert_eq!(e.kind(), ErrorKind::InvalidAmount);
    }

    #[test]
    fn not_found_and_unauthorized_read_differently() {
        let missing = EngineError::Registry(RegistryError::RequestNotFound("x".into()));
        let forbidden = EngineError::Unauthorized {
            actor: "a".into(),
            decision: Decision::Approve,
            target: "x".into(),
        };
        let not_approver = EngineError::MissingPermission {
            actor: "a".into(),
            decision: Decision::Approve,
            target: "x".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(forbidden.kind(), ErrorKind::Unauthorized);
        assert_eq!(not_approver.kind(), ErrorKind::Unauthorized);
        assert_ne!(missing.user_message(), not_approver.user_message());
        assert_ne!(missing.user_message(), forbidden.user_message());
    }

    #[test]
    fn store_failures_hide_details_from_users() {
        let e = EngineError::Store(StoreError::Read {
            path: "/secret/path/accounts.json".into(),
            source: std::io::Error::other("disk on fire"),
        });
        assert_eq!(e.kind(), ErrorKind::StoreIoFailure);
        assert!(!e.user_message().contains("secret"));
        assert!(e.to_string().contains("disk on fire"));
    }

    #[test]
    fn decided_registration_is_a_conflict() {
        let e = EngineError::Registry(RegistryError::AlreadyDecided(
            "r".into(),
            crate::model::RegistrationStatus::Approved,
        ));
        assert_eq!(e.kind(), ErrorKind::Conflict);
    }
}
