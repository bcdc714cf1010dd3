//! Outbound outcomes for the chat-platform layer to render and deliver.
//!
//! The engine only describes what happened; wording, embeds and delivery
//! belong to whoever implements [`Notifier`]. Delivery is best effort.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::Amount;
use crate::config::Channels;
use crate::model::{BankDetails, ProviderProfile, Reference, RegistrationId, UserId};

/// Announcement destinations, resolved to concrete ids through config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Approvals,
    Audit,
    Registrations,
    Showcase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    TopUpRequested {
        reference: Reference,
        user: UserId,
        amount_vnd: u64,
        transfer_memo: String,
    },
    TopUpApproved {
        reference: Reference,
        user: UserId,
        amount_vnd: u64,
        base: Amount,
        bonus: Amount,
        total: Amount,
        balance: Amount,
    },
    TopUpRejected {
        reference: Reference,
        user: UserId,
        amount_vnd: u64,
    },
    WithdrawalRequested {
        reference: Reference,
        user: UserId,
        coins: Amount,
        payout_vnd: u64,
        bank: BankDetails,
    },
    WithdrawalApproved {
        reference: Reference,
        user: UserId,
        coins: Amount,
        payout_vnd: u64,
        bank: BankDetails,
        balance: Amount,
    },
    WithdrawalRejected {
        reference: Reference,
        user: UserId,
        coins: Amount,
    },
    TransferRequested {
        reference: Reference,
        receiver: UserId,
        amount: Amount,
        balance: Amount,
        balance_after: Amount,
    },
    TransferSent {
        reference: Reference,
        receiver: UserId,
        amount: Amount,
        balance: Amount,
    },
    TransferReceived {
        reference: Reference,
        sender: UserId,
        amount: Amount,
        balance: Amount,
    },
    TransferCancelled {
        reference: Reference,
        sender: UserId,
        amount: Amount,
    },
    DonationSent {
        registration: RegistrationId,
        provider_name: String,
        amount: Amount,
        balance: Amount,
    },
    DonationReceived {
        sender: UserId,
        amount: Amount,
        balance: Amount,
    },
    RegistrationSubmitted {
        registration: RegistrationId,
        owner: UserId,
        profile: ProviderProfile,
    },
    RegistrationApproved {
        registration: RegistrationId,
    },
    RegistrationRejected {
        registration: RegistrationId,
    },
    ProviderListed {
        registration: RegistrationId,
        owner: UserId,
        profile: ProviderProfile,
    },
    HireStarted {
        registration: RegistrationId,
        client: UserId,
        provider: UserId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Tell one user privately.
    Notify { user: UserId, event: Event },
    /// Post to a shared channel.
    Announce { channel: ChannelRole, event: Event },
    /// Ask the platform for a private channel.
    CreateChannel {
        name: String,
        participants: Vec<UserId>,
    },
}

#[derive(Debug, Error)]
#[error("could not deliver to {target}: {reason}")]
pub struct NotifyError {
    pub target: String,
    pub reason: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, outcome: &Outcome) -> Result<(), NotifyError>;
}

/// Writes each outcome as a structured log line.
pub struct LogNotifier {
    channels: Channels,
}

impl LogNotifier {
    pub fn new(channels: Channels) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, outcome: &Outcome) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(outcome).map_err(|e| NotifyError {
            target: "log".to_string(),
            reason: e.to_string(),
        })?;
        match outcome {
            Outcome::Notify { user, .. } => info!(to = %user, %payload, "notify"),
            Outcome::Announce { channel, .. } => {
                info!(to = self.channels.destination(*channel), %payload, "announce")
            }
            Outcome::CreateChannel { name, .. } => info!(%name, %payload, "create channel"),
        }
        Ok(())
    }
}

/// Keeps delivered outcomes in memory. Users listed in `unreachable` fail
/// delivery, like a member with closed direct messages.
#[derive(Default)]
pub struct MemoryNotifier {
    delivered: Mutex<Vec<Outcome>>,
    unreachable: Vec<UserId>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(users: impl IntoIterator<Item = impl Into<UserId>>) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            unreachable: users.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn delivered(&self) -> Vec<Outcome> {
        self.delivered.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.delivered.lock().await.clear();
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn deliver(&self, outcome: &Outcome) -> Result<(), NotifyError> {
        if let Outcome::Notify { user, .. } = outcome {
            if self.unreachable.contains(user) {
                return Err(NotifyError {
                    target: user.clone(),
                    reason: "direct messages closed".to_string(),
                });
            }
        }
        self.delivered.lock().await.push(outcome.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notify(user: &str) -> Outcome {
        Outcome::Notify {
            user: user.into(),
            event: Event::RegistrationApproved {
                registration: "r".into(),
            },
        }
    }

    #[tokio::test]
    async fn memory_notifier_records_outcomes() {
        let notifier = MemoryNotifier::new();
        notifier.deliver(&notify("a")).await.unwrap();
        assert_eq!(notifier.delivered().await, vec![notify("a")]);
        notifier.clear().await;
        assert!(notifier.delivered().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_users_fail_delivery() {
        let notifier = MemoryNotifier::with_unreachable(["a"]);
        assert!(notifier.deliver(&notify("a")).await.is_err());
        assert!(notifier.deliver(&notify("b")).await.is_ok());
        assert_eq!(notifier.delivered().await.len(), 1);
    }

    #[tokio::test]
    async fn log_notifier_accepts_everything() {
        let notifier = LogNotifier::new(Channels::default());
        let announce = Outcome::Announce {
            channel: ChannelRole::Audit,
            event: Event::RegistrationRejected {
                registration: "r".into(),
            },
        };
        assert!(notifier.deliver(&announce).await.is_ok());
    }

    #[test]
    fn outcomes_serialize_with_tags() {
        let json = serde_json::to_value(notify("a")).unwrap();
        assert_eq!(json["outcome"], "notify");
        assert_eq!(json["event"]["event"], "registration_approved");
    }
}
