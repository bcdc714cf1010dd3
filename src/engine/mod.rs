//! Workflow engine.
//!
//! Turns intents into pending requests and decisions into settlements.
//! Every mutating operation runs under one process-wide lock and re-reads
//! the collections it touches, so decisions always see current balances and
//! a reference can only be settled once. Outcomes are delivered after the
//! lock is released; a failed delivery never undoes a settlement.

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::config::Config;
use crate::ledger;
use crate::model::{
    Accounts, Actor, BankDetails, Counters, Decision, DonationRequest, Intent, PendingMap,
    PendingRequest, ProviderProfile, Providers, Reference, RegistrationId, RegistrationStatus,
    RequestKind, TopUpRequest, TransferRequest, UserId, WithdrawalRequest, timestamp,
};
use crate::notify::{ChannelRole, Event, Notifier, Outcome};
use crate::registry::{self, PROVIDER_CHANNEL_COUNTER};
use crate::store::{Batch, Collection, JsonStore};

mod error;
pub use error::{EngineError, ErrorKind};

mod handlers;
use handlers::Handler;
pub use handlers::Settlement;

/// Result of a successful operation, for the caller to show the actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "receipt", rename_all = "snake_case")]
pub enum Receipt {
    Requested {
        reference: Reference,
        kind: RequestKind,
    },
    Settled(Settlement),
    Registered {
        registration: RegistrationId,
    },
    Reviewed {
        registration: RegistrationId,
        status: RegistrationStatus,
    },
    Hired {
        registration: RegistrationId,
        channel: String,
    },
    Balance {
        user: UserId,
        balance: Amount,
    },
}

/// The workflow engine.
pub struct Engine<N> {
    store: JsonStore,
    config: Config,
    notifier: N,
    lock: Mutex<()>,
}

/// Public API
impl<N: Notifier> Engine<N> {
    pub fn new(store: JsonStore, config: Config, notifier: N) -> Self {
        Self {
            store,
            config,
            notifier,
            lock: Mutex::new(()),
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run the engine over a stream of intents. Failed intents are logged
    /// and skipped.
    pub async fn run(&self, mut stream: impl Stream<Item = Intent> + Unpin) {
        while let Some(intent) = stream.next().await {
            let _ = self.apply(intent).await;
        }
    }

    /// Apply a single intent.
    pub async fn apply(&self, intent: Intent) -> Result<Receipt, EngineError> {
        let label = intent.label();
        let result = match intent {
            Intent::RequestTopUp { user, amount_vnd } => {
                self.request_top_up(&user, amount_vnd).await
            }
            Intent::RequestWithdrawal { user, coins, bank } => {
                self.request_withdrawal(&user, coins, bank).await
            }
            Intent::RequestTransfer {
                sender,
                receiver,
                amount,
            } => self.request_transfer(&sender, &receiver, amount).await,
            Intent::RequestDonation {
                sender,
                registration,
                amount,
            } => self.donate(&sender, &registration, amount).await,
            Intent::DecideRequest {
                reference,
                actor,
                decision,
            } => self.decide_request(&reference, &actor, decision).await,
            Intent::RegisterProvider { user, profile } => {
                self.register_provider(&user, profile).await
            }
            Intent::DecideRegistration {
                registration,
                actor,
                decision,
            } => {
                self.decide_registration(&registration, &actor, decision)
                    .await
            }
            Intent::HireProvider {
                client,
                registration,
            } => self.hire_provider(&client, &registration).await,
            Intent::QueryBalance { user } => self
                .query_balance(&user)
                .await
                .map(|balance| Receipt::Balance { user, balance }),
        };
        self.log_result(label, &result);
        result
    }

    /// Current balance; zero for unknown users, who are not created.
    pub async fn query_balance(&self, user: &str) -> Result<Amount, EngineError> {
        let _guard = self.lock.lock().await;
        let accounts: Accounts = self.store.read(Collection::Accounts).await?;
        Ok(ledger::balance(&accounts, user))
    }

    /// Snapshot of every account.
    pub async fn accounts(&self) -> Result<Accounts, EngineError> {
        let _guard = self.lock.lock().await;
        Ok(self.store.read(Collection::Accounts).await?)
    }

    /// Snapshot of every unresolved request.
    pub async fn pending(&self) -> Result<PendingMap, EngineError> {
        let _guard = self.lock.lock().await;
        Ok(self.store.read(Collection::Pending).await?)
    }

    /// Snapshot of every provider registration.
    pub async fn providers(&self) -> Result<Providers, EngineError> {
        let _guard = self.lock.lock().await;
        Ok(self.store.read(Collection::Providers).await?)
    }

    /// Open a top-up awaiting an approver's confirmation of the bank transfer.
    pub async fn request_top_up(
        &self,
        user: &str,
        amount_vnd: u64,
    ) -> Result<Receipt, EngineError> {
        let minimum = self.config.limits.min_topup_vnd;
        if amount_vnd == 0 {
            return Err(EngineError::ZeroAmount);
        }
        if amount_vnd < minimum {
            return Err(EngineError::BelowMinimum {
                amount: amount_vnd,
                minimum,
            });
        }

        let suffix = last_four(user);
        let transfer_memo = format!("Nap -BC{suffix}");

        let reference = {
            let _guard = self.lock.lock().await;
            let mut pending: PendingMap = self.store.read(Collection::Pending).await?;
            let reference = registry::create(
                &mut pending,
                PendingRequest::TopUp(TopUpRequest {
                    user: user.to_string(),
                    amount_vnd,
                    transfer_memo: transfer_memo.clone(),
                    created_at: timestamp(),
                }),
            );
            self.store.write(Collection::Pending, &pending).await?;
            reference
        };

        let event = Event::TopUpRequested {
            reference: reference.clone(),
            user: user.to_string(),
            amount_vnd,
            transfer_memo,
        };
        let outcomes = vec![
            Outcome::CreateChannel {
                name: format!("topup-bc{suffix}"),
                participants: self.participants([user]),
            },
            Outcome::Notify {
                user: user.to_string(),
                event: event.clone(),
            },
            Outcome::Announce {
                channel: ChannelRole::Approvals,
                event,
            },
        ];
        self.deliver(outcomes).await;

        Ok(Receipt::Requested {
            reference,
            kind: RequestKind::TopUp,
        })
    }

    /// Open a withdrawal. Funds are checked now and again on approval.
    pub async fn request_withdrawal(
        &self,
        user: &str,
        coins: Amount,
        bank: BankDetails,
    ) -> Result<Receipt, EngineError> {
        let minimum = self.config.limits.min_withdrawal_coins;
        if coins.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if coins.coins() < minimum {
            return Err(EngineError::BelowMinimum {
                amount: coins.coins(),
                minimum,
            });
        }
        let payout_vnd = self.config.rates.withdrawal_payout(coins);

        let reference = {
            let _guard = self.lock.lock().await;
            let accounts: Accounts = self.store.read(Collection::Accounts).await?;
            let balance = ledger::balance(&accounts, user);
            if balance < coins {
                return Err(EngineError::InsufficientFunds {
                    user: user.to_string(),
                    balance,
                    requested: coins,
                });
            }

            let mut pending: PendingMap = self.store.read(Collection::Pending).await?;
            let reference = registry::create(
                &mut pending,
                PendingRequest::Withdrawal(WithdrawalRequest {
                    user: user.to_string(),
                    coins,
                    payout_vnd,
                    bank: bank.clone(),
                    created_at: timestamp(),
                }),
            );
            self.store.write(Collection::Pending, &pending).await?;
            reference
        };

        let event = Event::WithdrawalRequested {
            reference: reference.clone(),
            user: user.to_string(),
            coins,
            payout_vnd,
            bank,
        };
        self.deliver(vec![
            Outcome::Notify {
                user: user.to_string(),
                event: event.clone(),
            },
            Outcome::Announce {
                channel: ChannelRole::Approvals,
                event,
            },
        ])
        .await;

        Ok(Receipt::Requested {
            reference,
            kind: RequestKind::Withdrawal,
        })
    }

    /// Open a transfer awaiting the sender's confirmation. Funds are only
    /// checked when the sender confirms.
    pub async fn request_transfer(
        &self,
        sender: &str,
        receiver: &str,
        amount: Amount,
    ) -> Result<Receipt, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        if sender == receiver {
            return Err(EngineError::SelfTransfer);
        }

        let (reference, balance) = {
            let _guard = self.lock.lock().await;
            let accounts: Accounts = self.store.read(Collection::Accounts).await?;
            let mut pending: PendingMap = self.store.read(Collection::Pending).await?;
            let reference = registry::create(
                &mut pending,
                PendingRequest::Transfer(TransferRequest {
                    sender: sender.to_string(),
                    receiver: receiver.to_string(),
                    amount,
                    created_at: timestamp(),
                }),
            );
            self.store.write(Collection::Pending, &pending).await?;
            (reference, ledger::balance(&accounts, sender))
        };

        self.deliver(vec![Outcome::Notify {
            user: sender.to_string(),
            event: Event::TransferRequested {
                reference: reference.clone(),
                receiver: receiver.to_string(),
                amount,
                balance,
                balance_after: balance.checked_sub(amount).unwrap_or_default(),
            },
        }])
        .await;

        Ok(Receipt::Requested {
            reference,
            kind: RequestKind::Transfer,
        })
    }

    /// Donate to an approved provider. Settles immediately.
    pub async fn donate(
        &self,
        sender: &str,
        registration: &str,
        amount: Amount,
    ) -> Result<Receipt, EngineError> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        let settled = {
            let _guard = self.lock.lock().await;
            let providers: Providers = self.store.read(Collection::Providers).await?;
            let provider = registry::approved(&providers, registration)?;
            let donation = DonationRequest {
                sender: sender.to_string(),
                registration: registration.to_string(),
                owner: provider.owner.clone(),
                provider_name: provider.profile.name.clone(),
                amount,
            };
            donation.authorize(&Actor::user(sender), Decision::Approve, registration)?;

            let mut accounts: Accounts = self.store.read(Collection::Accounts).await?;
            let settled = donation.settle(registration, &mut accounts, &self.config)?;
            self.store.write(Collection::Accounts, &accounts).await?;
            settled
        };

        self.deliver(settled.outcomes).await;
        Ok(Receipt::Settled(settled.settlement))
    }

    /// Resolve a pending request. The request is re-read under the lock, so
    /// a second decision on the same reference finds nothing. If approval
    /// fails validation the request stays pending and can be retried.
    pub async fn decide_request(
        &self,
        reference: &str,
        actor: &Actor,
        decision: Decision,
    ) -> Result<Receipt, EngineError> {
        let (settlement, outcomes) = {
            let _guard = self.lock.lock().await;
            let mut pending: PendingMap = self.store.read(Collection::Pending).await?;
            let request = registry::resolve(&pending, reference)?.clone();
            let handler = request.handler();
            handler.authorize(actor, decision, reference)?;

            match decision {
                Decision::Approve => {
                    let mut accounts: Accounts = self.store.read(Collection::Accounts).await?;
                    let settled = handler.settle(reference, &mut accounts, &self.config)?;
                    registry::remove(&mut pending, reference);

                    // pending goes first: a failure after it is rolled back
                    let mut batch = Batch::new();
                    batch.insert(Collection::Pending, &pending)?;
                    batch.insert(Collection::Accounts, &accounts)?;
                    self.store.apply_batch(batch).await?;
                    (settled.settlement, settled.outcomes)
                }
                Decision::Reject | Decision::Cancel => {
                    registry::remove(&mut pending, reference);
                    self.store.write(Collection::Pending, &pending).await?;
                    (
                        Settlement::Discarded {
                            reference: reference.to_string(),
                            kind: handler.kind(),
                            decision,
                        },
                        handler.discarded(reference, decision),
                    )
                }
            }
        };

        self.deliver(outcomes).await;
        Ok(Receipt::Settled(settlement))
    }

    /// Submit a provider application for review.
    pub async fn register_provider(
        &self,
        user: &str,
        profile: ProviderProfile,
    ) -> Result<Receipt, EngineError> {
        let registration = {
            let _guard = self.lock.lock().await;
            let mut providers: Providers = self.store.read(Collection::Providers).await?;
            let registration = registry::register(&mut providers, user, profile.clone())?;
            self.store.write(Collection::Providers, &providers).await?;
            registration
        };

        self.deliver(vec![Outcome::Announce {
            channel: ChannelRole::Registrations,
            event: Event::RegistrationSubmitted {
                registration: registration.clone(),
                owner: user.to_string(),
                profile,
            },
        }])
        .await;

        Ok(Receipt::Registered { registration })
    }

    /// Approve or reject a provider application. Elevated actors only.
    pub async fn decide_registration(
        &self,
        registration: &str,
        actor: &Actor,
        decision: Decision,
    ) -> Result<Receipt, EngineError> {
        let status = match decision {
            Decision::Approve => RegistrationStatus::Approved,
            Decision::Reject => RegistrationStatus::Rejected,
            Decision::Cancel => {
                return Err(EngineError::InvalidDecision {
                    decision,
                    target: "a provider registration",
                });
            }
        };
        if !actor.elevated {
            return Err(EngineError::MissingPermission {
                actor: actor.id.clone(),
                decision,
                target: registration.to_string(),
            });
        }

        let decided = {
            let _guard = self.lock.lock().await;
            let mut providers: Providers = self.store.read(Collection::Providers).await?;
            let decided = registry::decide(&mut providers, registration, status)?.clone();
            self.store.write(Collection::Providers, &providers).await?;
            decided
        };

        let outcomes = match status {
            RegistrationStatus::Approved => vec![
                Outcome::Notify {
                    user: decided.owner.clone(),
                    event: Event::RegistrationApproved {
                        registration: registration.to_string(),
                    },
                },
                Outcome::Announce {
                    channel: ChannelRole::Showcase,
                    event: Event::ProviderListed {
                        registration: registration.to_string(),
                        owner: decided.owner,
                        profile: decided.profile,
                    },
                },
            ],
            _ => vec![Outcome::Notify {
                user: decided.owner,
                event: Event::RegistrationRejected {
                    registration: registration.to_string(),
                },
            }],
        };
        self.deliver(outcomes).await;

        Ok(Receipt::Reviewed {
            registration: registration.to_string(),
            status,
        })
    }

    /// Ask for a private channel between a client and an approved provider.
    pub async fn hire_provider(
        &self,
        client: &str,
        registration: &str,
    ) -> Result<Receipt, EngineError> {
        let (owner, number) = {
            let _guard = self.lock.lock().await;
            let providers: Providers = self.store.read(Collection::Providers).await?;
            let owner = registry::approved(&providers, registration)?.owner.clone();

            let mut counters: Counters = self.store.read(Collection::Counters).await?;
            let number = registry::next(&mut counters, PROVIDER_CHANNEL_COUNTER);
            self.store.write(Collection::Counters, &counters).await?;
            (owner, number)
        };

        let channel = format!("provider-{number}");
        self.deliver(vec![
            Outcome::CreateChannel {
                name: channel.clone(),
                participants: self.participants([client, owner.as_str()]),
            },
            Outcome::Notify {
                user: owner.clone(),
                event: Event::HireStarted {
                    registration: registration.to_string(),
                    client: client.to_string(),
                    provider: owner,
                },
            },
        ])
        .await;

        Ok(Receipt::Hired {
            registration: registration.to_string(),
            channel,
        })
    }
}

/// Private API
impl<N: Notifier> Engine<N> {
    /// Small helper to log `apply` results
    fn log_result(&self, label: &str, result: &Result<Receipt, EngineError>) {
        match result {
            Ok(receipt) => info!(?receipt, "{label} applied"),
            Err(e @ EngineError::MissingPermission { .. }) => info!(
                kind = ?e.kind(),
                reason = %e,
                permission = %self.config.channels.approver_permission,
                "{label} skipped"
            ),
            Err(e) => info!(kind = ?e.kind(), reason = %e, "{label} skipped"),
        }
    }

    /// Best-effort delivery; failures are logged and dropped.
    async fn deliver(&self, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            if let Err(e) = self.notifier.deliver(&outcome).await {
                warn!(reason = %e, "outcome not delivered");
            }
        }
    }

    /// Channel members plus the configured admin, if any.
    fn participants<'a>(&self, users: impl IntoIterator<Item = &'a str>) -> Vec<UserId> {
        let mut participants: Vec<UserId> = users.into_iter().map(str::to_string).collect();
        if let Some(admin) = &self.config.channels.admin_user {
            if !participants.contains(admin) {
                participants.push(admin.clone());
            }
        }
        participants
    }
}

/// Last four characters of a user id, used in channel names and memos.
fn last_four(user: &str) -> String {
    let len = user.chars().count();
    user.chars().skip(len.saturating_sub(4)).collect()
}
