//! Per-kind decision handling.
//!
//! Each request kind knows who may decide it, how it settles against the
//! ledger and who hears about a rejection. The engine picks the handler from
//! the request's kind tag and never inspects the payload itself.

use serde::Serialize;

use crate::Amount;
use crate::config::Config;
use crate::ledger;
use crate::model::{
    Accounts, Actor, Decision, DonationRequest, PendingRequest, Reference, RegistrationId,
    RequestKind, TopUpRequest, TransferRequest, UserId, WithdrawalRequest,
};
use crate::notify::{ChannelRole, Event, Outcome};

use super::EngineError;

/// What a decided request did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "settlement", rename_all = "snake_case")]
pub enum Settlement {
    TopUp {
        reference: Reference,
        user: UserId,
        base: Amount,
        bonus: Amount,
        total: Amount,
        balance: Amount,
    },
    Withdrawal {
        reference: Reference,
        user: UserId,
        coins: Amount,
        payout_vnd: u64,
        balance: Amount,
    },
    Transfer {
        reference: Reference,
        sender: UserId,
        receiver: UserId,
        amount: Amount,
        sender_balance: Amount,
        receiver_balance: Amount,
    },
    Donation {
        registration: RegistrationId,
        sender: UserId,
        owner: UserId,
        amount: Amount,
        sender_balance: Amount,
        owner_balance: Amount,
    },
    /// Rejected or cancelled, no ledger effect.
    Discarded {
        reference: Reference,
        kind: RequestKind,
        decision: Decision,
    },
}

pub(crate) struct Settled {
    pub settlement: Settlement,
    pub outcomes: Vec<Outcome>,
}

pub(crate) trait Handler: Sync {
    fn kind(&self) -> RequestKind;

    /// Whether `actor` may issue `decision`. Runs before anything is mutated.
    fn authorize(&self, actor: &Actor, decision: Decision, reference: &str)
    -> Result<(), EngineError>;

    /// Re-validate against current balances and apply the ledger effect.
    /// On error `accounts` is unchanged.
    fn settle(
        &self,
        reference: &str,
        accounts: &mut Accounts,
        config: &Config,
    ) -> Result<Settled, EngineError>;

    /// Who to tell when the request is rejected or cancelled.
    fn discarded(&self, reference: &str, decision: Decision) -> Vec<Outcome>;
}

impl PendingRequest {
    pub(crate) fn handler(&self) -> &dyn Handler {
        match self {
            PendingRequest::TopUp(r) => r,
            PendingRequest::Withdrawal(r) => r,
            PendingRequest::Transfer(r) => r,
        }
    }
}

/// Approve/reject by an elevated actor other than the requester.
fn authorize_approver(
    actor: &Actor,
    decision: Decision,
    requester: &str,
    reference: &str,
    target: &'static str,
) -> Result<(), EngineError> {
    if decision == Decision::Cancel {
        return Err(EngineError::InvalidDecision { decision, target });
    }
    if !actor.elevated {
        return Err(EngineError::MissingPermission {
            actor: actor.id.clone(),
            decision,
            target: reference.to_string(),
        });
    }
    if actor.id == requester {
        return Err(EngineError::Unauthorized {
            actor: actor.id.clone(),
            decision,
            target: reference.to_string(),
        });
    }
    Ok(())
}

/// Approve/cancel by the original sender only.
fn authorize_sender(
    actor: &Actor,
    decision: Decision,
    sender: &str,
    target: String,
    what: &'static str,
) -> Result<(), EngineError> {
    if decision == Decision::Reject {
        return Err(EngineError::InvalidDecision {
            decision,
            target: what,
        });
    }
    if actor.id != sender {
        return Err(EngineError::Unauthorized {
            actor: actor.id.clone(),
            decision,
            target,
        });
    }
    Ok(())
}

impl Handler for TopUpRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::TopUp
    }

    fn authorize(
        &self,
        actor: &Actor,
        decision: Decision,
        reference: &str,
    ) -> Result<(), EngineError> {
        authorize_approver(actor, decision, &self.user, reference, "a top-up request")
    }

    fn settle(
        &self,
        reference: &str,
        accounts: &mut Accounts,
        config: &Config,
    ) -> Result<Settled, EngineError> {
        let first_topup = !accounts
            .get(&self.user)
            .is_some_and(|a| a.first_topup_used);
        let quote = config.rates.quote_top_up(self.amount_vnd, first_topup);

        let balance = ledger::credit(accounts, &self.user, quote.total)?;
        if first_topup {
            ledger::get_or_create(accounts, &self.user).first_topup_used = true;
        }

        let event = Event::TopUpApproved {
            reference: reference.to_string(),
            user: self.user.clone(),
            amount_vnd: self.amount_vnd,
            base: quote.base,
            bonus: quote.bonus,
            total: quote.total,
            balance,
        };
        Ok(Settled {
            settlement: Settlement::TopUp {
                reference: reference.to_string(),
                user: self.user.clone(),
                base: quote.base,
                bonus: quote.bonus,
                total: quote.total,
                balance,
            },
            outcomes: vec![
                Outcome::Notify {
                    user: self.user.clone(),
                    event: event.clone(),
                },
                Outcome::Announce {
                    channel: ChannelRole::Audit,
                    event,
                },
            ],
        })
    }

    fn discarded(&self, reference: &str, _decision: Decision) -> Vec<Outcome> {
        vec![Outcome::Notify {
            user: self.user.clone(),
            event: Event::TopUpRejected {
                reference: reference.to_string(),
                user: self.user.clone(),
                amount_vnd: self.amount_vnd,
            },
        }]
    }
}

impl Handler for WithdrawalRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Withdrawal
    }

    fn authorize(
        &self,
        actor: &Actor,
        decision: Decision,
        reference: &str,
    ) -> Result<(), EngineError> {
        authorize_approver(actor, decision, &self.user, reference, "a withdrawal request")
    }

    fn settle(
        &self,
        reference: &str,
        accounts: &mut Accounts,
        config: &Config,
    ) -> Result<Settled, EngineError> {
        let balance = ledger::debit(accounts, &self.user, self.coins)?;
        let payout_vnd = config.rates.withdrawal_payout(self.coins);

        let event = Event::WithdrawalApproved {
            reference: reference.to_string(),
            user: self.user.clone(),
            coins: self.coins,
            payout_vnd,
            bank: self.bank.clone(),
            balance,
        };
        Ok(Settled {
            settlement: Settlement::Withdrawal {
                reference: reference.to_string(),
                user: self.user.clone(),
                coins: self.coins,
                payout_vnd,
                balance,
            },
            outcomes: vec![
                Outcome::Notify {
                    user: self.user.clone(),
                    event: event.clone(),
                },
                Outcome::Announce {
                    channel: ChannelRole::Audit,
                    event,
                },
            ],
        })
    }

    fn discarded(&self, reference: &str, _decision: Decision) -> Vec<Outcome> {
        vec![Outcome::Notify {
            user: self.user.clone(),
            event: Event::WithdrawalRejected {
                reference: reference.to_string(),
                user: self.user.clone(),
                coins: self.coins,
            },
        }]
    }
}

impl Handler for TransferRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Transfer
    }

    fn authorize(
        &self,
        actor: &Actor,
        decision: Decision,
        reference: &str,
    ) -> Result<(), EngineError> {
        authorize_sender(
            actor,
            decision,
            &self.sender,
            reference.to_string(),
            "a transfer request",
        )
    }

    fn settle(
        &self,
        reference: &str,
        accounts: &mut Accounts,
        _config: &Config,
    ) -> Result<Settled, EngineError> {
        let (sender_balance, receiver_balance) =
            ledger::transfer(accounts, &self.sender, &self.receiver, self.amount)?;

        Ok(Settled {
            settlement: Settlement::Transfer {
                reference: reference.to_string(),
                sender: self.sender.clone(),
                receiver: self.receiver.clone(),
                amount: self.amount,
                sender_balance,
                receiver_balance,
            },
            outcomes: vec![
                Outcome::Notify {
                    user: self.sender.clone(),
                    event: Event::TransferSent {
                        reference: reference.to_string(),
                        receiver: self.receiver.clone(),
                        amount: self.amount,
                        balance: sender_balance,
                    },
                },
                Outcome::Notify {
                    user: self.receiver.clone(),
                    event: Event::TransferReceived {
                        reference: reference.to_string(),
                        sender: self.sender.clone(),
                        amount: self.amount,
                        balance: receiver_balance,
                    },
                },
            ],
        })
    }

    fn discarded(&self, reference: &str, _decision: Decision) -> Vec<Outcome> {
        vec![Outcome::Notify {
            user: self.receiver.clone(),
            event: Event::TransferCancelled {
                reference: reference.to_string(),
                sender: self.sender.clone(),
                amount: self.amount,
            },
        }]
    }
}

impl Handler for DonationRequest {
    fn kind(&self) -> RequestKind {
        RequestKind::Donation
    }

    fn authorize(
        &self,
        actor: &Actor,
        decision: Decision,
        _reference: &str,
    ) -> Result<(), EngineError> {
        if decision != Decision::Approve {
            return Err(EngineError::InvalidDecision {
                decision,
                target: "a donation",
            });
        }
        authorize_sender(
            actor,
            decision,
            &self.sender,
            self.registration.clone(),
            "a donation",
        )
    }

    fn settle(
        &self,
        _reference: &str,
        accounts: &mut Accounts,
        _config: &Config,
    ) -> Result<Settled, EngineError> {
        let (sender_balance, owner_balance) =
            ledger::transfer(accounts, &self.sender, &self.owner, self.amount)?;

        Ok(Settled {
            settlement: Settlement::Donation {
                registration: self.registration.clone(),
                sender: self.sender.clone(),
                owner: self.owner.clone(),
                amount: self.amount,
                sender_balance,
                owner_balance,
            },
            outcomes: vec![
                Outcome::Notify {
                    user: self.sender.clone(),
                    event: Event::DonationSent {
                        registration: self.registration.clone(),
                        provider_name: self.provider_name.clone(),
                        amount: self.amount,
                        balance: sender_balance,
                    },
                },
                Outcome::Notify {
                    user: self.owner.clone(),
                    event: Event::DonationReceived {
                        sender: self.sender.clone(),
                        amount: self.amount,
                        balance: owner_balance,
                    },
                },
            ],
        })
    }

    fn discarded(&self, _reference: &str, _decision: Decision) -> Vec<Outcome> {
        Vec::new()
    }
}
