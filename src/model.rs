//! Core domain types for the Bee Coin ledger.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::Amount;

/// Chat-platform user identifier.
pub type UserId = String;

/// Unique key of a pending request.
pub type Reference = String;

/// Unique key of a provider registration.
pub type RegistrationId = String;

/// Balances keyed by user.
pub type Accounts = BTreeMap<UserId, Account>;

/// In-flight requests keyed by reference.
pub type PendingMap = BTreeMap<Reference, PendingRequest>;

/// Provider registrations keyed by registration id.
pub type Providers = BTreeMap<RegistrationId, ProviderRegistration>;

/// Named monotonically increasing counters.
pub type Counters = BTreeMap<String, u64>;

/// Someone issuing a decision. `elevated` is set by the host platform when the
/// user holds the approver permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    #[serde(default)]
    pub elevated: bool,
}

impl Actor {
    pub fn user(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            elevated: false,
        }
    }

    pub fn approver(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            elevated: true,
        }
    }
}

/// Outcome chosen by the deciding actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Cancel,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
            Decision::Cancel => "cancel",
        })
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            "cancel" => Ok(Decision::Cancel),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

/// A user's balance record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub balance: Amount,
    /// Set once the user has received the first top-up bonus.
    #[serde(default)]
    pub first_topup_used: bool,
}

/// Kinds of financial request handled by the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    TopUp,
    Withdrawal,
    Transfer,
    Donation,
}

impl RequestKind {
    /// Prefix used when minting references.
    pub fn prefix(self) -> &'static str {
        match self {
            RequestKind::TopUp => "u",
            RequestKind::Withdrawal => "w",
            RequestKind::Transfer => "t",
            RequestKind::Donation => "d",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::TopUp => "top-up",
            RequestKind::Withdrawal => "withdrawal",
            RequestKind::Transfer => "transfer",
            RequestKind::Donation => "donation",
        })
    }
}

/// Where a withdrawal payout goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub account_number: String,
    pub bank: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    #[serde(rename = "userId")]
    pub user: UserId,
    pub amount_vnd: u64,
    /// Memo the user must put on the bank transfer so admins can match it.
    pub transfer_memo: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    #[serde(rename = "userId")]
    pub user: UserId,
    pub coins: Amount,
    /// Payout quoted when the request was made.
    pub payout_vnd: u64,
    pub bank: BankDetails,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(rename = "senderId")]
    pub sender: UserId,
    #[serde(rename = "receiverId")]
    pub receiver: UserId,
    pub amount: Amount,
    pub created_at: String,
}

/// A donation to an approved provider. Settled immediately, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRequest {
    pub sender: UserId,
    pub registration: RegistrationId,
    pub owner: UserId,
    pub provider_name: String,
    pub amount: Amount,
}

/// A request awaiting a decision, tagged by kind on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PendingRequest {
    TopUp(TopUpRequest),
    Withdrawal(WithdrawalRequest),
    Transfer(TransferRequest),
}

impl PendingRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            PendingRequest::TopUp(_) => RequestKind::TopUp,
            PendingRequest::Withdrawal(_) => RequestKind::Withdrawal,
            PendingRequest::Transfer(_) => RequestKind::Transfer,
        }
    }

    /// The user who created the request.
    pub fn requester(&self) -> &str {
        match self {
            PendingRequest::TopUp(r) => &r.user,
            PendingRequest::Withdrawal(r) => &r.user,
            PendingRequest::Transfer(r) => &r.sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub contact_link: String,
    pub description: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRegistration {
    #[serde(rename = "ownerId")]
    pub owner: UserId,
    #[serde(flatten)]
    pub profile: ProviderProfile,
    pub status: RegistrationStatus,
    pub created_at: String,
}

impl ProviderRegistration {
    /// Pending and approved registrations count as active.
    pub fn is_active(&self) -> bool {
        self.status != RegistrationStatus::Rejected
    }
}

/// An inbound intent from the chat-platform layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    RequestTopUp {
        user: UserId,
        amount_vnd: u64,
    },
    RequestWithdrawal {
        user: UserId,
        coins: Amount,
        bank: BankDetails,
    },
    RequestTransfer {
        sender: UserId,
        receiver: UserId,
        amount: Amount,
    },
    RequestDonation {
        sender: UserId,
        registration: RegistrationId,
        amount: Amount,
    },
    DecideRequest {
        reference: Reference,
        actor: Actor,
        decision: Decision,
    },
    RegisterProvider {
        user: UserId,
        profile: ProviderProfile,
    },
    DecideRegistration {
        registration: RegistrationId,
        actor: Actor,
        decision: Decision,
    },
    HireProvider {
        client: UserId,
        registration: RegistrationId,
    },
    QueryBalance {
        user: UserId,
    },
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::RequestTopUp { .. } => "top-up request",
            Intent::RequestWithdrawal { .. } => "withdrawal request",
            Intent::RequestTransfer { .. } => "transfer request",
            Intent::RequestDonation { .. } => "donation",
            Intent::DecideRequest { .. } => "decision",
            Intent::RegisterProvider { .. } => "provider registration",
            Intent::DecideRegistration { .. } => "registration review",
            Intent::HireProvider { .. } => "hire",
            Intent::QueryBalance { .. } => "balance query",
        }
    }
}

/// Current wall-clock time as an RFC 3339 string.
pub(crate) fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
