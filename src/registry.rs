//! Bookkeeping for pending requests, provider registrations and counters.
//!
//! Like the ledger, these functions work on collections the caller has just
//! read and will write back.

use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{
    Counters, PendingMap, PendingRequest, ProviderProfile, ProviderRegistration, Providers,
    Reference, RegistrationId, RegistrationStatus, UserId, timestamp,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no pending request {0}")]
    RequestNotFound(Reference),

    #[error("no provider registration {0}")]
    RegistrationNotFound(RegistrationId),

    #[error("registration {0} was already {1:?}")]
    AlreadyDecided(RegistrationId, RegistrationStatus),

    #[error("{0} already has an active registration {1}")]
    AlreadyRegistered(UserId, RegistrationId),

    #[error("provider {0} is not available")]
    Unavailable(RegistrationId),
}

/// Counter bumped for every private provider channel.
pub const PROVIDER_CHANNEL_COUNTER: &str = "providerChannel";

/// Mint `{prefix-}{actor}-{millis}`, suffixed with `-n` if that key is
/// already taken so an earlier entry is never overwritten.
pub fn mint_id<V>(existing: &BTreeMap<String, V>, prefix: Option<&str>, actor: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let base = match prefix {
        Some(prefix) => format!("{prefix}-{actor}-{millis}"),
        None => format!("{actor}-{millis}"),
    };
    if !existing.contains_key(&base) {
        return base;
    }
    (1u64..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !existing.contains_key(candidate))
        .unwrap_or(base)
}

/// Store a new request under a fresh reference.
pub fn create(pending: &mut PendingMap, request: PendingRequest) -> Reference {
    let reference = mint_id(pending, Some(request.kind().prefix()), request.requester());
    pending.insert(reference.clone(), request);
    reference
}

/// Look a request up without removing it.
pub fn resolve<'a>(
    pending: &'a PendingMap,
    reference: &str,
) -> Result<&'a PendingRequest, RegistryError> {
    pending
        .get(reference)
        .ok_or_else(|| RegistryError::RequestNotFound(reference.to_string()))
}

/// Drop a request. Removing an unknown reference is a no-op.
pub fn remove(pending: &mut PendingMap, reference: &str) -> Option<PendingRequest> {
    pending.remove(reference)
}

/// Record a new pending registration. An owner may hold at most one active one.
pub fn register(
    providers: &mut Providers,
    owner: &str,
    profile: ProviderProfile,
) -> Result<RegistrationId, RegistryError> {
    if let Some((id, _)) = providers
        .iter()
        .find(|(_, r)| r.owner == owner && r.is_active())
    {
        return Err(RegistryError::AlreadyRegistered(owner.to_string(), id.clone()));
    }

    let id = mint_id(providers, None, owner);
    providers.insert(
        id.clone(),
        ProviderRegistration {
            owner: owner.to_string(),
            profile,
            status: RegistrationStatus::Pending,
            created_at: timestamp(),
        },
    );
    Ok(id)
}

/// Move a pending registration to its final status.
pub fn decide<'a>(
    providers: &'a mut Providers,
    id: &str,
    status: RegistrationStatus,
) -> Result<&'a ProviderRegistration, RegistryError> {
    let registration = providers
        .get_mut(id)
        .ok_or_else(|| RegistryError::RegistrationNotFound(id.to_string()))?;
    if registration.status != RegistrationStatus::Pending {
        return Err(RegistryError::AlreadyDecided(
            id.to_string(),
            registration.status,
        ));
    }
    registration.status = status;
    Ok(registration)
}

/// An approved registration, or an error if it is missing or not approved.
pub fn approved<'a>(
    providers: &'a Providers,
    id: &str,
) -> Result<&'a ProviderRegistration, RegistryError> {
    match providers.get(id) {
        Some(r) if r.status == RegistrationStatus::Approved => Ok(r),
        Some(_) => Err(RegistryError::Unavailable(id.to_string())),
        None => Err(RegistryError::RegistrationNotFound(id.to_string())),
    }
}

/// Increment a named counter, returning the new value.
pub fn next(counters: &mut Counters, name: &str) -> u64 {
    let counter = counters.entry(name.to_string()).or_insert(0);
    *counter += 1;
    *counter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::TransferRequest;

    fn transfer(sender: &str) -> PendingRequest {
        PendingRequest::Transfer(TransferRequest {
            sender: sender.into(),
            receiver: "r".into(),
            amount: Amount::new(5),
            created_at: timestamp(),
        })
    }

    fn profile() -> ProviderProfile {
        ProviderProfile {
            name: "Lan".into(),
            age: "20".into(),
            gender: "F".into(),
            contact_link: "https://example.org/lan".into(),
            description: "chat".into(),
            avatar: None,
        }
    }

    #[test]
    fn references_carry_kind_prefix_and_actor() {
        let mut pending = PendingMap::new();
        let reference = create(&mut pending, transfer("42"));
        assert!(reference.starts_with("t-42-"));
        assert!(pending.contains_key(&reference));
    }

    #[test]
    fn rapid_requests_never_collide() {
        let mut pending = PendingMap::new();
        let references: Vec<_> = (0..50).map(|_| create(&mut pending, transfer("42"))).collect();
        assert_eq!(pending.len(), 50);
        let mut unique = references.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), references.len());
    }

    #[test]
    fn resolve_does_not_remove() {
        let mut pending = PendingMap::new();
        let reference = create(&mut pending, transfer("1"));
        assert_eq!(resolve(&pending, &reference).unwrap().requester(), "1");
        assert!(resolve(&pending, &reference).is_ok());
        assert_eq!(
            resolve(&pending, "missing"),
            Err(RegistryError::RequestNotFound("missing".into()))
        );
    }

    #[test]
    fn remove_twice_is_same_as_once() {
        let mut pending = PendingMap::new();
        let keep = create(&mut pending, transfer("1"));
        let reference = create(&mut pending, transfer("2"));

        assert!(remove(&mut pending, &reference).is_some());
        let once = pending.clone();
        assert!(remove(&mut pending, &reference).is_none());
        assert_eq!(pending, once);
        assert!(pending.contains_key(&keep));
    }

    #[test]
    fn one_active_registration_per_owner() {
        let mut providers = Providers::new();
        let first = register(&mut providers, "o", profile()).unwrap();
        assert!(matches!(
            register(&mut providers, "o", profile()),
            Err(RegistryError::AlreadyRegistered(_, id)) if id == first
        ));

        decide(&mut providers, &first, RegistrationStatus::Rejected).unwrap();
        assert!(register(&mut providers, "o", profile()).is_ok());
    }

    #[test]
    fn registration_is_decided_once() {
        let mut providers = Providers::new();
        let id = register(&mut providers, "o", profile()).unwrap();
        decide(&mut providers, &id, RegistrationStatus::Approved).unwrap();
        assert_eq!(
            decide(&mut providers, &id, RegistrationStatus::Rejected),
            Err(RegistryError::AlreadyDecided(
                id.clone(),
                RegistrationStatus::Approved
            ))
        );
        assert_eq!(providers[&id].status, RegistrationStatus::Approved);
    }

    #[test]
    fn only_approved_providers_are_available() {
        let mut providers = Providers::new();
        let id = register(&mut providers, "o", profile()).unwrap();
        assert_eq!(
            approved(&providers, &id),
            Err(RegistryError::Unavailable(id.clone()))
        );
        decide(&mut providers, &id, RegistrationStatus::Approved).unwrap();
        assert_eq!(approved(&providers, &id).unwrap().owner, "o");
        assert!(matches!(
            approved(&providers, "nope"),
            Err(RegistryError::RegistrationNotFound(_))
        ));
    }

    #[test]
    fn counters_start_at_one_and_increase() {
        let mut counters = Counters::new();
        assert_eq!(next(&mut counters, PROVIDER_CHANNEL_COUNTER), 1);
        assert_eq!(next(&mut counters, PROVIDER_CHANNEL_COUNTER), 2);
        assert_eq!(next(&mut counters, "other"), 1);
    }
}
