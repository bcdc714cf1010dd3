//! Balance arithmetic over a freshly read [`Accounts`] map.
//!
//! Every function either applies its whole effect or returns an error with
//! the map untouched. Nothing here persists; the caller writes the map back.

use thiserror::Error;

use crate::Amount;
use crate::model::{Account, Accounts, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        balance: Amount,
        requested: Amount,
    },

    #[error("cannot transfer from {0} to itself")]
    SelfTransfer(UserId),

    #[error("balance of {0} would overflow")]
    Overflow(UserId),
}

/// Balance of `user`, zero for unknown users. Never creates an account.
pub fn balance(accounts: &Accounts, user: &str) -> Amount {
    accounts.get(user).map(|a| a.balance).unwrap_or_default()
}

/// The account of `user`, created with the default record if absent.
pub fn get_or_create<'a>(accounts: &'a mut Accounts, user: &str) -> &'a mut Account {
    accounts.entry(user.to_string()).or_default()
}

/// Add `amount` to `user`, returning the new balance.
pub fn credit(accounts: &mut Accounts, user: &str, amount: Amount) -> Result<Amount, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let new_balance = balance(accounts, user)
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Overflow(user.to_string()))?;
    get_or_create(accounts, user).balance = new_balance;
    Ok(new_balance)
}

/// Remove `amount` from `user`, returning the new balance.
pub fn debit(accounts: &mut Accounts, user: &str, amount: Amount) -> Result<Amount, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let current = balance(accounts, user);
    let new_balance = current
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::InsufficientFunds {
            user: user.to_string(),
            balance: current,
            requested: amount,
        })?;
    get_or_create(accounts, user).balance = new_balance;
    Ok(new_balance)
}

/// Move `amount` from `from` to `to`, returning both new balances.
/// All checks run before either account is touched.
pub fn transfer(
    accounts: &mut Accounts,
    from: &str,
    to: &str,
    amount: Amount,
) -> Result<(Amount, Amount), LedgerError> {
    if from == to {
        return Err(LedgerError::SelfTransfer(from.to_string()));
    }
    if amount.is_zero() {
        return Err(LedgerError::ZeroAmount);
    }
    let sender = balance(accounts, from);
    if sender < amount {
        return Err(LedgerError::InsufficientFunds {
            user: from.to_string(),
            balance: sender,
            requested: amount,
        });
    }
    if balance(accounts, to).checked_add(amount).is_none() {
        return Err(LedgerError::Overflow(to.to_string()));
    }

    let from_balance = debit(accounts, from, amount)?;
    let to_balance = credit(accounts, to, amount)?;
    Ok((from_balance, to_balance))
}

/// Sum of all balances. Widened, since every account may hold up to
/// `u64::MAX` on its own.
pub fn total(accounts: &Accounts) -> u128 {
    accounts
        .values()
        .map(|a| u128::from(a.balance.coins()))
        .sum()
}
