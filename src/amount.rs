use std::fmt;

use serde::{Deserialize, Serialize};

/// A whole number of Bee Coin. Balances can never go negative, so the
/// representation is unsigned and every arithmetic step is checked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(coins: u64) -> Self {
        Amount(coins)
    }

    pub const fn coins(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }
}

impl From<u64> for Amount {
    fn from(coins: u64) -> Self {
        Amount(coins)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zero() {
        assert_eq!(Amount::default(), Amount::ZERO);
        assert!(Amount::default().is_zero());
    }

    #[test]
    fn checked_add() {
        assert_eq!(
            Amount::new(100).checked_add(Amount::new(50)),
            Some(Amount::new(150))
        );
        assert_eq!(Amount::new(u64::MAX).checked_add(Amount::new(1)), None);
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        assert_eq!(
            Amount::new(100).checked_sub(Amount::new(30)),
            Some(Amount::new(70))
        );
        assert_eq!(Amount::new(10).checked_sub(Amount::new(11)), None);
    }

    #[test]
    fn display_is_plain_integer() {
        assert_eq!(Amount::new(74).to_string(), "74");
        assert_eq!(Amount::ZERO.to_string(), "0");
    }

    #[test]
    fn serializes_as_bare_number() {
        assert_eq!(serde_json::to_string(&Amount::new(42)).unwrap(), "42");
        let parsed: Amount = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, Amount::new(7));
    }

    #[test]
    fn ordering() {
        assert!(Amount::new(10) < Amount::new(15));
    }
}
