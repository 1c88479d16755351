//! A token amount paired with its denomination.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Amount;

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// The denomination of the coin.
    pub denom: String,

    /// The integer amount.
    pub amount: Amount,
}

impl Coin {
    /// Creates a new [`Coin`].
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// Returns `true` if the amount is zero.
    pub const fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Coin::new("uatom", 100).to_string(), "100uatom");
        assert!(Coin::new("uatom", 0).is_zero());
    }
}
