//! Controller-side balances and supply.
//!
//! Vouchers of tokens that arrived over IBC are burned when they are sent back to their origin
//! and minted again if that transfer fails. Native tokens sent out are held in the channel's
//! escrow account instead, so they stay in supply.

use liquid_stake_db::KvStore;
use liquid_stake_primitives::{coin::Coin, denom::DenomTrace, types::Amount};

use crate::{
    errors::{StakeError, StakeResult},
    row_spec::{BalanceRowSpec, DenomTraceRowSpec, SupplyRowSpec},
};

fn balance_key(address: &str, denom: &str) -> (String, String) {
    (address.to_string(), denom.to_string())
}

/// Account holding native tokens sent out over `channel_id`.
pub fn escrow_address(channel_id: &str) -> String {
    format!("escrow/transfer/{channel_id}")
}

/// Balance of `address` in `denom`.
pub fn balance(store: &KvStore, address: &str, denom: &str) -> StakeResult<Amount> {
    Ok(store
        .get_row::<BalanceRowSpec>(&balance_key(address, denom))?
        .unwrap_or_default())
}

/// Total supply of `denom`.
pub fn supply(store: &KvStore, denom: &str) -> StakeResult<Amount> {
    Ok(store
        .get_row::<SupplyRowSpec>(&denom.to_string())?
        .unwrap_or_default())
}

fn set_balance(store: &mut KvStore, address: &str, denom: &str, amount: Amount) -> StakeResult<()> {
    let key = balance_key(address, denom);
    if amount == 0 {
        store.delete_row::<BalanceRowSpec>(&key)?;
    } else {
        store.put_row::<BalanceRowSpec>(&key, &amount)?;
    }
    Ok(())
}

fn debit(store: &mut KvStore, address: &str, coin: &Coin) -> StakeResult<()> {
    let available = balance(store, address, &coin.denom)?;
    let remaining = available
        .checked_sub(coin.amount)
        .ok_or_else(|| StakeError::InsufficientFunds {
            address: address.to_string(),
            denom: coin.denom.clone(),
            needed: coin.amount,
            available,
        })?;
    set_balance(store, address, &coin.denom, remaining)
}

fn credit(store: &mut KvStore, address: &str, coin: &Coin) -> StakeResult<()> {
    let current = balance(store, address, &coin.denom)?;
    let updated = current
        .checked_add(coin.amount)
        .ok_or_else(|| StakeError::validation("balance overflow"))?;
    set_balance(store, address, &coin.denom, updated)
}

/// Moves `coin` from `from` to `to`.
pub fn send(store: &mut KvStore, from: &str, to: &str, coin: &Coin) -> StakeResult<()> {
    debit(store, from, coin)?;
    credit(store, to, coin)
}

/// Creates `coin` in `to`.
pub fn mint(store: &mut KvStore, to: &str, coin: &Coin) -> StakeResult<()> {
    let total = supply(store, &coin.denom)?
        .checked_add(coin.amount)
        .ok_or_else(|| StakeError::validation("supply overflow"))?;
    credit(store, to, coin)?;
    store.put_row::<SupplyRowSpec>(&coin.denom, &total)?;
    Ok(())
}

/// Destroys `coin` held by `from`.
pub fn burn(store: &mut KvStore, from: &str, coin: &Coin) -> StakeResult<()> {
    debit(store, from, coin)?;
    let total = supply(store, &coin.denom)?.saturating_sub(coin.amount);
    store.put_row::<SupplyRowSpec>(&coin.denom, &total)?;
    Ok(())
}

/// Reads the trace of a voucher denom.
pub fn get_denom_trace(store: &KvStore, ibc_denom: &str) -> StakeResult<Option<DenomTrace>> {
    Ok(store.get_row::<DenomTraceRowSpec>(&ibc_denom.to_string())?)
}

/// Records the trace of a voucher denom and returns the denom.
pub fn set_denom_trace(store: &mut KvStore, trace: &DenomTrace) -> StakeResult<String> {
    let denom = trace.ibc_denom();
    store.put_row::<DenomTraceRowSpec>(&denom, trace)?;
    Ok(denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_send_burn() {
        let mut store = KvStore::new();
        let coin = |amount| Coin::new("stuatom", amount);

        mint(&mut store, "alice", &coin(100)).unwrap();
        send(&mut store, "alice", "bob", &coin(40)).unwrap();
        burn(&mut store, "bob", &coin(10)).unwrap();

        assert_eq!(balance(&store, "alice", "stuatom").unwrap(), 60);
        assert_eq!(balance(&store, "bob", "stuatom").unwrap(), 30);
        assert_eq!(supply(&store, "stuatom").unwrap(), 90);
    }

    #[test]
    fn test_overdraft_is_refused() {
        let mut store = KvStore::new();
        mint(&mut store, "alice", &Coin::new("uatom", 5)).unwrap();

        let err = send(&mut store, "alice", "bob", &Coin::new("uatom", 6)).unwrap_err();
        assert_eq!(
            err,
            StakeError::InsufficientFunds {
                address: "alice".to_string(),
                denom: "uatom".to_string(),
                needed: 6,
                available: 5,
            }
        );
        assert_eq!(balance(&store, "alice", "uatom").unwrap(), 5);
    }
}
