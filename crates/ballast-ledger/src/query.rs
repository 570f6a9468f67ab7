//! Point-in-time voting-power queries.
//!
//! Reads never mutate. Aggregates whose last synchronization predates the
//! queried epoch are projected forward on the fly.

use ballast_core::error::LedgerError;
use ballast_core::events::AggregateKind;
use ballast_core::types::{AccountId, LockId};

use crate::delegation::DelegationState;
use crate::escrow::Escrow;

impl Escrow {
    fn aggregate_power(&self, key: &AggregateKind, t: u64) -> u128 {
        self.accounts().get(key).map(|acc| acc.power_at(t, self.clock())).unwrap_or(0)
    }

    /// Power of a single lock at `t`.
    pub fn lock_power(&self, id: &LockId, t: u64) -> Result<u128, LedgerError> {
        Ok(self.locks().require(id)?.power_at(t, self.clock()))
    }

    /// Power credited to `owner` for its own, undelegated locks.
    pub fn owner_power(&self, owner: &AccountId, t: u64) -> u128 {
        self.aggregate_power(&AggregateKind::Owner(*owner), t)
    }

    /// Power delegated to `delegate` by all owners.
    pub fn delegate_power(&self, delegate: &AccountId, t: u64) -> u128 {
        self.aggregate_power(&AggregateKind::Delegate(*delegate), t)
    }

    /// Power `owner` has delegated to `delegate`.
    pub fn pair_power(&self, owner: &AccountId, delegate: &AccountId, t: u64) -> u128 {
        self.aggregate_power(&AggregateKind::Pair { owner: *owner, delegate: *delegate }, t)
    }

    /// Power `owner` has delegated away, summed over all delegates.
    pub fn delegated_away(&self, owner: &AccountId, t: u64) -> u128 {
        self.accounts()
            .pairs_of(owner)
            .map(|(_, acc)| acc.power_at(t, self.clock()))
            .fold(0u128, u128::saturating_add)
    }

    /// Power credited to `account` in either role. Unless
    /// `exclude_delegated`, power the account owns but has delegated away is
    /// counted as well.
    pub fn account_power(&self, account: &AccountId, t: u64, exclude_delegated: bool) -> u128 {
        let credited = self.owner_power(account, t).saturating_add(self.delegate_power(account, t));
        if exclude_delegated {
            credited
        } else {
            credited.saturating_add(self.delegated_away(account, t))
        }
    }

    /// Total live voting power at `t`.
    pub fn total_supply(&self, t: u64) -> u128 {
        self.accounts().global().power_at(t, self.clock())
    }

    /// Total supply at the start of epoch number `epoch`.
    pub fn historical_supply(&self, epoch: u64) -> u128 {
        self.accounts().historical_supply(epoch, self.clock())
    }

    pub fn delegation_state(&self, id: &LockId, now: u64) -> Result<DelegationState, LedgerError> {
        Ok(self.locks().require(id)?.delegation_state(now))
    }
}

#[cfg(test)]
mod tests {
    use ballast_core::config::LedgerConfig;
    use ballast_core::constants::UNIT;
    use ballast_core::types::Amounts;

    use super::*;
    use crate::memory::MemoryCollaborators;

    fn acct(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    fn day() -> u64 {
        LedgerConfig::testing().epoch_duration
    }

    fn setup() -> (Escrow, MemoryCollaborators) {
        let mem = MemoryCollaborators::new();
        mem.custody.fund(acct(1), Amounts::new(1_000 * UNIT, 0));
        mem.authority.register_delegate(acct(9));
        let escrow = Escrow::new(LedgerConfig::testing(), 0, mem.collaborators()).unwrap();
        (escrow, mem)
    }

    #[test]
    fn unknown_lock_is_an_error() {
        let (escrow, _) = setup();
        assert!(escrow.lock_power(&LockId([1; 32]), 0).is_err());
        assert_eq!(escrow.owner_power(&acct(1), 0), 0);
    }

    #[test]
    fn reads_inside_an_epoch_see_its_latest_balance() {
        let (mut escrow, _) = setup();
        let created = 5 * day() + day() / 2;
        let id = escrow.create_lock(&acct(1), Amounts::new(52 * UNIT, 0), 20 * day(), created).unwrap();
        let first = escrow.locks().get(&id).unwrap().balance();

        // earlier in the creation epoch already reports the lock
        let early = 5 * day() + 100;
        assert_eq!(escrow.lock_power(&id, early).unwrap(), first.value_at(early));
        assert_eq!(escrow.owner_power(&acct(1), early), first.value_at(early));
        assert_eq!(escrow.lock_power(&id, 5 * day() - 1).unwrap(), 0);
        assert_eq!(escrow.owner_power(&acct(1), 5 * day() - 1), 0);

        // same for an increase later in an epoch
        escrow.increase_amount(&acct(1), &id, Amounts::new(52 * UNIT, 0), 7 * day() + 40_000).unwrap();
        let second = escrow.locks().get(&id).unwrap().balance();
        assert!(second.slope > first.slope);
        let before_increase = 7 * day() + 10;
        assert_eq!(escrow.lock_power(&id, before_increase).unwrap(), second.value_at(before_increase));
        assert_eq!(escrow.lock_power(&id, 7 * day() - 1).unwrap(), first.value_at(7 * day() - 1));
    }

    #[test]
    fn lock_power_decays_to_zero() {
        let (mut escrow, _) = setup();
        let id = escrow.create_lock(&acct(1), Amounts::new(52 * UNIT, 0), 10 * day(), 0).unwrap();
        let slope = escrow.locks().get(&id).unwrap().balance().slope;
        assert_eq!(escrow.lock_power(&id, 0).unwrap(), slope * 10 * day() as u128);
        assert_eq!(escrow.lock_power(&id, 10 * day()).unwrap(), 0);
        assert_eq!(escrow.total_supply(5 * day()), slope * 5 * day() as u128);
        assert_eq!(escrow.total_supply(11 * day()), 0);
    }

    #[test]
    fn account_power_with_and_without_delegated() {
        let (mut escrow, _) = setup();
        let id = escrow.create_lock(&acct(1), Amounts::new(100 * UNIT, 0), 20 * day(), 0).unwrap();
        escrow.delegate(&acct(1), &id, &acct(9), 0).unwrap();
        let t = 2 * day();
        let lock = escrow.lock_power(&id, t).unwrap();
        assert_eq!(escrow.owner_power(&acct(1), t), 0);
        assert_eq!(escrow.delegate_power(&acct(9), t), lock);
        assert_eq!(escrow.pair_power(&acct(1), &acct(9), t), lock);
        assert_eq!(escrow.account_power(&acct(1), t, true), 0);
        assert_eq!(escrow.account_power(&acct(1), t, false), lock);
        assert_eq!(escrow.account_power(&acct(9), t, true), lock);
        assert_eq!(
            escrow.delegation_state(&id, t).unwrap(),
            DelegationState::Active { delegate: acct(9) }
        );
    }
}
