//! End-to-end lock and delegation scenarios.
//!
//! Every test runs on the testing config: one-day epochs, a 52-epoch maximum
//! term, a three-epoch minimum term.

use ballast_core::balance::DecayBalance;
use ballast_core::constants::UNIT;
use ballast_core::events::{AggregateKind, LedgerEvent};
use ballast_core::types::{Amounts, Role};
use ballast_ledger::DelegationState;
use ballast_tests::helpers::*;

fn setup() -> Harness {
    let h = Harness::new();
    h.fund(&[1, 2, 3]);
    h.register(&[8, 9]);
    h
}

fn owner_key(seed: u8) -> AggregateKind {
    AggregateKind::Owner(acct(seed))
}

fn delegate_key(seed: u8) -> AggregateKind {
    AggregateKind::Delegate(acct(seed))
}

fn pair_key(owner: u8, delegate: u8) -> AggregateKind {
    AggregateKind::Pair { owner: acct(owner), delegate: acct(delegate) }
}

// ---------------------------------------------------------------------------
// Creation and decay
// ---------------------------------------------------------------------------

#[test]
fn creation_value_and_decay_to_zero() {
    let mut h = setup();
    let max_term = h.escrow.config().max_term;
    let term = 10;
    let created_at = 3_600;
    h.at(created_at);
    let id = h.create(1, 520, term).unwrap();

    let slope = 520 * UNIT / max_term as u128;
    let expiry = h.epoch_start(term);
    assert_eq!(h.lock(&id).balance(), DecayBalance::new(slope * expiry as u128, slope));
    // full term minus what already elapsed in the creation epoch
    assert_eq!(
        h.escrow.lock_power(&id, created_at).unwrap(),
        slope * (term * h.epoch()) as u128 - slope * created_at as u128
    );
    assert!(h.escrow.lock_power(&id, expiry - h.epoch()).unwrap() > 0);
    assert!(h.escrow.lock_power(&id, expiry - 1).unwrap() > 0);
    assert_eq!(h.escrow.lock_power(&id, expiry).unwrap(), 0);
    assert_eq!(h.escrow.lock_power(&id, expiry + 100 * h.epoch()).unwrap(), 0);
    assert_eq!(h.escrow.owner_power(&acct(1), expiry), 0);
    assert_eq!(h.escrow.total_supply(expiry), 0);
}

#[test]
fn two_component_principal_counts_toward_slope() {
    let mut h = setup();
    let id = h
        .escrow
        .create_lock(&acct(1), Amounts::new(26 * UNIT, 26 * UNIT), h.epoch_start(20), 0)
        .unwrap();
    let only_a = h.create(2, 52, 20).unwrap();
    assert_eq!(h.lock(&id).balance(), h.lock(&only_a).balance());
    assert_eq!(h.mem.custody.held(), Amounts::new(78 * UNIT, 26 * UNIT));
}

#[test]
fn supply_tracks_staggered_expiries() {
    let mut h = setup();
    let a = h.create(1, 100, 5).unwrap();
    let b = h.create(2, 100, 10).unwrap();
    let lock_a = h.lock(&a).balance();
    let lock_b = h.lock(&b).balance();
    for e in 0..12 {
        let t = h.epoch_start(e);
        assert_eq!(h.escrow.total_supply(t), lock_a.value_at(t) + lock_b.value_at(t), "epoch {e}");
    }
    // sync far past both expiries in one call
    h.escrow.sync_global(h.epoch_start(40)).unwrap();
    assert_eq!(h.escrow.accounts().global().history, DecayBalance::ZERO);
    assert!(h.escrow.accounts().global().slope_adjustments.is_empty());
}

// ---------------------------------------------------------------------------
// Delegation activation
// ---------------------------------------------------------------------------

#[test]
fn delegation_activates_next_epoch() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    let n = 4;
    h.at(h.epoch_start(n) + 500);
    let activates = h.escrow.delegate(&acct(1), &id, &acct(9), h.now).unwrap();
    assert_eq!(activates, h.epoch_start(n + 1));

    // owner keeps full power through the rest of epoch n
    let late_in_n = h.epoch_start(n + 1) - 1;
    assert_eq!(h.escrow.owner_power(&acct(1), late_in_n), h.escrow.lock_power(&id, late_in_n).unwrap());
    assert_eq!(h.escrow.delegate_power(&acct(9), late_in_n), 0);
    assert!(matches!(h.escrow.delegation_state(&id, h.now).unwrap(), DelegationState::Pending { .. }));

    // sync at n+1
    let t = h.epoch_start(n + 1);
    h.escrow.sync_account(&acct(1), false, t).unwrap();
    h.escrow.sync_account(&acct(9), true, t).unwrap();
    h.escrow.sync_pair(&acct(1), &acct(9), t).unwrap();
    let lock_value = h.escrow.lock_power(&id, t).unwrap();
    assert_eq!(h.escrow.owner_power(&acct(1), t), 0);
    assert_eq!(h.escrow.delegate_power(&acct(9), t), lock_value);
    assert_eq!(h.escrow.pair_power(&acct(1), &acct(9), t), lock_value);
    assert_eq!(h.escrow.total_supply(t), lock_value);

    let lock = h.lock(&id).balance();
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap().history, DecayBalance::ZERO);
    assert_eq!(h.escrow.accounts().get(&delegate_key(9)).unwrap().history, lock);
    assert_eq!(h.escrow.accounts().get(&pair_key(1, 9)).unwrap().history, lock);
    assert_eq!(h.escrow.delegation_state(&id, t).unwrap(), DelegationState::Active { delegate: acct(9) });
}

#[test]
fn delegated_lock_expires_out_of_delegate() {
    let mut h = setup();
    let id = h.create(1, 100, 6).unwrap();
    h.escrow.delegate(&acct(1), &id, &acct(9), 0).unwrap();
    h.escrow.sync_account(&acct(9), true, h.epoch_start(10)).unwrap();
    h.escrow.sync_account(&acct(1), false, h.epoch_start(10)).unwrap();
    let delegate = h.escrow.accounts().get(&delegate_key(9)).unwrap();
    assert_eq!(delegate.history, DecayBalance::ZERO);
    assert!(delegate.slope_adjustments.is_empty());
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap().history, DecayBalance::ZERO);
    h.at(h.epoch_start(10));
    assert_eq!(h.escrow.unlock(&acct(1), &id, h.now).unwrap(), units(100));
}

#[test]
fn switch_moves_credit_between_delegates() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    h.escrow.delegate(&acct(1), &id, &acct(9), 0).unwrap();
    h.at(h.epoch_start(3));
    h.escrow.switch_delegate(&acct(1), &id, &acct(8), h.now).unwrap();

    // 9 keeps the credit until the switch activates
    let t = h.now + 10;
    let value = h.escrow.lock_power(&id, t).unwrap();
    assert_eq!(h.escrow.delegate_power(&acct(9), t), value);
    assert_eq!(h.escrow.delegate_power(&acct(8), t), 0);

    let t = h.epoch_start(4);
    let value = h.escrow.lock_power(&id, t).unwrap();
    assert_eq!(h.escrow.delegate_power(&acct(9), t), 0);
    assert_eq!(h.escrow.delegate_power(&acct(8), t), value);
    assert_eq!(h.escrow.pair_power(&acct(1), &acct(9), t), 0);
    assert_eq!(h.escrow.pair_power(&acct(1), &acct(8), t), value);
    assert_eq!(h.escrow.account_power(&acct(1), t, false), value);
    assert_eq!(h.escrow.account_power(&acct(1), t, true), 0);
    assert_eq!(h.lock(&id).counters.switches, 1);
}

#[test]
fn undelegate_returns_credit_to_owner() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    h.escrow.delegate(&acct(1), &id, &acct(9), 0).unwrap();
    h.at(h.epoch_start(5));
    h.escrow.undelegate(&acct(1), &id, h.now).unwrap();
    assert_eq!(h.escrow.delegation_state(&id, h.now).unwrap(), DelegationState::Undelegated);

    let during = h.now + 1;
    assert_eq!(h.escrow.delegate_power(&acct(9), during), h.escrow.lock_power(&id, during).unwrap());
    let t = h.epoch_start(6);
    assert_eq!(h.escrow.delegate_power(&acct(9), t), 0);
    assert_eq!(h.escrow.owner_power(&acct(1), t), h.escrow.lock_power(&id, t).unwrap());
    assert_eq!(h.lock(&id).counters.undelegations, 1);
}

#[test]
fn same_epoch_delegate_then_undelegate_nets_out() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    h.at(100);
    h.escrow.delegate(&acct(1), &id, &acct(9), h.now).unwrap();
    h.escrow.undelegate(&acct(1), &id, h.now).unwrap();
    let t = h.epoch_start(1);
    h.escrow.sync_account(&acct(1), false, t).unwrap();
    h.escrow.sync_account(&acct(9), true, t).unwrap();
    let lock = h.lock(&id).balance();
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap().history, lock);
    assert_eq!(h.escrow.accounts().get(&delegate_key(9)).unwrap().history, DecayBalance::ZERO);
    assert_eq!(h.escrow.owner_power(&acct(1), t), lock.value_at(t));
}

// ---------------------------------------------------------------------------
// Increases during delegation
// ---------------------------------------------------------------------------

#[test]
fn increase_on_active_delegation_credits_delegate_immediately() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    h.escrow.delegate(&acct(1), &id, &acct(9), 0).unwrap();
    h.at(h.epoch_start(2) + 50);
    let before = h.escrow.delegate_power(&acct(9), h.now);
    let owner_before = h.escrow.accounts().get(&owner_key(1)).unwrap().clone();

    let delta = h.escrow.increase_amount(&acct(1), &id, units(50), h.now).unwrap();
    assert_eq!(h.escrow.delegate_power(&acct(9), h.now), before + delta.value_at(h.now));
    assert_eq!(h.escrow.owner_power(&acct(1), h.now), 0);
    // the owner aggregate is not involved at all
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap(), &owner_before);
    assert!(h.escrow.accounts().get(&delegate_key(9)).unwrap().pending.is_none());
    assert!(h.escrow.accounts().get(&pair_key(1, 9)).unwrap().pending.is_none());
}

#[test]
fn increase_on_pending_delegation_follows_the_transfer() {
    let mut h = setup();
    let id = h.create(1, 100, 30).unwrap();
    h.at(1_000);
    h.escrow.delegate(&acct(1), &id, &acct(9), h.now).unwrap();
    let original = h.lock(&id).balance();
    let before = h.escrow.owner_power(&acct(1), h.now);

    let first = h.escrow.increase_amount(&acct(1), &id, units(40), h.now).unwrap();
    let second = h.escrow.increase_duration(&acct(1), &id, h.epoch_start(40), h.now).unwrap();
    assert_eq!(second.slope, 0);
    assert_eq!(
        h.escrow.owner_power(&acct(1), h.now),
        before + first.value_at(h.now) + second.value_at(h.now)
    );

    let owner = h.escrow.accounts().get(&owner_key(1)).unwrap();
    let queued = original.saturating_add(&first).saturating_add(&second);
    assert_eq!(owner.pending.unwrap().subtractions, Some(queued));
    let delegate = h.escrow.accounts().get(&delegate_key(9)).unwrap();
    assert_eq!(delegate.pending.unwrap().additions, Some(queued));
    assert_eq!(queued, h.lock(&id).balance());

    let t = h.epoch_start(1);
    h.escrow.sync_account(&acct(1), false, t).unwrap();
    h.escrow.sync_account(&acct(9), true, t).unwrap();
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap().history, DecayBalance::ZERO);
    assert_eq!(h.escrow.accounts().get(&delegate_key(9)).unwrap().history, queued);
    assert_eq!(h.escrow.accounts().get(&delegate_key(9)).unwrap().scheduled_slope(h.epoch_start(40)), queued.slope);

    // the new expiry removes the whole slope from the delegate
    h.escrow.sync_account(&acct(9), true, h.epoch_start(41)).unwrap();
    assert_eq!(h.escrow.accounts().get(&delegate_key(9)).unwrap().history, DecayBalance::ZERO);
}

#[test]
fn increase_duration_moves_expiry_registration() {
    let mut h = setup();
    let id = h.create(1, 100, 10).unwrap();
    h.at(h.epoch_start(2));
    h.escrow.increase_duration(&acct(1), &id, h.epoch_start(20), h.now).unwrap();
    let global = h.escrow.accounts().global();
    assert_eq!(global.scheduled_slope(h.epoch_start(10)), 0);
    assert_eq!(global.scheduled_slope(h.epoch_start(20)), h.lock(&id).balance().slope);
    assert!(h.escrow.lock_power(&id, h.epoch_start(15)).unwrap() > 0);
    assert_eq!(h.escrow.total_supply(h.epoch_start(15)), h.escrow.lock_power(&id, h.epoch_start(15)).unwrap());
}

// ---------------------------------------------------------------------------
// Unlock and supply history
// ---------------------------------------------------------------------------

#[test]
fn unlock_settles_principal_without_touching_aggregates() {
    let mut h = setup();
    let id = h.create(1, 100, 5).unwrap();
    h.at(h.epoch_start(7));
    let global = h.escrow.accounts().global().clone();
    let owner = h.escrow.accounts().get(&owner_key(1)).unwrap().clone();
    let wallet = h.mem.custody.balance_of(&acct(1));

    let released = h.escrow.unlock(&acct(1), &id, h.now).unwrap();
    assert_eq!(released, units(100));
    assert_eq!(h.mem.custody.balance_of(&acct(1)).principal_a, wallet.principal_a + 100 * UNIT);
    assert_eq!(h.escrow.accounts().global(), &global);
    assert_eq!(h.escrow.accounts().get(&owner_key(1)).unwrap(), &owner);
    assert!(h.lock(&id).is_unlocked());
    assert_eq!(h.lock(&id).amounts, Amounts::ZERO);
    assert!(h.escrow.unlock(&acct(1), &id, h.now).is_err());
}

#[test]
fn historical_supply_is_memoized_per_epoch() {
    let mut h = setup();
    let a = h.create(1, 100, 6).unwrap();
    h.at(h.epoch_start(2) + 7);
    let b = h.create(2, 200, 12).unwrap();
    let (lock_a, lock_b) = (h.lock(&a).balance(), h.lock(&b).balance());

    h.escrow.sync_global(h.epoch_start(20)).unwrap();
    assert_eq!(h.escrow.historical_supply(0), 0);
    assert_eq!(h.escrow.historical_supply(1), lock_a.value_at(h.epoch_start(1)));
    for e in 3..15 {
        let start = h.epoch_start(e);
        assert_eq!(h.escrow.historical_supply(e), lock_a.value_at(start) + lock_b.value_at(start), "epoch {e}");
    }
    assert_eq!(h.escrow.historical_supply(20), 0);
}

#[test]
fn batch_create_on_behalf() {
    let mut h = setup();
    h.mem.authority.grant(acct(3), Role::Operator);
    let expiry = h.epoch_start(15);
    let batch: Vec<_> = [4u8, 5, 6]
        .iter()
        .map(|s| ballast_ledger::NewLock { owner: acct(*s), amounts: units(10), expiry })
        .collect();
    let ids = h.escrow.create_locks_for(&acct(3), &batch, 0).unwrap();
    assert_eq!(ids.len(), 3);
    for (id, seed) in ids.iter().zip([4u8, 5, 6]) {
        assert_eq!(h.lock(id).owner, acct(seed));
        assert_eq!(h.escrow.owner_power(&acct(seed), 0), h.escrow.lock_power(id, 0).unwrap());
    }
    let created = h
        .mem
        .events
        .events()
        .iter()
        .filter(|e| matches!(e, LedgerEvent::LockCreated { .. }))
        .count();
    assert_eq!(created, 3);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn ledger_resumes_from_saved_state() {
    let mut h = setup();
    let a = h.create(1, 100, 30).unwrap();
    h.create(2, 40, 12).unwrap();
    h.escrow.delegate(&acct(1), &a, &acct(9), 600).unwrap();
    h.escrow.sync_global(h.epoch_start(3)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.bin");
    ballast_ledger::persist::save(h.escrow.state(), &path).unwrap();
    let state = ballast_ledger::persist::load(&path).unwrap();
    let mem = ballast_ledger::MemoryCollaborators::new();
    let mut resumed =
        ballast_ledger::Escrow::from_state(h.escrow.config().clone(), state, mem.collaborators()).unwrap();

    for e in [3, 5, 12, 20, 31] {
        let t = h.epoch_start(e) + 17;
        for key in all_keys(&h.escrow) {
            assert_eq!(reported_power(&resumed, &key, t), reported_power(&h.escrow, &key, t), "{key:?} at {t}");
        }
        assert_eq!(resumed.historical_supply(e), h.escrow.historical_supply(e));
    }

    let t = h.epoch_start(20);
    h.escrow.sync_global(t).unwrap();
    resumed.sync_global(t).unwrap();
    assert_eq!(resumed.state(), h.escrow.state());
}
