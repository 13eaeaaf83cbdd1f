//! # Ledger Verification Tests
//!
//! Randomised operation sequences against the escrow ledger:
//!
//! 1. **Conservation**: battles only move coins, except the floored part of a debit
//! 2. **Terminal states**: every invitation leaves `Pending` at most once
//! 3. **Settlement**: every battle completes at most once
//!
//! Run with: cargo test --package ascend_economy --test ledger_verification

use std::collections::HashMap;

use ascend_economy::{EconomyError, EscrowLedger};
use ascend_shared::{BattleStatus, InvitationStatus, LedgerEvent, User};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const PLAYERS: u64 = 5;

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

fn seeded_ledger() -> EscrowLedger {
    EscrowLedger::new(
        (1..=PLAYERS).map(|id| User::new(id, format!("player-{id}"), 400 + id * 100)),
        600,
    )
}

#[test]
fn verify_random_sequences_keep_ledger_consistent() {
    for seed in 0..20u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut ledger = seeded_ledger();
        let mut now = start();
        let mut expected_total = ledger.total_balance();
        let mut terminal_seen: HashMap<u64, InvitationStatus> = HashMap::new();

        for _ in 0..500 {
            now += Duration::seconds(rng.gen_range(0..120));
            match rng.gen_range(0..6) {
                0 | 1 => {
                    let a = rng.gen_range(1..=PLAYERS);
                    let b = rng.gen_range(1..=PLAYERS);
                    let stake = rng.gen_range(0..700);
                    match ledger.create_invitation(a, b, stake, now) {
                        Ok(_)
                        | Err(EconomyError::InsufficientFunds { .. })
                        | Err(EconomyError::InvalidStake(0))
                        | Err(EconomyError::InvalidState(_)) => {}
                        Err(other) => panic!("unexpected error {other:?}"),
                    }
                }
                2 => {
                    if let Some(id) = pick_invitation(&ledger, &mut rng) {
                        let _ = ledger.accept_invitation(id, now);
                    }
                }
                3 => {
                    if let Some(id) = pick_invitation(&ledger, &mut rng) {
                        let _ = ledger.decline_invitation(id, now);
                    }
                }
                4 => {
                    let battles = ledger.battles();
                    if !battles.is_empty() {
                        let battle = &battles[rng.gen_range(0..battles.len())];
                        let winner = if rng.gen_bool(0.5) {
                            battle.challenger_id
                        } else {
                            battle.opponent_id
                        };
                        let id = battle.id;
                        let _ = ledger.complete_battle(id, winner, now);
                    }
                }
                _ => {
                    let user = rng.gen_range(1..=PLAYERS);
                    let spent = ledger.debit(user, rng.gen_range(0..200)).unwrap();
                    expected_total -= spent;
                }
            }

            for event in ledger.drain_events() {
                if let LedgerEvent::BattleCompleted { stake, debited, .. } = event {
                    expected_total = expected_total + stake - debited;
                }
            }
            assert_eq!(ledger.total_balance(), expected_total, "seed {seed}: coins created or lost");

            for invitation in ledger.invitations() {
                if let Some(previous) = terminal_seen.get(&invitation.id) {
                    assert_eq!(*previous, invitation.status, "seed {seed}: terminal status changed");
                } else if invitation.status.is_terminal() {
                    terminal_seen.insert(invitation.id, invitation.status);
                }
            }
        }

        for battle in ledger.battles() {
            if battle.status == BattleStatus::Completed {
                assert!(battle.winner_id.is_some() && battle.loser_id.is_some());
                assert_ne!(battle.winner_id, battle.loser_id);
            }
        }
    }
}

fn pick_invitation(ledger: &EscrowLedger, rng: &mut ChaCha8Rng) -> Option<u64> {
    let invitations = ledger.invitations();
    if invitations.is_empty() {
        return None;
    }
    Some(invitations[rng.gen_range(0..invitations.len())].id)
}

#[test]
fn verify_wager_scenario() {
    let mut ledger = EscrowLedger::new([User::new(1, "me", 500), User::new(2, "rival", 500)], 600);
    let invitation = ledger.create_invitation(1, 2, 150, start()).unwrap();
    let battle = ledger.accept_invitation(invitation, start()).unwrap();
    ledger.complete_battle(battle, 2, start()).unwrap();

    assert_eq!(ledger.balance(2).unwrap(), 650);
    assert_eq!(ledger.balance(1).unwrap(), 350);
}

#[test]
fn verify_insufficient_funds_scenario() {
    let mut ledger = EscrowLedger::new([User::new(1, "me", 1000), User::new(2, "rival", 9000)], 600);
    let err = ledger.create_invitation(1, 2, 1500, start()).unwrap_err();

    assert!(matches!(err, EconomyError::InsufficientFunds { .. }));
    assert!(ledger.invitations().is_empty());
    assert_eq!(ledger.balance(1).unwrap(), 1000);
}
