use std::sync::Arc;
use std::time::Duration;

use ocasino_common::ids::{PartnerId, PlayerId, ReferenceId};
use ocasino_common::money::{Amount, Currency};
use ocasino_crypto::AmountCipher;
use ocasino_events::EventBus;
use ocasino_store::memory::MemoryStore;
use ocasino_store::model::TransactionStatus;
use ocasino_store::repo::TransactionRepo;
use ocasino_wallet::{WalletEngine, WalletOpRequest};

fn usd() -> Currency {
    Currency::new("USD").unwrap()
}

fn amount(decimal: &str) -> Amount {
    Amount::parse(decimal, &usd()).unwrap()
}

fn engine() -> (Arc<WalletEngine>, Arc<MemoryStore>) {
    let store = MemoryStore::new();
    let cipher = Arc::new(AmountCipher::new(&[3u8; 32]).unwrap());
    let dead_letters: Arc<dyn ocasino_store::repo::DeadLetterRepo> = store.clone();
    let events = EventBus::new(2, 64, dead_letters);
    let engine = Arc::new(WalletEngine::new(store.clone(), cipher, events, Duration::from_secs(5)));
    (engine, store)
}

fn request(partner: PartnerId, player: &PlayerId, reference: &str, amount_decimal: &str) -> WalletOpRequest {
    WalletOpRequest {
        partner_id: partner,
        player_id: player.clone(),
        reference_id: ReferenceId(reference.to_string()),
        amount: amount(amount_decimal),
        currency: usd(),
        game_id: None,
        game_session_id: None,
        original_reference_id: None,
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn happy_deposit_bet_win_withdraw() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-1".into());

    let deposit = engine.deposit(request(partner, &player, "d1", "100.00")).await.unwrap();
    assert_eq!(deposit.updated_balance.to_decimal_string(&usd()), "100.00");

    let mut bet_req = request(partner, &player, "b1", "30.00");
    bet_req.game_id = Some("g1".into());
    let bet = engine.bet(bet_req).await.unwrap();
    assert_eq!(bet.updated_balance.to_decimal_string(&usd()), "70.00");

    let mut win_req = request(partner, &player, "w1", "50.00");
    win_req.game_id = Some("g1".into());
    win_req.original_reference_id = Some(ReferenceId("d1".into()));
    let win = engine.win(win_req).await.unwrap();
    assert_eq!(win.updated_balance.to_decimal_string(&usd()), "120.00");

    let withdraw = engine.withdraw(request(partner, &player, "o1", "120.00")).await.unwrap();
    assert_eq!(withdraw.updated_balance.to_decimal_string(&usd()), "0.00");
}

#[tokio::test]
async fn idempotent_retry_returns_stored_result_without_double_mutation() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-2".into());

    let first = engine.deposit(request(partner, &player, "r-dup", "50.00")).await.unwrap();
    assert_eq!(first.updated_balance.to_decimal_string(&usd()), "50.00");

    let replay = engine.deposit(request(partner, &player, "r-dup", "50.00")).await.unwrap();
    assert_eq!(replay.transaction_id, first.transaction_id);
    assert_eq!(replay.updated_balance.to_decimal_string(&usd()), "50.00");

    let conflict = engine.deposit(request(partner, &player, "r-dup", "60.00")).await;
    assert!(conflict.is_err());
    assert_eq!(conflict.unwrap_err().code, ocasino_common::ErrorCode::IdempotencyConflict);

    let balance_check = engine.deposit(request(partner, &player, "r-dup-check", "0.01")).await;
    assert!(balance_check.is_ok());
    let balance_after = balance_check.unwrap().updated_balance;
    assert_eq!(balance_after.to_decimal_string(&usd()), "50.01");
}

#[tokio::test]
async fn concurrent_bets_never_both_commit_past_the_balance() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-3".into());
    engine.deposit(request(partner, &player, "seed", "100.00")).await.unwrap();

    let e1 = engine.clone();
    let e2 = engine.clone();
    let p1 = player.clone();
    let p2 = player.clone();

    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { e1.bet(request(partner, &p1, "bet-a", "40.00")).await }),
        tokio::spawn(async move { e2.bet(request(partner, &p2, "bet-b", "70.00")).await }),
    );
    let r1 = r1.unwrap();
    let r2 = r2.unwrap();

    let outcomes: Vec<_> = vec![r1.is_ok(), r2.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one of the two bets should commit");

    let failure = if r1.is_err() { r1.err().unwrap() } else { r2.err().unwrap() };
    assert_eq!(failure.code, ocasino_common::ErrorCode::InsufficientFunds);

    let winner_balance = if r1.is_ok() { r1.unwrap().updated_balance } else { r2.unwrap().updated_balance };
    let expected = winner_balance.to_decimal_string(&usd());
    assert!(expected == "60.00" || expected == "30.00");
}

#[tokio::test]
async fn rollback_reverses_a_bet_and_rejects_a_second_rollback() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-4".into());
    engine.deposit(request(partner, &player, "seed", "100.00")).await.unwrap();

    let mut bet_req = request(partner, &player, "b-roll", "25.00");
    bet_req.game_id = Some("g1".into());
    let bet = engine.bet(bet_req).await.unwrap();
    assert_eq!(bet.updated_balance.to_decimal_string(&usd()), "75.00");

    let mut rollback_req = request(partner, &player, "rb-1", "1.00");
    rollback_req.original_reference_id = Some(ReferenceId("b-roll".into()));
    let rollback = engine.rollback(rollback_req).await.unwrap();
    assert_eq!(rollback.updated_balance.to_decimal_string(&usd()), "100.00");
    assert_eq!(rollback.amount.to_decimal_string(&usd()), "25.00", "rollback's own amount is the reversed delta, not the placeholder");

    let mut second_rollback_req = request(partner, &player, "rb-2", "1.00");
    second_rollback_req.original_reference_id = Some(ReferenceId("b-roll".into()));
    let second = engine.rollback(second_rollback_req).await;
    assert!(second.is_err());
    assert_eq!(second.unwrap_err().code, ocasino_common::ErrorCode::AlreadyRolledBack);
}

#[tokio::test]
async fn rollback_replay_is_idempotent_despite_placeholder_amount() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-5".into());
    engine.deposit(request(partner, &player, "seed", "100.00")).await.unwrap();
    let mut bet_req = request(partner, &player, "b-roll", "25.00");
    bet_req.game_id = Some("g1".into());
    engine.bet(bet_req).await.unwrap();

    let mut rollback_req = request(partner, &player, "rb-1", "1.00");
    rollback_req.original_reference_id = Some(ReferenceId("b-roll".into()));
    let first = engine.rollback(rollback_req.clone()).await.unwrap();

    let replay = engine.rollback(rollback_req).await.unwrap();
    assert_eq!(replay.transaction_id, first.transaction_id);
    assert_eq!(replay.updated_balance.to_decimal_string(&usd()), "100.00");
}

#[tokio::test]
async fn rollback_currency_mismatch_is_rejected() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-6".into());
    engine.deposit(request(partner, &player, "seed", "100.00")).await.unwrap();
    let mut bet_req = request(partner, &player, "b-roll", "25.00");
    bet_req.game_id = Some("g1".into());
    engine.bet(bet_req).await.unwrap();

    // The original bet settled in USD; a rollback claiming a different
    // currency must be rejected rather than silently opening a new wallet.
    let mut rollback_req = request(partner, &player, "rb-1", "1.00");
    rollback_req.currency = Currency::new("EUR").unwrap();
    rollback_req.original_reference_id = Some(ReferenceId("b-roll".into()));
    let err = engine.rollback(rollback_req).await.unwrap_err();
    assert_eq!(err.code, ocasino_common::ErrorCode::CurrencyMismatch);
}

#[tokio::test]
async fn no_overdraft_on_a_single_withdrawal_exceeding_balance() {
    let (engine, _store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-7".into());
    engine.deposit(request(partner, &player, "seed", "20.00")).await.unwrap();

    let err = engine.withdraw(request(partner, &player, "too-much", "20.01")).await.unwrap_err();
    assert_eq!(err.code, ocasino_common::ErrorCode::InsufficientFunds);
}

#[tokio::test]
async fn conservation_of_funds_holds_across_a_mixed_sequence() {
    let (engine, store) = engine();
    let partner = PartnerId::new();
    let player = PlayerId("player-8".into());

    engine.deposit(request(partner, &player, "d1", "200.00")).await.unwrap();
    let mut bet = request(partner, &player, "b1", "40.00");
    bet.game_id = Some("g1".into());
    engine.bet(bet).await.unwrap();
    let mut win = request(partner, &player, "w1", "15.00");
    win.game_id = Some("g1".into());
    engine.win(win).await.unwrap();
    let final_balance = engine.withdraw(request(partner, &player, "wd1", "50.00")).await.unwrap().updated_balance;

    // 200 - 40 + 15 - 50 = 125
    assert_eq!(final_balance.to_decimal_string(&usd()), "125.00");

    let wallet = store.get_or_create_wallet(&player, partner, &usd()).await.unwrap();
    assert_eq!(wallet.balance.to_decimal_string(&usd()), "125.00");

    let history = TransactionRepo::list_by_player(store.as_ref(), &player, partner, chrono::Utc::now() - chrono::Duration::days(1), 100)
        .await
        .unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|tx| tx.status == TransactionStatus::Completed));
}
