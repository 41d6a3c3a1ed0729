use std::net::IpAddr;
use std::sync::Arc;

use ocasino_auth::AuthPipeline;
use ocasino_common::ids::{PartnerId, PlayerId, ReferenceId};
use ocasino_common::money::{Amount, Currency};
use ocasino_common::{PlatformError, Result};
use ocasino_store::repo::{TransactionRepo, WalletRepo};
use ocasino_wallet::{WalletEngine, WalletOpRequest, WalletOpResult};
use serde_json::Value;

use crate::dto::{BalanceData, BetRequest, MoneyMovementRequest, RollbackRequest, WalletOperationData, WinRequest};

/// Everything a thin HTTP handler needs to serve the five wallet endpoints:
/// authenticate the caller, then run the matching wallet operation.
/// Constructed once at startup and shared behind an `Arc` the same way
/// `AuthPipeline` and `WalletEngine` already are.
pub struct ApiContext {
    pub auth: Arc<AuthPipeline>,
    pub wallet: Arc<WalletEngine>,
    pub wallets: Arc<dyn WalletRepo>,
    pub transactions: Arc<dyn TransactionRepo>,
}

impl ApiContext {
    pub fn new(
        auth: Arc<AuthPipeline>,
        wallet: Arc<WalletEngine>,
        wallets: Arc<dyn WalletRepo>,
        transactions: Arc<dyn TransactionRepo>,
    ) -> Self {
        Self { auth, wallet, wallets, transactions }
    }

    pub async fn balance(&self, raw_api_key: Option<&str>, caller_ip: IpAddr, player: PlayerId, currency: &str) -> Result<BalanceData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:balance").await?;
        let currency = Currency::new(currency)?;
        let wallet = self
            .wallets
            .find(&player, ctx.partner_id, currency.code())
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("no wallet for player '{player}' in {currency}")))?;
        Ok(BalanceData {
            balance: wallet.balance.to_decimal_string(&wallet.currency),
            currency: wallet.currency.code().to_string(),
            partner_id: ctx.partner_id.to_string(),
        })
    }

    pub async fn deposit(
        &self,
        raw_api_key: Option<&str>,
        caller_ip: IpAddr,
        player: PlayerId,
        body: MoneyMovementRequest,
    ) -> Result<WalletOperationData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:deposit").await?;
        let req = money_request(ctx.partner_id, player, &body.reference_id, &body.amount, &body.currency, None, None, None, body.metadata)?;
        let result = self.wallet.deposit(req).await?;
        Ok(to_operation_data(&result))
    }

    pub async fn withdraw(
        &self,
        raw_api_key: Option<&str>,
        caller_ip: IpAddr,
        player: PlayerId,
        body: MoneyMovementRequest,
    ) -> Result<WalletOperationData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:withdraw").await?;
        let req = money_request(ctx.partner_id, player, &body.reference_id, &body.amount, &body.currency, None, None, None, body.metadata)?;
        let result = self.wallet.withdraw(req).await?;
        Ok(to_operation_data(&result))
    }

    pub async fn bet(&self, raw_api_key: Option<&str>, caller_ip: IpAddr, player: PlayerId, body: BetRequest) -> Result<WalletOperationData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:bet").await?;
        let req = money_request(
            ctx.partner_id,
            player,
            &body.reference_id,
            &body.amount,
            &body.currency,
            Some(body.game_id),
            body.round_id,
            None,
            body.metadata,
        )?;
        let result = self.wallet.bet(req).await?;
        Ok(to_operation_data(&result))
    }

    pub async fn win(&self, raw_api_key: Option<&str>, caller_ip: IpAddr, player: PlayerId, body: WinRequest) -> Result<WalletOperationData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:win").await?;
        let req = money_request(
            ctx.partner_id,
            player,
            &body.reference_id,
            &body.amount,
            &body.currency,
            Some(body.game_id),
            None,
            body.related_bet_reference_id,
            body.metadata,
        )?;
        let result = self.wallet.win(req).await?;
        Ok(to_operation_data(&result))
    }

    pub async fn rollback(
        &self,
        raw_api_key: Option<&str>,
        caller_ip: IpAddr,
        player: PlayerId,
        body: RollbackRequest,
    ) -> Result<WalletOperationData> {
        let ctx = self.auth.authenticate(raw_api_key, caller_ip, "wallet", "wallet:rollback").await?;
        let original_ref = ReferenceId(body.original_reference_id);
        let original = self
            .transactions
            .find_by_reference(ctx.partner_id, &original_ref)
            .await?
            .ok_or_else(|| PlatformError::not_found(format!("original transaction '{original_ref}' not found")))?;

        let mut metadata = body.metadata.unwrap_or_else(|| Value::Object(Default::default()));
        if let (Some(reason), Value::Object(map)) = (&body.reason, &mut metadata) {
            map.insert("reason".to_string(), Value::String(reason.clone()));
        }
        // a rollback reverses exactly the original transaction's delta; the
        // engine recomputes that delta itself and ignores this amount, but
        // the currency must match the wallet for the engine's own guard to pass.
        let req = WalletOpRequest {
            partner_id: ctx.partner_id,
            player_id: player,
            reference_id: ReferenceId(body.reference_id),
            amount: Amount::from_minor_units(1),
            currency: original.currency.clone(),
            game_id: None,
            game_session_id: None,
            original_reference_id: Some(original_ref),
            metadata,
        };
        let result = self.wallet.rollback(req).await?;
        Ok(to_operation_data(&result))
    }
}

#[allow(clippy::too_many_arguments)]
fn money_request(
    partner_id: PartnerId,
    player: PlayerId,
    reference_id: &str,
    amount: &str,
    currency: &str,
    game_id: Option<String>,
    game_session_id: Option<String>,
    original_reference_id: Option<String>,
    metadata: Option<Value>,
) -> Result<WalletOpRequest> {
    let currency = Currency::new(currency)?;
    let amount = Amount::parse(amount, &currency)?;
    Ok(WalletOpRequest {
        partner_id,
        player_id: player,
        reference_id: ReferenceId(reference_id.to_string()),
        amount,
        currency,
        game_id,
        game_session_id,
        original_reference_id: original_reference_id.map(ReferenceId),
        metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
    })
}

fn to_operation_data(result: &WalletOpResult) -> WalletOperationData {
    WalletOperationData {
        transaction_id: result.transaction_id.to_string(),
        amount: result.amount.to_decimal_string(&result.currency),
        balance: result.updated_balance.to_decimal_string(&result.currency),
        currency: result.currency.code().to_string(),
        timestamp: result.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ocasino_cache::{Cache, RateLimiter};
    use ocasino_common::ids::ApiKeyId;
    use ocasino_crypto::{lookup_hash, AmountCipher};
    use ocasino_events::EventBus;
    use ocasino_store::memory::MemoryStore;
    use ocasino_store::model::{ApiKey as StoreApiKey, Partner, PartnerStatus};
    use std::time::Duration;

    async fn test_context() -> (ApiContext, String) {
        let store = MemoryStore::new();
        let partner_id = PartnerId::new();
        store
            .insert_partner(Partner {
                id: partner_id,
                code: "ACME".into(),
                status: PartnerStatus::Active,
                permitted_ips: vec![],
                created_at: Utc::now(),
            })
            .await;
        let raw_key = "live_apitestkey";
        store
            .insert_api_key(StoreApiKey {
                id: ApiKeyId::new(),
                partner_id,
                key_hash: lookup_hash(raw_key),
                permissions: vec!["wallet:*".to_string()],
                active: true,
                expires_at: None,
                last_used_at: None,
                created_at: Utc::now(),
            })
            .await;

        let cipher = Arc::new(AmountCipher::new(&[7u8; 32]).unwrap());
        let dead_letters: Arc<dyn ocasino_store::repo::DeadLetterRepo> = store.clone();
        let events = EventBus::new(2, 64, dead_letters);
        let wallet = Arc::new(WalletEngine::new(store.clone(), cipher, events, Duration::from_secs(5)));
        let cache = Cache::local();
        let limiter = RateLimiter::new(cache.clone(), 1000);
        let auth = Arc::new(AuthPipeline::new(store.clone(), store.clone(), cache, limiter, vec![], false));
        let wallets: Arc<dyn WalletRepo> = store.clone();
        let transactions: Arc<dyn TransactionRepo> = store.clone();

        (ApiContext::new(auth, wallet, wallets, transactions), raw_key.to_string())
    }

    fn loopback() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn deposit_then_balance_reflects_the_credit() {
        let (ctx, key) = test_context().await;
        let player = PlayerId("p-1".into());
        let body = MoneyMovementRequest {
            reference_id: "ref-1".into(),
            amount: "50.00".into(),
            currency: "USD".into(),
            metadata: None,
        };
        let result = ctx.deposit(Some(&key), loopback(), player.clone(), body).await.unwrap();
        assert_eq!(result.balance, "50.00");

        let balance = ctx.balance(Some(&key), loopback(), player, "USD").await.unwrap();
        assert_eq!(balance.balance, "50.00");
        assert_eq!(balance.currency, "USD");
    }

    #[tokio::test]
    async fn deposit_without_api_key_is_unauthenticated() {
        let (ctx, _key) = test_context().await;
        let player = PlayerId("p-2".into());
        let body = MoneyMovementRequest { reference_id: "ref-2".into(), amount: "10.00".into(), currency: "USD".into(), metadata: None };
        let err = ctx.deposit(None, loopback(), player, body).await.unwrap_err();
        assert_eq!(err.code, ocasino_common::ErrorCode::Unauthenticated);
    }

    #[tokio::test]
    async fn rollback_reverses_a_bet() {
        let (ctx, key) = test_context().await;
        let player = PlayerId("p-3".into());
        ctx.deposit(
            Some(&key),
            loopback(),
            player.clone(),
            MoneyMovementRequest { reference_id: "dep-1".into(), amount: "100.00".into(), currency: "USD".into(), metadata: None },
        )
        .await
        .unwrap();

        ctx.bet(
            Some(&key),
            loopback(),
            player.clone(),
            BetRequest {
                reference_id: "bet-1".into(),
                amount: "30.00".into(),
                currency: "USD".into(),
                game_id: "slots-1".into(),
                round_id: None,
                metadata: None,
            },
        )
        .await
        .unwrap();

        let rolled_back = ctx
            .rollback(
                Some(&key),
                loopback(),
                player.clone(),
                RollbackRequest {
                    reference_id: "rollback-1".into(),
                    original_reference_id: "bet-1".into(),
                    reason: Some("player disconnected".into()),
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(rolled_back.balance, "100.00");
    }
}
