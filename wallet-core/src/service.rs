//! Wallet ledger service
//!
//! The only component allowed to mutate balances. Every credit/debit
//! attempt, successful or rejected, appends exactly one ledger transaction,
//! so the audit trail is complete even for operations that never moved
//! money.
//!
//! Concurrency: the read-check-write of every mutation (debit sufficiency,
//! credit idempotency) runs under a per-(user, pool) mutex from
//! [`KeyedLocks`]. Unrelated users and pools never contend.

use crate::{
    audit::{AuditSource, AuditWriter},
    locks::KeyedLocks,
    storage::Storage,
    types::{
        Balance, CreditPool, LedgerTransaction, Operation, TxOutcome, TxSource, UserId, Wallet,
    },
    Error, Result,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Wallet ledger service handle.
///
/// Constructed once at process start around the storage handle and injected
/// into every component that needs balance access; there is no global
/// wallet state.
#[derive(Debug)]
pub struct WalletLedger {
    storage: Arc<Storage>,
    audit: Arc<AuditWriter>,
    locks: KeyedLocks<(UserId, CreditPool)>,
}

impl WalletLedger {
    /// Create the ledger service
    pub fn new(storage: Arc<Storage>, audit: Arc<AuditWriter>) -> Self {
        Self {
            storage,
            audit,
            locks: KeyedLocks::new(),
        }
    }

    /// Shared storage handle, for collaborators that read ledger state
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Shared audit writer
    pub fn audit(&self) -> &Arc<AuditWriter> {
        &self.audit
    }

    /// Balance for a (user, pool). Creates a zeroed wallet on first access.
    pub async fn balance(&self, user_id: &UserId, pool: CreditPool) -> Result<Balance> {
        let wallet = self.load_or_create(user_id)?;
        Ok(wallet.balance(pool).clone())
    }

    /// Full wallet for a user, all four pools
    pub async fn all_balances(&self, user_id: &UserId) -> Result<Wallet> {
        self.load_or_create(user_id)
    }

    /// Read-only sufficiency check
    pub async fn has_sufficient_funds(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        amount: Decimal,
    ) -> Result<bool> {
        let wallet = self.load_or_create(user_id)?;
        Ok(wallet.balance(pool).amount >= amount)
    }

    /// Increase a pool balance.
    ///
    /// Fails with `InvalidAmount` for non-positive amounts and with
    /// `DuplicateEvent` when `external_id` has already been applied. Both
    /// rejections still append an Error-outcome ledger transaction.
    pub async fn credit(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        amount: Decimal,
        external_id: Option<&str>,
        source: TxSource,
        description: &str,
    ) -> Result<Balance> {
        let _guard = self.locks.acquire((user_id.clone(), pool)).await;
        let mut wallet = self.load_or_create(user_id)?;
        let current = wallet.balance(pool).amount;

        if amount <= Decimal::ZERO {
            let err = Error::InvalidAmount(amount);
            self.record_rejected(
                user_id, pool, Operation::Add, amount, current, external_id, source, &err,
                description,
            )?;
            return Err(err);
        }

        if let Some(ext) = external_id {
            if self.storage.is_event_applied(ext)? {
                let err = Error::DuplicateEvent(ext.to_string());
                self.record_rejected(
                    user_id, pool, Operation::Add, amount, current, external_id, source, &err,
                    description,
                )?;
                return Err(err);
            }
        }

        let balance = wallet.balance_mut(pool);
        let timestamp = next_timestamp(balance.updated_at);
        balance.amount += amount;
        balance.updated_at = timestamp;
        let new_balance = balance.clone();

        let tx = LedgerTransaction {
            id: Uuid::now_v7(),
            timestamp,
            user_id: user_id.clone(),
            operation: Operation::Add,
            pool,
            amount,
            resulting_balance: new_balance.amount,
            external_id: external_id.map(String::from),
            source,
            outcome: TxOutcome::Success,
            error: None,
            description: description.to_string(),
        };

        self.storage.commit_transaction(Some(&wallet), &tx)?;
        self.append_audit(&tx)?;

        tracing::info!(
            user_id = %user_id,
            pool = %pool,
            amount = %amount,
            new_balance = %new_balance.amount,
            source = source.as_str(),
            "Credits added"
        );

        Ok(new_balance)
    }

    /// Decrease a pool balance.
    ///
    /// The sufficiency check and the write happen inside the same critical
    /// section, so two concurrent debits cannot both observe a sufficient
    /// balance. As with [`credit`](Self::credit), an `external_id` that has
    /// already been applied fails with `DuplicateEvent` and the marker is
    /// committed in the same batch as the mutation.
    pub async fn debit(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        amount: Decimal,
        external_id: Option<&str>,
        source: TxSource,
        reason: &str,
    ) -> Result<Balance> {
        let _guard = self.locks.acquire((user_id.clone(), pool)).await;
        let mut wallet = self.load_or_create(user_id)?;
        let current = wallet.balance(pool).amount;

        if amount <= Decimal::ZERO {
            let err = Error::InvalidAmount(amount);
            self.record_rejected(
                user_id, pool, Operation::Deduct, amount, current, external_id, source, &err,
                reason,
            )?;
            return Err(err);
        }

        if let Some(ext) = external_id {
            if self.storage.is_event_applied(ext)? {
                let err = Error::DuplicateEvent(ext.to_string());
                self.record_rejected(
                    user_id, pool, Operation::Deduct, amount, current, external_id, source, &err,
                    reason,
                )?;
                return Err(err);
            }
        }

        if current < amount {
            let err = Error::InsufficientFunds {
                pool,
                available: current,
                required: amount,
            };
            self.record_rejected(
                user_id, pool, Operation::Deduct, amount, current, external_id, source, &err,
                reason,
            )?;
            return Err(err);
        }

        let balance = wallet.balance_mut(pool);
        let timestamp = next_timestamp(balance.updated_at);
        balance.amount -= amount;
        balance.updated_at = timestamp;
        let new_balance = balance.clone();

        let tx = LedgerTransaction {
            id: Uuid::now_v7(),
            timestamp,
            user_id: user_id.clone(),
            operation: Operation::Deduct,
            pool,
            amount,
            resulting_balance: new_balance.amount,
            external_id: external_id.map(String::from),
            source,
            outcome: TxOutcome::Success,
            error: None,
            description: reason.to_string(),
        };

        self.storage.commit_transaction(Some(&wallet), &tx)?;
        self.append_audit(&tx)?;

        tracing::info!(
            user_id = %user_id,
            pool = %pool,
            amount = %amount,
            new_balance = %new_balance.amount,
            source = source.as_str(),
            "Credits deducted"
        );

        Ok(new_balance)
    }

    /// Transaction history for a (user, pool), in append order
    pub async fn transactions(
        &self,
        user_id: &UserId,
        pool: CreditPool,
    ) -> Result<Vec<LedgerTransaction>> {
        self.storage.transactions_for(user_id, pool)
    }

    /// Fold the Success transactions for a (user, pool) over a zero
    /// starting balance. Must equal the stored balance at all times.
    pub async fn reconstruct_balance(
        &self,
        user_id: &UserId,
        pool: CreditPool,
    ) -> Result<Decimal> {
        let txs = self.storage.transactions_for(user_id, pool)?;
        Ok(txs
            .iter()
            .filter(|tx| tx.outcome == TxOutcome::Success)
            .fold(Decimal::ZERO, |acc, tx| match tx.operation {
                Operation::Add => acc + tx.amount,
                Operation::Deduct => acc - tx.amount,
            }))
    }

    fn load_or_create(&self, user_id: &UserId) -> Result<Wallet> {
        match self.storage.get_wallet(user_id)? {
            Some(wallet) => Ok(wallet),
            None => {
                let wallet = Wallet::new(user_id.clone());
                self.storage.put_wallet(&wallet)?;
                tracing::debug!(user_id = %user_id, "Wallet created");
                Ok(wallet)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_rejected(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        operation: Operation,
        amount: Decimal,
        current_balance: Decimal,
        external_id: Option<&str>,
        source: TxSource,
        error: &Error,
        description: &str,
    ) -> Result<()> {
        let tx = LedgerTransaction {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            user_id: user_id.clone(),
            operation,
            pool,
            amount,
            resulting_balance: current_balance,
            external_id: external_id.map(String::from),
            source,
            outcome: TxOutcome::Error,
            error: Some(error.to_string()),
            description: description.to_string(),
        };

        self.storage.commit_transaction(None, &tx)?;
        self.append_audit(&tx)?;

        tracing::warn!(
            user_id = %user_id,
            pool = %pool,
            amount = %amount,
            error = %error,
            "Ledger operation rejected"
        );

        Ok(())
    }

    fn append_audit(&self, tx: &LedgerTransaction) -> Result<()> {
        self.audit.append(
            AuditSource::WalletLedger,
            json!({
                "timestamp": tx.timestamp.to_rfc3339(),
                "transaction_id": tx.id,
                "user_id": tx.user_id.as_str(),
                "operation": match tx.operation {
                    Operation::Add => "add",
                    Operation::Deduct => "deduct",
                },
                "pool": tx.pool.as_str(),
                "amount": tx.amount.to_string(),
                "resulting_balance": tx.resulting_balance.to_string(),
                "external_id": tx.external_id,
                "source": tx.source.as_str(),
                "status": match tx.outcome {
                    TxOutcome::Success => "success",
                    TxOutcome::Error => "error",
                },
                "error": tx.error,
                "description": tx.description,
            }),
        )
    }
}

/// Next mutation timestamp: strictly after the previous one even when the
/// wall clock stalls or regresses.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_ledger() -> (WalletLedger, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = crate::Config {
            data_dir: temp.path().join("db"),
            audit_log_dir: temp.path().join("audit"),
            ..Default::default()
        };
        let storage = Arc::new(Storage::open(&config).unwrap());
        let audit = Arc::new(AuditWriter::new(&config.audit_log_dir).unwrap());
        (WalletLedger::new(storage, audit), temp)
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_balance_creates_zeroed_wallet() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        let balance = ledger.balance(&user, CreditPool::Internal).await.unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
        assert_eq!(balance.currency, CreditPool::Internal.currency());
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        let balance = ledger
            .credit(&user, CreditPool::FacebookAds, dec("50.00"), None, TxSource::Manual, "top up")
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("50.00"));

        let balance = ledger
            .debit(&user, CreditPool::FacebookAds, dec("30.00"), None, TxSource::FundingAdapter, "funding")
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("20.00"));
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected_and_audited() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        let result = ledger
            .credit(&user, CreditPool::Internal, Decimal::ZERO, None, TxSource::Manual, "noop")
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));

        // Rejection still writes exactly one transaction
        let txs = ledger.transactions(&user, CreditPool::Internal).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].outcome, TxOutcome::Error);
        assert_eq!(
            ledger.balance(&user, CreditPool::Internal).await.unwrap().amount,
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_no_mutation() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        ledger
            .credit(&user, CreditPool::GoogleAds, dec("10.00"), None, TxSource::Manual, "seed")
            .await
            .unwrap();

        let result = ledger
            .debit(&user, CreditPool::GoogleAds, dec("25.00"), None, TxSource::FundingAdapter, "funding")
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        let balance = ledger.balance(&user, CreditPool::GoogleAds).await.unwrap();
        assert_eq!(balance.amount, dec("10.00"));
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        ledger
            .credit(
                &user,
                CreditPool::Internal,
                dec("100.00"),
                Some("evt_123"),
                TxSource::Webhook,
                "payment",
            )
            .await
            .unwrap();

        let result = ledger
            .credit(
                &user,
                CreditPool::Internal,
                dec("100.00"),
                Some("evt_123"),
                TxSource::Webhook,
                "payment replay",
            )
            .await;
        assert!(matches!(result, Err(Error::DuplicateEvent(_))));

        // Exactly one balance mutation
        let balance = ledger.balance(&user, CreditPool::Internal).await.unwrap();
        assert_eq!(balance.amount, dec("100.00"));
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected_on_debit() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        ledger
            .credit(&user, CreditPool::Internal, dec("100.00"), None, TxSource::Manual, "seed")
            .await
            .unwrap();
        ledger
            .debit(
                &user,
                CreditPool::Internal,
                dec("40.00"),
                Some("evt_refund_1"),
                TxSource::Refund,
                "refund",
            )
            .await
            .unwrap();
        assert!(ledger.storage().is_event_applied("evt_refund_1").unwrap());

        let result = ledger
            .debit(
                &user,
                CreditPool::Internal,
                dec("40.00"),
                Some("evt_refund_1"),
                TxSource::Refund,
                "refund replay",
            )
            .await;
        assert!(matches!(result, Err(Error::DuplicateEvent(_))));

        // Exactly one debit went through
        let balance = ledger.balance(&user, CreditPool::Internal).await.unwrap();
        assert_eq!(balance.amount, dec("60.00"));
    }

    #[tokio::test]
    async fn test_updated_at_strictly_increases() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");

        let first = ledger
            .credit(&user, CreditPool::Internal, dec("1.00"), None, TxSource::Manual, "a")
            .await
            .unwrap();
        let second = ledger
            .credit(&user, CreditPool::Internal, dec("1.00"), None, TxSource::Manual, "b")
            .await
            .unwrap();
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_concurrent_debits_cannot_overdraw() {
        let (ledger, _temp) = test_ledger();
        let ledger = Arc::new(ledger);
        let user = UserId::new("user_1");

        ledger
            .credit(&user, CreditPool::Internal, dec("100.00"), None, TxSource::Manual, "seed")
            .await
            .unwrap();

        // Two debits of 70 against a balance of 100: exactly one must win
        let mut handles = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .debit(&user, CreditPool::Internal, dec("70.00"), None, TxSource::FundingAdapter, "race")
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);

        let balance = ledger.balance(&user, CreditPool::Internal).await.unwrap();
        assert_eq!(balance.amount, dec("30.00"));
    }

    #[tokio::test]
    async fn test_reconstruction_matches_stored_balance() {
        let (ledger, _temp) = test_ledger();
        let user = UserId::new("user_1");
        let pool = CreditPool::LlmProvider;

        ledger
            .credit(&user, pool, dec("40.00"), None, TxSource::Manual, "a")
            .await
            .unwrap();
        ledger
            .debit(&user, pool, dec("15.50"), None, TxSource::Manual, "b")
            .await
            .unwrap();
        // Rejected operation must not affect the fold
        let _ = ledger.debit(&user, pool, dec("99.00"), None, TxSource::Manual, "c").await;
        ledger
            .credit(&user, pool, dec("5.25"), None, TxSource::Manual, "d")
            .await
            .unwrap();

        let stored = ledger.balance(&user, pool).await.unwrap().amount;
        let folded = ledger.reconstruct_balance(&user, pool).await.unwrap();
        assert_eq!(stored, folded);
        assert_eq!(stored, dec("29.75"));
    }
}
