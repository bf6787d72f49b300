//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `wallets` - Current wallet per user (key: user_id)
//! - `transactions` - Append-only ledger transactions (key: transaction id, UUIDv7)
//! - `tx_index` - Secondary index user || pool || transaction id
//! - `webhook_events` - Processed-event records (key: external event id)
//! - `applied_events` - Idempotency markers (key: external id, value: transaction id)
//! - `processor_confirmations` - Applied-event lookup by processor transaction ref
//! - `intents` - Payment intents awaiting confirmation (key: intent id)
//!
//! Wallet write, transaction append, index entry and idempotency marker are
//! committed in one `WriteBatch`, so a mutation is either fully durable or
//! absent.

use crate::{
    error::{Error, Result},
    types::{CreditPool, LedgerTransaction, PaymentIntentRecord, UserId, Wallet, WebhookEventRecord},
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use uuid::Uuid;

const CF_WALLETS: &str = "wallets";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TX_INDEX: &str = "tx_index";
const CF_WEBHOOK_EVENTS: &str = "webhook_events";
const CF_APPLIED_EVENTS: &str = "applied_events";
const CF_PROCESSOR_CONFIRMATIONS: &str = "processor_confirmations";
const CF_INTENTS: &str = "intents";

const ALL_CFS: [&str; 7] = [
    CF_WALLETS,
    CF_TRANSACTIONS,
    CF_TX_INDEX,
    CF_WEBHOOK_EVENTS,
    CF_APPLIED_EVENTS,
    CF_PROCESSOR_CONFIRMATIONS,
    CF_INTENTS,
];

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened wallet store");

        Ok(Self { db })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Wallet operations

    /// Get wallet for a user, if one exists
    pub fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        match self.db.get_cf(cf, user_id.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Persist a wallet without a transaction (lazy creation only)
    pub fn put_wallet(&self, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let value = bincode::serialize(wallet)?;
        self.db.put_cf(cf, wallet.user_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    // Ledger transaction operations

    /// Commit a ledger transaction, atomically with the wallet state it
    /// produced.
    ///
    /// `wallet` is `None` for rejected operations, which append a
    /// transaction without touching any balance. A Success transaction with
    /// an external id also writes the idempotency marker in the same batch.
    pub fn commit_transaction(
        &self,
        wallet: Option<&Wallet>,
        tx: &LedgerTransaction,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        if let Some(wallet) = wallet {
            let cf_wallets = self.cf_handle(CF_WALLETS)?;
            batch.put_cf(
                cf_wallets,
                wallet.user_id.as_str().as_bytes(),
                bincode::serialize(wallet)?,
            );
        }

        let cf_txs = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(cf_txs, tx.id.as_bytes(), bincode::serialize(tx)?);

        let cf_index = self.cf_handle(CF_TX_INDEX)?;
        batch.put_cf(cf_index, Self::index_key(&tx.user_id, tx.pool, Some(tx.id)), []);

        if wallet.is_some() {
            if let Some(ref external_id) = tx.external_id {
                let cf_applied = self.cf_handle(CF_APPLIED_EVENTS)?;
                batch.put_cf(cf_applied, external_id.as_bytes(), tx.id.as_bytes());
            }
        }

        self.db.write(batch)?;

        tracing::debug!(
            tx_id = %tx.id,
            user_id = %tx.user_id,
            pool = %tx.pool,
            "Ledger transaction committed"
        );

        Ok(())
    }

    /// Get transaction by id
    pub fn get_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// All transactions for a (user, pool), in append order
    pub fn transactions_for(
        &self,
        user_id: &UserId,
        pool: CreditPool,
    ) -> Result<Vec<LedgerTransaction>> {
        self.scan_transactions(Self::index_key(user_id, pool, None))
    }

    /// All transactions for a user across pools, in append order per pool
    pub fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerTransaction>> {
        let mut prefix = user_id.as_str().as_bytes().to_vec();
        prefix.push(0);
        self.scan_transactions(prefix)
    }

    fn scan_transactions(&self, prefix: Vec<u8>) -> Result<Vec<LedgerTransaction>> {
        let cf_index = self.cf_handle(CF_TX_INDEX)?;
        let iter = self
            .db
            .iterator_cf(cf_index, IteratorMode::From(&prefix, Direction::Forward));

        let mut txs = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Transaction id is the trailing 16 bytes of the index key
            if key.len() >= 16 {
                let id_bytes: [u8; 16] = key[key.len() - 16..]
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed index key".to_string()))?;
                if let Some(tx) = self.get_transaction(Uuid::from_bytes(id_bytes))? {
                    txs.push(tx);
                }
            }
        }
        Ok(txs)
    }

    // Idempotency markers

    /// Has this external event/transaction id already produced a mutation?
    pub fn is_event_applied(&self, external_id: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_APPLIED_EVENTS)?;
        Ok(self.db.get_cf(cf, external_id.as_bytes())?.is_some())
    }

    /// Ledger transaction an external id was applied as, if any
    pub fn applied_transaction(&self, external_id: &str) -> Result<Option<Uuid>> {
        let cf = self.cf_handle(CF_APPLIED_EVENTS)?;
        match self.db.get_cf(cf, external_id.as_bytes())? {
            Some(value) => {
                let id_bytes: [u8; 16] = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed applied-event marker".to_string()))?;
                Ok(Some(Uuid::from_bytes(id_bytes)))
            }
            None => Ok(None),
        }
    }

    // Webhook event records

    /// Persist a processed-event record.
    ///
    /// `confirms_charge` additionally writes the confirmation lookup entry
    /// used by the webhook-confirmation gate, in the same batch. Only
    /// records of a successful charge mutation may set it; refund and
    /// failure records must not, since they are no evidence the charge went
    /// through. The caller passes it for Deduplicated records too: the
    /// mutation happened even though the original record write was lost.
    pub fn put_webhook_record(
        &self,
        record: &WebhookEventRecord,
        confirms_charge: bool,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_events = self.cf_handle(CF_WEBHOOK_EVENTS)?;
        batch.put_cf(cf_events, record.event_id.as_bytes(), bincode::serialize(record)?);

        if confirms_charge && record.ledger_transaction_id.is_some() {
            if let Some(ref tx_ref) = record.transaction_ref {
                let cf_confirm = self.cf_handle(CF_PROCESSOR_CONFIRMATIONS)?;
                batch.put_cf(cf_confirm, tx_ref.as_bytes(), record.event_id.as_bytes());
            }
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Get processed-event record by external event id
    pub fn get_webhook_record(&self, event_id: &str) -> Result<Option<WebhookEventRecord>> {
        let cf = self.cf_handle(CF_WEBHOOK_EVENTS)?;
        match self.db.get_cf(cf, event_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Has an applied payment been recorded for this processor transaction
    /// reference?
    pub fn has_processor_confirmation(&self, tx_ref: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_PROCESSOR_CONFIRMATIONS)?;
        Ok(self.db.get_cf(cf, tx_ref.as_bytes())?.is_some())
    }

    // Payment intents

    /// Persist a payment intent record
    pub fn put_intent(&self, intent: &PaymentIntentRecord) -> Result<()> {
        let cf = self.cf_handle(CF_INTENTS)?;
        self.db
            .put_cf(cf, intent.intent_id.as_bytes(), bincode::serialize(intent)?)?;
        Ok(())
    }

    /// Get a payment intent record
    pub fn get_intent(&self, intent_id: &str) -> Result<Option<PaymentIntentRecord>> {
        let cf = self.cf_handle(CF_INTENTS)?;
        match self.db.get_cf(cf, intent_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn index_key(user_id: &UserId, pool: CreditPool, tx_id: Option<Uuid>) -> Vec<u8> {
        let mut key = user_id.as_str().as_bytes().to_vec();
        key.push(0); // Separator: user ids never contain NUL
        key.push(pool as u8);
        if let Some(id) = tx_id {
            key.extend_from_slice(id.as_bytes());
        }
        key
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
