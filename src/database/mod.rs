use crate::error::LedgerResult;

pub mod connect;
pub mod memory;
pub mod models;
pub mod mutations;
pub mod postgres;
pub mod queries;

pub use memory::MemoryLedgerStore;
pub use models::{Account, LedgerDelta, LedgerStats, NewTransaction, Profile, Transaction, TransactionKind};
pub use postgres::PgLedgerStore;

/// Durable account and transaction records. Implementations hold no loyalty
/// rules; every method is one all-or-nothing unit of work.
pub trait LedgerStore: Send + Sync {
    /// Inserts the account, assigns its public code via `code_for` and
    /// appends `initial` as its first transaction.
    fn create_account(
        &self,
        external_id: &str,
        profile: &Profile,
        initial: &NewTransaction,
        code_for: fn(i64) -> String,
    ) -> LedgerResult<(Account, Transaction)>;

    fn find_by_external_id(&self, external_id: &str) -> LedgerResult<Account>;

    fn find_by_public_code(&self, public_code: &str) -> LedgerResult<Account>;

    /// Administrative lookup, inactive accounts included.
    fn find_by_account_id(&self, account_id: i64) -> LedgerResult<Account>;

    /// Adjusts the balance, lifetime totals and appends the transaction under
    /// one lock on the account.
    fn apply_delta(&self, account_id: i64, delta: &LedgerDelta) -> LedgerResult<(Account, Transaction)>;

    fn set_active(&self, account_id: i64, active: bool) -> LedgerResult<Account>;

    /// Most recent first.
    fn list_transactions(&self, account_id: i64, limit: i64) -> LedgerResult<Vec<Transaction>>;

    /// Active accounts, newest first, with the total active count.
    fn list_accounts(&self, limit: i64, offset: i64) -> LedgerResult<(Vec<Account>, i64)>;

    fn aggregate_stats(&self) -> LedgerResult<LedgerStats>;

    fn ping(&self) -> LedgerResult<()>;
}
