use std::ops::DerefMut;

use crate::database::connect::DbPool;
use crate::database::models::{Account, LedgerDelta, LedgerStats, NewTransaction, Profile, Transaction};
use crate::database::{mutations, queries, LedgerStore};
use crate::error::LedgerResult;

/// Ledger backed by Postgres through an r2d2 pool. Each call checks out its
/// own connection.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl LedgerStore for PgLedgerStore {
    fn create_account(
        &self,
        external_id: &str,
        profile: &Profile,
        initial: &NewTransaction,
        code_for: fn(i64) -> String,
    ) -> LedgerResult<(Account, Transaction)> {
        let mut conn = self.pool.get()?;
        mutations::create_account(conn.deref_mut(), external_id, profile, initial, code_for)
    }

    fn find_by_external_id(&self, external_id: &str) -> LedgerResult<Account> {
        let mut conn = self.pool.get()?;
        queries::find_by_external_id(conn.deref_mut(), external_id)
    }

    fn find_by_public_code(&self, public_code: &str) -> LedgerResult<Account> {
        let mut conn = self.pool.get()?;
        queries::find_by_public_code(conn.deref_mut(), public_code)
    }

    fn find_by_account_id(&self, account_id: i64) -> LedgerResult<Account> {
        let mut conn = self.pool.get()?;
        queries::find_by_account_id(conn.deref_mut(), account_id)
    }

    fn apply_delta(&self, account_id: i64, delta: &LedgerDelta) -> LedgerResult<(Account, Transaction)> {
        let mut conn = self.pool.get()?;
        mutations::apply_delta(conn.deref_mut(), account_id, delta)
    }

    fn set_active(&self, account_id: i64, active: bool) -> LedgerResult<Account> {
        let mut conn = self.pool.get()?;
        mutations::set_active(conn.deref_mut(), account_id, active)
    }

    fn list_transactions(&self, account_id: i64, limit: i64) -> LedgerResult<Vec<Transaction>> {
        let mut conn = self.pool.get()?;
        queries::list_transactions(conn.deref_mut(), account_id, limit)
    }

    fn list_accounts(&self, limit: i64, offset: i64) -> LedgerResult<(Vec<Account>, i64)> {
        let mut conn = self.pool.get()?;
        queries::list_accounts(conn.deref_mut(), limit, offset)
    }

    fn aggregate_stats(&self) -> LedgerResult<LedgerStats> {
        let mut conn = self.pool.get()?;
        queries::aggregate_stats(conn.deref_mut())
    }

    fn ping(&self) -> LedgerResult<()> {
        let mut conn = self.pool.get()?;
        queries::ping(conn.deref_mut())
    }
}
