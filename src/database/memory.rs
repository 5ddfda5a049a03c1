use std::sync::{Mutex, MutexGuard, PoisonError};

use bigdecimal::{BigDecimal, Zero};

use crate::database::models::{Account, LedgerDelta, LedgerStats, NewTransaction, Profile, Transaction};
use crate::database::LedgerStore;
use crate::error::{LedgerError, LedgerResult};

#[derive(Default)]
struct Ledger {
    // index is account_id - 1
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
}

impl Ledger {
    fn append(&mut self, account_id: i64, tx: &NewTransaction) -> Transaction {
        let logged = Transaction {
            transaction_id: self.transactions.len() as i64 + 1,
            account_id,
            kind: tx.kind,
            amount: tx.amount.clone(),
            points_delta: tx.points_delta,
            note: tx.note.clone(),
            created_at: chrono::Utc::now().naive_utc(),
        };
        self.transactions.push(logged.clone());
        logged
    }

    fn account_mut(&mut self, account_id: i64) -> LedgerResult<&mut Account> {
        usize::try_from(account_id - 1)
            .ok()
            .and_then(|idx| self.accounts.get_mut(idx))
            .ok_or(LedgerError::NotFound)
    }

    fn active(&self) -> impl DoubleEndedIterator<Item = &Account> {
        self.accounts.iter().filter(|a| a.active)
    }
}

/// In-process ledger with the same contract as the Postgres store. A single
/// mutex serializes every unit of work.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Ledger>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn create_account(
        &self,
        external_id: &str,
        profile: &Profile,
        initial: &NewTransaction,
        code_for: fn(i64) -> String,
    ) -> LedgerResult<(Account, Transaction)> {
        if initial.points_delta < 0 {
            return Err(LedgerError::InvalidPoints("opening balance must not be negative".into()));
        }
        let mut ledger = self.lock();
        if ledger.active().any(|a| a.external_id == external_id) {
            return Err(LedgerError::AlreadyExists);
        }

        let account_id = ledger.accounts.len() as i64 + 1;
        let account = Account {
            account_id,
            external_id: external_id.to_string(),
            profile: profile.clone(),
            public_code: code_for(account_id),
            lifetime_spend: BigDecimal::zero(),
            lifetime_points: initial.points_delta,
            balance: initial.points_delta,
            active: true,
            created_at: chrono::Utc::now().naive_utc(),
        };
        ledger.accounts.push(account.clone());
        let opening = ledger.append(account_id, initial);
        Ok((account, opening))
    }

    fn find_by_external_id(&self, external_id: &str) -> LedgerResult<Account> {
        self.lock()
            .active()
            .find(|a| a.external_id == external_id)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn find_by_public_code(&self, public_code: &str) -> LedgerResult<Account> {
        self.lock()
            .active()
            .find(|a| a.public_code == public_code)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn find_by_account_id(&self, account_id: i64) -> LedgerResult<Account> {
        self.lock().account_mut(account_id).map(|a| a.clone())
    }

    fn apply_delta(&self, account_id: i64, delta: &LedgerDelta) -> LedgerResult<(Account, Transaction)> {
        let mut ledger = self.lock();
        let account = ledger.account_mut(account_id)?;
        if !account.active {
            return Err(LedgerError::NotFound);
        }
        if let Some(required) = delta.required_balance {
            if account.balance < required {
                return Err(LedgerError::InsufficientBalance {
                    balance: account.balance,
                    requested: required,
                });
            }
        }
        let balance_after = account.balance + delta.points_delta();
        if balance_after < 0 {
            return Err(LedgerError::InsufficientBalance {
                balance: account.balance,
                requested: -delta.points_delta(),
            });
        }

        account.balance = balance_after;
        account.lifetime_points += delta.lifetime_points_delta();
        account.lifetime_spend += delta.amount_delta.clone();
        let updated = account.clone();
        let logged = ledger.append(account_id, &delta.transaction);
        Ok((updated, logged))
    }

    fn set_active(&self, account_id: i64, active: bool) -> LedgerResult<Account> {
        let mut ledger = self.lock();
        let account = ledger.account_mut(account_id)?;
        account.active = active;
        Ok(account.clone())
    }

    fn list_transactions(&self, account_id: i64, limit: i64) -> LedgerResult<Vec<Transaction>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn list_accounts(&self, limit: i64, offset: i64) -> LedgerResult<(Vec<Account>, i64)> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let offset = usize::try_from(offset).unwrap_or(0);
        let ledger = self.lock();
        let page = ledger.active().rev().skip(offset).take(limit).cloned().collect();
        Ok((page, ledger.active().count() as i64))
    }

    fn aggregate_stats(&self) -> LedgerResult<LedgerStats> {
        let ledger = self.lock();
        let accounts = ledger.active().count() as i64;
        let total_spend = ledger
            .active()
            .fold(BigDecimal::zero(), |acc, a| acc + a.lifetime_spend.clone());
        let total_balance = ledger.active().map(|a| a.balance).sum();
        let average_spend = if accounts == 0 {
            BigDecimal::zero()
        } else {
            (total_spend.clone() / BigDecimal::from(accounts)).with_scale(2)
        };
        Ok(LedgerStats {
            accounts,
            total_spend,
            total_balance,
            average_spend,
        })
    }

    fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}
