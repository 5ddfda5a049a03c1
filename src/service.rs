use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::database::{
    Account, LedgerDelta, LedgerStats, LedgerStore, NewTransaction, Profile, Transaction, TransactionKind,
};
use crate::error::{LedgerError, LedgerResult};
use crate::points::PointsPolicy;
use crate::public_code;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub account: Account,
    /// False when the identity was already registered.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub account: Account,
    pub amount: BigDecimal,
    pub points_earned: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionReceipt {
    pub account: Account,
    pub points_spent: i64,
    pub discount_pct: BigDecimal,
    pub balance: i64,
}

/// The only mutator of ledger state. Each public method is a single unit of
/// work against the store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    policy: PointsPolicy,
}

impl AccountService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: PointsPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &PointsPolicy {
        &self.policy
    }

    /// Returns the existing account unchanged when the identity is already
    /// registered.
    #[instrument(skip(self, profile))]
    pub fn register(&self, external_id: &str, profile: Profile) -> LedgerResult<Registration> {
        match self.store.find_by_external_id(external_id) {
            Ok(account) => return Ok(Registration { account, created: false }),
            Err(LedgerError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let bonus = NewTransaction {
            kind: TransactionKind::RegistrationBonus,
            amount: None,
            points_delta: self.policy.welcome_bonus,
            note: "registration bonus".to_string(),
        };
        match self
            .store
            .create_account(external_id, &profile, &bonus, public_code::for_account)
        {
            Ok((account, _)) => {
                info!(
                    account_id = account.account_id,
                    public_code = account.public_code.as_str(),
                    "account registered"
                );
                Ok(Registration { account, created: true })
            }
            // lost a race against a concurrent registration of the same identity
            Err(LedgerError::AlreadyExists) => self
                .store
                .find_by_external_id(external_id)
                .map(|account| Registration { account, created: false }),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(amount = %amount))]
    pub fn record_purchase_by_account(&self, account_id: i64, amount: &BigDecimal) -> LedgerResult<PurchaseReceipt> {
        let points_earned = self.policy.points_earned_for(amount)?;
        let delta = LedgerDelta {
            amount_delta: amount.clone(),
            required_balance: None,
            transaction: NewTransaction {
                kind: TransactionKind::PurchaseEarn,
                amount: Some(amount.clone()),
                points_delta: points_earned,
                note: format!("purchase of {amount}"),
            },
        };
        let (account, _) = self.store.apply_delta(account_id, &delta)?;
        info!(account_id, points_delta = points_earned, balance = account.balance, "purchase recorded");
        Ok(PurchaseReceipt {
            balance: account.balance,
            account,
            amount: amount.clone(),
            points_earned,
        })
    }

    /// Point-of-sale path. The receipt carries the account so the caller can
    /// notify its owner.
    #[instrument(skip(self), fields(amount = %amount))]
    pub fn record_purchase_by_code(&self, code: &str, amount: &BigDecimal) -> LedgerResult<PurchaseReceipt> {
        if public_code::verify(code).is_none() {
            warn!(code, "code fails checksum");
            return Err(LedgerError::NotFound);
        }
        let account = self.store.find_by_public_code(code.trim())?;
        self.record_purchase_by_account(account.account_id, amount)
    }

    #[instrument(skip(self), fields(purchase_amount = %purchase_amount))]
    pub fn redeem_points(
        &self,
        account_id: i64,
        points_requested: i64,
        purchase_amount: &BigDecimal,
    ) -> LedgerResult<RedemptionReceipt> {
        if points_requested <= 0 {
            return Err(LedgerError::InvalidPoints(format!(
                "{points_requested} is not a positive number of points"
            )));
        }
        let current = self.store.find_by_account_id(account_id)?;
        if !current.active {
            return Err(LedgerError::NotFound);
        }
        if points_requested > current.balance {
            return Err(LedgerError::InsufficientBalance {
                balance: current.balance,
                requested: points_requested,
            });
        }

        let discount = self.policy.discount_for(points_requested, purchase_amount)?;
        if discount.points == 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "{purchase_amount} is too small to discount"
            )));
        }

        let delta = LedgerDelta {
            amount_delta: BigDecimal::zero(),
            // re-checked under the account lock, the read above may be stale
            required_balance: Some(points_requested),
            transaction: NewTransaction {
                kind: TransactionKind::Redemption,
                amount: None,
                points_delta: -discount.points,
                note: format!("redeemed {} points for {}% off", discount.points, discount.percent),
            },
        };
        let (account, _) = self.store.apply_delta(account_id, &delta)?;
        info!(
            account_id,
            points_delta = -discount.points,
            balance = account.balance,
            "points redeemed"
        );
        Ok(RedemptionReceipt {
            balance: account.balance,
            account,
            points_spent: discount.points,
            discount_pct: discount.percent,
        })
    }

    /// Administrative change. Negative deltas reduce the balance but never the
    /// lifetime total.
    #[instrument(skip(self, note))]
    pub fn adjust_points(&self, account_id: i64, delta: i64, note: &str) -> LedgerResult<Account> {
        if delta == 0 {
            return Err(LedgerError::InvalidPoints("adjustment must not be zero".into()));
        }
        let delta = LedgerDelta {
            amount_delta: BigDecimal::zero(),
            required_balance: None,
            transaction: NewTransaction {
                kind: TransactionKind::ManualAdjustment,
                amount: None,
                points_delta: delta,
                note: note.to_string(),
            },
        };
        let (account, _) = self.store.apply_delta(account_id, &delta)?;
        info!(account_id, points_delta = delta.points_delta(), balance = account.balance, "points adjusted");
        Ok(account)
    }

    pub fn grant_birthday_bonus(&self, account_id: i64) -> LedgerResult<Account> {
        self.adjust_points(account_id, self.policy.birthday_bonus, "birthday bonus")
    }

    #[instrument(skip(self))]
    pub fn deactivate(&self, account_id: i64) -> LedgerResult<Account> {
        let account = self.store.set_active(account_id, false)?;
        warn!(account_id, "account deactivated");
        Ok(account)
    }

    pub fn account_for(&self, external_id: &str) -> LedgerResult<Account> {
        self.store.find_by_external_id(external_id)
    }

    pub fn account_by_code(&self, code: &str) -> LedgerResult<Account> {
        self.store.find_by_public_code(code.trim())
    }

    pub fn account_by_id(&self, account_id: i64) -> LedgerResult<Account> {
        self.store.find_by_account_id(account_id)
    }

    pub fn history(&self, account_id: i64, limit: i64) -> LedgerResult<Vec<Transaction>> {
        self.store.list_transactions(account_id, limit)
    }

    pub fn list_accounts(&self, limit: i64, offset: i64) -> LedgerResult<(Vec<Account>, i64)> {
        self.store.list_accounts(limit, offset)
    }

    pub fn stats(&self) -> LedgerResult<LedgerStats> {
        self.store.aggregate_stats()
    }

    pub fn ping(&self) -> LedgerResult<()> {
        self.store.ping()
    }

    /// Discount the current balance could buy, for display.
    pub fn available_discount(&self, account: &Account) -> BigDecimal {
        self.policy.percent_for(account.balance)
    }
}
