use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;

use crate::error::LedgerError;

/// Owner-editable details collected during registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub contact: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub account_id: i64,
    pub external_id: String,
    pub profile: Profile,
    pub public_code: String,
    pub lifetime_spend: BigDecimal,
    pub lifetime_points: i64,
    pub balance: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    RegistrationBonus,
    PurchaseEarn,
    Redemption,
    ManualAdjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::RegistrationBonus => "registration-bonus",
            TransactionKind::PurchaseEarn => "purchase-earn",
            TransactionKind::Redemption => "redemption",
            TransactionKind::ManualAdjustment => "manual-adjustment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration-bonus" => Ok(TransactionKind::RegistrationBonus),
            "purchase-earn" => Ok(TransactionKind::PurchaseEarn),
            "redemption" => Ok(TransactionKind::Redemption),
            "manual-adjustment" => Ok(TransactionKind::ManualAdjustment),
            other => Err(LedgerError::storage(anyhow::anyhow!("unknown transaction kind {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub transaction_id: i64,
    pub account_id: i64,
    pub kind: TransactionKind,
    pub amount: Option<BigDecimal>,
    pub points_delta: i64,
    pub note: String,
    pub created_at: NaiveDateTime,
}

/// A transaction row before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Option<BigDecimal>,
    pub points_delta: i64,
    pub note: String,
}

/// One balance mutation together with the log entry that records it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerDelta {
    pub amount_delta: BigDecimal,
    /// Balance the account must hold before the delta applies; checked under
    /// the same lock as the write.
    pub required_balance: Option<i64>,
    pub transaction: NewTransaction,
}

impl LedgerDelta {
    pub fn points_delta(&self) -> i64 {
        self.transaction.points_delta
    }

    /// Only positive deltas count toward lifetime points.
    pub fn lifetime_points_delta(&self) -> i64 {
        self.transaction.points_delta.max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub accounts: i64,
    pub total_spend: BigDecimal,
    pub total_balance: i64,
    pub average_spend: BigDecimal,
}

#[derive(Queryable)]
pub struct AccountRow {
    pub account_id: i64,
    pub external_id: String,
    pub display_name: Option<String>,
    pub contact: Option<String>,
    pub category: Option<String>,
    pub public_code: Option<String>,
    pub lifetime_spend: BigDecimal,
    pub lifetime_points: i64,
    pub balance: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let public_code = row
            .public_code
            .unwrap_or_else(|| crate::public_code::for_account(row.account_id));
        Account {
            account_id: row.account_id,
            external_id: row.external_id,
            profile: Profile {
                display_name: row.display_name,
                contact: row.contact,
                category: row.category,
            },
            public_code,
            lifetime_spend: row.lifetime_spend,
            lifetime_points: row.lifetime_points,
            balance: row.balance,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::account)]
pub struct NewAccountRow<'a> {
    pub external_id: &'a str,
    pub display_name: Option<&'a str>,
    pub contact: Option<&'a str>,
    pub category: Option<&'a str>,
    pub lifetime_spend: BigDecimal,
    pub lifetime_points: i64,
    pub balance: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Queryable)]
pub struct TransactionRow {
    pub transaction_id: i64,
    pub account_id: i64,
    pub kind: String,
    pub amount: Option<BigDecimal>,
    pub points_delta: i64,
    pub note: String,
    pub created_at: NaiveDateTime,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            transaction_id: row.transaction_id,
            account_id: row.account_id,
            kind: row.kind.parse()?,
            amount: row.amount,
            points_delta: row.points_delta,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::points_transaction)]
pub struct NewTransactionRow<'a> {
    pub account_id: i64,
    pub kind: &'a str,
    pub amount: Option<BigDecimal>,
    pub points_delta: i64,
    pub note: &'a str,
    pub created_at: NaiveDateTime,
}
