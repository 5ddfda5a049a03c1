//! Wire messages of the read API. They encode as protobuf and serialize as
//! camelCase JSON from the same definitions.

use prost_wkt_types::Timestamp;
use serde::{Deserialize, Serialize};

use crate::database::{Account, Transaction};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    #[prost(int64, tag = "1")]
    pub transaction_id: i64,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(int64, tag = "3")]
    pub points_delta: i64,
    /// Empty when the entry moved no money.
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub amount: String,
    #[prost(string, tag = "5")]
    #[serde(default)]
    pub note: String,
    #[prost(message, optional, tag = "6")]
    pub created_at: Option<Timestamp>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceData {
    #[prost(string, tag = "1")]
    pub public_code: String,
    #[prost(int64, tag = "2")]
    pub balance: i64,
    #[prost(int64, tag = "3")]
    pub lifetime_points: i64,
    #[prost(string, tag = "4")]
    pub lifetime_spend: String,
    #[prost(string, tag = "5")]
    pub discount_pct: String,
    #[prost(message, repeated, tag = "6")]
    #[serde(default)]
    pub recent: Vec<TransactionEntry>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct NotFoundError {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct InternalError {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct BadParameterError {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[prost(oneof = "error::OneError", tags = "1, 2, 3")]
    pub one_error: Option<error::OneError>,
}

pub mod error {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, PartialEq, prost::Oneof, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum OneError {
        #[prost(message, tag = "1")]
        NotFound(super::NotFoundError),
        #[prost(message, tag = "2")]
        BadParameter(super::BadParameterError),
        #[prost(message, tag = "3")]
        Internal(super::InternalError),
    }
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericOutput {
    #[prost(message, optional, tag = "1")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_balance: Option<AccountBalanceData>,
    #[prost(message, optional, tag = "2")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl From<&Transaction> for TransactionEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.transaction_id,
            kind: tx.kind.to_string(),
            points_delta: tx.points_delta,
            amount: tx.amount.as_ref().map(ToString::to_string).unwrap_or_default(),
            note: tx.note.clone(),
            created_at: Some(Timestamp {
                seconds: tx.created_at.timestamp(),
                nanos: tx.created_at.timestamp_subsec_nanos() as i32,
            }),
        }
    }
}

impl AccountBalanceData {
    pub fn new(account: &Account, recent: &[Transaction], discount_pct: String) -> Self {
        Self {
            public_code: account.public_code.clone(),
            balance: account.balance,
            lifetime_points: account.lifetime_points,
            lifetime_spend: account.lifetime_spend.to_string(),
            discount_pct,
            recent: recent.iter().map(TransactionEntry::from).collect(),
        }
    }
}
