use bigdecimal::BigDecimal;
use diesel::{Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};

use crate::database::models::{
    Account, AccountRow, LedgerDelta, NewAccountRow, NewTransaction, NewTransactionRow, Profile, Transaction,
    TransactionRow,
};
use crate::error::{LedgerError, LedgerResult};

fn insert_transaction(conn: &mut PgConnection, req_account_id: i64, tx: &NewTransaction) -> LedgerResult<Transaction> {
    use crate::schema::points_transaction::dsl::*;
    let row = NewTransactionRow {
        account_id: req_account_id,
        kind: tx.kind.as_str(),
        amount: tx.amount.clone(),
        points_delta: tx.points_delta,
        note: tx.note.as_str(),
        created_at: chrono::Utc::now().naive_utc(),
    };
    diesel::insert_into(points_transaction)
        .values(&row)
        .get_result::<TransactionRow>(conn)?
        .try_into()
}

// creates the account row, stamps its public code and logs the opening transaction
pub fn create_account(
    conn: &mut PgConnection,
    req_external_id: &str,
    profile: &Profile,
    initial: &NewTransaction,
    code_for: fn(i64) -> String,
) -> LedgerResult<(Account, Transaction)> {
    if initial.points_delta < 0 {
        return Err(LedgerError::InvalidPoints("opening balance must not be negative".into()));
    }

    conn.transaction::<_, LedgerError, _>(|conn| {
        let new_id = {
            use crate::schema::account::dsl::*;
            let existing = account
                .filter(external_id.eq(req_external_id))
                .filter(active.eq(true))
                .select(account_id)
                .first::<i64>(conn)
                .optional()?;
            if existing.is_some() {
                return Err(LedgerError::AlreadyExists);
            }

            let new_account = NewAccountRow {
                external_id: req_external_id,
                display_name: profile.display_name.as_deref(),
                contact: profile.contact.as_deref(),
                category: profile.category.as_deref(),
                lifetime_spend: BigDecimal::from(0),
                lifetime_points: initial.points_delta,
                balance: initial.points_delta,
                active: true,
                created_at: chrono::Utc::now().naive_utc(),
            };
            // a concurrent insert for the same identity trips the partial
            // unique index and surfaces as AlreadyExists
            diesel::insert_into(account)
                .values(&new_account)
                .returning(account_id)
                .get_result::<i64>(conn)?
        };

        let created = {
            use crate::schema::account::dsl::*;
            diesel::update(account.filter(account_id.eq(new_id)))
                .set(public_code.eq(code_for(new_id)))
                .get_result::<AccountRow>(conn)?
        };

        let opening = insert_transaction(conn, new_id, initial)?;
        Ok((Account::from(created), opening))
    })
}

// applies a balance change under a row lock, returns the updated account
pub fn apply_delta(
    conn: &mut PgConnection,
    req_account_id: i64,
    delta: &LedgerDelta,
) -> LedgerResult<(Account, Transaction)> {
    conn.transaction::<_, LedgerError, _>(|conn| {
        // load account record and lock for update
        let current = {
            use crate::schema::account::dsl::*;
            account
                .filter(account_id.eq(req_account_id))
                .filter(active.eq(true))
                .for_update()
                .first::<AccountRow>(conn)
                .optional()?
                .ok_or(LedgerError::NotFound)?
        };

        if let Some(required) = delta.required_balance {
            if current.balance < required {
                return Err(LedgerError::InsufficientBalance {
                    balance: current.balance,
                    requested: required,
                });
            }
        }
        let balance_after = current.balance + delta.points_delta();
        if balance_after < 0 {
            return Err(LedgerError::InsufficientBalance {
                balance: current.balance,
                requested: -delta.points_delta(),
            });
        }

        let logged = insert_transaction(conn, req_account_id, &delta.transaction)?;

        let updated = {
            use crate::schema::account::dsl::*;
            diesel::update(account.filter(account_id.eq(req_account_id)))
                .set((
                    balance.eq(balance_after),
                    lifetime_points.eq(current.lifetime_points + delta.lifetime_points_delta()),
                    lifetime_spend.eq(current.lifetime_spend.clone() + delta.amount_delta.clone()),
                ))
                .get_result::<AccountRow>(conn)?
        };

        Ok((Account::from(updated), logged))
    })
}

pub fn set_active(conn: &mut PgConnection, req_account_id: i64, req_active: bool) -> LedgerResult<Account> {
    use crate::schema::account::dsl::*;
    diesel::update(account.filter(account_id.eq(req_account_id)))
        .set(active.eq(req_active))
        .get_result::<AccountRow>(conn)
        .optional()?
        .map(Account::from)
        .ok_or(LedgerError::NotFound)
}
