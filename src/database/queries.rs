use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use diesel::dsl::{avg, count_star, sum};
use diesel::{ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl};

use crate::database::models::{Account, AccountRow, LedgerStats, Transaction, TransactionRow};
use crate::error::{LedgerError, LedgerResult};

fn found(row: Option<AccountRow>) -> LedgerResult<Account> {
    row.map(Account::from).ok_or(LedgerError::NotFound)
}

pub fn find_by_external_id(conn: &mut PgConnection, req_external_id: &str) -> LedgerResult<Account> {
    use crate::schema::account::dsl::*;
    let row = account
        .filter(external_id.eq(req_external_id))
        .filter(active.eq(true))
        .first::<AccountRow>(conn)
        .optional()?;
    found(row)
}

pub fn find_by_public_code(conn: &mut PgConnection, req_code: &str) -> LedgerResult<Account> {
    use crate::schema::account::dsl::*;
    let row = account
        .filter(public_code.eq(req_code))
        .filter(active.eq(true))
        .first::<AccountRow>(conn)
        .optional()?;
    found(row)
}

pub fn find_by_account_id(conn: &mut PgConnection, req_account_id: i64) -> LedgerResult<Account> {
    use crate::schema::account::dsl::*;
    let row = account
        .filter(account_id.eq(req_account_id))
        .first::<AccountRow>(conn)
        .optional()?;
    found(row)
}

pub fn list_transactions(conn: &mut PgConnection, req_account_id: i64, limit: i64) -> LedgerResult<Vec<Transaction>> {
    use crate::schema::points_transaction::dsl::*;
    points_transaction
        .filter(account_id.eq(req_account_id))
        .order(transaction_id.desc())
        .limit(limit)
        .load::<TransactionRow>(conn)?
        .into_iter()
        .map(Transaction::try_from)
        .collect()
}

pub fn list_accounts(conn: &mut PgConnection, limit: i64, offset: i64) -> LedgerResult<(Vec<Account>, i64)> {
    use crate::schema::account::dsl::*;
    let rows = account
        .filter(active.eq(true))
        .order(account_id.desc())
        .limit(limit)
        .offset(offset)
        .load::<AccountRow>(conn)?;
    let total = account.filter(active.eq(true)).count().get_result::<i64>(conn)?;
    Ok((rows.into_iter().map(Account::from).collect(), total))
}

pub fn aggregate_stats(conn: &mut PgConnection) -> LedgerResult<LedgerStats> {
    use crate::schema::account::dsl::*;
    let (accounts, total_spend, total_balance, average_spend) = account
        .filter(active.eq(true))
        .select((count_star(), sum(lifetime_spend), sum(balance), avg(lifetime_spend)))
        .first::<(i64, Option<BigDecimal>, Option<BigDecimal>, Option<BigDecimal>)>(conn)?;
    let total_balance = total_balance
        .unwrap_or_else(BigDecimal::zero)
        .to_i64()
        .ok_or_else(|| LedgerError::storage(anyhow::anyhow!("total balance out of range")))?;
    Ok(LedgerStats {
        accounts,
        total_spend: total_spend.unwrap_or_else(BigDecimal::zero),
        total_balance,
        average_spend: average_spend.unwrap_or_else(BigDecimal::zero).with_scale(2),
    })
}

pub fn ping(conn: &mut PgConnection) -> LedgerResult<()> {
    diesel::sql_query("SELECT 1").execute(conn)?;
    Ok(())
}
