use crate::models::{AdAccount, AssignmentHistory, Customer, InvoiceEntity, NewAccount};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

/// 对账户加事务级咨询锁, 串行化同一账户上的并发读改写
pub async fn advisory_lock_account<'e, E>(executor: E, account_id: i64) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// 查询账户
pub async fn get_account<'e, E>(executor: E, account_id: i64) -> Result<Option<AdAccount>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AdAccount>(
        r#"
        SELECT fid, fexternalid, fname, fstatus, fcurrency,
               finvoiceentityid, fcustomerid, fbatchid, ftotalspending
        FROM t_ad_account
        WHERE fid = $1
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

/// 按外部投放账户ID查询账户
pub async fn get_account_by_external_id<'e, E>(
    executor: E,
    external_id: &str,
) -> Result<Option<AdAccount>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AdAccount>(
        r#"
        SELECT fid, fexternalid, fname, fstatus, fcurrency,
               finvoiceentityid, fcustomerid, fbatchid, ftotalspending
        FROM t_ad_account
        WHERE fexternalid = $1
        "#,
    )
    .bind(external_id)
    .fetch_optional(executor)
    .await
}

/// 创建账户 (导入时首次出现)
pub async fn insert_account<'e, E>(executor: E, new: &NewAccount) -> Result<AdAccount, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AdAccount>(
        r#"
        INSERT INTO t_ad_account (fexternalid, fname, fstatus, fcurrency, fbatchid)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING fid, fexternalid, fname, fstatus, fcurrency,
                  finvoiceentityid, fcustomerid, fbatchid, ftotalspending
        "#,
    )
    .bind(&new.fexternalid)
    .bind(&new.fname)
    .bind(&new.fstatus)
    .bind(&new.fcurrency)
    .bind(new.fbatchid)
    .fetch_one(executor)
    .await
}

/// 更新账户名称与状态 (导入行携带的最新信息)
pub async fn update_account_profile<'e, E>(
    executor: E,
    account_id: i64,
    name: &str,
    status: &str,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_ad_account SET fname = $2, fstatus = $3 WHERE fid = $1")
        .bind(account_id)
        .bind(name)
        .bind(status)
        .execute(executor)
        .await?;
    Ok(())
}

/// 更新账户当前开票主体引用 (None = 解绑)
pub async fn set_account_invoice_entity<'e, E>(
    executor: E,
    account_id: i64,
    entity_id: Option<i64>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_ad_account SET finvoiceentityid = $2 WHERE fid = $1")
        .bind(account_id)
        .bind(entity_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// 更新账户当前客户引用 (None = 取消分配)
pub async fn set_account_customer<'e, E>(
    executor: E,
    account_id: i64,
    customer_id: Option<i64>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_ad_account SET fcustomerid = $2 WHERE fid = $1")
        .bind(account_id)
        .bind(customer_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// 查询开票主体
pub async fn get_invoice_entity<'e, E>(
    executor: E,
    entity_id: i64,
) -> Result<Option<InvoiceEntity>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, InvoiceEntity>(
        r#"
        SELECT fid, fexternalno, fstatus, fcreditstatus, flinkedcount, factivecount
        FROM t_invoice_entity
        WHERE fid = $1
        "#,
    )
    .bind(entity_id)
    .fetch_optional(executor)
    .await
}

/// 查询客户
pub async fn get_customer<'e, E>(
    executor: E,
    customer_id: i64,
) -> Result<Option<Customer>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Customer>(
        r#"
        SELECT fid, fname, fstatus, ftotalspending, ftotalaccounts, factiveaccounts
        FROM t_customer
        WHERE fid = $1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(executor)
    .await
}

/// 查询账户当前生效的开票主体关联历史行 (fendedat 为空)
pub async fn active_invoice_link<'e, E>(
    executor: E,
    account_id: i64,
) -> Result<Option<AssignmentHistory>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AssignmentHistory>(
        r#"
        SELECT fid, faccountid, ftargetid, fstartedat, fendedat, factor, freason
        FROM t_invoice_link_history
        WHERE faccountid = $1 AND fendedat IS NULL
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

/// 关闭开票主体历史行, 同时盖上关闭原因
pub async fn close_invoice_link<'e, E>(
    executor: E,
    history_id: i64,
    ended_at: DateTime<Utc>,
    reason: &str,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_invoice_link_history SET fendedat = $2, freason = $3 WHERE fid = $1")
        .bind(history_id)
        .bind(ended_at)
        .bind(reason)
        .execute(executor)
        .await?;
    Ok(())
}

/// 新开一条开票主体关联历史行
pub async fn open_invoice_link<'e, E>(
    executor: E,
    account_id: i64,
    entity_id: i64,
    started_at: DateTime<Utc>,
    actor: Option<&str>,
    reason: &str,
) -> Result<AssignmentHistory, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AssignmentHistory>(
        r#"
        INSERT INTO t_invoice_link_history (faccountid, ftargetid, fstartedat, factor, freason)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING fid, faccountid, ftargetid, fstartedat, fendedat, factor, freason
        "#,
    )
    .bind(account_id)
    .bind(entity_id)
    .bind(started_at)
    .bind(actor)
    .bind(reason)
    .fetch_one(executor)
    .await
}

/// 查询账户当前生效的客户分配历史行
pub async fn active_customer_assign<'e, E>(
    executor: E,
    account_id: i64,
) -> Result<Option<AssignmentHistory>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AssignmentHistory>(
        r#"
        SELECT fid, faccountid, ftargetid, fstartedat, fendedat, factor, freason
        FROM t_customer_assign_history
        WHERE faccountid = $1 AND fendedat IS NULL
        "#,
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

/// 关闭客户分配历史行
pub async fn close_customer_assign<'e, E>(
    executor: E,
    history_id: i64,
    ended_at: DateTime<Utc>,
    reason: &str,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_customer_assign_history SET fendedat = $2, freason = $3 WHERE fid = $1")
        .bind(history_id)
        .bind(ended_at)
        .bind(reason)
        .execute(executor)
        .await?;
    Ok(())
}

/// 新开一条客户分配历史行
pub async fn open_customer_assign<'e, E>(
    executor: E,
    account_id: i64,
    customer_id: i64,
    started_at: DateTime<Utc>,
    actor: Option<&str>,
    reason: &str,
) -> Result<AssignmentHistory, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, AssignmentHistory>(
        r#"
        INSERT INTO t_customer_assign_history (faccountid, ftargetid, fstartedat, factor, freason)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING fid, faccountid, ftargetid, fstartedat, fendedat, factor, freason
        "#,
    )
    .bind(account_id)
    .bind(customer_id)
    .bind(started_at)
    .bind(actor)
    .bind(reason)
    .fetch_one(executor)
    .await
}
