use sqlx::PgExecutor;

/// 重算账户累计消耗 (全量求和, 不做增量, 避免部分失败后漂移)
pub async fn refresh_account_total<'e, E>(executor: E, account_id: i64) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE t_ad_account SET ftotalspending = COALESCE(
            (SELECT SUM(r.famount) FROM t_spending_record r WHERE r.faccountid = t_ad_account.fid),
            0)
        WHERE fid = $1
        "#,
    )
    .bind(account_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// 重算单个开票主体的关联/活跃账户数
/// 增量路径与批量修复共用同一口径: 以账户当前引用为准全量计数
pub async fn refresh_invoice_entity_counters<'e, E>(
    executor: E,
    entity_id: i64,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE t_invoice_entity SET
            flinkedcount = (SELECT COUNT(*) FROM t_ad_account a
                            WHERE a.finvoiceentityid = t_invoice_entity.fid),
            factivecount = (SELECT COUNT(*) FROM t_ad_account a
                            WHERE a.finvoiceentityid = t_invoice_entity.fid
                              AND a.fstatus = 'ACTIVE')
        WHERE fid = $1
        "#,
    )
    .bind(entity_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// 重算单个客户的账户数与累计消耗
pub async fn refresh_customer_counters<'e, E>(executor: E, customer_id: i64) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE t_customer SET
            ftotalaccounts = (SELECT COUNT(*) FROM t_ad_account a
                              WHERE a.fcustomerid = t_customer.fid),
            factiveaccounts = (SELECT COUNT(*) FROM t_ad_account a
                               WHERE a.fcustomerid = t_customer.fid
                                 AND a.fstatus = 'ACTIVE'),
            ftotalspending = COALESCE(
                (SELECT SUM(r.famount)
                 FROM t_spending_record r
                 INNER JOIN t_ad_account a ON a.fid = r.faccountid
                 WHERE a.fcustomerid = t_customer.fid),
                0)
        WHERE fid = $1
        "#,
    )
    .bind(customer_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// 重算单个批次的账户数
pub async fn refresh_batch_counters<'e, E>(executor: E, batch_id: i64) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE t_batch SET
            ftotalaccounts = (SELECT COUNT(*) FROM t_ad_account a
                              WHERE a.fbatchid = t_batch.fid),
            fliveaccounts = (SELECT COUNT(*) FROM t_ad_account a
                             WHERE a.fbatchid = t_batch.fid
                               AND a.fstatus = 'ACTIVE')
        WHERE fid = $1
        "#,
    )
    .bind(batch_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// 批量修复: 重算所有开票主体计数, 返回影响行数
pub async fn repair_invoice_entity_counters<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE t_invoice_entity SET
            flinkedcount = (SELECT COUNT(*) FROM t_ad_account a
                            WHERE a.finvoiceentityid = t_invoice_entity.fid),
            factivecount = (SELECT COUNT(*) FROM t_ad_account a
                            WHERE a.finvoiceentityid = t_invoice_entity.fid
                              AND a.fstatus = 'ACTIVE')
        "#,
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 批量修复: 重算所有客户计数与累计消耗
pub async fn repair_customer_counters<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE t_customer SET
            ftotalaccounts = (SELECT COUNT(*) FROM t_ad_account a
                              WHERE a.fcustomerid = t_customer.fid),
            factiveaccounts = (SELECT COUNT(*) FROM t_ad_account a
                               WHERE a.fcustomerid = t_customer.fid
                                 AND a.fstatus = 'ACTIVE'),
            ftotalspending = COALESCE(
                (SELECT SUM(r.famount)
                 FROM t_spending_record r
                 INNER JOIN t_ad_account a ON a.fid = r.faccountid
                 WHERE a.fcustomerid = t_customer.fid),
                0)
        "#,
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 批量修复: 重算所有批次计数
pub async fn repair_batch_counters<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE t_batch SET
            ftotalaccounts = (SELECT COUNT(*) FROM t_ad_account a
                              WHERE a.fbatchid = t_batch.fid),
            fliveaccounts = (SELECT COUNT(*) FROM t_ad_account a
                             WHERE a.fbatchid = t_batch.fid
                               AND a.fstatus = 'ACTIVE')
        "#,
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// 批量修复: 重算所有账户累计消耗
pub async fn repair_account_totals<'e, E>(executor: E) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE t_ad_account SET ftotalspending = COALESCE(
            (SELECT SUM(r.famount) FROM t_spending_record r WHERE r.faccountid = t_ad_account.fid),
            0)
        "#,
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
