use crate::models::{SpendingRecord, SpendingRecordRow, SpendingSnapshot};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgExecutor;
use std::path::Path;

/// 落一条消耗快照 (只追加, 不校验单调性, 单调性由对账阶段处理)
pub async fn insert_snapshot<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
    cumulative_amount: &BigDecimal,
    observed_at: DateTime<Utc>,
    invoice_entity_id: Option<i64>,
    customer_id: Option<i64>,
    snapshot_type: &str,
) -> Result<SpendingSnapshot, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SpendingSnapshot>(
        r#"
        INSERT INTO t_spending_snapshot
            (faccountid, fday, fcumulativeamount, fobservedat,
             finvoiceentityid, fcustomerid, fsnapshottype)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING fid, faccountid, fday, fcumulativeamount, fobservedat,
                  finvoiceentityid, fcustomerid, fsnapshottype
        "#,
    )
    .bind(account_id)
    .bind(day)
    .bind(cumulative_amount)
    .bind(observed_at)
    .bind(invoice_entity_id)
    .bind(customer_id)
    .bind(snapshot_type)
    .fetch_one(executor)
    .await
}

/// 查询账户当日全部快照, 按采集时间升序
pub async fn list_snapshots<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
) -> Result<Vec<SpendingSnapshot>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SpendingSnapshot>(
        r#"
        SELECT fid, faccountid, fday, fcumulativeamount, fobservedat,
               finvoiceentityid, fcustomerid, fsnapshottype
        FROM t_spending_snapshot
        WHERE faccountid = $1 AND fday = $2
        ORDER BY fobservedat ASC
        "#,
    )
    .bind(account_id)
    .bind(day)
    .fetch_all(executor)
    .await
}

/// 删除账户当日全部消耗记录 (重算前整体作废)
pub async fn delete_records_for_day<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
) -> Result<u64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM t_spending_record WHERE faccountid = $1 AND fday = $2")
        .bind(account_id)
        .bind(day)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// 批量插入消耗记录
pub async fn insert_records_batch<'e, E>(
    executor: E,
    records: &[SpendingRecord],
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    if records.is_empty() {
        return Ok(());
    }

    tracing::debug!("开始构建批量插入语句, {} 条记录", records.len());

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO t_spending_record (
            faccountid, fday, famount, fcurrency,
            finvoiceentityid, fcustomerid,
            fperiodstart, fperiodend, fsource, fcreatedat
        ) ",
    );

    query_builder.push_values(records, |mut b, rec| {
        b.push_bind(rec.faccountid)
            .push_bind(rec.fday)
            .push_bind(rec.famount.clone())
            .push_bind(&rec.fcurrency)
            .push_bind(rec.finvoiceentityid)
            .push_bind(rec.fcustomerid)
            .push_bind(rec.fperiodstart)
            .push_bind(rec.fperiodend)
            .push_bind(&rec.fsource)
            .push_bind(rec.fcreatedat);
    });

    // 超时控制: 30秒
    let execute_result = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        query_builder.build().execute(executor),
    )
    .await;

    match execute_result {
        Ok(Ok(result)) => {
            tracing::debug!("INSERT执行成功, 影响 {} 行", result.rows_affected());
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("INSERT执行失败, 错误: {:?}", e);
            Err(e)
        }
        Err(_) => {
            tracing::error!("INSERT操作超时 (>30秒)!");
            Err(sqlx::Error::PoolTimedOut)
        }
    }
}

/// 其他归属组合当日已记金额之和 (NULL 安全比较)
pub async fn sum_other_pair_amount<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
    invoice_entity_id: Option<i64>,
    customer_id: Option<i64>,
) -> Result<BigDecimal, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, BigDecimal>(
        r#"
        SELECT COALESCE(SUM(famount), 0)
        FROM t_spending_record
        WHERE faccountid = $1 AND fday = $2
          AND (finvoiceentityid IS DISTINCT FROM $3
               OR fcustomerid IS DISTINCT FROM $4)
        "#,
    )
    .bind(account_id)
    .bind(day)
    .bind(invoice_entity_id)
    .bind(customer_id)
    .fetch_one(executor)
    .await
}

/// 查询当前归属组合当日已有的记录 (幂等判断用)
pub async fn find_record_for_pair<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
    invoice_entity_id: Option<i64>,
    customer_id: Option<i64>,
) -> Result<Option<SpendingRecordRow>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SpendingRecordRow>(
        r#"
        SELECT fid, faccountid, fday, famount, fcurrency,
               finvoiceentityid, fcustomerid,
               fperiodstart, fperiodend, fsource, fcreatedat
        FROM t_spending_record
        WHERE faccountid = $1 AND fday = $2
          AND finvoiceentityid IS NOT DISTINCT FROM $3
          AND fcustomerid IS NOT DISTINCT FROM $4
        LIMIT 1
        "#,
    )
    .bind(account_id)
    .bind(day)
    .bind(invoice_entity_id)
    .bind(customer_id)
    .fetch_optional(executor)
    .await
}

/// 覆盖已有记录的金额 (overwrite 导入)
pub async fn update_record_amount<'e, E>(
    executor: E,
    record_id: i64,
    amount: &BigDecimal,
    created_at: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE t_spending_record SET famount = $2, fcreatedat = $3 WHERE fid = $1")
        .bind(record_id)
        .bind(amount)
        .bind(created_at)
        .execute(executor)
        .await?;
    Ok(())
}

/// 插入单条消耗记录
pub async fn insert_record<'e, E>(
    executor: E,
    rec: &SpendingRecord,
) -> Result<SpendingRecordRow, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SpendingRecordRow>(
        r#"
        INSERT INTO t_spending_record
            (faccountid, fday, famount, fcurrency,
             finvoiceentityid, fcustomerid,
             fperiodstart, fperiodend, fsource, fcreatedat)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING fid, faccountid, fday, famount, fcurrency,
                  finvoiceentityid, fcustomerid,
                  fperiodstart, fperiodend, fsource, fcreatedat
        "#,
    )
    .bind(rec.faccountid)
    .bind(rec.fday)
    .bind(rec.famount.clone())
    .bind(&rec.fcurrency)
    .bind(rec.finvoiceentityid)
    .bind(rec.fcustomerid)
    .bind(rec.fperiodstart)
    .bind(rec.fperiodend)
    .bind(&rec.fsource)
    .bind(rec.fcreatedat)
    .fetch_one(executor)
    .await
}

/// 查询账户当日全部消耗记录
pub async fn list_records_for_day<'e, E>(
    executor: E,
    account_id: i64,
    day: NaiveDate,
) -> Result<Vec<SpendingRecordRow>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, SpendingRecordRow>(
        r#"
        SELECT fid, faccountid, fday, famount, fcurrency,
               finvoiceentityid, fcustomerid,
               fperiodstart, fperiodend, fsource, fcreatedat
        FROM t_spending_record
        WHERE faccountid = $1 AND fday = $2
        ORDER BY fperiodstart ASC
        "#,
    )
    .bind(account_id)
    .bind(day)
    .fetch_all(executor)
    .await
}

/// 将 Option<i64> 转换为 CSV 字符串
fn option_to_csv(val: &Option<i64>) -> String {
    val.map(|v| v.to_string()).unwrap_or_default()
}

/// 导出消耗记录到 CSV 文件（PostgreSQL COPY 兼容格式）
pub fn export_records_csv(
    records: &[SpendingRecordRow],
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use csv::Writer;
    use std::fs::File;

    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    for rec in records {
        writer.write_record(&[
            rec.fid.to_string(),
            rec.faccountid.to_string(),
            rec.fday.to_string(),
            rec.famount.to_string(),
            rec.fcurrency.clone(),
            option_to_csv(&rec.finvoiceentityid),
            option_to_csv(&rec.fcustomerid),
            rec.fperiodstart.to_rfc3339(),
            rec.fperiodend.to_rfc3339(),
            rec.fsource.clone(),
            rec.fcreatedat.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_export_records_csv_writes_all_rows() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        let rows = vec![SpendingRecordRow {
            fid: 1,
            faccountid: 42,
            fday: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            famount: "10.00".parse().unwrap(),
            fcurrency: "CNY".to_string(),
            finvoiceentityid: Some(7),
            fcustomerid: None,
            fperiodstart: ts,
            fperiodend: ts,
            fsource: "SNAPSHOT".to_string(),
            fcreatedat: ts,
        }];

        let path = std::env::temp_dir().join("adspend_recon_export_test.csv");
        export_records_csv(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("10.00"));
        assert!(content.contains("CNY"));
        // 未分配客户导出为空列
        assert!(content.contains(",7,,"));
        std::fs::remove_file(&path).ok();
    }
}
