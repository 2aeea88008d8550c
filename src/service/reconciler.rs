use bigdecimal::{BigDecimal, Zero};
use chrono::{NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;

use crate::db::{queries, queries_counters, queries_spending};
use crate::error::{ReconError, RowError};
use crate::models::account::DEFAULT_CURRENCY;
use crate::models::spending::SOURCE_SNAPSHOT;
use crate::models::{
    allocate_import, build_import_record, compute_day_deltas, decide_upsert, plan_profile_update,
    AdAccount, ImportRequest, ImportRow, ImportSummary, NewAccount, RecalcOutcome, SnapshotReading,
    SpendingRecord, SpendingSnapshot, UpsertDecision,
};
use crate::service::ledger;

/// 单行导入的处理结果
enum RowAction {
    Created,
    Updated,
    Skipped,
}

struct RowOutcome {
    account_created: bool,
    account_updated: bool,
    action: RowAction,
}

/// 增量对账服务
/// 两条独立算法: 快照增量模式 (多次盘中累计读数 -> 增量段) 与
/// 权威总额分摊模式 (外部日总额 -> 当前归属组合的差额)
pub struct ReconcilerService {
    pool: PgPool,
}

impl ReconcilerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 落一条累计快照, 同事务内读取账户当前开票主体/客户作为采集时归属
    pub async fn record_snapshot(
        &self,
        account_id: i64,
        day: NaiveDate,
        cumulative_amount: &BigDecimal,
        snapshot_type: &str,
    ) -> Result<SpendingSnapshot, ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        let account = queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;

        let snapshot = queries_spending::insert_snapshot(
            &mut *tx,
            account_id,
            day,
            cumulative_amount,
            Utc::now(),
            account.finvoiceentityid,
            account.fcustomerid,
            snapshot_type,
        )
        .await?;

        tx.commit().await?;
        Ok(snapshot)
    }

    /// 快照增量模式: 按当日快照序列重算账户消耗记录
    /// 先整体删除当日旧记录再重建, 对相同快照输入幂等
    pub async fn recalculate_day(
        &self,
        account_id: i64,
        day: NaiveDate,
    ) -> Result<RecalcOutcome, ReconError> {
        let mut tx = self.pool.begin().await?;
        queries::advisory_lock_account(&mut *tx, account_id).await?;

        let account = queries::get_account(&mut *tx, account_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("account {}", account_id)))?;

        let snapshots = queries_spending::list_snapshots(&mut *tx, account_id, day).await?;
        if snapshots.is_empty() {
            return Err(ReconError::NoData { account_id, day });
        }

        let readings: Vec<SnapshotReading> = snapshots
            .iter()
            .map(|s| SnapshotReading {
                snapshot_id: s.fid,
                cumulative_amount: s.fcumulativeamount.clone(),
                observed_at: s.fobservedat,
                invoice_entity_id: s.finvoiceentityid,
                customer_id: s.fcustomerid,
            })
            .collect();

        let day_start = day.and_time(NaiveTime::MIN).and_utc();
        let plan = compute_day_deltas(day_start, &readings);

        // 累计值回退不生成记录, 但必须让调用方看见
        for reset in &plan.resets {
            tracing::warn!(
                "账户 {} 当日 {} 快照 {} 累计值回退/重复 (delta={}), 该读数不生成记录",
                account_id,
                day,
                reset.snapshot_id,
                reset.delta
            );
        }

        let deleted = queries_spending::delete_records_for_day(&mut *tx, account_id, day).await?;
        if deleted > 0 {
            tracing::info!("账户 {} 当日 {} 旧记录 {} 条已作废", account_id, day, deleted);
        }

        let now = Utc::now();
        let records: Vec<SpendingRecord> = plan
            .segments
            .into_iter()
            .map(|seg| SpendingRecord {
                faccountid: account_id,
                fday: day,
                famount: seg.amount,
                fcurrency: account.fcurrency.clone(),
                finvoiceentityid: seg.invoice_entity_id,
                fcustomerid: seg.customer_id,
                fperiodstart: seg.period_start,
                fperiodend: seg.period_end,
                fsource: SOURCE_SNAPSHOT.to_string(),
                fcreatedat: now,
            })
            .collect();

        for chunk in records.chunks(1000) {
            queries_spending::insert_records_batch(&mut *tx, chunk).await?;
        }

        // 账户累计消耗整体重算, 客户同理 (不做增量, 避免漂移)
        queries_counters::refresh_account_total(&mut *tx, account_id).await?;
        if let Some(customer_id) = account.fcustomerid {
            queries_counters::refresh_customer_counters(&mut *tx, customer_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            "账户 {} 当日 {} 重算完成: 生成 {} 条记录, 跳过 {} 次回退",
            account_id,
            day,
            records.len(),
            plan.resets.len()
        );

        Ok(RecalcOutcome {
            records_created: records.len(),
            resets_skipped: plan.resets.len(),
            records,
        })
    }

    /// 权威总额分摊模式: 逐行尽力而为, 单行失败进入错误列表不中断整批
    pub async fn import_daily_totals(&self, req: &ImportRequest) -> Result<ImportSummary, ReconError> {
        let mut summary = ImportSummary::default();
        let total_rows = req.rows.len();

        tracing::info!(
            "权威日总额导入开始: {} 行, 日期 {}, overwrite={}",
            total_rows,
            req.day,
            req.overwrite
        );

        for (idx, row) in req.rows.iter().enumerate() {
            match self.process_import_row(req, row).await {
                Ok(outcome) => {
                    if outcome.account_created {
                        summary.accounts_created += 1;
                    }
                    if outcome.account_updated {
                        summary.accounts_updated += 1;
                    }
                    match outcome.action {
                        RowAction::Created => summary.spending_created += 1,
                        RowAction::Updated => summary.spending_updated += 1,
                        RowAction::Skipped => summary.skipped += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "导入第 {} 行失败 (账户 {}): {}",
                        idx + 1,
                        row.external_account_id,
                        e
                    );
                    summary.errors.push(RowError {
                        row_index: idx,
                        external_account_id: row.external_account_id.clone(),
                        message: e.to_string(),
                    });
                }
            }

            let current = idx + 1;
            if current % 100 == 0 || current == 1 {
                tracing::info!(
                    "导入进度: {}/{}, 新建消耗: {}, 覆盖: {}, 跳过: {}, 失败: {}",
                    current,
                    total_rows,
                    summary.spending_created,
                    summary.spending_updated,
                    summary.skipped,
                    summary.errors.len()
                );
            }
        }

        tracing::info!(
            "导入完成: 建账 {}, 更新账户 {}, 新建消耗 {}, 覆盖 {}, 跳过 {}, 失败 {}",
            summary.accounts_created,
            summary.accounts_updated,
            summary.spending_created,
            summary.spending_updated,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// 单行导入: 一行一个事务, 失败整行回滚
    async fn process_import_row(
        &self,
        req: &ImportRequest,
        row: &ImportRow,
    ) -> Result<RowOutcome, ReconError> {
        let mut tx = self.pool.begin().await?;

        // 解析账户: 优先行内ID, 其次外部ID, 都没有则建账
        let mut found = match row.account_id {
            Some(id) => queries::get_account(&mut *tx, id).await?,
            None => None,
        };
        if found.is_none() {
            found = queries::get_account_by_external_id(&mut *tx, &row.external_account_id).await?;
        }

        // 先锁后读归属: 锁前读到的开票主体/客户可能已被并发改挂覆盖
        let (mut account, account_created) = match found {
            Some(a) => {
                queries::advisory_lock_account(&mut *tx, a.fid).await?;
                let fresh = queries::get_account(&mut *tx, a.fid)
                    .await?
                    .ok_or_else(|| ReconError::NotFound(format!("account {}", a.fid)))?;
                (fresh, false)
            }
            None => {
                let a = self.create_account_for_row(&mut tx, req, row).await?;
                queries::advisory_lock_account(&mut *tx, a.fid).await?;
                (a, true)
            }
        };

        let mut account_updated = false;
        let mut status_changed = false;
        if !account_created {
            let plan = plan_profile_update(
                &account.fname,
                &account.fstatus,
                &row.account_name,
                row.new_status.as_deref(),
            );
            if plan.changed {
                queries::update_account_profile(
                    &mut *tx,
                    account.fid,
                    &row.account_name,
                    &plan.desired_status,
                )
                .await?;
                account.fname = row.account_name.clone();
                account.fstatus = plan.desired_status;
                status_changed = plan.status_changed;
                account_updated = true;
            }
        }

        // 状态翻转影响开票主体/批次的活跃账户数, 同事务内刷新
        if status_changed {
            if let Some(entity_id) = account.finvoiceentityid {
                queries_counters::refresh_invoice_entity_counters(&mut *tx, entity_id).await?;
            }
            if let Some(batch_id) = account.fbatchid {
                queries_counters::refresh_batch_counters(&mut *tx, batch_id).await?;
            }
        }

        // 其他归属组合的已记金额保持不动, 当前组合分得差额
        let other_amount = queries_spending::sum_other_pair_amount(
            &mut *tx,
            account.fid,
            req.day,
            account.finvoiceentityid,
            account.fcustomerid,
        )
        .await?;
        let allocated = allocate_import(&row.new_amount, &other_amount);

        if allocated < BigDecimal::zero() {
            // 上游数据错误的典型形态, 整行回滚并上报
            return Err(ReconError::AllocationAnomaly {
                account_id: account.fid,
                day: req.day,
                allocated,
            });
        }

        let existing = queries_spending::find_record_for_pair(
            &mut *tx,
            account.fid,
            req.day,
            account.finvoiceentityid,
            account.fcustomerid,
        )
        .await?;

        if let (Some(rec), Some(expected)) = (&existing, &row.existing_amount) {
            if &rec.famount != expected {
                tracing::debug!(
                    "账户 {} 当日 {} 库内金额 {} 与导入行声称的 {} 不一致",
                    account.fid,
                    req.day,
                    rec.famount,
                    expected
                );
            }
        }

        let now = Utc::now();
        let decision = decide_upsert(existing.is_some(), req.overwrite);
        let action = match (decision, existing) {
            (UpsertDecision::Skip, _) => {
                tx.commit().await?;
                return Ok(RowOutcome {
                    account_created,
                    account_updated,
                    action: RowAction::Skipped,
                });
            }
            (UpsertDecision::Overwrite, Some(rec)) => {
                queries_spending::update_record_amount(&mut *tx, rec.fid, &allocated, now).await?;
                RowAction::Updated
            }
            (UpsertDecision::Create, _) | (UpsertDecision::Overwrite, None) => {
                queries_spending::insert_record(
                    &mut *tx,
                    &build_import_record(&account, req.day, allocated, now),
                )
                .await?;
                RowAction::Created
            }
        };

        queries_counters::refresh_account_total(&mut *tx, account.fid).await?;
        if let Some(customer_id) = account.fcustomerid {
            queries_counters::refresh_customer_counters(&mut *tx, customer_id).await?;
        }

        tx.commit().await?;
        Ok(RowOutcome {
            account_created,
            account_updated,
            action,
        })
    }

    /// 导入行首次出现的账户: 建账并套用批次/开票主体上下文
    async fn create_account_for_row(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        req: &ImportRequest,
        row: &ImportRow,
    ) -> Result<AdAccount, ReconError> {
        let new = NewAccount {
            fexternalid: row.external_account_id.clone(),
            fname: row.account_name.clone(),
            fstatus: row
                .new_status
                .clone()
                .unwrap_or_else(|| crate::models::account::STATUS_ACTIVE.to_string()),
            fcurrency: DEFAULT_CURRENCY.to_string(),
            fbatchid: req.batch_id,
        };

        let mut account = queries::insert_account(&mut **tx, &new)
            .await
            .map_err(|e| ReconError::from_db_unique(e, &row.external_account_id))?;

        if let Some(batch_id) = req.batch_id {
            queries_counters::refresh_batch_counters(&mut **tx, batch_id).await?;
        }

        if let Some(entity_id) = req.invoice_entity_id {
            queries::get_invoice_entity(&mut **tx, entity_id)
                .await?
                .ok_or_else(|| ReconError::NotFound(format!("invoice entity {}", entity_id)))?;
            ledger::link_invoice_entity_tx(&mut *tx, account.fid, entity_id, Some("import")).await?;
            account.finvoiceentityid = Some(entity_id);
        }

        Ok(account)
    }

    /// 导出账户当日的对账记录 (运维用)
    pub async fn export_day_records(
        &self,
        account_id: i64,
        day: NaiveDate,
        output_path: &std::path::Path,
    ) -> Result<usize, ReconError> {
        let records = queries_spending::list_records_for_day(&self.pool, account_id, day).await?;
        queries_spending::export_records_csv(&records, output_path).map_err(|e| {
            ReconError::Db(sqlx::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )))
        })?;
        Ok(records.len())
    }
}
