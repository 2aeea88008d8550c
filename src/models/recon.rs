use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::models::account::AdAccount;
use crate::models::spending::{SpendingRecord, SOURCE_IMPORT};

/// 参与增量计算的快照读数 (按 observed_at 升序传入)
#[derive(Debug, Clone)]
pub struct SnapshotReading {
    pub snapshot_id: i64,
    pub cumulative_amount: BigDecimal,
    pub observed_at: DateTime<Utc>,
    pub invoice_entity_id: Option<i64>,
    pub customer_id: Option<i64>,
}

/// 一个可归属的消耗增量段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSegment {
    pub amount: BigDecimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub invoice_entity_id: Option<i64>,
    pub customer_id: Option<i64>,
}

/// 累计值回退/重复读数: 不生成记录, 上报给调用方
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetAnomaly {
    pub snapshot_id: i64,
    pub observed_at: DateTime<Utc>,
    pub delta: BigDecimal,
}

/// 单账户单日的增量计划
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DayDeltaPlan {
    pub segments: Vec<DeltaSegment>,
    pub resets: Vec<ResetAnomaly>,
}

/// 累计快照 -> 增量段
///
/// 基线 cumulative_0 = 0 (当日零点), delta_i = cumulative_i - cumulative_{i-1}。
/// delta > 0 时生成一段, 区间为 [上一快照的 observed_at, 本快照的 observed_at],
/// 归属取本快照采集时刻的开票主体/客户;
/// delta <= 0 (回退或重复读数) 不生成段, 记入 resets。
/// 无论是否生成段, 基线都前移到本快照, 与外部平台的口径保持一致。
pub fn compute_day_deltas(day_start: DateTime<Utc>, readings: &[SnapshotReading]) -> DayDeltaPlan {
    let mut plan = DayDeltaPlan::default();

    let mut prev_cumulative = BigDecimal::zero();
    let mut prev_observed = day_start;

    for r in readings {
        let delta = &r.cumulative_amount - &prev_cumulative;

        if delta > BigDecimal::zero() {
            plan.segments.push(DeltaSegment {
                amount: delta,
                period_start: prev_observed,
                period_end: r.observed_at,
                invoice_entity_id: r.invoice_entity_id,
                customer_id: r.customer_id,
            });
        } else {
            plan.resets.push(ResetAnomaly {
                snapshot_id: r.snapshot_id,
                observed_at: r.observed_at,
                delta,
            });
        }

        prev_cumulative = r.cumulative_amount.clone();
        prev_observed = r.observed_at;
    }

    plan
}

/// 权威总额分摊: 当前组合可分得 = 导入总额 - 其他组合已记金额
pub fn allocate_import(imported_total: &BigDecimal, other_amount: &BigDecimal) -> BigDecimal {
    imported_total - other_amount
}

/// 当前组合已有记录时的处理决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertDecision {
    Create,
    Overwrite,
    Skip,
}

/// overwrite 未开启时已有记录保持不变 (防重复导入)
pub fn decide_upsert(has_existing: bool, overwrite: bool) -> UpsertDecision {
    match (has_existing, overwrite) {
        (false, _) => UpsertDecision::Create,
        (true, true) => UpsertDecision::Overwrite,
        (true, false) => UpsertDecision::Skip,
    }
}

/// 导入行对账户档案的更新计划
/// status_changed 决定是否连带刷新开票主体/批次的活跃账户数
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdatePlan {
    pub desired_status: String,
    pub changed: bool,
    pub status_changed: bool,
}

pub fn plan_profile_update(
    current_name: &str,
    current_status: &str,
    row_name: &str,
    row_status: Option<&str>,
) -> ProfileUpdatePlan {
    let desired_status = row_status.unwrap_or(current_status).to_string();
    let status_changed = desired_status != current_status;
    ProfileUpdatePlan {
        changed: status_changed || current_name != row_name,
        status_changed,
        desired_status,
    }
}

/// 权威总额导入的整日记录, 归属取账户此刻的开票主体/客户
pub fn build_import_record(
    account: &AdAccount,
    day: NaiveDate,
    allocated: BigDecimal,
    now: DateTime<Utc>,
) -> SpendingRecord {
    let day_start = day.and_time(NaiveTime::MIN).and_utc();
    SpendingRecord {
        faccountid: account.fid,
        fday: day,
        famount: allocated,
        fcurrency: account.fcurrency.clone(),
        finvoiceentityid: account.finvoiceentityid,
        fcustomerid: account.fcustomerid,
        fperiodstart: day_start,
        fperiodend: day_start + chrono::Duration::days(1),
        fsource: SOURCE_IMPORT.to_string(),
        fcreatedat: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, hour, 0, 0).unwrap()
    }

    fn reading(id: i64, hour: u32, cumulative: &str, mi: Option<i64>) -> SnapshotReading {
        SnapshotReading {
            snapshot_id: id,
            cumulative_amount: dec(cumulative),
            observed_at: ts(hour),
            invoice_entity_id: mi,
            customer_id: Some(7),
        }
    }

    #[test]
    fn test_segments_sum_to_last_cumulative() {
        // 09:00 累计 10.00 (MI=1), 14:00 累计 25.00 (MI=2), 18:00 累计 40.00 (MI=2)
        let readings = vec![
            reading(1, 9, "10.00", Some(1)),
            reading(2, 14, "25.00", Some(2)),
            reading(3, 18, "40.00", Some(2)),
        ];

        let plan = compute_day_deltas(ts(0), &readings);

        assert_eq!(plan.segments.len(), 3);
        assert!(plan.resets.is_empty());

        assert_eq!(plan.segments[0].amount, dec("10.00"));
        assert_eq!(plan.segments[0].period_start, ts(0));
        assert_eq!(plan.segments[0].period_end, ts(9));
        assert_eq!(plan.segments[0].invoice_entity_id, Some(1));

        assert_eq!(plan.segments[1].amount, dec("15.00"));
        assert_eq!(plan.segments[1].period_start, ts(9));
        assert_eq!(plan.segments[1].period_end, ts(14));
        assert_eq!(plan.segments[1].invoice_entity_id, Some(2));

        assert_eq!(plan.segments[2].amount, dec("15.00"));

        let total = plan
            .segments
            .iter()
            .fold(BigDecimal::zero(), |acc, s| acc + &s.amount);
        assert_eq!(total, dec("40.00"));
    }

    #[test]
    fn test_reset_reading_emits_no_segment_but_is_surfaced() {
        // 第二个读数回退到 8.00, 第三个读数在回退后的基线上继续
        let readings = vec![
            reading(1, 9, "10.00", Some(1)),
            reading(2, 12, "8.00", Some(1)),
            reading(3, 15, "12.00", Some(1)),
        ];

        let plan = compute_day_deltas(ts(0), &readings);

        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.resets.len(), 1);
        assert_eq!(plan.resets[0].snapshot_id, 2);
        assert_eq!(plan.resets[0].delta, dec("-2.00"));

        // 回退后的段从回退快照的时刻起算, 基线为回退后的累计值
        assert_eq!(plan.segments[1].amount, dec("4.00"));
        assert_eq!(plan.segments[1].period_start, ts(12));
        assert_eq!(plan.segments[1].period_end, ts(15));
    }

    #[test]
    fn test_repeated_reading_counts_as_reset() {
        let readings = vec![
            reading(1, 9, "10.00", Some(1)),
            reading(2, 10, "10.00", Some(1)),
        ];

        let plan = compute_day_deltas(ts(0), &readings);

        assert_eq!(plan.segments.len(), 1);
        assert_eq!(plan.resets.len(), 1);
        assert_eq!(plan.resets[0].delta, dec("0.00"));
    }

    #[test]
    fn test_recompute_is_idempotent_for_identical_input() {
        let readings = vec![
            reading(1, 9, "10.00", Some(1)),
            reading(2, 14, "25.00", Some(2)),
        ];

        let first = compute_day_deltas(ts(0), &readings);
        let second = compute_day_deltas(ts(0), &readings);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_produces_empty_plan() {
        let plan = compute_day_deltas(ts(0), &[]);
        assert!(plan.segments.is_empty());
        assert!(plan.resets.is_empty());
    }

    #[test]
    fn test_attribution_follows_capture_time_pair() {
        let mut r = reading(1, 9, "10.00", Some(1));
        r.customer_id = None; // 采集时未分配客户

        let plan = compute_day_deltas(ts(0), &[r]);

        assert_eq!(plan.segments[0].invoice_entity_id, Some(1));
        assert_eq!(plan.segments[0].customer_id, None);
    }

    #[test]
    fn test_allocation_subtracts_other_pairs() {
        assert_eq!(allocate_import(&dec("20.00"), &dec("5.00")), dec("15.00"));
        assert_eq!(allocate_import(&dec("20.00"), &dec("0")), dec("20.00"));
    }

    #[test]
    fn test_allocation_can_go_negative() {
        // 其他组合已记金额超过导入总额时为负, 由调用方判定为异常
        let allocated = allocate_import(&dec("3.00"), &dec("5.00"));
        assert!(allocated < BigDecimal::zero());
        assert_eq!(allocated, dec("-2.00"));
    }

    #[test]
    fn test_upsert_decision_guards_double_import() {
        assert_eq!(decide_upsert(false, false), UpsertDecision::Create);
        assert_eq!(decide_upsert(false, true), UpsertDecision::Create);
        assert_eq!(decide_upsert(true, false), UpsertDecision::Skip);
        assert_eq!(decide_upsert(true, true), UpsertDecision::Overwrite);
    }

    fn account(mi: Option<i64>, mc: Option<i64>) -> AdAccount {
        AdAccount {
            fid: 42,
            fexternalid: "EXT-42".to_string(),
            fname: "账户A".to_string(),
            fstatus: "ACTIVE".to_string(),
            fcurrency: "CNY".to_string(),
            finvoiceentityid: mi,
            fcustomerid: mc,
            fbatchid: Some(9),
            ftotalspending: dec("0"),
        }
    }

    #[test]
    fn test_import_record_attributes_to_accounts_current_pair() {
        // 改挂提交后的账户状态是唯一口径, 记录归属必须跟随传入的账户
        let acc = account(Some(2), Some(7));
        let record = build_import_record(&acc, ts(0).date_naive(), dec("15.00"), ts(10));

        assert_eq!(record.finvoiceentityid, Some(2));
        assert_eq!(record.fcustomerid, Some(7));
        assert_eq!(record.famount, dec("15.00"));
        assert_eq!(record.fsource, SOURCE_IMPORT);
        assert_eq!(record.fperiodstart, ts(0));
        assert_eq!(record.fperiodend, ts(0) + chrono::Duration::days(1));
    }

    #[test]
    fn test_import_record_keeps_unassigned_pair() {
        let acc = account(None, None);
        let record = build_import_record(&acc, ts(0).date_naive(), dec("5.00"), ts(10));

        assert_eq!(record.finvoiceentityid, None);
        assert_eq!(record.fcustomerid, None);
    }

    #[test]
    fn test_status_flip_requires_counter_refresh() {
        let plan = plan_profile_update("账户A", "ACTIVE", "账户A", Some("INACTIVE"));
        assert!(plan.changed);
        assert!(plan.status_changed);
        assert_eq!(plan.desired_status, "INACTIVE");
    }

    #[test]
    fn test_name_only_change_skips_counter_refresh() {
        let plan = plan_profile_update("账户A", "ACTIVE", "账户B", Some("ACTIVE"));
        assert!(plan.changed);
        assert!(!plan.status_changed);
    }

    #[test]
    fn test_unchanged_profile_writes_nothing() {
        // 行内未带状态时沿用库内状态
        let plan = plan_profile_update("账户A", "ACTIVE", "账户A", None);
        assert!(!plan.changed);
        assert!(!plan.status_changed);
        assert_eq!(plan.desired_status, "ACTIVE");
    }
}
