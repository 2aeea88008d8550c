use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_INACTIVE: &str = "INACTIVE";

/// 导入建账时的默认币种 (外部报表不携带币种)
pub const DEFAULT_CURRENCY: &str = "CNY";

/// 投放账户 (t_ad_account)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdAccount {
    pub fid: i64,
    pub fexternalid: String,      // 外部投放账户ID
    pub fname: String,
    pub fstatus: String,          // ACTIVE / INACTIVE
    pub fcurrency: String,
    pub finvoiceentityid: Option<i64>, // 当前开票主体
    pub fcustomerid: Option<i64>,      // 当前客户
    pub fbatchid: Option<i64>,
    pub ftotalspending: BigDecimal,    // 派生值, 只整体重算
}

/// 开票主体 (t_invoice_entity)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvoiceEntity {
    pub fid: i64,
    pub fexternalno: String,
    pub fstatus: String,
    pub fcreditstatus: String,
    pub flinkedcount: i64,
    pub factivecount: i64,
}

/// 客户 (t_customer)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub fid: i64,
    pub fname: String,
    pub fstatus: String,
    pub ftotalspending: BigDecimal,
    pub ftotalaccounts: i64,
    pub factiveaccounts: i64,
}

/// 批次 (t_batch) - 只维护计数
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Batch {
    pub fid: i64,
    pub fname: String,
    pub ftotalaccounts: i64,
    pub fliveaccounts: i64,
}

/// 新建账户的字段 (导入时创建)
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub fexternalid: String,
    pub fname: String,
    pub fstatus: String,
    pub fcurrency: String,
    pub fbatchid: Option<i64>,
}
