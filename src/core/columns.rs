//! Well-known column and dataset names

/// Expected receive month as written by procurement, e.g. `Jan-24`
pub const EXPECTED_RECEIVE_MONTH: &str = "Expected Receive Month";
/// Expected receive month as integer YYYYMM (0 when unparseable)
pub const ERM_YYYYMM: &str = "Expected Received Month_轉換格式";
/// Date range parsed out of the item description, `YYYYMM,YYYYMM`
pub const DESCRIPTION_RANGE: &str = "YMs of Item Description";
/// Marker value for a description whose date range could not be parsed
pub const DEFAULT_DATE_RANGE: &str = "100001,100002";

pub const ITEM_DESCRIPTION: &str = "Item Description";
pub const LINE_NUMBER: &str = "Line#";
pub const GL_ACCOUNT: &str = "GL#";
pub const GL_DATE: &str = "GL DATE";
pub const ENTRY_QUANTITY: &str = "Entry Quantity";
pub const RECEIVED_QUANTITY: &str = "Received Quantity";
pub const BILLED_QUANTITY: &str = "Billed Quantity";
pub const ENTRY_AMOUNT: &str = "Entry Amount";
pub const ENTRY_BILLED_AMOUNT: &str = "Entry Billed Amount";
pub const ENTRY_PREPAY_AMOUNT: &str = "Entry Prepay Amount";
pub const UNIT_PRICE: &str = "Unit Price";
pub const CURRENCY: &str = "Currency";
pub const DEPARTMENT: &str = "Department";
pub const REMARK_PROCUREMENT: &str = "Remarked by Procurement";
pub const REMARK_PREVIOUS_FN: &str = "Remarked by 上月 FN";
pub const REMARK_PREVIOUS_FN_PR: &str = "Remarked by 上月 FN PR";
pub const REMARK_PREVIOUS_PROCUREMENT: &str = "Remarked by 上月 Procurement";
pub const REMARK_PROCUREMENT_PR: &str = "Remarked by Procurement PR";
pub const NOTED_PROCUREMENT: &str = "Noted by Procurement";
pub const NOTED_PROCUREMENT_PR: &str = "Noted by Procurement PR";
pub const MEMO: &str = "memo";
pub const PO_LINE: &str = "PO Line";
pub const PR_LINE: &str = "PR Line";

pub const FILE_DATE: &str = "檔案日期";
pub const ACCRUAL_FLAG: &str = "是否估計入帳";
pub const MATCHED_CONDITION: &str = "matched_condition_on_status";

pub const ACCOUNT_CODE: &str = "Account code";
pub const ACCOUNT_NAME: &str = "Account Name";
pub const REGION: &str = "Region_c";
pub const DEPARTMENT_CODE: &str = "Dep.";
pub const CURRENCY_CODE: &str = "Currency_c";
pub const ACCRUAL_AMOUNT: &str = "Accr. Amount";
pub const HAS_PREPAYMENT: &str = "是否有預付";
pub const LIABILITY: &str = "Liability";

/// Reference dataset columns
pub const REF_ACCOUNT: &str = "Account";
pub const REF_ACCOUNT_DESC: &str = "Account Desc";

/// Auxiliary dataset holding account code to account name
pub const REFERENCE_ACCOUNT: &str = "reference_account";
/// Auxiliary dataset holding account code to liability account
pub const REFERENCE_LIABILITY: &str = "reference_liability";

/// Status substring marking a row for accrual
pub const COMPLETION_MARKER: &str = "已完成";
/// Status assigned to rows whose description range is malformed
pub const FORMAT_ERROR_STATUS: &str = "格式錯誤，退單";
