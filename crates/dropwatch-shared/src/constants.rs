/// Address server suffix used by group chats
pub const GROUP_SERVER: &str = "g.us";

/// Default identifier prefix ("drop numbers" look like DR1234567)
pub const DEFAULT_IDENTIFIER_PREFIX: &str = "DR";

/// Number of QA photo steps tracked per review record
pub const REVIEW_STEP_COUNT: usize = 14;

/// Human-readable step names, in column order (sheet columns C..P)
pub const STEP_NAMES: [&str; REVIEW_STEP_COUNT] = [
    "Property frontage",
    "Location before install",
    "Outside cable span",
    "Home entry outside",
    "Home entry inside",
    "Fibre entry to ONT",
    "Patched and labelled drop",
    "Work area completion",
    "ONT barcode scan",
    "UPS serial number",
    "Power meter reading",
    "Power meter at ONT",
    "Active broadband light",
    "Customer signature",
];

/// Default completion keywords (matched case-insensitively)
pub const DEFAULT_COMPLETION_KEYWORDS: [&str; 6] =
    ["done", "complete", "finished", "ready", "submitted", "resubmitted"];

/// Status written to freshly allocated sheet rows
pub const INITIAL_SHEET_STATUS: &str = "Processing";

/// First data row of every project worksheet (rows above hold headers and the
/// checkbox template)
pub const DEFAULT_DATA_START_ROW: u32 = 17;

/// Rows read per allocator window
pub const DEFAULT_SCAN_WINDOW: u32 = 84;

/// Upper bound on row numbers the allocator will hand out
pub const DEFAULT_MAX_ROW: u32 = 2000;

/// Largest accepted `sheet.max_row`
pub const MAX_SHEET_ROW: u32 = 1_000_000;

/// Submitter labels are truncated to this many characters
pub const DEFAULT_SUBMITTER_MAX_LEN: usize = 20;

/// Budget for any single remote call (sheets, review store, media fetch)
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// How far back a receipt-triggered rescan looks
pub const DEFAULT_RECEIPT_RESCAN_SECS: i64 = 3600;

/// Longest accepted receipt rescan window (one week)
pub const MAX_RECEIPT_RESCAN_SECS: i64 = 7 * 24 * 3600;

/// How many recent messages a receipt-triggered rescan inspects
pub const DEFAULT_RECEIPT_RESCAN_LIMIT: u32 = 10;
