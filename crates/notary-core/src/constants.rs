//! ─── Notary Core Protocol Constants ─────────────────────────────────────────

// ── Cron (C5) ─────────────────────────────────────────────────────────────────

/// Default process interval for Trade cron items (§4.4).
pub const CRON_TRADE_INTERVAL_SECS: i64 = 10;

/// Default process interval for PaymentPlan cron items (§4.4).
pub const CRON_PAYMENT_PLAN_INTERVAL_SECS: i64 = 3_600;

// ── Market (C7) ────────────────────────────────────────────────────────────────

/// Default bound on the recent-trades journal per market (§4.6).
pub const MARKET_RECENT_TRADES_CAP: usize = 50;

// ── Concurrency & transport (§5/§6) ───────────────────────────────────────────

/// Default per-context client send timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default idle keep-alive interval; 0 disables keep-alive pings.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 0;

// ── Armored frame (C2) ─────────────────────────────────────────────────────────

/// Line width for base64 payload wrapping inside an armored frame.
pub const ARMOR_LINE_WIDTH: usize = 72;

/// Version string written into the armored frame header.
pub const ARMOR_VERSION: &str = "Notary Core 1.0";
