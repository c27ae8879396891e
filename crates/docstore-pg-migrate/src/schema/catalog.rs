//! Application schema: tables by phase, indexes and row policies.
//!
//! Phase N tables reference only tables from phases below N. The
//! `test_builtin_foreign_keys_point_to_lower_phases` test keeps it that way.

use super::ColumnType::*;
use super::{
    group_phases, Column, ColumnDefault, IndexDef, OnDelete, Phase, PolicyCommand, PolicyDef,
    RowPolicy, TableDef,
};

const PROFILE_TYPES: &[&str] = &["individual", "company"];
const REVIEW_STATUSES: &[&str] = &["pending", "approved", "rejected"];

// =============================================================================
// Phase 1: lookup tables
// =============================================================================

pub static ROLES: TableDef = TableDef {
    name: "roles",
    phase: 1,
    columns: &[
        Column::required("name", VarChar(50)).unique(),
        Column::new("description", VarChar(500)),
        Column::new("permissions", Jsonb).json_object(),
    ],
    unique: &[],
    row_security: false,
};

pub static COUNTRIES: TableDef = TableDef {
    name: "countries",
    phase: 1,
    columns: &[
        Column::required("country_code", VarChar(10)).unique(),
        Column::required("country_name", VarChar(100)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
    ],
    unique: &[],
    row_security: false,
};

pub static TRANSACTION_TYPES: TableDef = TableDef {
    name: "transaction_types",
    phase: 1,
    columns: &[
        Column::required("type_code", VarChar(50)).unique(),
        Column::required("type_name", VarChar(100)),
        Column::new("description", VarChar(500)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
    ],
    unique: &[],
    row_security: false,
};

pub static PROJECT_STATUSES: TableDef = TableDef {
    name: "project_statuses",
    phase: 1,
    columns: &[
        Column::required("status_code", VarChar(50)).unique(),
        Column::required("status_name", VarChar(100)),
        Column::new("description", VarChar(500)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
    ],
    unique: &[],
    row_security: false,
};

// =============================================================================
// Phase 2: users
// =============================================================================

/// Application accounts.
///
/// `email` is NOT NULL and UNIQUE, and the users rule fills a missing email
/// with `""`. A second user without an email therefore collides with the
/// first and its whole batch is rejected. Rows in later collections that
/// reference the rejected users then fail their foreign keys in turn.
pub static USERS: TableDef = TableDef {
    name: "users",
    phase: 2,
    columns: &[
        Column::required("firebase_uid", Text).unique(),
        Column::required("email", Text).unique(),
        Column::new("display_name", VarChar(255)),
        Column::new("phone", VarChar(20)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("is_verified", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("profile_type", Text).one_of(PROFILE_TYPES),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 3: user satellites and permissions
// =============================================================================

pub static USER_PROFILES: TableDef = TableDef {
    name: "user_profiles",
    phase: 3,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::new("profile_type", Text).one_of(PROFILE_TYPES),
        Column::new("first_name", VarChar(100)),
        Column::new("last_name", VarChar(100)),
        Column::new("date_of_birth", Date),
        Column::new("nationality", VarChar(100)),
        Column::new("residence_country", VarChar(100)),
        Column::new("address", VarChar(500)),
        Column::new("city", VarChar(100)),
        Column::new("postal_code", VarChar(20)),
        Column::new("company_name", VarChar(255)),
        Column::new("tax_id", VarChar(50)),
        Column::new("representative_name", VarChar(100)),
        Column::new("representative_last_name", VarChar(100)),
        Column::new("kyc_status", Text).one_of(REVIEW_STATUSES),
        Column::new("kyc_data", Jsonb).json_object(),
    ],
    unique: &[],
    row_security: true,
};

pub static TWO_FACTOR_AUTH: TableDef = TableDef {
    name: "two_factor_auth",
    phase: 3,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("secret_key", VarChar(100)),
        Column::new("backup_codes", TextArray),
        Column::new("is_enabled", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("last_used", Timestamptz),
    ],
    unique: &[],
    row_security: true,
};

pub static PERMISSIONS: TableDef = TableDef {
    name: "permissions",
    phase: 3,
    columns: &[
        Column::fk("role_id", "roles", OnDelete::Cascade),
        Column::required("resource", VarChar(100)),
        Column::required("action", VarChar(50)),
    ],
    unique: &[&["role_id", "resource", "action"]],
    row_security: false,
};

// =============================================================================
// Phase 4: investments
// =============================================================================

pub static INVESTMENTS: TableDef = TableDef {
    name: "investments",
    phase: 4,
    columns: &[
        Column::required("firebase_id", Text).unique(),
        Column::required("title", Text),
        Column::new("description", Text),
        Column::new("company", Text),
        Column::new("token_symbol", Text),
        Column::new("token_address", Text),
        Column::new("seller_address", Text),
        Column::new("project_wallet", Text),
        Column::required("amount_to_sell", Decimal(15, 2)),
        Column::new("amount_sold", Decimal(15, 2)).default(ColumnDefault::Int(0)),
        Column::required("price_token", Decimal(15, 2)),
        Column::required("annual_return", Decimal(5, 2)),
        Column::new("estimated_delivery_time", Integer),
        Column::new("project_status", Text).one_of(&[
            "active",
            "funded",
            "in_progress",
            "distributing_dividends",
            "completed",
            "sold",
        ]),
        Column::new("is_hidden", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("only_investors", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("percentage_private_sale", Decimal(5, 2)).default(ColumnDefault::Int(100)),
        Column::new("main_image", Text),
        Column::new("images", TextArray),
        Column::new("documents", Jsonb),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 5: positions and project history
// =============================================================================

pub static USER_INVESTMENTS: TableDef = TableDef {
    name: "user_investments",
    phase: 5,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("total_amount", Decimal(15, 2)),
        Column::required("token_quantity", Decimal(15, 2)),
        Column::new("investment_type", Text).one_of(&["current", "legacy"]),
        Column::new("last_activity_date", Timestamptz).default(ColumnDefault::Now),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[&["user_id", "investment_id"]],
    row_security: true,
};

pub static INVESTORS: TableDef = TableDef {
    name: "investors",
    phase: 5,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade).unique(),
        Column::new("total_projects", Integer).default(ColumnDefault::Int(0)),
        Column::new("total_volume", Decimal(15, 2)).default(ColumnDefault::Int(0)),
        Column::new("average_ticket", Decimal(15, 2)).default(ColumnDefault::Int(0)),
        Column::new("last_investment_date", Timestamptz),
    ],
    unique: &[],
    row_security: true,
};

pub static PROJECT_TIMELINE: TableDef = TableDef {
    name: "project_timeline",
    phase: 5,
    columns: &[
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("event_type", VarChar(50)),
        Column::required("title", VarChar(255)),
        Column::new("description", Text),
        Column::required("event_date", Timestamptz),
        Column::new("metadata", Jsonb).json_object(),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 6: money movement
// =============================================================================

pub static TRANSACTIONS_MANGOPAY: TableDef = TableDef {
    name: "transactions_mangopay",
    phase: 6,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("transfer_id", VarChar(100)).unique(),
        Column::required("amount", Decimal(15, 2)),
        Column::new("quantity", Decimal(15, 2)),
        Column::required("wallet", VarChar(100)),
        Column::new("retention_rate", Decimal(5, 2)).default(ColumnDefault::Int(0)),
        Column::required("status", Text)
            .one_of(&["pending", "completed", "failed", "cancelled"])
            .default(ColumnDefault::Text("pending")),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static TRANSACTIONS_BLOCKCHAIN: TableDef = TableDef {
    name: "transactions_blockchain",
    phase: 6,
    columns: &[
        Column::required("address", VarChar(100)),
        Column::required("amount", VarChar(100)),
        Column::required("project", VarChar(100)),
        Column::required("timestamp", BigInt),
        Column::required("user", VarChar(100)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static BANK_TRANSFERS: TableDef = TableDef {
    name: "bank_transfers",
    phase: 6,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("transfer_id", VarChar(100)).unique(),
        Column::required("amount", Decimal(15, 2)),
        Column::new("currency", VarChar(10)).default(ColumnDefault::Text("EUR")),
        Column::new("status", Text).one_of(&["pending", "confirmed", "failed"]),
        Column::new("confirmed_at", Timestamptz),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static WITHDRAWALS: TableDef = TableDef {
    name: "withdrawals",
    phase: 6,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("amount", Decimal(15, 2)),
        Column::new("currency", VarChar(10)).default(ColumnDefault::Text("EUR")),
        Column::new("bank_account_id", VarChar(100)),
        Column::new("status", Text).one_of(&["pending", "processing", "completed", "failed"]),
        Column::new("processed_at", Timestamptz),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 7: reservations
// =============================================================================

pub static RESERVES: TableDef = TableDef {
    name: "reserves",
    phase: 7,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("token_quantity", Decimal(15, 2)),
        Column::new("user_wallet", VarChar(100)),
        Column::new("project_wallet", VarChar(100)),
        Column::new("transfer_id", VarChar(100)),
        Column::new("status", Text).one_of(&["PENDING", "CONFIRMED", "MINTED", "FAILED"]),
        Column::new("is_external", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static RESERVES_BLOCKCHAIN: TableDef = TableDef {
    name: "reserves_blockchain",
    phase: 7,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("token_quantity", Decimal(15, 2)),
        Column::required("wallet_address", VarChar(100)),
        Column::new("transaction_hash", VarChar(100)),
        Column::new("status", Text).one_of(&["pending", "confirmed", "expired", "failed"]),
        Column::required("expire_at", Timestamptz),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 8: dividend declarations, wallets, on-chain balances
// =============================================================================

pub static DIVIDENDS: TableDef = TableDef {
    name: "dividends",
    phase: 8,
    columns: &[
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("interest_rate", Decimal(5, 2)),
        Column::required("total_amount", Decimal(15, 2)),
        Column::new("retention_applied", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("is_rent", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("is_last_dividend", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static WALLETS: TableDef = TableDef {
    name: "wallets",
    phase: 8,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("wallet_id", VarChar(100)).unique(),
        Column::new("wallet_type", Text).one_of(&["company", "personal"]),
        Column::new("currency", VarChar(10)).default(ColumnDefault::Text("EUR")),
        Column::new("description", VarChar(500)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("is_primary", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static BLOCKCHAIN_BALANCES: TableDef = TableDef {
    name: "blockchain_balances",
    phase: 8,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::required("token_address", VarChar(100)),
        Column::required("balance_wei", VarChar(100)),
        Column::new("balance_tokens", Decimal(15, 2)),
    ],
    unique: &[&["user_id", "investment_id", "token_address"]],
    row_security: true,
};

// =============================================================================
// Phase 9: rows hanging off phase 8
// =============================================================================

pub static DIVIDEND_CLAIMS: TableDef = TableDef {
    name: "dividend_claims",
    phase: 9,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("investment_id", "investments", OnDelete::Cascade),
        Column::fk("dividend_id", "dividends", OnDelete::Cascade),
        Column::required("capital_invested", Decimal(15, 2)),
        Column::required("token_quantity", Decimal(15, 2)),
        Column::required("gross_interest", Decimal(15, 2)),
        Column::required("gross_return", Decimal(15, 2)),
        Column::required("tax_rate", Decimal(5, 2)),
        Column::required("retention_applied", Decimal(15, 2)),
        Column::required("net_interest", Decimal(15, 2)),
        Column::required("net_return", Decimal(15, 2)),
        Column::required("return_date", Timestamptz),
        Column::new("claimed_at", Timestamptz),
        Column::new("claim_type", Text)
            .one_of(&["wallet", "blockchain"])
            .default(ColumnDefault::Text("wallet")),
        Column::new("wallet_address", VarChar(100)),
        Column::new("transaction_hash", VarChar(100)),
        Column::new("status", Text)
            .one_of(&["pending", "claimed", "failed"])
            .default(ColumnDefault::Text("pending")),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static WALLET_TRANSACTIONS: TableDef = TableDef {
    name: "wallet_transactions",
    phase: 9,
    columns: &[
        Column::fk("wallet_id", "wallets", OnDelete::Cascade),
        Column::new("transaction_type", Text).one_of(&["credit", "debit"]),
        Column::required("amount", Decimal(15, 2)),
        Column::new("currency", VarChar(10)).default(ColumnDefault::Text("EUR")),
        Column::new("description", VarChar(500)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static WALLET_BALANCES: TableDef = TableDef {
    name: "wallet_balances",
    phase: 9,
    columns: &[
        Column::fk("wallet_id", "wallets", OnDelete::Cascade),
        Column::required("balance", Decimal(15, 2)),
        Column::new("currency", VarChar(10)).default(ColumnDefault::Text("EUR")),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 10: compliance
// =============================================================================

pub static KYC_VERIFICATIONS: TableDef = TableDef {
    name: "kyc_verifications",
    phase: 10,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("external_identifier", VarChar(100)).unique(),
        Column::new("status", Text).one_of(REVIEW_STATUSES),
        Column::new("verification_data", Jsonb).json_object(),
        Column::new("error_details", Jsonb).json_object(),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static DOCUMENTS: TableDef = TableDef {
    name: "documents",
    phase: 10,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("document_type", VarChar(50)),
        Column::required("title", VarChar(255)),
        Column::required("filename", VarChar(255)),
        Column::required("file_path", VarChar(500)),
        Column::new("file_url", VarChar(500)),
        Column::required("bucket_name", VarChar(50)),
        Column::new("file_size", BigInt),
        Column::new("mime_type", VarChar(100)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static FISCAL_DOCUMENTS: TableDef = TableDef {
    name: "fiscal_documents",
    phase: 10,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("document_type", VarChar(50)),
        Column::new("tax_id", VarChar(50)),
        Column::new("country", VarChar(100)),
        Column::new("status", Text).one_of(REVIEW_STATUSES),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

// =============================================================================
// Phase 11: configuration and cache
// =============================================================================

pub static SYSTEM_CONFIG: TableDef = TableDef {
    name: "system_config",
    phase: 11,
    columns: &[
        Column::required("config_key", VarChar(100)).unique(),
        Column::required("config_value", Jsonb).json_object(),
        Column::new("description", VarChar(500)),
        Column::new("is_active", Boolean).default(ColumnDefault::Bool(true)),
    ],
    unique: &[],
    row_security: true,
};

pub static CACHE_DATA: TableDef = TableDef {
    name: "cache_data",
    phase: 11,
    columns: &[
        Column::required("cache_key", VarChar(255)).unique(),
        Column::required("cache_value", Jsonb).json_object(),
        Column::required("expires_at", Timestamptz),
    ],
    unique: &[],
    row_security: false,
};

// =============================================================================
// Phases 12-15: bonuses, audit, notifications, role assignments
// =============================================================================

pub static USER_BONUSES: TableDef = TableDef {
    name: "user_bonuses",
    phase: 12,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("bonus_type", VarChar(50)),
        Column::required("amount", Decimal(15, 2)),
        Column::new("percentage", Decimal(5, 2)),
        Column::new("project_name", VarChar(255)),
        Column::new("project_id", VarChar(100)),
        Column::new("user_email", VarChar(255)),
        Column::new("is_applied", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("email_sent", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static AUDIT_LOGS: TableDef = TableDef {
    name: "audit_logs",
    phase: 13,
    columns: &[
        Column::fk("user_id", "users", OnDelete::SetNull),
        Column::required("action_type", VarChar(50)),
        Column::required("resource_type", VarChar(50)),
        Column::new("resource_id", VarChar(100)),
        Column::new("old_values", Jsonb).json_object(),
        Column::new("new_values", Jsonb).json_object(),
        Column::new("ip_address", Inet),
        Column::new("user_agent", VarChar(500)),
    ],
    unique: &[],
    row_security: true,
};

pub static USER_NOTIFICATIONS: TableDef = TableDef {
    name: "user_notifications",
    phase: 14,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::required("notification_type", VarChar(50)),
        Column::required("title", VarChar(255)),
        Column::required("message", Text),
        Column::new("is_read", Boolean).default(ColumnDefault::Bool(false)),
        Column::new("read_at", Timestamptz),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static USER_PREFERENCES: TableDef = TableDef {
    name: "user_preferences",
    phase: 14,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::new("alert_new_document", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_withdrawn_success", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_deposit_success", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_invest_success", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_new_project", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_project_financed", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_transfer_digital_wallet", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("alert_otp", Boolean).default(ColumnDefault::Bool(true)),
        Column::new("firebase_id", VarChar(100)),
    ],
    unique: &[],
    row_security: true,
};

pub static ROLE_ASSIGNMENTS: TableDef = TableDef {
    name: "role_assignments",
    phase: 15,
    columns: &[
        Column::fk("user_id", "users", OnDelete::Cascade),
        Column::fk("role_id", "roles", OnDelete::Cascade),
        Column::fk("assigned_by", "users", OnDelete::NoAction),
        Column::new("assigned_at", Timestamptz).default(ColumnDefault::Now),
        Column::new("expires_at", Timestamptz),
    ],
    unique: &[&["user_id", "role_id"]],
    row_security: true,
};

pub static ADMIN_ACTIONS: TableDef = TableDef {
    name: "admin_actions",
    phase: 15,
    columns: &[
        Column::fk("admin_id", "users", OnDelete::Cascade),
        Column::required("action_type", VarChar(50)),
        Column::required("resource_type", VarChar(50)),
        Column::new("resource_id", VarChar(100)),
        Column::new("details", Jsonb).json_object(),
        Column::new("ip_address", Inet),
        Column::new("user_agent", VarChar(500)),
    ],
    unique: &[],
    row_security: true,
};

/// All tables, in provisioning order within each phase.
pub static TABLES: &[&TableDef] = &[
    &ROLES,
    &COUNTRIES,
    &TRANSACTION_TYPES,
    &PROJECT_STATUSES,
    &USERS,
    &USER_PROFILES,
    &TWO_FACTOR_AUTH,
    &PERMISSIONS,
    &INVESTMENTS,
    &USER_INVESTMENTS,
    &INVESTORS,
    &PROJECT_TIMELINE,
    &TRANSACTIONS_MANGOPAY,
    &TRANSACTIONS_BLOCKCHAIN,
    &BANK_TRANSFERS,
    &WITHDRAWALS,
    &RESERVES,
    &RESERVES_BLOCKCHAIN,
    &DIVIDENDS,
    &WALLETS,
    &BLOCKCHAIN_BALANCES,
    &DIVIDEND_CLAIMS,
    &WALLET_TRANSACTIONS,
    &WALLET_BALANCES,
    &KYC_VERIFICATIONS,
    &DOCUMENTS,
    &FISCAL_DOCUMENTS,
    &SYSTEM_CONFIG,
    &CACHE_DATA,
    &USER_BONUSES,
    &AUDIT_LOGS,
    &USER_NOTIFICATIONS,
    &USER_PREFERENCES,
    &ROLE_ASSIGNMENTS,
    &ADMIN_ACTIONS,
];

const fn index(
    name: &'static str,
    table: &'static str,
    columns: &'static [&'static str],
) -> IndexDef {
    IndexDef {
        name,
        table,
        columns,
    }
}

pub static INDEXES: &[IndexDef] = &[
    index("idx_users_firebase_uid", "users", &["firebase_uid"]),
    index("idx_users_email", "users", &["email"]),
    index("idx_users_is_active", "users", &["is_active"]),
    index("idx_users_is_deleted", "users", &["is_deleted"]),
    index("idx_investments_firebase_id", "investments", &["firebase_id"]),
    index("idx_investments_project_status", "investments", &["project_status"]),
    index("idx_investments_is_hidden", "investments", &["is_hidden"]),
    index("idx_investments_is_deleted", "investments", &["is_deleted"]),
    index("idx_investments_status_hidden", "investments", &["project_status", "is_hidden"]),
    index("idx_transactions_mangopay_user_id", "transactions_mangopay", &["user_id"]),
    index("idx_transactions_mangopay_investment_id", "transactions_mangopay", &["investment_id"]),
    index("idx_transactions_mangopay_status", "transactions_mangopay", &["status"]),
    index("idx_transactions_user_status", "transactions_mangopay", &["user_id", "status"]),
    index("idx_transactions_investment_status", "transactions_mangopay", &["investment_id", "status"]),
    index("idx_reserves_user_id", "reserves", &["user_id"]),
    index("idx_reserves_investment_id", "reserves", &["investment_id"]),
    index("idx_reserves_status", "reserves", &["status"]),
    index("idx_reserves_user_investment", "reserves", &["user_id", "investment_id"]),
    index("idx_reserves_user_status", "reserves", &["user_id", "status"]),
    index("idx_dividend_claims_user_id", "dividend_claims", &["user_id"]),
    index("idx_dividend_claims_investment_id", "dividend_claims", &["investment_id"]),
    index("idx_dividend_claims_status", "dividend_claims", &["status"]),
    index("idx_dividend_claims_user_investment", "dividend_claims", &["user_id", "investment_id"]),
    index("idx_dividend_claims_user_status", "dividend_claims", &["user_id", "status"]),
    index("idx_audit_logs_user_id", "audit_logs", &["user_id"]),
    index("idx_audit_logs_resource_type", "audit_logs", &["resource_type"]),
    index("idx_audit_logs_created_at", "audit_logs", &["created_at"]),
    index("idx_audit_logs_user_created", "audit_logs", &["user_id", "created_at"]),
    index("idx_audit_logs_resource_created", "audit_logs", &["resource_type", "created_at"]),
    index("idx_user_investments_user_investment", "user_investments", &["user_id", "investment_id"]),
    index("idx_user_investments_user_deleted", "user_investments", &["user_id", "is_deleted"]),
    index("idx_user_notifications_user_read", "user_notifications", &["user_id", "is_read"]),
    index("idx_wallet_transactions_wallet_type", "wallet_transactions", &["wallet_id", "transaction_type"]),
    index("idx_kyc_verifications_user_status", "kyc_verifications", &["user_id", "status"]),
    index("idx_documents_user_type", "documents", &["user_id", "document_type"]),
    index("idx_user_profiles_user_type", "user_profiles", &["user_id", "profile_type"]),
    index("idx_wallets_user_type", "wallets", &["user_id", "wallet_type"]),
    index("idx_wallets_user_active", "wallets", &["user_id", "is_active"]),
];

const OWNS_PROFILE: &str = "auth.uid()::text = firebase_uid";
const OWNS_ROW: &str = "auth.uid()::text = (SELECT firebase_uid FROM users WHERE id = user_id)";
const IS_ADMIN: &str = "EXISTS (SELECT 1 FROM role_assignments ra JOIN roles r ON ra.role_id = r.id \
     WHERE ra.user_id = (SELECT id FROM users WHERE firebase_uid = auth.uid()::text) \
     AND r.name IN ('SuperAdmin', 'Admin'))";

const fn using(
    table: &'static str,
    name: &'static str,
    command: PolicyCommand,
    predicate: &'static str,
) -> PolicyDef {
    PolicyDef {
        table,
        policy: RowPolicy {
            name,
            command,
            using: Some(predicate),
            with_check: None,
        },
    }
}

const fn checking(
    table: &'static str,
    name: &'static str,
    predicate: &'static str,
) -> PolicyDef {
    PolicyDef {
        table,
        policy: RowPolicy {
            name,
            command: PolicyCommand::Insert,
            using: None,
            with_check: Some(predicate),
        },
    }
}

pub static POLICIES: &[PolicyDef] = &[
    using("users", "Users can view own profile", PolicyCommand::Select, OWNS_PROFILE),
    using("users", "Users can update own profile", PolicyCommand::Update, OWNS_PROFILE),
    using("user_profiles", "Users can view own profile", PolicyCommand::Select, OWNS_ROW),
    using("user_profiles", "Users can update own profile", PolicyCommand::Update, OWNS_ROW),
    using("investments", "Anyone can view active investments", PolicyCommand::Select, "is_hidden = false"),
    using("investments", "Admins can manage investments", PolicyCommand::All, IS_ADMIN),
    using("user_investments", "Users can view own investments", PolicyCommand::Select, OWNS_ROW),
    checking("user_investments", "Users can create own investments", OWNS_ROW),
    using("transactions_mangopay", "Users can view own transactions", PolicyCommand::Select, OWNS_ROW),
    checking("transactions_mangopay", "Users can create own transactions", OWNS_ROW),
    using("wallets", "Users can view own wallets", PolicyCommand::Select, OWNS_ROW),
    using("wallets", "Users can manage own wallets", PolicyCommand::All, OWNS_ROW),
    using("documents", "Users can view own documents", PolicyCommand::Select, OWNS_ROW),
    checking("documents", "Users can upload own documents", OWNS_ROW),
    using("user_notifications", "Users can view own notifications", PolicyCommand::Select, OWNS_ROW),
    using("user_notifications", "Users can update own notifications", PolicyCommand::Update, OWNS_ROW),
    using("user_preferences", "Users can view own preferences", PolicyCommand::Select, OWNS_ROW),
    using("user_preferences", "Users can update own preferences", PolicyCommand::Update, OWNS_ROW),
    using("audit_logs", "Admins can view audit logs", PolicyCommand::Select, IS_ADMIN),
    using("system_config", "Admins can manage system config", PolicyCommand::All, IS_ADMIN),
];

/// A complete schema: tables, indexes and row policies.
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    pub tables: &'static [&'static TableDef],
    pub indexes: &'static [IndexDef],
    pub policies: &'static [PolicyDef],
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The application schema.
    pub fn builtin() -> Self {
        Self {
            tables: TABLES,
            indexes: INDEXES,
            policies: POLICIES,
        }
    }

    /// A catalog with tables only.
    pub fn with_tables(tables: &'static [&'static TableDef]) -> Self {
        Self {
            tables,
            indexes: &[],
            policies: &[],
        }
    }

    pub fn phases(&self) -> Vec<Phase> {
        group_phases(self.tables)
    }

    pub fn phase(&self, number: u32) -> Option<Phase> {
        self.phases().into_iter().find(|p| p.number == number)
    }

    pub fn table(&self, name: &str) -> Option<&'static TableDef> {
        self.tables.iter().copied().find(|t| t.name == name)
    }

    /// Declared default of a boolean column, if the catalog has one.
    pub fn bool_default(&self, table: &str, column: &str) -> Option<bool> {
        match self.table(table)?.column(column)?.default {
            Some(ColumnDefault::Bool(b)) => Some(b),
            _ => None,
        }
    }

    /// Foreign keys whose target is missing or not in a strictly lower phase.
    pub fn phase_order_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for table in self.tables {
            for dep in table.dependencies() {
                match self.table(dep) {
                    None => violations.push(format!(
                        "{} (phase {}) references unknown table {}",
                        table.name, table.phase, dep
                    )),
                    Some(target) if target.phase >= table.phase => violations.push(format!(
                        "{} (phase {}) references {} (phase {})",
                        table.name, table.phase, dep, target.phase
                    )),
                    Some(_) => {}
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_foreign_keys_point_to_lower_phases() {
        let violations = Catalog::builtin().phase_order_violations();
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_phase_order_violation_detected() {
        static EARLY: TableDef = TableDef {
            name: "early",
            phase: 4,
            columns: &[Column::fk("late_id", "late", OnDelete::Cascade)],
            unique: &[],
            row_security: false,
        };
        static LATE: TableDef = TableDef {
            name: "late",
            phase: 6,
            columns: &[],
            unique: &[],
            row_security: false,
        };
        static TABLES: &[&TableDef] = &[&EARLY, &LATE];

        let violations = Catalog::with_tables(TABLES).phase_order_violations();
        assert_eq!(violations, vec!["early (phase 4) references late (phase 6)"]);
    }

    #[test]
    fn test_table_names_unique() {
        let mut seen = HashSet::new();
        for table in TABLES {
            assert!(seen.insert(table.name), "duplicate table {}", table.name);
        }
    }

    #[test]
    fn test_phases_are_contiguous_from_one() {
        let phases = Catalog::builtin().phases();
        let numbers: Vec<u32> = phases.iter().map(|p| p.number).collect();
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        assert_eq!(numbers, expected);
        assert_eq!(phases[1].table_names(), vec!["users"]);
    }

    #[test]
    fn test_indexes_and_policies_reference_known_columns() {
        let catalog = Catalog::builtin();
        for idx in catalog.indexes {
            let table = catalog.table(idx.table).expect(idx.table);
            for column in idx.columns {
                assert!(table.column(column).is_some(), "{}.{}", idx.table, column);
            }
        }
        for def in catalog.policies {
            let table = catalog.table(def.table).expect(def.table);
            assert!(table.row_security, "policy on {} without RLS", def.table);
        }
    }

    #[test]
    fn test_unique_constraints_reference_known_columns() {
        for table in TABLES {
            for columns in table.unique {
                for column in *columns {
                    assert!(table.column(column).is_some(), "{}.{}", table.name, column);
                }
            }
        }
    }

    #[test]
    fn test_bool_default_reads_schema() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.bool_default("users", "is_active"), Some(true));
        assert_eq!(catalog.bool_default("users", "is_verified"), Some(false));
        assert_eq!(catalog.bool_default("user_preferences", "alert_otp"), Some(true));
        assert_eq!(catalog.bool_default("users", "email"), None);
        assert_eq!(catalog.bool_default("nope", "is_active"), None);
    }
}
