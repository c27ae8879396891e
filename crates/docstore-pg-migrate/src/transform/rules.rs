//! Per-collection field rules.
//!
//! Every built-in rule derives the row `id` from the document id, so rows in
//! other tables can point at it with [`Coercion::Reference`] before the
//! referenced row is even loaded.

/// How a column's value is produced from the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coercion {
    /// The document id as text.
    SourceId,
    /// Text, or the default when absent.
    Text(&'static str),
    /// Text, or NULL when absent.
    OptionalText,
    /// Text; the record is dropped when absent or empty.
    RequiredText,
    /// One of `values`, matched case-insensitively; `default` when absent.
    /// Any other value drops the record.
    Choice {
        values: &'static [&'static str],
        default: &'static str,
    },
    /// Number, or the default when absent or unparsable.
    Numeric(f64),
    /// Number, or NULL when absent or unparsable.
    OptionalNumeric,
    /// Integer, or the default when absent or unparsable.
    Integer(i64),
    /// Integer, or NULL when absent or unparsable.
    OptionalInteger,
    /// Seconds since the epoch; the transform time when absent.
    UnixSeconds,
    /// Explicit boolean, else the column's configured default.
    Bool,
    /// Instant; the transform time when absent or unparsable.
    Timestamp,
    /// Instant, or NULL when absent or unparsable.
    OptionalTimestamp,
    /// Array of text; `[]` when absent or not an array.
    TextArray,
    /// JSON object; `{}` when absent or not an object.
    JsonObject,
    /// JSON array or object passed through; `{}` otherwise.
    Json,
    /// Row id of the document with this id in the named collection; NULL
    /// when absent.
    Reference(&'static str),
}

/// One destination column and where its value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub column: &'static str,
    /// Document fields to try, first present wins.
    pub sources: &'static [&'static str],
    pub coercion: Coercion,
}

/// Rule set for one collection.
#[derive(Debug)]
pub struct TransformRule {
    pub collection: &'static str,
    pub table: &'static str,
    pub fields: &'static [FieldRule],
}

const fn field(
    column: &'static str,
    sources: &'static [&'static str],
    coercion: Coercion,
) -> FieldRule {
    FieldRule {
        column,
        sources,
        coercion,
    }
}

const fn source_id(column: &'static str) -> FieldRule {
    field(column, &[], Coercion::SourceId)
}

const fn user_ref(sources: &'static [&'static str]) -> FieldRule {
    field("user_id", sources, Coercion::Reference("users"))
}

const fn investment_ref() -> FieldRule {
    field(
        "investment_id",
        &["investmentId", "projectId"],
        Coercion::Reference("investments"),
    )
}

const CREATED_AT: FieldRule = field("created_at", &["createdAt"], Coercion::Timestamp);
const UPDATED_AT: FieldRule = field("updated_at", &["updatedAt"], Coercion::Timestamp);

const PROFILE_TYPES: &[&str] = &["individual", "company"];
const REVIEW_STATUSES: &[&str] = &["pending", "approved", "rejected"];

pub static USERS: TransformRule = TransformRule {
    collection: "users",
    table: "users",
    fields: &[
        source_id("firebase_uid"),
        field("email", &["email"], Coercion::Text("")),
        field("display_name", &["displayName", "name"], Coercion::Text("")),
        field("phone", &["phone"], Coercion::Text("")),
        field("is_active", &["isActive"], Coercion::Bool),
        field("is_verified", &["emailVerified"], Coercion::Bool),
        field(
            "profile_type",
            &["profileType"],
            Coercion::Choice {
                values: PROFILE_TYPES,
                default: "individual",
            },
        ),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static INVESTMENTS: TransformRule = TransformRule {
    collection: "investments",
    table: "investments",
    fields: &[
        source_id("firebase_id"),
        field("title", &["title"], Coercion::Text("")),
        field("description", &["description"], Coercion::Text("")),
        field("company", &["company"], Coercion::Text("")),
        field("token_symbol", &["tokenSymbol"], Coercion::Text("")),
        field("token_address", &["tokenAddress"], Coercion::Text("")),
        field("seller_address", &["sellerAddress"], Coercion::Text("")),
        field("project_wallet", &["projectWallet"], Coercion::Text("")),
        field("amount_to_sell", &["amountToSell"], Coercion::Numeric(0.0)),
        field("amount_sold", &["amountSold"], Coercion::Numeric(0.0)),
        field("price_token", &["priceToken"], Coercion::Numeric(0.0)),
        field("annual_return", &["annualReturn"], Coercion::Numeric(0.0)),
        field(
            "estimated_delivery_time",
            &["estimatedDeliveryTime"],
            Coercion::Integer(0),
        ),
        field(
            "project_status",
            &["projectStatus"],
            Coercion::Choice {
                values: &[
                    "active",
                    "funded",
                    "in_progress",
                    "distributing_dividends",
                    "completed",
                    "sold",
                ],
                default: "active",
            },
        ),
        field("is_hidden", &["isHidden"], Coercion::Bool),
        field("only_investors", &["onlyInvestors"], Coercion::Bool),
        field(
            "percentage_private_sale",
            &["percentagePrivateSale"],
            Coercion::Numeric(100.0),
        ),
        field("main_image", &["mainImage"], Coercion::Text("")),
        field("images", &["images"], Coercion::TextArray),
        field("documents", &["documents"], Coercion::Json),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static USER_INVESTMENTS: TransformRule = TransformRule {
    collection: "user-investments",
    table: "user_investments",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        investment_ref(),
        field("total_amount", &["totalAmount"], Coercion::Numeric(0.0)),
        field("token_quantity", &["tokenQuantity"], Coercion::Numeric(0.0)),
        field(
            "investment_type",
            &["investmentType"],
            Coercion::Choice {
                values: &["current", "legacy"],
                default: "current",
            },
        ),
        field(
            "last_activity_date",
            &["lastActivityDate"],
            Coercion::Timestamp,
        ),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static TRANSACTIONS_MANGOPAY: TransformRule = TransformRule {
    collection: "transactions-mangopay",
    table: "transactions_mangopay",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        investment_ref(),
        field(
            "transfer_id",
            &["transferId", "transactionId"],
            Coercion::RequiredText,
        ),
        field("amount", &["amount"], Coercion::Numeric(0.0)),
        field("quantity", &["quantity", "tokenQuantity"], Coercion::OptionalNumeric),
        field("wallet", &["wallet", "walletId"], Coercion::Text("")),
        field("retention_rate", &["retentionRate"], Coercion::Numeric(0.0)),
        field(
            "status",
            &["status"],
            Coercion::Choice {
                values: &["pending", "completed", "failed", "cancelled"],
                default: "pending",
            },
        ),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static TRANSACTIONS_BLOCKCHAIN: TransformRule = TransformRule {
    collection: "transactions-blockchain",
    table: "transactions_blockchain",
    fields: &[
        source_id("firebase_id"),
        field("address", &["address", "from"], Coercion::Text("")),
        field("amount", &["amount", "value"], Coercion::Text("0")),
        field("project", &["project", "projectAddress"], Coercion::Text("")),
        field("timestamp", &["timestamp", "blockTimestamp"], Coercion::UnixSeconds),
        field("user", &["user", "to"], Coercion::Text("")),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static RESERVES: TransformRule = TransformRule {
    collection: "reserves",
    table: "reserves",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        investment_ref(),
        field(
            "token_quantity",
            &["tokenQuantity", "quantity"],
            Coercion::Numeric(0.0),
        ),
        field("user_wallet", &["userWallet"], Coercion::OptionalText),
        field("project_wallet", &["projectWallet"], Coercion::OptionalText),
        field("transfer_id", &["transferId"], Coercion::OptionalText),
        field(
            "status",
            &["status"],
            Coercion::Choice {
                values: &["PENDING", "CONFIRMED", "MINTED", "FAILED"],
                default: "PENDING",
            },
        ),
        field("is_external", &["isExternal"], Coercion::Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static DIVIDENDS: TransformRule = TransformRule {
    collection: "dividends",
    table: "dividends",
    fields: &[
        source_id("firebase_id"),
        investment_ref(),
        field("interest_rate", &["interestRate"], Coercion::Numeric(0.0)),
        field("total_amount", &["totalAmount", "amount"], Coercion::Numeric(0.0)),
        field("retention_applied", &["retentionApplied"], Coercion::Bool),
        field("is_rent", &["isRent"], Coercion::Bool),
        field("is_last_dividend", &["isLastDividend"], Coercion::Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static DIVIDEND_CLAIMS: TransformRule = TransformRule {
    collection: "dividend-claims",
    table: "dividend_claims",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        investment_ref(),
        field("dividend_id", &["dividendId"], Coercion::Reference("dividends")),
        field("capital_invested", &["capitalInvested"], Coercion::Numeric(0.0)),
        field("token_quantity", &["tokenQuantity"], Coercion::Numeric(0.0)),
        field("gross_interest", &["grossInterest"], Coercion::Numeric(0.0)),
        field("gross_return", &["grossReturn"], Coercion::Numeric(0.0)),
        field("tax_rate", &["taxRate"], Coercion::Numeric(0.0)),
        field("retention_applied", &["retentionApplied"], Coercion::Numeric(0.0)),
        field("net_interest", &["netInterest"], Coercion::Numeric(0.0)),
        field("net_return", &["netReturn"], Coercion::Numeric(0.0)),
        field("return_date", &["returnDate"], Coercion::Timestamp),
        field("claimed_at", &["claimedAt"], Coercion::OptionalTimestamp),
        field(
            "claim_type",
            &["claimType"],
            Coercion::Choice {
                values: &["wallet", "blockchain"],
                default: "wallet",
            },
        ),
        field("wallet_address", &["walletAddress"], Coercion::OptionalText),
        field(
            "transaction_hash",
            &["transactionHash", "txHash"],
            Coercion::OptionalText,
        ),
        field(
            "status",
            &["status"],
            Coercion::Choice {
                values: &["pending", "claimed", "failed"],
                default: "pending",
            },
        ),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static WALLETS: TransformRule = TransformRule {
    collection: "wallets",
    table: "wallets",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field("wallet_id", &["walletId", "mangopayWalletId"], Coercion::RequiredText),
        field(
            "wallet_type",
            &["walletType", "type"],
            Coercion::Choice {
                values: &["company", "personal"],
                default: "personal",
            },
        ),
        field("currency", &["currency"], Coercion::Text("EUR")),
        field("description", &["description"], Coercion::OptionalText),
        field("is_active", &["isActive"], Coercion::Bool),
        field("is_primary", &["isPrimary"], Coercion::Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static KYC_RESULTS: TransformRule = TransformRule {
    collection: "kyc-results",
    table: "kyc_verifications",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field(
            "external_identifier",
            &["externalIdentifier", "identifier", "verificationId"],
            Coercion::RequiredText,
        ),
        field(
            "status",
            &["status"],
            Coercion::Choice {
                values: REVIEW_STATUSES,
                default: "pending",
            },
        ),
        field(
            "verification_data",
            &["verificationData", "data"],
            Coercion::JsonObject,
        ),
        field("error_details", &["errorDetails", "errors"], Coercion::JsonObject),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static DOCUMENTS: TransformRule = TransformRule {
    collection: "documents",
    table: "documents",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field("document_type", &["documentType", "type"], Coercion::Text("other")),
        field("title", &["title", "name"], Coercion::Text("")),
        field("filename", &["filename", "fileName"], Coercion::Text("")),
        field("file_path", &["filePath", "path"], Coercion::Text("")),
        field("file_url", &["fileUrl", "url"], Coercion::OptionalText),
        field("bucket_name", &["bucketName", "bucket"], Coercion::Text("documents")),
        field("file_size", &["fileSize", "size"], Coercion::OptionalInteger),
        field("mime_type", &["mimeType", "contentType"], Coercion::OptionalText),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static FISCAL_DOCUMENTS: TransformRule = TransformRule {
    collection: "fiscal-documents",
    table: "fiscal_documents",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field("document_type", &["documentType", "type"], Coercion::Text("other")),
        field("tax_id", &["taxId"], Coercion::OptionalText),
        field("country", &["country"], Coercion::OptionalText),
        field(
            "status",
            &["status"],
            Coercion::Choice {
                values: REVIEW_STATUSES,
                default: "pending",
            },
        ),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static USER_BONUSES: TransformRule = TransformRule {
    collection: "user-bonuses",
    table: "user_bonuses",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field("bonus_type", &["bonusType", "type"], Coercion::Text("")),
        field("amount", &["amount"], Coercion::Numeric(0.0)),
        field("percentage", &["percentage"], Coercion::OptionalNumeric),
        field("project_name", &["projectName"], Coercion::OptionalText),
        field("project_id", &["projectId"], Coercion::OptionalText),
        field("user_email", &["userEmail", "email"], Coercion::OptionalText),
        field("is_applied", &["isApplied"], Coercion::Bool),
        field("email_sent", &["emailSent"], Coercion::Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static USER_NOTIFICATIONS: TransformRule = TransformRule {
    collection: "user-notifications",
    table: "user_notifications",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId"]),
        field(
            "notification_type",
            &["notificationType", "type"],
            Coercion::Text("general"),
        ),
        field("title", &["title"], Coercion::Text("")),
        field("message", &["message", "body"], Coercion::Text("")),
        field("is_read", &["isRead", "read"], Coercion::Bool),
        field("read_at", &["readAt"], Coercion::OptionalTimestamp),
        CREATED_AT,
        UPDATED_AT,
    ],
};

pub static USER_PANEL: TransformRule = TransformRule {
    collection: "user-panel",
    table: "user_preferences",
    fields: &[
        source_id("firebase_id"),
        user_ref(&["userId", "uid"]),
        field("alert_new_document", &["alertNewDocument"], Coercion::Bool),
        field("alert_withdrawn_success", &["alertWithdrawnSuccess"], Coercion::Bool),
        field("alert_deposit_success", &["alertDepositSuccess"], Coercion::Bool),
        field("alert_invest_success", &["alertInvestSuccess"], Coercion::Bool),
        field("alert_new_project", &["alertNewProject"], Coercion::Bool),
        field("alert_project_financed", &["alertProjectFinanced"], Coercion::Bool),
        field(
            "alert_transfer_digital_wallet",
            &["alertTransferDigitalWallet"],
            Coercion::Bool,
        ),
        field("alert_otp", &["alertOtp"], Coercion::Bool),
        CREATED_AT,
        UPDATED_AT,
    ],
};

/// Every built-in rule.
pub static BUILTIN_RULES: &[&TransformRule] = &[
    &USERS,
    &INVESTMENTS,
    &USER_INVESTMENTS,
    &TRANSACTIONS_MANGOPAY,
    &TRANSACTIONS_BLOCKCHAIN,
    &RESERVES,
    &DIVIDENDS,
    &DIVIDEND_CLAIMS,
    &WALLETS,
    &KYC_RESULTS,
    &DOCUMENTS,
    &FISCAL_DOCUMENTS,
    &USER_BONUSES,
    &USER_NOTIFICATIONS,
    &USER_PANEL,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::BUILTIN_MAPPINGS;
    use crate::schema::Catalog;

    #[test]
    fn test_every_mapping_has_a_rule_for_its_table() {
        for (collection, table) in BUILTIN_MAPPINGS {
            let rule = BUILTIN_RULES
                .iter()
                .find(|r| r.collection == *collection)
                .unwrap_or_else(|| panic!("no rule for {}", collection));
            assert_eq!(rule.table, *table);
        }
    }

    #[test]
    fn test_rule_columns_exist_with_matching_kinds() {
        let catalog = Catalog::builtin();
        for rule in BUILTIN_RULES {
            let table = catalog.table(rule.table).expect(rule.table);
            for f in rule.fields {
                let column = table
                    .column(f.column)
                    .unwrap_or_else(|| panic!("{}.{} not in schema", rule.table, f.column));
                if f.coercion == Coercion::Bool {
                    assert_eq!(column.ty, crate::schema::ColumnType::Boolean, "{}", f.column);
                }
                if let Coercion::Reference(collection) = f.coercion {
                    let target = BUILTIN_MAPPINGS
                        .iter()
                        .find(|(c, _)| *c == collection)
                        .map(|(_, t)| *t);
                    assert_eq!(
                        column.references.map(|r| r.table),
                        target,
                        "{}.{}",
                        rule.table,
                        f.column
                    );
                }
            }
        }
    }

    #[test]
    fn test_choice_values_match_check_constraints() {
        let catalog = Catalog::builtin();
        for rule in BUILTIN_RULES {
            let table = catalog.table(rule.table).expect(rule.table);
            for f in rule.fields {
                if let Coercion::Choice { values, default } = f.coercion {
                    let column = table.column(f.column).expect(f.column);
                    assert_eq!(
                        column.check,
                        Some(crate::schema::ColumnCheck::OneOf(values)),
                        "{}.{}",
                        rule.table,
                        f.column
                    );
                    assert!(values.contains(&default));
                }
            }
        }
    }
}
