//! Storage key layout.
//!
//! ```text
//! usage/<account>               UsageRecord
//! debt/<account>                DebtRecord
//! refcount/<content hash>       reference count
//! files/<account>/<filename>    FileEntry
//! ```
//!
//! Accounts are rendered as lowercase `0x` hex, so every account has exactly one key.

use std::collections::BTreeSet;

use pinmeter_api::{Account, ContentHash, Filename};
use pinmeter_storage::KvStore;
use tracing::warn;

use crate::BillingError;

/// Prefix of all usage records.
pub const USAGE_PREFIX: &str = "usage/";
/// Prefix of all debt records.
pub const DEBT_PREFIX: &str = "debt/";
/// Prefix of all reference counts.
pub const REFCOUNT_PREFIX: &str = "refcount/";
/// Prefix of all file entries.
pub const FILES_PREFIX: &str = "files/";

/// Key of an account's usage record.
pub fn usage(account: &Account) -> String {
    format!("{USAGE_PREFIX}{account}")
}

/// Key of an account's debt record.
pub fn debt(account: &Account) -> String {
    format!("{DEBT_PREFIX}{account}")
}

/// Key of a content hash's reference count.
pub fn refcount(hash: &ContentHash) -> String {
    format!("{REFCOUNT_PREFIX}{hash}")
}

/// Key of a single file entry.
pub fn file(account: &Account, filename: &Filename) -> String {
    format!("{FILES_PREFIX}{account}/{filename}")
}

/// Prefix of every file entry owned by `account`.
pub fn files(account: &Account) -> String {
    format!("{FILES_PREFIX}{account}/")
}

/// Parse the account out of a `usage/` or `debt/` key.
pub fn account_from_key(key: &str, prefix: &str) -> Option<Account> {
    key.strip_prefix(prefix)?.parse().ok()
}

/// Lock key of an account's past-due gate.
pub(crate) fn account_lock(account: &Account) -> String {
    format!("account/{account}")
}

/// Accounts holding a usage or debt record in `store`, ordered by address.
///
/// Keys that do not parse as an account are skipped with a warning.
pub async fn active_accounts(store: &dyn KvStore) -> Result<BTreeSet<Account>, BillingError> {
    let mut accounts = BTreeSet::new();
    for prefix in [USAGE_PREFIX, DEBT_PREFIX] {
        for entry in store.list(prefix).await? {
            match account_from_key(&entry.key, prefix) {
                Some(account) => {
                    accounts.insert(account);
                }
                None => warn!(key = %entry.key, "skipping malformed account key"),
            }
        }
    }
    Ok(accounts)
}
