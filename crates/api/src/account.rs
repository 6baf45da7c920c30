//! Account and filename identifiers.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, hex};
use serde::{Deserialize, Serialize};

use crate::InputError;

/// Maximum filename length in bytes.
pub const MAX_FILENAME_LEN: usize = 1024;

/// An account, identified by its `0x`-prefixed 20-byte address.
///
/// Displays (and serializes) as lowercase hex so that storage keys are canonical regardless
/// of the checksum casing the caller used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account(Address);

impl Account {
    /// Wrap an address.
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// The underlying address.
    pub const fn address(&self) -> Address {
        self.0
    }
}

impl From<Address> for Account {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl FromStr for Account {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| InputError::InvalidAccount {
            input: s.to_owned(),
            reason: reason.to_owned(),
        };

        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if digits.len() != 40 {
            return Err(invalid("expected 40 hex digits"));
        }

        let address = digits
            .parse::<Address>()
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(Self(address))
    }
}

impl TryFrom<String> for Account {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Account> for String {
    fn from(account: Account) -> Self {
        account.to_string()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// A validated filename within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filename(String);

impl Filename {
    /// Validate and wrap a filename.
    pub fn new(name: impl Into<String>) -> Result<Self, InputError> {
        let name = name.into();
        if name.is_empty() {
            return Err(InputError::EmptyFilename);
        }
        if name.len() > MAX_FILENAME_LEN {
            return Err(InputError::FilenameTooLong {
                len: name.len(),
                max: MAX_FILENAME_LEN,
            });
        }
        if name.contains('\0') {
            return Err(InputError::InvalidFilename {
                reason: "contains a NUL byte".to_owned(),
            });
        }
        Ok(Self(name))
    }

    /// The filename as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Filename {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Filename {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Filename> for String {
    fn from(name: Filename) -> Self {
        name.0
    }
}

impl AsRef<str> for Filename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn test_account_parse_is_case_insensitive() {
        let upper: Account = CHECKSUMMED.parse().unwrap();
        let lower: Account = CHECKSUMMED.to_lowercase().parse().unwrap();

        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), CHECKSUMMED.to_lowercase());
    }

    #[test]
    fn test_account_rejects_malformed() {
        for input in [
            "",
            "0x",
            "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0x1234",
            "0xzzzzb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        ] {
            assert!(
                matches!(input.parse::<Account>(), Err(InputError::InvalidAccount { .. })),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_account_serde_as_string() {
        let account: Account = CHECKSUMMED.parse().unwrap();
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", CHECKSUMMED.to_lowercase()));

        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_filename_validation() {
        assert_eq!(Filename::new(""), Err(InputError::EmptyFilename));
        assert!(matches!(Filename::new("a\0b"), Err(InputError::InvalidFilename { .. })));
        assert!(matches!(
            Filename::new("x".repeat(MAX_FILENAME_LEN + 1)),
            Err(InputError::FilenameTooLong { .. })
        ));

        let name = Filename::new("photos/nyan.gif").unwrap();
        assert_eq!(name.as_str(), "photos/nyan.gif");
    }
}
