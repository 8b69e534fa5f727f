use std::fmt;

/// Portal account (meter) identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Returns `None` for blank ids, which the portal uses for unbound meters.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate meter from the portal's account list.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Advanced Metering Infrastructure capable.
    pub is_ami: bool,
}

/// Picks the first AMI-capable meter, otherwise the first meter listed.
pub fn select_account(accounts: &[Account]) -> Option<&Account> {
    for account in accounts {
        if account.is_ami {
            return Some(account);
        }
    }
    accounts.first()
}
