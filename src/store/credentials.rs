use std::collections::HashMap;

use crate::error::PipelineError;
use crate::models::{Credential, Row};

/// CredentialStore maps hostnames to login secrets for one pipeline run.
/// Built from the row set; a hostname without both a username and a
/// password is simply absent.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    creds: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Scan the rows once. Later rows for the same hostname win.
    pub fn resolve(rows: &[Row]) -> Self {
        let mut creds = HashMap::new();
        for row in rows {
            let hostname = row.hostname.trim();
            let username = row.username.trim();
            let password = row.password.trim();
            if hostname.is_empty() || username.is_empty() || password.is_empty() {
                continue;
            }
            creds.insert(
                hostname.to_string(),
                Credential {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            );
        }
        Self { creds }
    }

    pub fn get(&self, hostname: &str) -> Option<&Credential> {
        self.creds.get(hostname)
    }

    /// Like `get`, but absence becomes a per-device `CredentialNotFound`
    pub fn require(&self, hostname: &str) -> Result<Credential, PipelineError> {
        self.get(hostname)
            .cloned()
            .ok_or_else(|| PipelineError::CredentialNotFound {
                hostname: hostname.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.creds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hostname: &str, user: &str, pass: &str) -> Row {
        Row {
            hostname: hostname.into(),
            username: user.into(),
            password: pass.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_last_row_wins() {
        let store = CredentialStore::resolve(&[
            row("R1", "admin", "first"),
            row("R1", "ops", "second"),
        ]);
        let cred = store.get("R1").unwrap();
        assert_eq!(cred.username, "ops");
        assert_eq!(cred.password, "second");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_incomplete_rows_are_skipped() {
        let store = CredentialStore::resolve(&[
            row("R1", "admin", ""),
            row("R2", "", "secret"),
            row("", "admin", "admin"),
            row(" S1 ", " admin ", " admin "),
        ]);
        assert!(store.get("R1").is_none());
        assert!(store.get("R2").is_none());
        assert_eq!(store.get("S1").unwrap().username, "admin");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_incomplete_later_row_does_not_erase_earlier() {
        let store = CredentialStore::resolve(&[row("R1", "admin", "pw"), row("R1", "", "")]);
        assert_eq!(store.get("R1").unwrap().password, "pw");
    }

    #[test]
    fn test_require_reports_missing_hostname() {
        let store = CredentialStore::default();
        assert!(store.is_empty());
        assert_eq!(
            store.require("R9"),
            Err(PipelineError::CredentialNotFound { hostname: "R9".into() })
        );
    }
}
