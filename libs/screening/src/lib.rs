//! Sanction screening: a pure decision over a payment and a reference list.

use std::path::Path;

use sanction_api::PaymentPayload;

/// Reason attached to every failed screening.
pub const SANCTION_FAILED_REASON: &str = "Sanction Check has Failed";

#[derive(Debug, thiserror::Error)]
pub enum ReferenceListError {
    #[error("cannot read reference list {path}: {source}")]
    Read { path: String, source: std::io::Error },
}

/// Names and addresses that must not take part in a payment.
///
/// Entries are stored lowercased, so matching is case-insensitive and exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceList {
    entries: Vec<String>,
}

impl ReferenceList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        list.extend(entries);
        list
    }

    /// One entry per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReferenceListError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ReferenceListError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(
            content.lines().filter(|l| !l.trim_start().starts_with('#')),
        ))
    }

    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let entry = entry.to_lowercase();
            if !self.entries.contains(&entry) {
                self.entries.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        self.entries.iter().any(|e| *e == value)
    }
}

/// Outcome of [`screen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screening {
    pub failed: bool,
    pub reason: Option<&'static str>,
}

impl Screening {
    const PASSED: Screening = Screening { failed: false, reason: None };
    const FAILED: Screening = Screening { failed: true, reason: Some(SANCTION_FAILED_REASON) };
}

/// Screen the four identity fields of `payment` against `list`.
pub fn screen(payment: &PaymentPayload, list: &ReferenceList) -> Screening {
    if payment.identity_fields().iter().any(|f| list.contains(f)) {
        Screening::FAILED
    } else {
        Screening::PASSED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanction_api::ScaledAmount;

    fn payment(from: &str, to: &str) -> PaymentPayload {
        PaymentPayload {
            request_id: "REQ-1".into(),
            created_at: 1_700_000_000_000,
            status: "NEW".into(),
            total: ScaledAmount::from_unscaled(1250),
            username_from: from.into(),
            username_from_address: format!("{from} street 1"),
            username_to: to.into(),
            username_to_address: format!("{to} avenue 2"),
        }
    }

    #[test]
    fn no_match_passes() {
        let s = screen(&payment("Alice", "Bob"), &ReferenceList::new(["Mallory"]));
        assert_eq!(s, Screening { failed: false, reason: None });
    }

    #[test]
    fn match_is_case_insensitive() {
        for entry in ["ACME", "acme", "Acme"] {
            let list = ReferenceList::new([entry]);
            assert!(screen(&payment("acme", "Bob"), &list).failed);
            assert!(screen(&payment("Alice", "Acme"), &list).failed);
        }
    }

    #[test]
    fn match_is_exact() {
        let list = ReferenceList::new(["ali"]);
        assert!(!screen(&payment("Alice", "Bob"), &list).failed);
    }

    #[test]
    fn address_fields_are_screened() {
        let list = ReferenceList::new(["BOB AVENUE 2"]);
        let s = screen(&payment("Alice", "Bob"), &list);
        assert_eq!(s.reason, Some(SANCTION_FAILED_REASON));
    }

    #[test]
    fn repeated_calls_agree() {
        let list = ReferenceList::new(["alice", "eve"]);
        let p = payment("Alice", "Bob");
        let first = screen(&p, &list);
        for _ in 0..100 {
            assert_eq!(screen(&p, &list), first);
        }
    }

    #[test]
    fn empty_list_passes_everything() {
        assert!(!screen(&payment("Alice", "Bob"), &ReferenceList::default()).failed);
    }

    #[test]
    fn file_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        std::fs::write(&path, "# sanctioned parties\n\n  Eve  \nMALLORY\neve\n").unwrap();
        let list = ReferenceList::from_file(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert!(screen(&payment("mallory", "Bob"), &list).failed);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = ReferenceList::from_file("/nonexistent/list.txt").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/list.txt"));
    }
}
