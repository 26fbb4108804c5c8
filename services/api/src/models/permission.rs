//! Permission codes granted to users

use serde::Serialize;
use std::collections::BTreeSet;

pub const ITEMS_READ: &str = "items:read";
pub const ITEMS_WRITE: &str = "items:write";

/// The set of permission codes held by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Permissions(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_only_granted_codes() {
        let permissions: Permissions = [ITEMS_READ].into_iter().collect();
        assert!(permissions.includes(ITEMS_READ));
        assert!(!permissions.includes(ITEMS_WRITE));
        assert_eq!(permissions.len(), 1);
    }

    #[test]
    fn duplicates_collapse() {
        let permissions: Permissions = vec!["items:read", "items:read"].into_iter().collect();
        assert_eq!(permissions.len(), 1);
    }
}
