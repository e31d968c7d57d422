//! API-key authentication and ownership authorization.

use std::fmt;

use gallery_core::{ApiKey, Principal, Registration};

use crate::error::{RegistryError, Result};
use crate::principal::PrincipalDirectory;

/// An operation gated on registration ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Push,
    Delete,
    Verify,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Push => write!(f, "push"),
            Action::Delete => write!(f, "delete"),
            Action::Verify => write!(f, "verify"),
        }
    }
}

/// Resolve a raw key token to the principal holding it.
///
/// A token that is not a well-formed key is a bad request; a well-formed key
/// nobody holds is forbidden.
pub fn authenticate(directory: &dyn PrincipalDirectory, token: &str) -> Result<Principal> {
    let key = ApiKey::parse(token)?;
    directory
        .find_by_api_key(&key)?
        .ok_or(RegistryError::UnknownKey)
}

/// Whether `principal` may perform `action` on `registration`.
///
/// Every gated action requires ownership.
pub fn authorize(principal: &Principal, registration: &Registration, _action: Action) -> bool {
    registration.is_owned_by(&principal.username)
}

/// Like [`authorize`], but failing with `Forbidden`.
pub fn require(principal: &Principal, registration: &Registration, action: Action) -> Result<()> {
    if authorize(principal, registration, action) {
        Ok(())
    } else {
        tracing::debug!(
            user = %principal.username,
            id = %registration.id,
            %action,
            "authorization denied"
        );
        Err(RegistryError::Forbidden {
            action,
            id: registration.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::principal::MemoryDirectory;

    #[test]
    fn authenticate_known_key() {
        let directory = MemoryDirectory::new();
        let alice = directory.add("alice").unwrap();
        let found = authenticate(&directory, &alice.api_key.to_string()).unwrap();
        assert_eq!(found.username, "alice");
    }

    #[test]
    fn malformed_token_is_bad_request() {
        let directory = MemoryDirectory::new();
        let err = authenticate(&directory, "definitely-not-a-key").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidKeyFormat { .. }));
        assert_eq!(err.status(), Status::BadRequest);
    }

    #[test]
    fn unknown_key_is_forbidden() {
        let directory = MemoryDirectory::new();
        let err = authenticate(&directory, &ApiKey::generate().to_string()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKey));
        assert_eq!(err.status(), Status::Forbidden);
    }

    #[test]
    fn only_owners_are_authorized() {
        let directory = MemoryDirectory::new();
        let alice = directory.add("alice").unwrap();
        let bob = directory.add("bob").unwrap();
        let registration = Registration::new("A", "alice");

        assert!(authorize(&alice, &registration, Action::Delete));
        assert!(!authorize(&bob, &registration, Action::Verify));

        let err = require(&bob, &registration, Action::Delete).unwrap_err();
        assert_eq!(err.to_string(), "the API key is not authorized to delete 'A'");
    }
}
