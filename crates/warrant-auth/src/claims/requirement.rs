//! Claim requirement DSL.
//!
//! A requirement is a tree: each node holds predicates that must all pass
//! and alternative nodes of which any one passing satisfies the whole node.
//!
//! ```
//! use warrant_auth::claims::{ClaimRequirement, Claims};
//!
//! let admin_or_auditor = ClaimRequirement::new()
//!     .with_claim_list_part("role", "admin")
//!     .or(ClaimRequirement::new().with_claim("role", "auditor"));
//!
//! let claims = Claims::new().claim("role", "auditor");
//! assert!(admin_or_auditor.validate(&claims).is_ok());
//! ```

use regex::Regex;

use crate::AuthResult;
use crate::claims::Claims;
use crate::error::AuthError;

#[derive(Debug, Clone)]
enum Predicate {
    Equals { key: String, value: String },
    Matches { key: String, pattern: Regex },
    Contains { key: String, substring: String },
    ListPart { key: String, item: String },
}

impl Predicate {
    fn check(&self, claims: &Claims) -> bool {
        match self {
            Self::Equals { key, value } => claims.get(key).is_some_and(|v| v == *value),
            Self::Matches { key, pattern } => claims.get(key).is_some_and(|v| pattern.is_match(&v)),
            Self::Contains { key, substring } => {
                claims.get(key).is_some_and(|v| v.contains(substring.as_str()))
            }
            Self::ListPart { key, item } => claims
                .get(key)
                .is_some_and(|v| v.split(',').any(|part| part == item)),
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. }
            | Self::Matches { key, .. }
            | Self::Contains { key, .. }
            | Self::ListPart { key, .. } => key,
        }
    }
}

/// A composable set of claim predicates.
///
/// Never serialized; it only exists to be evaluated against parsed claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimRequirement {
    predicates: Vec<Predicate>,
    alternatives: Vec<ClaimRequirement>,
}

impl ClaimRequirement {
    /// Creates a requirement that every claim set satisfies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `key` to equal `value` exactly.
    #[must_use]
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Equals {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Requires `key` to match `pattern` anywhere in its value.
    ///
    /// Anchor the pattern with `^...$` for a full match.
    #[must_use]
    pub fn with_claim_match(mut self, key: impl Into<String>, pattern: Regex) -> Self {
        self.predicates.push(Predicate::Matches {
            key: key.into(),
            pattern,
        });
        self
    }

    /// Requires `key` to contain `substring`.
    #[must_use]
    pub fn with_claim_contains(
        mut self,
        key: impl Into<String>,
        substring: impl Into<String>,
    ) -> Self {
        self.predicates.push(Predicate::Contains {
            key: key.into(),
            substring: substring.into(),
        });
        self
    }

    /// Requires `item` to be one of the comma-separated parts of `key`.
    #[must_use]
    pub fn with_claim_list_part(
        mut self,
        key: impl Into<String>,
        item: impl Into<String>,
    ) -> Self {
        self.predicates.push(Predicate::ListPart {
            key: key.into(),
            item: item.into(),
        });
        self
    }

    /// Adds `other` as an alternative to this whole requirement.
    #[must_use]
    pub fn or(mut self, other: ClaimRequirement) -> Self {
        self.alternatives.push(other);
        self
    }

    /// Returns `true` if the requirement has no predicates and no alternatives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty() && self.alternatives.is_empty()
    }

    /// Evaluates the requirement against `claims`.
    ///
    /// Any passing alternative satisfies the requirement outright. Otherwise
    /// every predicate on this node must pass.
    ///
    /// # Errors
    ///
    /// Returns `ClaimsNotConform` on the first failing predicate.
    pub fn validate(&self, claims: &Claims) -> AuthResult<()> {
        if self
            .alternatives
            .iter()
            .any(|alt| alt.validate(claims).is_ok())
        {
            return Ok(());
        }

        match self.predicates.iter().find(|p| !p.check(claims)) {
            Some(failed) => {
                tracing::debug!(claim = failed.key(), "claim requirement not met");
                Err(AuthError::ClaimsNotConform)
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(value: &str) -> Claims {
        Claims::new().claim("role", value)
    }

    #[test]
    fn test_empty_requirement_accepts_everything() {
        let req = ClaimRequirement::new();
        assert!(req.is_empty());
        assert!(req.validate(&Claims::new()).is_ok());
    }

    #[test]
    fn test_with_claim() {
        let req = ClaimRequirement::new().with_claim("role", "admin");
        assert!(req.validate(&role("admin")).is_ok());
        assert!(matches!(
            req.validate(&role("user")),
            Err(AuthError::ClaimsNotConform)
        ));
        assert!(req.validate(&Claims::new()).is_err());
    }

    #[test]
    fn test_with_claim_list_part() {
        let req = ClaimRequirement::new().with_claim_list_part("role", "admin");
        assert!(req.validate(&role("admin,user")).is_ok());
        assert!(req.validate(&role("user,admin")).is_ok());
        assert!(req.validate(&role("administrator,user")).is_err());
        assert!(req.validate(&role("user")).is_err());
    }

    #[test]
    fn test_with_claim_contains() {
        let req = ClaimRequirement::new().with_claim_contains("email", "@acme.");
        assert!(req.validate(&Claims::new().claim("email", "a@acme.io")).is_ok());
        assert!(req.validate(&Claims::new().claim("email", "a@other.io")).is_err());
    }

    #[test]
    fn test_with_claim_match() {
        let req = ClaimRequirement::new()
            .with_claim_match("sub", Regex::new(r"^user-\d+$").unwrap());
        assert!(req.validate(&Claims::new().subject("user-42")).is_ok());
        assert!(req.validate(&Claims::new().subject("user-x")).is_err());

        let partial = ClaimRequirement::new().with_claim_match("sub", Regex::new(r"\d").unwrap());
        assert!(partial.validate(&Claims::new().subject("abc1def")).is_ok());
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let req = ClaimRequirement::new()
            .with_claim("role", "admin")
            .with_claim("tenant", "acme");

        let both = role("admin").claim("tenant", "acme");
        let one = role("admin").claim("tenant", "other");
        assert!(req.validate(&both).is_ok());
        assert!(req.validate(&one).is_err());
    }

    #[test]
    fn test_or_alternation() {
        let req = ClaimRequirement::new()
            .with_claim("role", "a")
            .or(ClaimRequirement::new().with_claim("role", "b"));

        assert!(req.validate(&role("a")).is_ok());
        assert!(req.validate(&role("b")).is_ok());
        assert!(req.validate(&role("c")).is_err());
    }

    #[test]
    fn test_alternative_short_circuits_own_predicates() {
        let req = ClaimRequirement::new()
            .with_claim("role", "admin")
            .with_claim("tenant", "acme")
            .or(ClaimRequirement::new().with_claim("sub", "root"));

        let claims = Claims::new().subject("root");
        assert!(req.validate(&claims).is_ok());
    }

    #[test]
    fn test_nested_alternatives() {
        let inner = ClaimRequirement::new()
            .with_claim("role", "x")
            .or(ClaimRequirement::new().with_claim("role", "y"));
        let req = ClaimRequirement::new().with_claim("role", "a").or(inner);

        assert!(req.validate(&role("y")).is_ok());
        assert!(req.validate(&role("z")).is_err());
    }

    #[test]
    fn test_registered_claims_are_addressable() {
        let req = ClaimRequirement::new().with_claim("iss", "warrant");
        assert!(req.validate(&Claims::new().issuer("warrant")).is_ok());
        assert!(req.validate(&Claims::new().claim("issuer", "warrant")).is_err());
    }
}
