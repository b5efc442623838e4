//! Identifier casing policies.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

/// How declared identifiers are mapped to database identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasingPolicy {
    /// Identifiers are used as declared.
    #[default]
    None,
    /// `createdAt` becomes `created_at`.
    SnakeCase,
    /// `created_at` becomes `createdAt`.
    CamelCase,
}

impl CasingPolicy {
    /// Applies the policy to an identifier.
    #[must_use]
    pub fn apply(self, ident: &str) -> String {
        match self {
            Self::None => ident.to_string(),
            Self::SnakeCase => ident.to_case(Case::Snake),
            Self::CamelCase => ident.to_case(Case::Camel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casing_policies() {
        assert_eq!(CasingPolicy::None.apply("createdAt"), "createdAt");
        assert_eq!(CasingPolicy::SnakeCase.apply("createdAt"), "created_at");
        assert_eq!(CasingPolicy::CamelCase.apply("created_at"), "createdAt");
    }

    #[test]
    fn test_snake_and_camel_forms_collide() {
        assert_eq!(
            CasingPolicy::SnakeCase.apply("userId"),
            CasingPolicy::SnakeCase.apply("user_id")
        );
    }
}
