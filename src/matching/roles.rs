//! Social roles and their complements
//!
//! A searcher offers one role and seeks another; two queue entries are
//! compatible when each one's sought role is the complement of the other's
//! offered role.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A social role a user can offer or seek
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Mother,
    Father,
    Son,
    Daughter,
    Mentor,
    Student,
    Brother,
    Sister,
    Friend,
    Grandparent,
    Grandchild,
    /// A role name outside the built-in table
    Other(String),
}

/// Display metadata for a built-in role
#[derive(Debug, Clone, Serialize)]
pub struct RoleInfo {
    pub role: Role,
    pub label: &'static str,
    pub pairs_with: &'static str,
}

impl Role {
    /// The built-in roles, in catalog order
    pub const KNOWN: [Role; 11] = [
        Role::Mother,
        Role::Father,
        Role::Son,
        Role::Daughter,
        Role::Mentor,
        Role::Student,
        Role::Brother,
        Role::Sister,
        Role::Friend,
        Role::Grandparent,
        Role::Grandchild,
    ];

    /// Parse a role name; unknown names become `Role::Other`
    pub fn parse(name: &str) -> Role {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "mother" => Role::Mother,
            "father" => Role::Father,
            "son" => Role::Son,
            "daughter" => Role::Daughter,
            "mentor" => Role::Mentor,
            "student" => Role::Student,
            "brother" => Role::Brother,
            "sister" => Role::Sister,
            "friend" => Role::Friend,
            "grandparent" => Role::Grandparent,
            "grandchild" => Role::Grandchild,
            _ => Role::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Mother => "mother",
            Role::Father => "father",
            Role::Son => "son",
            Role::Daughter => "daughter",
            Role::Mentor => "mentor",
            Role::Student => "student",
            Role::Brother => "brother",
            Role::Sister => "sister",
            Role::Friend => "friend",
            Role::Grandparent => "grandparent",
            Role::Grandchild => "grandchild",
            Role::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Role::Other(_))
    }

    /// The role this one pairs with; unknown roles pair with themselves
    pub fn complement(&self) -> Role {
        match self {
            Role::Mother => Role::Son,
            Role::Son => Role::Mother,
            Role::Father => Role::Daughter,
            Role::Daughter => Role::Father,
            Role::Mentor => Role::Student,
            Role::Student => Role::Mentor,
            Role::Brother => Role::Sister,
            Role::Sister => Role::Brother,
            Role::Friend => Role::Friend,
            Role::Grandparent => Role::Grandchild,
            Role::Grandchild => Role::Grandparent,
            Role::Other(name) => Role::Other(name.clone()),
        }
    }

    /// Catalog of built-in roles for clients choosing what to offer
    pub fn catalog() -> Vec<RoleInfo> {
        Self::KNOWN
            .iter()
            .map(|role| {
                let (label, pairs_with) = match role {
                    Role::Mother => ("Digital Mother", "son/daughter"),
                    Role::Father => ("Digital Father", "son/daughter"),
                    Role::Son => ("Digital Son", "mother/father"),
                    Role::Daughter => ("Digital Daughter", "mother/father"),
                    Role::Mentor => ("Mentor", "student"),
                    Role::Student => ("Student", "mentor"),
                    Role::Brother => ("Digital Brother", "brother/sister"),
                    Role::Sister => ("Digital Sister", "brother/sister"),
                    Role::Friend => ("Global Friend", "friend"),
                    Role::Grandparent => ("Digital Grandparent", "grandchild"),
                    Role::Grandchild => ("Digital Grandchild", "grandparent"),
                    Role::Other(_) => ("Custom", "itself"),
                };
                RoleInfo {
                    role: role.clone(),
                    label,
                    pairs_with,
                }
            })
            .collect()
    }
}

/// Free-function form used by the queue filters
pub fn complement(role: &Role) -> Role {
    role.complement()
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(s))
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}
