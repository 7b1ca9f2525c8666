use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single permission on a resource or within a group.
///
/// Permissions are not hierarchical here: the resolver returns exactly what
/// was granted. The `MANAGE > EDIT > VIEW` convention is applied by callers
/// when they grant sets, never by the resolution code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    View,
    Edit,
    Manage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "VIEW",
            Permission::Edit => "EDIT",
            Permission::Manage => "MANAGE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deduplicated set of permissions.
///
/// Stored in the database and serialized on the wire as a JSON array of
/// permission names. Duplicates collapse on insert; ordering is not
/// significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Vec<Permission>)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full `{VIEW, EDIT, MANAGE}` set, as granted to creators.
    pub fn all() -> Self {
        [Permission::View, Permission::Edit, Permission::Manage]
            .into_iter()
            .collect()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    pub fn union_with(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Serialize for a TEXT column.
    pub fn to_db(&self) -> String {
        // a set of unit variants cannot fail to serialize
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse a TEXT column. Elements decode one at a time; an unknown name
    /// is skipped without discarding the recognized grants stored beside
    /// it, and non-array content reads as empty.
    pub fn from_db(raw: &str) -> Self {
        let values: Vec<serde_json::Value> = serde_json::from_str(raw).unwrap_or_default();
        values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Permission>(value).ok())
            .collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Permission>> for PermissionSet {
    fn from(value: Vec<Permission>) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for permission in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(permission.as_str())?;
        }
        Ok(())
    }
}
