//! Visibility predicates for resource listings.
//!
//! Listing endpoints never call the resolver per row; instead they append a
//! composable SQL predicate: a resource is listed when it is public, or the
//! authenticated caller holds the required permission on it directly or
//! through a group (for packages, also via the parent catalog's cascade).
//! The public clause stands alone for anonymous principals.
//!
//! Permission columns hold JSON arrays, so membership is tested with a
//! quoted-substring match (`permissions LIKE '%"VIEW"%'`).

use super::permission::Permission;
use super::Principal;

/// A WHERE fragment plus its positional bind values, appended in order
/// after any binds the surrounding query already carries.
#[derive(Debug, Clone)]
pub struct VisibilityFilter {
    pub clause: String,
    pub binds: Vec<String>,
}

fn public_clause(alias: &str) -> String {
    format!("{alias}.is_public = 1")
}

fn like_pattern(permission: Permission) -> String {
    format!("%\"{}\"%", permission.as_str())
}

/// Catalogs visible to the principal, table aliased `c`.
pub fn catalog_filter(principal: &Principal, required: Permission) -> VisibilityFilter {
    let public = public_clause("c");
    let user_id = match principal.user_id() {
        None => return VisibilityFilter { clause: public, binds: Vec::new() },
        Some(id) => id.to_string(),
    };

    let clause = format!(
        "({public} OR \
          EXISTS (SELECT 1 FROM user_catalog_permissions u \
                  WHERE u.catalog_id = c.id AND u.user_id = ? AND u.permissions LIKE ?) OR \
          EXISTS (SELECT 1 FROM group_catalog_permissions gp \
                  INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                  WHERE gp.catalog_id = c.id AND m.user_id = ? AND gp.permissions LIKE ?))"
    );
    let pattern = like_pattern(required);
    VisibilityFilter {
        clause,
        binds: vec![user_id.clone(), pattern.clone(), user_id, pattern],
    }
}

/// Packages visible to the principal, table aliased `p`. The authenticated
/// clause admits direct and group grants on the package itself, plus
/// catalog-level package cascades (direct and group).
pub fn package_filter(principal: &Principal, required: Permission) -> VisibilityFilter {
    let public = public_clause("p");
    let user_id = match principal.user_id() {
        None => return VisibilityFilter { clause: public, binds: Vec::new() },
        Some(id) => id.to_string(),
    };

    let clause = format!(
        "({public} OR \
          EXISTS (SELECT 1 FROM user_package_permissions u \
                  WHERE u.package_id = p.id AND u.user_id = ? AND u.permissions LIKE ?) OR \
          EXISTS (SELECT 1 FROM group_package_permissions gp \
                  INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                  WHERE gp.package_id = p.id AND m.user_id = ? AND gp.permissions LIKE ?) OR \
          EXISTS (SELECT 1 FROM user_catalog_permissions uc \
                  WHERE uc.catalog_id = p.catalog_id AND uc.user_id = ? \
                    AND uc.package_permissions LIKE ?) OR \
          EXISTS (SELECT 1 FROM group_catalog_permissions gc \
                  INNER JOIN group_memberships gm ON gm.group_id = gc.group_id \
                  WHERE gc.catalog_id = p.catalog_id AND gm.user_id = ? \
                    AND gc.package_permissions LIKE ?))"
    );
    let pattern = like_pattern(required);
    VisibilityFilter {
        clause,
        binds: vec![
            user_id.clone(),
            pattern.clone(),
            user_id.clone(),
            pattern.clone(),
            user_id.clone(),
            pattern.clone(),
            user_id,
            pattern,
        ],
    }
}

/// Collections visible to the principal, table aliased `c`.
pub fn collection_filter(principal: &Principal, required: Permission) -> VisibilityFilter {
    let public = public_clause("c");
    let user_id = match principal.user_id() {
        None => return VisibilityFilter { clause: public, binds: Vec::new() },
        Some(id) => id.to_string(),
    };

    let clause = format!(
        "({public} OR \
          EXISTS (SELECT 1 FROM user_collection_permissions u \
                  WHERE u.collection_id = c.id AND u.user_id = ? AND u.permissions LIKE ?) OR \
          EXISTS (SELECT 1 FROM group_collection_permissions gp \
                  INNER JOIN group_memberships m ON m.group_id = gp.group_id \
                  WHERE gp.collection_id = c.id AND m.user_id = ? AND gp.permissions LIKE ?))"
    );
    let pattern = like_pattern(required);
    VisibilityFilter {
        clause,
        binds: vec![user_id.clone(), pattern.clone(), user_id, pattern],
    }
}
