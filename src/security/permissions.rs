use tracing::{debug, info};

use super::credentials::load_caller;
use crate::error::{AppError, AppResult};
use crate::identity::Invocation;
use crate::models::{doctype, new_id, AccessLevel, Feature, FeatureGrant, Role, RoleFeature};
use crate::query::Selector;
use crate::repository::Repository;
use crate::storage::StateStore;

/// Fields returned by the multi-role grant lookup.
pub const GRANT_FIELDS: [&str; 3] = ["accesslevel", "roleid", "featureid"];

/// Role to feature authorization, plus management of roles, features and grants.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionEvaluator {
    roles: Repository<Role>,
    features: Repository<Feature>,
    grants: Repository<RoleFeature>,
}

impl PermissionEvaluator {
    pub fn new() -> Self { Self::default() }

    /// Whether the caller's role holds at least `requested` on `feature_id`.
    pub fn check_user_permission(&self, inv: &Invocation<'_>, feature_id: &str, requested: AccessLevel) -> AppResult<bool> {
        let (user, _) = load_caller(inv).map_err(AppError::into_authorization)?;
        if requested == AccessLevel::Unknown {
            return Ok(false);
        }
        let grants = self.grants_for(inv, &user.role_id, feature_id).map_err(AppError::into_authorization)?;
        let granted = grants.iter().any(|g| g.access_level.satisfies(requested));
        debug!(
            target: "skillbill::security",
            user = %user.ad_login, role = %user.role_id, feature = feature_id, %requested, granted,
            "permission check"
        );
        Ok(granted)
    }

    fn grants_for(&self, store: &dyn StateStore, role_id: &str, feature_id: &str) -> AppResult<Vec<RoleFeature>> {
        let selector = Selector::for_doctype(doctype::ROLE_FEATURE)
            .eq("roleid", role_id)
            .eq("featureid", feature_id)
            .to_json_string();
        self.grants.get_by_query(store, &selector)
    }

    /// Grant `level` on a feature to a role. Every call creates a new grant record.
    pub fn assign_feature_role(
        &self,
        store: &dyn StateStore,
        role_id: &str,
        feature_id: &str,
        level: AccessLevel,
    ) -> AppResult<RoleFeature> {
        if level == AccessLevel::Unknown {
            return Err(AppError::invalid("access level must be ReadOnly or ReadWrite"));
        }
        self.roles.get_by_key(store, role_id)?;
        self.features.get_by_key(store, feature_id)?;
        let grant = RoleFeature::new(role_id, feature_id, level);
        self.grants.save(store, &grant.id, &grant)?;
        info!(target: "skillbill::security", role = role_id, feature = feature_id, %level, id = %grant.id, "feature assigned");
        Ok(grant)
    }

    /// Delete every grant of `feature_id` to `role_id`; returns how many were removed.
    /// Fails with `NotFound` when there was nothing to remove.
    pub fn remove_feature_from_role(&self, store: &dyn StateStore, role_id: &str, feature_id: &str) -> AppResult<usize> {
        let grants = self.grants_for(store, role_id, feature_id)?;
        if grants.is_empty() {
            return Err(AppError::not_found(format!("no grant of feature '{feature_id}' to role '{role_id}'")));
        }
        for g in &grants {
            self.grants.delete(store, &g.id)?;
        }
        info!(target: "skillbill::security", role = role_id, feature = feature_id, removed = grants.len(), "feature removed");
        Ok(grants.len())
    }

    /// Grants held by any of `role_ids`, projected to `(accesslevel, roleid, featureid)`.
    pub fn features_by_role_ids<S: AsRef<str>>(&self, store: &dyn StateStore, role_ids: &[S]) -> AppResult<Vec<FeatureGrant>> {
        if role_ids.is_empty() {
            return Err(AppError::invalid("at least one role id is required"));
        }
        let selector = Selector::new()
            .any_of("roleid", role_ids.iter().map(|r| r.as_ref()))
            .eq("doctype", doctype::ROLE_FEATURE)
            .fields(GRANT_FIELDS)
            .to_json_string();
        self.grants
            .query_records(store, &selector)?
            .into_iter()
            .map(|(key, doc)| serde_json::from_value(doc).map_err(|e| AppError::decode(key, e)))
            .collect()
    }

    pub fn create_role(&self, store: &dyn StateStore, name: &str) -> AppResult<Role> {
        if name.trim().is_empty() {
            return Err(AppError::invalid("role name must not be empty"));
        }
        let role = Role::new(new_id(), name);
        self.roles.save(store, &role.role_id, &role)?;
        info!(target: "skillbill::security", id = %role.role_id, name, "role created");
        Ok(role)
    }

    /// Delete a role together with the grants that reference it.
    pub fn delete_role(&self, store: &dyn StateStore, role_id: &str) -> AppResult<()> {
        self.roles.delete(store, role_id)?;
        let orphans = self.delete_grants_where(store, "roleid", role_id)?;
        info!(target: "skillbill::security", id = role_id, grants = orphans, "role deleted");
        Ok(())
    }

    pub fn create_feature(&self, store: &dyn StateStore, name: &str) -> AppResult<Feature> {
        if name.trim().is_empty() {
            return Err(AppError::invalid("feature name must not be empty"));
        }
        let feature = Feature::new(new_id(), name);
        self.features.save(store, &feature.feature_id, &feature)?;
        info!(target: "skillbill::security", id = %feature.feature_id, name, "feature created");
        Ok(feature)
    }

    /// Delete a feature together with the grants that reference it.
    pub fn delete_feature(&self, store: &dyn StateStore, feature_id: &str) -> AppResult<()> {
        self.features.delete(store, feature_id)?;
        let orphans = self.delete_grants_where(store, "featureid", feature_id)?;
        info!(target: "skillbill::security", id = feature_id, grants = orphans, "feature deleted");
        Ok(())
    }

    fn delete_grants_where(&self, store: &dyn StateStore, field: &str, value: &str) -> AppResult<usize> {
        let selector = Selector::for_doctype(doctype::ROLE_FEATURE).eq(field, value).to_json_string();
        let grants = self.grants.get_by_query(store, &selector)?;
        for g in &grants {
            self.grants.delete(store, &g.id)?;
        }
        Ok(grants.len())
    }

    pub fn get_roles(&self, store: &dyn StateStore) -> AppResult<Vec<Role>> { self.roles.get_all(store) }

    pub fn get_features(&self, store: &dyn StateStore) -> AppResult<Vec<Feature>> { self.features.get_all(store) }

    /// Roles matching `"field,value"` pairs.
    pub fn find_roles<S: AsRef<str>>(&self, store: &dyn StateStore, pairs: &[S]) -> AppResult<Vec<Role>> {
        let selector = Selector::from_pairs(pairs)?.eq("doctype", doctype::ROLE).to_json_string();
        self.roles.get_by_query(store, &selector)
    }

    /// Features matching `"field,value"` pairs.
    pub fn find_features<S: AsRef<str>>(&self, store: &dyn StateStore, pairs: &[S]) -> AppResult<Vec<Feature>> {
        let selector = Selector::from_pairs(pairs)?.eq("doctype", doctype::FEATURE).to_json_string();
        self.features.get_by_query(store, &selector)
    }
}
