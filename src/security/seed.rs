//! Default roles, features and grants for a fresh ledger.

use tracing::info;

use super::permissions::PermissionEvaluator;
use crate::error::AppResult;
use crate::models::{AccessLevel, Feature, Role};
use crate::repository::Repository;
use crate::storage::StateStore;

pub const ADMINISTRATORS: &str = "Administrators";
pub const PROFESSIONAL_GROUP_ADMINISTRATORS: &str = "ProfessionalGroupAdministrators";
pub const SKILL_ADMINISTRATORS: &str = "SkillAdministrators";
pub const USERS: &str = "Users";

pub const DEFAULT_ROLES: [&str; 4] = [ADMINISTRATORS, PROFESSIONAL_GROUP_ADMINISTRATORS, SKILL_ADMINISTRATORS, USERS];

pub mod feature_id {
    pub const SKILL_PLAN_MANAGEMENT: &str = "025D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const SKILL_MANAGEMENT: &str = "035D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const TRACK_MANAGEMENT: &str = "045D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const MILESTONE_MANAGEMENT: &str = "055D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const USER_MANAGEMENT: &str = "065D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const ROLE_MANAGEMENT: &str = "075D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const KNOWLEDGE_GROUP: &str = "085D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const FEATURE_MANAGEMENT: &str = "095D1E9A-9B52-E811-AA17-FCAA145000C2";
    pub const TRANSLATION_MANAGEMENT: &str = "0A5D1E9A-9B52-E811-AA17-FCAA145000C2";
}

pub const DEFAULT_FEATURES: [(&str, &str); 9] = [
    (feature_id::SKILL_PLAN_MANAGEMENT, "SkillPlanManagement"),
    (feature_id::SKILL_MANAGEMENT, "SkillManagement"),
    (feature_id::TRACK_MANAGEMENT, "TrackManagement"),
    (feature_id::MILESTONE_MANAGEMENT, "MilestoneManagement"),
    (feature_id::USER_MANAGEMENT, "UserManagement"),
    (feature_id::ROLE_MANAGEMENT, "RoleManagement"),
    (feature_id::KNOWLEDGE_GROUP, "KnowledgeGroup"),
    (feature_id::FEATURE_MANAGEMENT, "FeatureManagement"),
    (feature_id::TRANSLATION_MANAGEMENT, "TranslationManagement"),
];

/// Features the `Users` role may read and write.
pub const USER_FEATURES: [&str; 2] = [feature_id::ROLE_MANAGEMENT, feature_id::KNOWLEDGE_GROUP];

/// Install the default data. Does nothing and returns false when any role exists.
pub fn seed_defaults(store: &dyn StateStore) -> AppResult<bool> {
    let roles: Repository<Role> = Repository::new();
    if roles.any(store, |_| true)? {
        return Ok(false);
    }
    let perms = PermissionEvaluator::new();
    let mut admin_id = String::new();
    let mut users_id = String::new();
    for name in DEFAULT_ROLES {
        let role = perms.create_role(store, name)?;
        match name {
            ADMINISTRATORS => admin_id = role.role_id,
            USERS => users_id = role.role_id,
            _ => {}
        }
    }

    let features: Repository<Feature> = Repository::new();
    for (id, name) in DEFAULT_FEATURES {
        features.save(store, id, &Feature::new(id, name))?;
    }

    for (id, _) in DEFAULT_FEATURES {
        perms.assign_feature_role(store, &admin_id, id, AccessLevel::ReadWrite)?;
    }
    for id in USER_FEATURES {
        perms.assign_feature_role(store, &users_id, id, AccessLevel::ReadWrite)?;
    }
    info!(
        target: "skillbill::security",
        roles = DEFAULT_ROLES.len(), features = DEFAULT_FEATURES.len(),
        "default roles and features installed"
    );
    Ok(true)
}
