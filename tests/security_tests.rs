//! Security integration tests: certificate login, user registration and
//! role/feature authorization over an in-memory ledger.

use anyhow::Result;
use rcgen::{CertificateParams, DnType, KeyPair};

use skillbill::identity::CallerCertificate;
use skillbill::models::{doctype, User};
use skillbill::security::password::hash_password;
use skillbill::security::seed::{self, feature_id};
use skillbill::security::seed_defaults;
use skillbill::storage::StateStore;
use skillbill::{AccessLevel, AppError, CredentialValidator, Invocation, MemoryStore, PermissionEvaluator, Repository, Role};

const MSP: &str = "Org1MSP";

fn cert_pem(common_name: &str) -> String {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, common_name);
    let key_pair = KeyPair::generate().expect("key generation should succeed");
    params.self_signed(&key_pair).expect("self-signing should succeed").pem()
}

fn key_hex(pem: &str) -> String {
    CallerCertificate::from_pem(pem.as_bytes()).unwrap().public_key_hex()
}

fn role_id(store: &MemoryStore, name: &str) -> String {
    let perms = PermissionEvaluator::new();
    perms.find_roles(store, &[format!("rolename,{name}")]).unwrap().remove(0).role_id
}

/// Seeded ledger with alice registered as a `Users` member.
fn ledger_with_alice() -> (MemoryStore, String) {
    let store = MemoryStore::in_memory();
    assert!(seed_defaults(&store).unwrap());
    let pem = cert_pem("alice");
    let users_role = role_id(&store, seed::USERS);
    let inv = Invocation::with_certificate(&store, MSP, pem.clone());
    CredentialValidator::new().register_user(&inv, "alice", &users_role, "s3cret").unwrap();
    (store, pem)
}

#[test]
fn alice_login_scenarios() -> Result<()> {
    let (store, alice_pem) = ledger_with_alice();
    let creds = CredentialValidator::new();

    let inv = Invocation::with_certificate(&store, MSP, alice_pem.clone());
    assert!(creds.validate_login(&inv, Some("s3cret"))?);
    assert!(!creds.validate_login(&inv, Some("wrong"))?);
    // existence check only
    assert!(creds.validate_login(&inv, None)?);
    assert!(creds.validate_login(&inv, Some(""))?);

    // same name, different key pair
    let impostor = Invocation::with_certificate(&store, MSP, cert_pem("alice"));
    assert!(!creds.validate_login(&impostor, Some("s3cret"))?);

    let bob = Invocation::with_certificate(&store, MSP, cert_pem("bob"));
    assert!(matches!(creds.validate_login(&bob, Some("s3cret")), Err(AppError::Authentication(_))));
    assert!(matches!(creds.validate_login(&bob, None), Err(AppError::Authentication(_))));
    Ok(())
}

#[test]
fn missing_creator_fails_authentication() {
    let (store, _) = ledger_with_alice();
    let inv = Invocation::new(&store, Vec::new());
    let err = CredentialValidator::new().validate_login(&inv, Some("s3cret")).unwrap_err();
    assert!(matches!(err, AppError::Authentication(_)));
    assert_eq!(err.code_str(), "UNAUTHENTICATED");
}

#[test]
fn corrupt_user_record_surfaces_decode_error() {
    let (store, _) = ledger_with_alice();
    store.put_state("mallory", br#"{"adlogin":7,"doctype":"user"}"#).unwrap();
    let inv = Invocation::with_certificate(&store, MSP, cert_pem("mallory"));
    let err = CredentialValidator::new().validate_login(&inv, None).unwrap_err();
    assert!(matches!(err, AppError::Decode { .. }));
}

#[test]
fn corrupt_user_record_can_be_deleted_and_reregistered() -> Result<()> {
    let (store, _) = ledger_with_alice();
    store.put_state("mallory", br#"{"adlogin":7,"doctype":"user"}"#)?;
    let users: Repository<User> = Repository::new();
    users.delete(&store, "mallory")?;
    assert_eq!(store.get_state("mallory")?, None);

    let pem = cert_pem("mallory");
    let inv = Invocation::with_certificate(&store, MSP, pem);
    let creds = CredentialValidator::new();
    assert!(matches!(creds.validate_login(&inv, None), Err(AppError::Authentication(_))));
    creds.register_user(&inv, "mallory", &role_id(&store, seed::USERS), "pw")?;
    assert!(creds.validate_login(&inv, Some("pw"))?);
    Ok(())
}

#[test]
fn authenticate_returns_principal() -> Result<()> {
    let (store, alice_pem) = ledger_with_alice();
    let creds = CredentialValidator::new();
    let inv = Invocation::with_certificate(&store, "Org2MSP", alice_pem);
    let p = creds.authenticate(&inv, Some("s3cret"))?;
    assert_eq!(p.user_id, "alice");
    assert_eq!(p.role_id, role_id(&store, seed::USERS));
    assert_eq!(p.mspid, "Org2MSP");
    assert!(matches!(creds.authenticate(&inv, Some("nope")), Err(AppError::Authentication(_))));
    Ok(())
}

#[test]
fn register_and_add_user_uniqueness() -> Result<()> {
    let (store, alice_pem) = ledger_with_alice();
    let creds = CredentialValidator::new();
    let users_role = role_id(&store, seed::USERS);

    // same login
    let err = creds.add_user(&store, "alice", "00ff", &users_role, "h").unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    // same key under another login
    let err = creds.add_user(&store, "alice2", &key_hex(&alice_pem), &users_role, "h").unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    // unknown role
    let err = creds.add_user(&store, "carol", "abcd", "NO-SUCH-ROLE", "h").unwrap_err();
    assert!(err.is_not_found());

    let carol_pem = cert_pem("carol");
    let inv = Invocation::with_certificate(&store, MSP, carol_pem.clone());
    assert_eq!(creds.register_user(&inv, "carol", &users_role, "pw")?, "carol");

    let users = creds.get_all_users(&store)?;
    assert_eq!(users.iter().map(|u| u.ad_login.as_str()).collect::<Vec<_>>(), vec!["alice", "carol"]);
    assert!(users.iter().all(|u| u.hashed_password.starts_with("$argon2")));

    let found = creds.get_user_by_public_key(&store, &key_hex(&carol_pem))?;
    assert_eq!(found.ad_login, "carol");
    assert!(creds.get_user_by_public_key(&store, "beef").unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn duplicate_public_keys_are_a_conflict_on_lookup() -> Result<()> {
    let store = MemoryStore::in_memory();
    let users: Repository<User> = Repository::new();
    for login in ["a", "b"] {
        users.save(&store, login, &User::new(login, "abcd", "R", &hash_password("x")?))?;
    }
    let err = CredentialValidator::new().get_user_by_public_key(&store, "abcd").unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    Ok(())
}

#[test]
fn seeded_permissions() -> Result<()> {
    let (store, alice_pem) = ledger_with_alice();
    let perms = PermissionEvaluator::new();
    let inv = Invocation::with_certificate(&store, MSP, alice_pem);

    assert!(perms.check_user_permission(&inv, feature_id::ROLE_MANAGEMENT, AccessLevel::ReadWrite)?);
    assert!(perms.check_user_permission(&inv, feature_id::KNOWLEDGE_GROUP, AccessLevel::ReadOnly)?);
    assert!(!perms.check_user_permission(&inv, feature_id::SKILL_MANAGEMENT, AccessLevel::ReadOnly)?);
    assert!(!perms.check_user_permission(&inv, feature_id::ROLE_MANAGEMENT, AccessLevel::Unknown)?);

    let bob = Invocation::with_certificate(&store, MSP, cert_pem("bob"));
    let err = perms.check_user_permission(&bob, feature_id::ROLE_MANAGEMENT, AccessLevel::ReadOnly).unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
    assert_eq!(err.code_str(), "PERMISSION_DENIED");
    Ok(())
}

#[test]
fn read_only_grant_does_not_satisfy_read_write() -> Result<()> {
    let store = MemoryStore::in_memory();
    let perms = PermissionEvaluator::new();
    let creds = CredentialValidator::new();
    let role = perms.create_role(&store, "Viewers")?;
    let feature = perms.create_feature(&store, "Reports")?;
    perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadOnly)?;

    let pem = cert_pem("dave");
    let inv = Invocation::with_certificate(&store, MSP, pem);
    creds.register_user(&inv, "dave", &role.role_id, "pw")?;

    assert!(perms.check_user_permission(&inv, &feature.feature_id, AccessLevel::ReadOnly)?);
    assert!(!perms.check_user_permission(&inv, &feature.feature_id, AccessLevel::ReadWrite)?);

    perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadWrite)?;
    assert!(perms.check_user_permission(&inv, &feature.feature_id, AccessLevel::ReadWrite)?);
    Ok(())
}

#[test]
fn unknown_stored_level_never_grants() -> Result<()> {
    let store = MemoryStore::in_memory();
    let perms = PermissionEvaluator::new();
    let role = perms.create_role(&store, "Odd")?;
    let feature = perms.create_feature(&store, "Thing")?;
    let grant = perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadWrite)?;
    // rewrite the stored level to something outside the enum
    let raw = store.get_state(&grant.id)?.unwrap();
    let mut doc: serde_json::Value = serde_json::from_slice(&raw)?;
    doc["accesslevel"] = serde_json::json!(42);
    store.put_state(&grant.id, &serde_json::to_vec(&doc)?)?;

    let inv = Invocation::with_certificate(&store, MSP, cert_pem("erin"));
    CredentialValidator::new().register_user(&inv, "erin", &role.role_id, "pw")?;
    assert!(!perms.check_user_permission(&inv, &feature.feature_id, AccessLevel::ReadOnly)?);
    Ok(())
}

#[test]
fn assign_twice_creates_two_records_and_remove_is_strict() -> Result<()> {
    let store = MemoryStore::in_memory();
    let perms = PermissionEvaluator::new();
    let role = perms.create_role(&store, "Editors")?;
    let feature = perms.create_feature(&store, "Docs")?;

    let a = perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadWrite)?;
    let b = perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadWrite)?;
    assert_ne!(a.id, b.id);
    assert_eq!(perms.features_by_role_ids(&store, &[role.role_id.as_str()])?.len(), 2);

    assert_eq!(perms.remove_feature_from_role(&store, &role.role_id, &feature.feature_id)?, 2);
    assert!(perms.features_by_role_ids(&store, &[role.role_id.as_str()])?.is_empty());
    assert!(perms.remove_feature_from_role(&store, &role.role_id, &feature.feature_id).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn assign_validates_inputs() -> Result<()> {
    let store = MemoryStore::in_memory();
    let perms = PermissionEvaluator::new();
    let role = perms.create_role(&store, "R")?;
    let feature = perms.create_feature(&store, "F")?;
    let unknown = perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::Unknown);
    assert!(matches!(unknown, Err(AppError::InvalidArgument(_))));
    assert!(perms.assign_feature_role(&store, "nope", &feature.feature_id, AccessLevel::ReadOnly).unwrap_err().is_not_found());
    assert!(perms.assign_feature_role(&store, &role.role_id, "nope", AccessLevel::ReadOnly).unwrap_err().is_not_found());
    Ok(())
}

#[test]
fn features_by_role_ids_projects_grants() -> Result<()> {
    let store = MemoryStore::in_memory();
    seed_defaults(&store)?;
    let perms = PermissionEvaluator::new();
    let admins = role_id(&store, seed::ADMINISTRATORS);
    let users = role_id(&store, seed::USERS);

    let grants = perms.features_by_role_ids(&store, &[admins.as_str(), users.as_str()])?;
    assert_eq!(grants.len(), 11);
    assert!(grants.iter().all(|g| g.access_level == AccessLevel::ReadWrite));
    assert_eq!(grants.iter().filter(|g| g.role_id == users).count(), 2);

    let only_users = perms.features_by_role_ids(&store, &[users])?;
    let mut ids: Vec<&str> = only_users.iter().map(|g| g.feature_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec![feature_id::ROLE_MANAGEMENT, feature_id::KNOWLEDGE_GROUP]);

    let none: [&str; 0] = [];
    assert!(matches!(perms.features_by_role_ids(&store, &none), Err(AppError::InvalidArgument(_))));
    Ok(())
}

#[test]
fn seeding_is_idempotent() -> Result<()> {
    let store = MemoryStore::in_memory();
    assert!(seed_defaults(&store)?);
    let before = store.len();
    assert!(!seed_defaults(&store)?);
    assert_eq!(store.len(), before);

    let perms = PermissionEvaluator::new();
    assert_eq!(perms.get_roles(&store)?.len(), 4);
    let features = perms.get_features(&store)?;
    assert_eq!(features.len(), 9);
    assert!(features.iter().any(|f| f.feature_id == feature_id::TRANSLATION_MANAGEMENT && f.feature_name == "TranslationManagement"));
    // 4 roles + 9 features + 11 grants
    assert_eq!(before, 24);
    Ok(())
}

#[test]
fn role_and_feature_lifecycle() -> Result<()> {
    let store = MemoryStore::in_memory();
    let perms = PermissionEvaluator::new();
    let role = perms.create_role(&store, "Temp")?;
    assert_eq!(role.role_id, role.role_id.to_uppercase());
    let feature = perms.create_feature(&store, "Scratch")?;
    perms.assign_feature_role(&store, &role.role_id, &feature.feature_id, AccessLevel::ReadOnly)?;

    assert_eq!(perms.find_roles(&store, &["rolename,Temp"])?, vec![role.clone()]);
    assert!(perms.find_roles(&store, &["rolename,Other"])?.is_empty());
    // pairs cannot reach other doctypes
    assert_eq!(perms.find_features(&store, &[format!("doctype,{}", doctype::ROLE)])?, vec![feature.clone()]);
    assert!(matches!(perms.find_roles(&store, &["rolename"]), Err(AppError::InvalidArgument(_))));

    perms.delete_role(&store, &role.role_id)?;
    assert!(perms.get_roles(&store)?.is_empty());
    assert!(perms.features_by_role_ids(&store, &[role.role_id.as_str()])?.is_empty());
    assert!(perms.delete_role(&store, &role.role_id).unwrap_err().is_not_found());

    perms.delete_feature(&store, &feature.feature_id)?;
    assert!(perms.get_features(&store)?.is_empty());
    assert!(matches!(perms.create_role(&store, "  "), Err(AppError::InvalidArgument(_))));

    let roles: Repository<Role> = Repository::new();
    assert!(roles.get_all(&store)?.is_empty());
    Ok(())
}
