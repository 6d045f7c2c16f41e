use tracing::{debug, info, warn};

use super::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};
use crate::identity::{CallerCertificate, Invocation, Principal};
use crate::models::{doctype, Role, User};
use crate::query::Selector;
use crate::repository::Repository;
use crate::storage::StateStore;

/// Load the user record whose login equals the caller's certificate common name.
///
/// Errors are returned unconverted; each caller folds them into its own boundary kind.
pub(crate) fn load_caller<'i>(inv: &'i Invocation<'_>) -> AppResult<(User, &'i CallerCertificate)> {
    let cert = inv.certificate()?;
    let login = cert.common_name();
    let user = Repository::<User>::new()
        .first_or_default(inv, |u| u.ad_login == login)?
        .ok_or_else(|| AppError::not_found(format!("no such user '{login}'")))?;
    Ok((user, cert))
}

/// Authenticates callers against persisted user records and manages those records.
#[derive(Debug, Default, Clone, Copy)]
pub struct CredentialValidator {
    users: Repository<User>,
    roles: Repository<Role>,
}

impl CredentialValidator {
    pub fn new() -> Self { Self::default() }

    /// Check the caller's credentials.
    ///
    /// With a non-empty password both the password and the certificate public key
    /// must match the stored record. Without one, the record's existence is enough.
    /// An unknown caller is an `Authentication` error, a mismatch is `Ok(false)`.
    pub fn validate_login(&self, inv: &Invocation<'_>, password: Option<&str>) -> AppResult<bool> {
        let (user, cert) = load_caller(inv).map_err(AppError::into_authentication)?;
        Ok(Self::credentials_match(&user, cert, password))
    }

    /// Like [`CredentialValidator::validate_login`], but yields the authenticated principal.
    pub fn authenticate(&self, inv: &Invocation<'_>, password: Option<&str>) -> AppResult<Principal> {
        let (user, cert) = load_caller(inv).map_err(AppError::into_authentication)?;
        if !Self::credentials_match(&user, cert, password) {
            return Err(AppError::Authentication(format!("invalid credentials for '{}'", user.ad_login)));
        }
        let mspid = inv.mspid().map_err(AppError::into_authentication)?.to_string();
        Ok(Principal { user_id: user.ad_login, role_id: user.role_id, mspid })
    }

    fn credentials_match(user: &User, cert: &CallerCertificate, password: Option<&str>) -> bool {
        let Some(password) = password.filter(|p| !p.is_empty()) else {
            debug!(target: "skillbill::security", user = %user.ad_login, "login without password; existence check only");
            return true;
        };
        let password_ok = verify_password(&user.hashed_password, password);
        let key_ok = hex::decode(&user.public_key).is_ok_and(|k| k == cert.public_key());
        if !(password_ok && key_ok) {
            warn!(target: "skillbill::security", user = %user.ad_login, password_ok, key_ok, "login rejected");
        }
        password_ok && key_ok
    }

    /// Register a user bound to the caller's certificate key.
    pub fn register_user(&self, inv: &Invocation<'_>, ad_login: &str, role_id: &str, password: &str) -> AppResult<String> {
        let hashed = hash_password(password)?;
        let key = inv.certificate()?.public_key_hex();
        self.add_user(inv, ad_login, &key, role_id, &hashed)
    }

    /// Insert a user record. Login and public key must both be unused, and the role must exist.
    pub fn add_user(
        &self,
        store: &dyn StateStore,
        ad_login: &str,
        public_key_hex: &str,
        role_id: &str,
        hashed_password: &str,
    ) -> AppResult<String> {
        if ad_login.is_empty() {
            return Err(AppError::invalid("adlogin must not be empty"));
        }
        if role_id.is_empty() {
            return Err(AppError::invalid("roleid must not be empty"));
        }
        self.roles.get_by_key(store, role_id)?;
        for u in self.users.get_all(store)? {
            if u.ad_login == ad_login {
                return Err(AppError::conflict(format!("user '{ad_login}' already exists")));
            }
            if !public_key_hex.is_empty() && u.public_key == public_key_hex {
                return Err(AppError::conflict(format!("public key already registered to '{}'", u.ad_login)));
            }
        }
        let user = User::new(ad_login, public_key_hex, role_id, hashed_password);
        self.users.save(store, ad_login, &user)?;
        info!(target: "skillbill::security", user = ad_login, role = role_id, "user added");
        Ok(user.ad_login)
    }

    pub fn get_all_users(&self, store: &dyn StateStore) -> AppResult<Vec<User>> { self.users.get_all(store) }

    /// The single user registered with this hex public key.
    pub fn get_user_by_public_key(&self, store: &dyn StateStore, public_key_hex: &str) -> AppResult<User> {
        if public_key_hex.is_empty() {
            return Err(AppError::invalid("public key must not be empty"));
        }
        let selector = Selector::for_doctype(doctype::USER).eq("publickey", public_key_hex).to_json_string();
        let mut found = self.users.get_by_query(store, &selector)?;
        match found.len() {
            0 => Err(AppError::not_found(format!("no user with public key {public_key_hex}"))),
            1 => Ok(found.remove(0)),
            n => Err(AppError::conflict(format!("{n} users share public key {public_key_hex}"))),
        }
    }
}
