//! Login gate in front of the editor. Credentials are plain configured values;
//! the only state is an authenticated flag and user name in the settings store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{read_or_none, SettingsStore};

pub const AUTH_KEY: &str = "auth:isAuthenticated";
pub const USER_KEY: &str = "auth:user";
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Account accepted by the Google sign-in path.
    pub allowed_google_email: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "dezprox".to_string(),
            password: "dezprox@2025".to_string(),
            allowed_google_email: "owner@example.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("This Google account is not allowed")]
    EmailNotAllowed,
}

fn mark_authenticated<S: SettingsStore + ?Sized>(store: &S, user: &str) {
    let res = store.set(AUTH_KEY, "true").and_then(|_| store.set(USER_KEY, user));
    if let Err(e) = res {
        tracing::warn!(target: "auth", error = %e, "could not persist login");
    }
}

pub fn login_with_credentials<S: SettingsStore + ?Sized>(
    store: &S,
    creds: &Credentials,
    username: &str,
    password: &str,
) -> Result<(), AuthError> {
    let username = username.trim();
    if username != creds.username || password != creds.password {
        tracing::info!(target: "auth", "login rejected");
        return Err(AuthError::InvalidCredentials);
    }
    mark_authenticated(store, username);
    tracing::info!(target: "auth", user = username, "logged in");
    Ok(())
}

pub fn login_with_google_email<S: SettingsStore + ?Sized>(
    store: &S,
    creds: &Credentials,
    email: &str,
) -> Result<(), AuthError> {
    let email = email.trim();
    if email.is_empty() || !email.eq_ignore_ascii_case(creds.allowed_google_email.trim()) {
        tracing::info!(target: "auth", "google login rejected");
        return Err(AuthError::EmailNotAllowed);
    }
    mark_authenticated(store, email);
    Ok(())
}

pub fn logout<S: SettingsStore + ?Sized>(store: &S) {
    for key in [AUTH_KEY, USER_KEY] {
        if let Err(e) = store.remove(key) {
            tracing::warn!(target: "auth", key, error = %e, "could not clear login");
        }
    }
}

pub fn is_authenticated<S: SettingsStore + ?Sized>(store: &S) -> bool {
    read_or_none(store, AUTH_KEY).as_deref() == Some("true")
}

pub fn auth_user<S: SettingsStore + ?Sized>(store: &S) -> Option<String> {
    read_or_none(store, USER_KEY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Editor,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => LOGIN_ROUTE,
            Route::Editor => "/",
        }
    }

    fn is_protected(&self) -> bool {
        matches!(self, Route::Editor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted { user: Option<String> },
    /// Send the visitor to `to`, remembering where they were heading.
    Redirect { to: &'static str, from: &'static str },
}

pub fn guard<S: SettingsStore + ?Sized>(store: &S, route: Route) -> Access {
    if route.is_protected() && !is_authenticated(store) {
        return Access::Redirect { to: LOGIN_ROUTE, from: route.path() };
    }
    Access::Granted { user: auth_user(store) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::tests::BrokenStore;
    use crate::settings::MemoryStore;

    fn creds() -> Credentials {
        Credentials {
            username: "owner".to_string(),
            password: "s3cret".to_string(),
            allowed_google_email: "Owner@Example.com".to_string(),
        }
    }

    #[test]
    fn wrong_credentials_keep_editor_locked() {
        let store = MemoryStore::new();
        let err = login_with_credentials(&store, &creds(), "owner", "nope").unwrap_err();
        assert_eq!(err.to_string(), "Invalid username or password");
        assert!(!is_authenticated(&store));
        assert_eq!(
            guard(&store, Route::Editor),
            Access::Redirect { to: "/login", from: "/" }
        );
    }

    #[test]
    fn matching_credentials_open_the_editor() {
        let store = MemoryStore::new();
        login_with_credentials(&store, &creds(), "  owner ", "s3cret").unwrap();
        assert!(is_authenticated(&store));
        assert_eq!(auth_user(&store).as_deref(), Some("owner"));
        assert_eq!(
            guard(&store, Route::Editor),
            Access::Granted { user: Some("owner".to_string()) }
        );

        logout(&store);
        assert!(!is_authenticated(&store));
        assert_eq!(auth_user(&store), None);
    }

    #[test]
    fn password_is_not_trimmed() {
        let store = MemoryStore::new();
        assert!(login_with_credentials(&store, &creds(), "owner", " s3cret").is_err());
    }

    #[test]
    fn google_email_matches_case_insensitively() {
        let store = MemoryStore::new();
        assert_eq!(
            login_with_google_email(&store, &creds(), "someone@example.com"),
            Err(AuthError::EmailNotAllowed)
        );
        assert_eq!(login_with_google_email(&store, &creds(), ""), Err(AuthError::EmailNotAllowed));
        login_with_google_email(&store, &creds(), "owner@example.COM").unwrap();
        assert_eq!(auth_user(&store).as_deref(), Some("owner@example.COM"));
    }

    #[test]
    fn login_route_is_always_reachable() {
        let store = MemoryStore::new();
        assert_eq!(guard(&store, Route::Login), Access::Granted { user: None });
    }

    #[test]
    fn unavailable_store_means_not_authenticated() {
        assert!(!is_authenticated(&BrokenStore));
        assert!(matches!(guard(&BrokenStore, Route::Editor), Access::Redirect { .. }));
        logout(&BrokenStore);
    }

    #[test]
    fn partial_credentials_fall_back_to_defaults() {
        let creds: Credentials = serde_json::from_str(r#"{ "username": "x" }"#).unwrap();
        assert_eq!(creds.username, "x");
        assert_eq!(creds.password, "dezprox@2025");
        assert_eq!(creds.allowed_google_email, "owner@example.com");
    }

    #[test]
    fn default_login_is_dezprox() {
        let store = MemoryStore::new();
        let creds = Credentials::default();
        login_with_credentials(&store, &creds, "dezprox", "dezprox@2025").unwrap();
        assert_eq!(auth_user(&store).as_deref(), Some("dezprox"));
    }
}
