use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::error::Result;

pub const ENV_CONFIG: &str = "INVOICE_BUILDER_CONFIG";
pub const ENV_DATA_DIR: &str = "INVOICE_BUILDER_DATA_DIR";
pub const ENV_ASSET_ROOT: &str = "INVOICE_BUILDER_ASSET_ROOT";
pub const ENV_USERNAME: &str = "INVOICE_BUILDER_USERNAME";
pub const ENV_PASSWORD: &str = "INVOICE_BUILDER_PASSWORD";
pub const ENV_GOOGLE_EMAIL: &str = "INVOICE_BUILDER_GOOGLE_EMAIL";
pub const ENV_PAGE_PADDING_MM: &str = "INVOICE_BUILDER_PAGE_PADDING_MM";
pub const ENV_PRINT_TIMEOUT_MS: &str = "INVOICE_BUILDER_PRINT_TIMEOUT_MS";
/// Comma separated stylesheet links.
pub const ENV_STYLESHEETS: &str = "INVOICE_BUILDER_STYLESHEETS";
/// Logo reference; an empty value disables the logo.
pub const ENV_LOGO: &str = "INVOICE_BUILDER_LOGO";

const DB_FILE_NAME: &str = "invoice-builder.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Directory holding the settings database; resolved from candidates when unset.
    pub data_dir: Option<PathBuf>,
    /// Root for static asset paths such as `/logo.png`.
    pub asset_root: PathBuf,
    /// Stylesheet links placed in the host page head.
    pub stylesheets: Vec<String>,
    pub logo: Option<String>,
    pub credentials: Credentials,
    pub page_padding_mm: f32,
    pub print_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            asset_root: PathBuf::from("public"),
            stylesheets: Vec::new(),
            logo: Some("/logo.png".to_string()),
            credentials: Credentials::default(),
            page_padding_mm: 20.0,
            print_timeout_ms: 3000,
        }
    }
}

fn nonempty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or_keep<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, current: T) -> T {
    match nonempty(raw) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(target: "config", key, value = %v, "ignoring unparsable override");
            current
        }),
        None => current,
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Optional JSON file named by `INVOICE_BUILDER_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match nonempty(std::env::var(ENV_CONFIG).ok()) {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, keyed by the `ENV_*` names.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = nonempty(lookup(ENV_DATA_DIR)) {
            self.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = nonempty(lookup(ENV_ASSET_ROOT)) {
            self.asset_root = PathBuf::from(v);
        }
        if let Some(v) = nonempty(lookup(ENV_USERNAME)) {
            self.credentials.username = v;
        }
        if let Some(v) = lookup(ENV_PASSWORD).filter(|v| !v.is_empty()) {
            self.credentials.password = v;
        }
        if let Some(v) = nonempty(lookup(ENV_GOOGLE_EMAIL)) {
            self.credentials.allowed_google_email = v;
        }
        self.page_padding_mm =
            parse_or_keep(ENV_PAGE_PADDING_MM, lookup(ENV_PAGE_PADDING_MM), self.page_padding_mm);
        self.print_timeout_ms =
            parse_or_keep(ENV_PRINT_TIMEOUT_MS, lookup(ENV_PRINT_TIMEOUT_MS), self.print_timeout_ms);
        if let Some(v) = lookup(ENV_STYLESHEETS) {
            self.stylesheets = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup(ENV_LOGO) {
            self.logo = nonempty(Some(v));
        }
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_millis(self.print_timeout_ms.max(1))
    }

    /// Candidate directories for the settings database, in preference order.
    pub fn data_dir_candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &self.data_dir {
            candidates.push(dir.clone());
        }
        if let Some(home) = std::env::var_os("XDG_DATA_HOME").or_else(|| std::env::var_os("APPDATA")) {
            candidates.push(PathBuf::from(home).join("invoice-builder"));
        } else if let Some(home) = std::env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".local/share/invoice-builder"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd);
        }
        candidates
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.join(DB_FILE_NAME));
        }
        crate::settings::resolve_db_path(&self.data_dir_candidates(), DB_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{ "pagePaddingMm": 12 }"#).unwrap();
        assert_eq!(cfg.page_padding_mm, 12.0);
        assert_eq!(cfg.print_timeout_ms, 3000);
        assert_eq!(cfg.credentials.username, "dezprox");
    }

    #[test]
    fn explicit_data_dir_wins() {
        let cfg = AppConfig { data_dir: Some(PathBuf::from("/tmp/ib")), ..Default::default() };
        assert_eq!(cfg.db_path().unwrap(), PathBuf::from("/tmp/ib").join(DB_FILE_NAME));
        assert_eq!(cfg.data_dir_candidates()[0], PathBuf::from("/tmp/ib"));
    }

    #[test]
    fn timeout_is_never_zero() {
        let cfg = AppConfig { print_timeout_ms: 0, ..Default::default() };
        assert_eq!(cfg.print_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn partial_credentials_in_file_keep_other_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "credentials": { "username": "x" } }"#).unwrap();
        assert_eq!(cfg.credentials.username, "x");
        assert_eq!(cfg.credentials.password, "dezprox@2025");
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_cover_layout_and_print_settings() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[
            (ENV_PAGE_PADDING_MM, " 12.5 "),
            (ENV_PRINT_TIMEOUT_MS, "750"),
            (ENV_STYLESHEETS, "/a.css, ,/b.css"),
            (ENV_LOGO, "/brand.png"),
        ]));
        assert_eq!(cfg.page_padding_mm, 12.5);
        assert_eq!(cfg.print_timeout_ms, 750);
        assert_eq!(cfg.stylesheets, vec!["/a.css".to_string(), "/b.css".to_string()]);
        assert_eq!(cfg.logo.as_deref(), Some("/brand.png"));
    }

    #[test]
    fn bad_numbers_keep_current_values_and_empty_logo_disables_it() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[
            (ENV_PAGE_PADDING_MM, "wide"),
            (ENV_PRINT_TIMEOUT_MS, "-5"),
            (ENV_LOGO, "  "),
        ]));
        assert_eq!(cfg.page_padding_mm, 20.0);
        assert_eq!(cfg.print_timeout_ms, 3000);
        assert_eq!(cfg.logo, None);
    }

    #[test]
    fn absent_overrides_change_nothing() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[]));
        assert_eq!(cfg, AppConfig::default());
    }
}
