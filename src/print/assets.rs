//! Resolution of stylesheet, font and image references and the concurrent
//! readiness wait that runs before a print job is handed to a backend.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::{join3, join_all};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Stylesheet,
    Font,
    Image,
}

impl AssetKind {
    fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Stylesheet => "stylesheet",
            AssetKind::Font => "font",
            AssetKind::Image => "image",
        }
    }
}

/// One settled load: bytes on success, the reason otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedAsset {
    pub kind: AssetKind,
    pub reference: String,
    pub outcome: std::result::Result<Vec<u8>, String>,
}

impl LoadedAsset {
    pub fn is_ready(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.outcome.as_ref().ok().map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetReport {
    pub stylesheets: Vec<LoadedAsset>,
    pub fonts: Vec<LoadedAsset>,
    pub images: Vec<LoadedAsset>,
}

impl AssetReport {
    fn all(&self) -> impl Iterator<Item = &LoadedAsset> {
        self.stylesheets.iter().chain(self.fonts.iter()).chain(self.images.iter())
    }

    pub fn failures(&self) -> usize {
        self.all().filter(|a| !a.is_ready()).count()
    }

    pub fn bytes(&self, kind: AssetKind, reference: &str) -> Option<&[u8]> {
        self.all()
            .find(|a| a.kind == kind && a.reference == reference)
            .and_then(LoadedAsset::bytes)
    }

    /// First font that loaded and parsed.
    pub fn first_font(&self) -> Option<&[u8]> {
        self.fonts.iter().find_map(LoadedAsset::bytes)
    }
}

/// Decodes `data:<mime>;base64,<payload>` into its MIME type and bytes.
pub fn decode_data_url(s: &str) -> Option<(mime::Mime, Vec<u8>)> {
    let s = s.trim();
    if !s.to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    let comma = s.find(',')?;
    let (meta, data) = s.split_at(comma);
    let meta = &meta[5..];
    let mut parts = meta.split(';');
    let mime_type = parts
        .next()
        .filter(|m| !m.trim().is_empty())
        .and_then(|m| m.trim().parse::<mime::Mime>().ok())
        .unwrap_or(mime::TEXT_PLAIN);
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return None;
    }
    let bytes = base64::engine::general_purpose::STANDARD.decode(data[1..].trim()).ok()?;
    Some((mime_type, bytes))
}

/// `url(...)` sources declared inside `@font-face` blocks.
pub fn font_face_sources(css: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = css;
    while let Some(start) = rest.find("@font-face") {
        let after = &rest[start..];
        let Some(open) = after.find('{') else { break };
        let block_end = after[open..].find('}').map(|i| open + i).unwrap_or(after.len());
        let mut block = &after[open..block_end];
        while let Some(u) = block.find("url(") {
            let tail = &block[u + 4..];
            let Some(close) = tail.find(')') else { break };
            let src = tail[..close].trim().trim_matches(|c| c == '"' || c == '\'');
            if !src.is_empty() {
                out.push(src.to_string());
            }
            block = &tail[close..];
        }
        rest = &after[block_end..];
    }
    out
}

fn strip_query(reference: &str) -> &str {
    let end = reference.find(['?', '#']).unwrap_or(reference.len());
    &reference[..end]
}

/// Local path a static reference maps to (`/a.png?v=2` -> `<root>/a.png`).
/// `None` when the reference climbs out of `root` with `..`.
pub fn resolve_static_path(root: &Path, reference: &str) -> Option<PathBuf> {
    let path = strip_query(reference.trim());
    let path = path.strip_prefix("file://").unwrap_or(path);
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    Some(root.join(relative))
}

pub struct AssetLoader {
    client: reqwest::Client,
    root: PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, root: root.into() }
    }

    pub fn local_path(&self, reference: &str) -> Result<PathBuf> {
        resolve_static_path(&self.root, reference)
            .ok_or_else(|| AppError::Asset(format!("{reference} escapes the asset root")))
    }

    pub async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AppError::Asset("empty reference".to_string()));
        }
        if reference.to_ascii_lowercase().starts_with("data:") {
            return decode_data_url(reference)
                .map(|(_, bytes)| bytes)
                .ok_or_else(|| AppError::Asset("malformed data URL".to_string()));
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let resp = self.client.get(reference).send().await?.error_for_status()?;
            return Ok(resp.bytes().await?.to_vec());
        }
        Ok(tokio::fs::read(self.local_path(reference)?).await?)
    }

    async fn settle(&self, kind: AssetKind, reference: &str) -> LoadedAsset {
        let outcome = match self.fetch(reference).await {
            Ok(bytes) if kind == AssetKind::Font => {
                let parsed = ttf_parser::Face::parse(&bytes, 0).map(|_| ());
                match parsed {
                    Ok(()) => Ok(bytes),
                    Err(e) => Err(format!("unusable font: {e:?}")),
                }
            }
            Ok(bytes) => Ok(bytes),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = &outcome {
            tracing::warn!(target: "print", kind = kind.as_str(), reference, %reason, "asset failed to load; printing anyway");
        }
        LoadedAsset { kind, reference: reference.to_string(), outcome }
    }

    /// Waits until every stylesheet, font and image has loaded or failed.
    /// The three groups and every asset within them load concurrently.
    pub async fn wait_for_assets(&self, stylesheets: &[String], fonts: &[String], images: &[String]) -> AssetReport {
        let styles = join_all(stylesheets.iter().map(|r| self.settle(AssetKind::Stylesheet, r)));
        let fonts = join_all(fonts.iter().map(|r| self.settle(AssetKind::Font, r)));
        let images = join_all(images.iter().map(|r| self.settle(AssetKind::Image, r)));
        let (stylesheets, fonts, images) = join3(styles, fonts, images).await;
        AssetReport { stylesheets, fonts, images }
    }
}
