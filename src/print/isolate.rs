//! The isolated rendering context a print job runs in: a private staging
//! directory holding a standalone copy of the source element and the host
//! page's head resources, sized to an A4 sheet.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::format::escape_html;
use crate::preview::{HeadEntry, HostPage, MountedElement};

use super::assets::{font_face_sources, AssetReport};

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;
pub const STAGED_DOCUMENT: &str = "index.html";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub width_mm: f32,
    pub height_mm: f32,
    pub padding_mm: f32,
}

impl PageGeometry {
    pub fn a4(padding_mm: f32) -> Self {
        let max_pad = A4_WIDTH_MM / 2.0 - 1.0;
        let padding_mm = if padding_mm.is_finite() { padding_mm.clamp(0.0, max_pad) } else { 0.0 };
        Self { width_mm: A4_WIDTH_MM, height_mm: A4_HEIGHT_MM, padding_mm }
    }
}

/// Exclusively owned by one print call; the staging directory is removed
/// when the context is destroyed or dropped.
#[derive(Debug)]
pub struct IsolatedContext {
    dir: PathBuf,
    pub title: String,
    pub geometry: PageGeometry,
    pub stylesheet_links: Vec<String>,
    pub inline_styles: Vec<String>,
    pub body: MountedElement,
}

impl IsolatedContext {
    pub fn create(
        page: &HostPage,
        source: &MountedElement,
        title: String,
        geometry: PageGeometry,
        staging_root: Option<&Path>,
    ) -> Result<Self> {
        let root = staging_root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let dir = root.join(format!("print-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;

        let mut stylesheet_links = Vec::new();
        let mut inline_styles = Vec::new();
        for entry in &page.head {
            match entry {
                HeadEntry::Stylesheet { href } if !href.trim().is_empty() => stylesheet_links.push(href.clone()),
                HeadEntry::Stylesheet { .. } => {}
                HeadEntry::InlineStyle(css) => inline_styles.push(css.clone()),
            }
        }

        tracing::debug!(target: "print", dir = %dir.display(), element = %source.id, "isolated context created");
        Ok(Self {
            dir,
            title,
            geometry,
            stylesheet_links,
            inline_styles,
            body: source.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fonts declared by `@font-face` rules in the copied inline styles.
    pub fn font_sources(&self) -> Vec<String> {
        self.inline_styles.iter().flat_map(|css| font_face_sources(css)).collect()
    }

    /// Standalone document. Stylesheets that loaded are inlined; the rest stay as links.
    pub fn document_html(&self, report: &AssetReport) -> String {
        let g = self.geometry;
        let mut html = String::from("<!doctype html>\n<html>\n<head>\n");
        html.push_str("<meta charset=\"utf-8\" />\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(&self.title)));
        for href in &self.stylesheet_links {
            let loaded = report
                .stylesheets
                .iter()
                .find(|a| &a.reference == href)
                .and_then(|a| a.bytes());
            match loaded {
                Some(css) => html.push_str(&format!(
                    "<style data-href=\"{}\">{}</style>\n",
                    escape_html(href),
                    String::from_utf8_lossy(css)
                )),
                None => html.push_str(&format!("<link rel=\"stylesheet\" href=\"{}\" />\n", escape_html(href))),
            }
        }
        html.push_str(&format!(
            "<style>\n@page {{ size: A4; margin: 0; }}\n\
             html, body {{ background: #fff; margin: 0; padding: 0; }}\n\
             body {{ -webkit-print-color-adjust: exact; print-color-adjust: exact; }}\n\
             .print-root {{ width: {}mm; min-height: {}mm; margin: 0 auto; box-sizing: border-box; padding: {}mm; }}\n\
             </style>\n",
            g.width_mm, g.height_mm, g.padding_mm
        ));
        for css in &self.inline_styles {
            html.push_str(&format!("<style>{}</style>\n", css));
        }
        html.push_str("</head>\n<body>\n<div class=\"print-root\">\n");
        html.push_str(&self.body.markup);
        html.push_str("\n</div>\n</body>\n</html>\n");
        html
    }

    /// Writes the standalone document into the staging directory.
    pub fn stage(&self, report: &AssetReport) -> Result<(PathBuf, String)> {
        let html = self.document_html(report);
        let path = self.dir.join(STAGED_DOCUMENT);
        std::fs::write(&path, &html)?;
        Ok((path, html))
    }

    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(target: "print", dir = %self.dir.display(), "isolated context destroyed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(target: "print", dir = %self.dir.display(), error = %e, "could not remove print staging dir"),
        }
    }
}
