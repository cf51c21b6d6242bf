//! Print/export of a rendered element in isolation from the host page.
//!
//! A print call locates the source element, copies it with the page's head
//! resources into an [`IsolatedContext`], waits for stylesheets, fonts and
//! images to settle, then hands a [`PrintJob`] to a [`PrintBackend`]. The
//! context is torn down when the backend returns or the cleanup timeout
//! elapses, whichever comes first. Nothing in here returns an error to the
//! caller; the outcome is reported as a [`PrintStatus`].

pub mod assets;
pub mod export;
pub mod isolate;
pub mod pdf;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::preview::{HostPage, PreviewSheet};

pub use assets::{AssetKind, AssetLoader, AssetReport, LoadedAsset};
pub use export::{HtmlExport, SystemPrint};
pub use isolate::{IsolatedContext, PageGeometry};
pub use pdf::PdfExport;

pub const DEFAULT_PAGE_PADDING_MM: f32 = 20.0;
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    /// Document title of the print job; falls back to the page title.
    pub title: Option<String>,
    pub page_padding_mm: f32,
    pub cleanup_timeout: Duration,
    /// Font files to wait for in addition to the page's `@font-face` rules.
    pub extra_fonts: Vec<String>,
    /// Where staging directories are created; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            title: None,
            page_padding_mm: DEFAULT_PAGE_PADDING_MM,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
            extra_fonts: Vec::new(),
            staging_root: None,
        }
    }
}

/// Everything a backend needs; owned so it can move onto a blocking task.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub title: String,
    pub html: String,
    pub staged_document: PathBuf,
    pub staging_dir: PathBuf,
    pub geometry: PageGeometry,
    pub sheet: Option<PreviewSheet>,
    pub assets: AssetReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintOutcome {
    pub backend: &'static str,
    /// File written for the user, if the backend produces one.
    pub output: Option<PathBuf>,
}

pub trait PrintBackend: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn print(&self, job: &PrintJob) -> Result<PrintOutcome>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrintStatus {
    Printed(PrintOutcome),
    /// The element to print was not on the page; nothing was touched.
    MissingSource,
    /// The backend did not finish within the cleanup timeout. Staging is
    /// removed regardless; the backend thread cannot be cancelled, so the job
    /// may still complete and write its output afterwards.
    TimedOut,
    Failed(String),
}

fn job_title(options: &PrintOptions, page: &HostPage) -> String {
    let explicit = options.title.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let page_title = Some(page.title.trim()).filter(|s| !s.is_empty());
    explicit.or(page_title).unwrap_or("Document").to_string()
}

pub async fn print_element(
    page: &HostPage,
    element_id: &str,
    options: &PrintOptions,
    loader: &AssetLoader,
    backend: Arc<dyn PrintBackend>,
) -> PrintStatus {
    let Some(source) = page.element(element_id) else {
        tracing::warn!(target: "print", element_id, "print source element not found");
        return PrintStatus::MissingSource;
    };

    let title = job_title(options, page);
    let geometry = PageGeometry::a4(options.page_padding_mm);
    let context = match IsolatedContext::create(page, source, title.clone(), geometry, options.staging_root.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(target: "print", error = %e, "could not create isolated print context");
            return PrintStatus::Failed(e.to_string());
        }
    };

    let mut fonts = context.font_sources();
    fonts.extend(options.extra_fonts.iter().cloned());
    let assets = loader
        .wait_for_assets(&context.stylesheet_links, &fonts, &context.body.images)
        .await;
    if assets.failures() > 0 {
        tracing::info!(target: "print", failures = assets.failures(), "some assets did not load");
    }

    let (staged_document, html) = match context.stage(&assets) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "print", error = %e, "could not stage print document");
            context.destroy();
            return PrintStatus::Failed(e.to_string());
        }
    };

    let job = PrintJob {
        title,
        html,
        staged_document,
        staging_dir: context.dir().to_path_buf(),
        geometry,
        sheet: context.body.sheet.clone(),
        assets,
    };

    let backend_name = backend.name();
    let task = tokio::task::spawn_blocking(move || backend.print(&job));
    let status = match tokio::time::timeout(options.cleanup_timeout, task).await {
        Ok(Ok(Ok(outcome))) => {
            tracing::info!(target: "print", backend = backend_name, output = ?outcome.output, "print job finished");
            PrintStatus::Printed(outcome)
        }
        Ok(Ok(Err(e))) => {
            tracing::warn!(target: "print", backend = backend_name, error = %e, "print backend failed");
            PrintStatus::Failed(e.to_string())
        }
        Ok(Err(e)) => {
            tracing::warn!(target: "print", backend = backend_name, error = %e, "print task aborted");
            PrintStatus::Failed(e.to_string())
        }
        Err(_) => {
            tracing::warn!(target: "print", backend = backend_name, timeout = ?options.cleanup_timeout, "print backend still running after timeout; staging removed, output may still appear");
            PrintStatus::TimedOut
        }
    };

    context.destroy();
    status
}
