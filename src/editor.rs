//! One editing session: the document being edited, the persisted preview
//! preferences and every user action the editor exposes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::model::{new_id, Document, DocumentKind, Signature, MAX_SIGNATURES};
use crate::patch::{DocumentPatch, ItemPatch, LayerPatch};
use crate::preview::{HostPage, PREVIEW_ELEMENT_ID};
use crate::print::assets::{decode_data_url, resolve_static_path};
use crate::print::{print_element, AssetLoader, PrintBackend, PrintOptions, PrintStatus};
use crate::settings::{Preferences, SettingsStore};

fn mime_from_path(reference: &str) -> mime::Mime {
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

fn image_dimensions(bytes: &[u8]) -> (u32, u32) {
    match printpdf::image_crate::load_from_memory(bytes) {
        Ok(img) => (img.width(), img.height()),
        Err(_) => (0, 0),
    }
}

pub struct EditorSession<S: SettingsStore> {
    document: Document,
    prefs: Preferences,
    store: S,
    asset_root: PathBuf,
    stylesheets: Vec<String>,
    logo: Option<String>,
}

impl<S: SettingsStore> EditorSession<S> {
    /// Opens a session; stored preferences override the document's visibility flags.
    pub fn new(mut document: Document, store: S, config: &AppConfig) -> Self {
        let prefs = Preferences::load(&store, &document);
        document.show_due_amount = prefs.show_due_amount;
        document.show_paid_amount = prefs.show_paid_amount;
        document.recalculate();
        Self {
            document,
            prefs,
            store,
            asset_root: config.asset_root.clone(),
            stylesheets: config.stylesheets.clone(),
            logo: config.logo.clone(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_kind(&self) -> DocumentKind {
        self.prefs.document_kind
    }

    pub fn apply_patch(&mut self, mut patch: DocumentPatch) {
        if let Some(v) = patch.show_due_amount.take() {
            self.set_show_due(v);
        }
        if let Some(v) = patch.show_paid_amount.take() {
            self.set_show_paid(v);
        }
        patch.apply(&mut self.document);
    }

    pub fn set_show_due(&mut self, v: bool) {
        self.prefs.save_show_due(&self.store, v);
        self.document.show_due_amount = v;
    }

    pub fn set_show_paid(&mut self, v: bool) {
        self.prefs.save_show_paid(&self.store, v);
        self.document.show_paid_amount = v;
    }

    pub fn set_document_kind(&mut self, kind: DocumentKind) {
        self.prefs.save_document_kind(&self.store, kind);
    }

    pub fn add_layer(&mut self) -> String {
        self.document.add_layer()
    }

    pub fn update_layer(&mut self, layer_id: &str, patch: LayerPatch) -> Result<()> {
        self.document.update_layer(layer_id, patch)
    }

    pub fn delete_layer(&mut self, layer_id: &str) -> Result<()> {
        self.document.delete_layer(layer_id)
    }

    pub fn add_item(&mut self, layer_id: &str) -> Result<String> {
        self.document.add_item(layer_id)
    }

    pub fn update_item(&mut self, layer_id: &str, item_id: &str, patch: ItemPatch) -> Result<()> {
        self.document.update_item(layer_id, item_id, patch)
    }

    pub fn delete_item(&mut self, layer_id: &str, item_id: &str) -> Result<()> {
        self.document.delete_item(layer_id, item_id)
    }

    /// Adds a named signature from a `data:` URL, URL or static path and
    /// returns its id. The first signature added to an empty selection is selected.
    pub fn add_signature(&mut self, name: &str, src: &str) -> Result<String> {
        let name = name.trim();
        let src = src.trim();
        if name.is_empty() {
            return Err(AppError::Invalid("signature name is required".to_string()));
        }
        if src.is_empty() {
            return Err(AppError::Invalid("signature image is required".to_string()));
        }
        if self.document.signatures.len() >= MAX_SIGNATURES {
            return Err(AppError::Invalid(format!("at most {MAX_SIGNATURES} signatures are allowed")));
        }
        if self.document.signature(name).is_some() {
            return Err(AppError::Invalid(format!("a signature named {name} already exists")));
        }

        let (mime_type, bytes) = if src.to_ascii_lowercase().starts_with("data:") {
            let (m, bytes) = decode_data_url(src)
                .ok_or_else(|| AppError::Invalid("malformed signature data URL".to_string()))?;
            if m.type_() != mime::IMAGE {
                return Err(AppError::Invalid(format!("signature must be an image, got {m}")));
            }
            (m, Some(bytes))
        } else if src.starts_with("http://") || src.starts_with("https://") {
            (mime_from_path(src), None)
        } else {
            let path = resolve_static_path(&self.asset_root, src)
                .ok_or_else(|| AppError::Invalid(format!("signature path {src} escapes the asset root")))?;
            (mime_from_path(src), std::fs::read(path).ok())
        };

        let (size, (width, height)) = match &bytes {
            Some(b) => (b.len() as u64, image_dimensions(b)),
            None => (0, (0, 0)),
        };
        let signature = Signature {
            id: new_id(),
            name: name.to_string(),
            src: src.to_string(),
            mime_type: mime_type.to_string(),
            size,
            width,
            height,
        };
        let id = signature.id.clone();
        self.document.signatures.push(signature);
        if self.document.selected_signature_name.is_none() {
            self.document.selected_signature_name = Some(name.to_string());
        }
        tracing::debug!(name, mime = %mime_type, size, "signature added");
        Ok(id)
    }

    /// Removes a signature; a removed selection moves to the first remaining one.
    pub fn remove_signature(&mut self, name: &str) -> Result<()> {
        let before = self.document.signatures.len();
        self.document.signatures.retain(|s| s.name != name);
        if self.document.signatures.len() == before {
            return Err(AppError::NotFound(format!("signature {name}")));
        }
        if self.document.selected_signature_name.as_deref() == Some(name) {
            self.document.selected_signature_name = self.document.signatures.first().map(|s| s.name.clone());
        }
        Ok(())
    }

    /// Selects the signature shown on the document; `None` clears the selection.
    pub fn select_signature(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            Some(n) if self.document.signature(n).is_none() => Err(AppError::NotFound(format!("signature {n}"))),
            Some(n) => {
                self.document.selected_signature_name = Some(n.to_string());
                Ok(())
            }
            None => {
                self.document.selected_signature_name = None;
                Ok(())
            }
        }
    }

    pub fn render_page(&self) -> HostPage {
        HostPage::for_document(&self.document, self.prefs.document_kind, &self.stylesheets, self.logo.as_deref())
    }

    /// Prints the rendered preview. Without an explicit title the job is named
    /// after the document kind and number.
    pub async fn print(&self, options: &PrintOptions, backend: Arc<dyn PrintBackend>) -> PrintStatus {
        let page = self.render_page();
        let loader = AssetLoader::new(&self.asset_root);
        let mut options = options.clone();
        if options.title.is_none() && !self.document.invoice_number.trim().is_empty() {
            options.title = Some(format!("{} {}", self.prefs.document_kind.as_str(), self.document.invoice_number.trim()));
        }
        print_element(&page, PREVIEW_ELEMENT_ID, &options, &loader, backend).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::{PrintJob, PrintOutcome};
    use crate::settings::{MemoryStore, KEY_DOCUMENT_KIND, KEY_SHOW_DUE, KEY_SHOW_PAID};
    use std::sync::Mutex;

    const PNG_1X1: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    fn session(store: &MemoryStore) -> EditorSession<&MemoryStore> {
        EditorSession::new(Document::sample(), store, &AppConfig::default())
    }

    #[test]
    fn stored_preferences_override_document_flags() {
        let store = MemoryStore::new();
        store.set(KEY_SHOW_PAID, "0").unwrap();
        store.set(KEY_DOCUMENT_KIND, "Quotation").unwrap();
        let s = session(&store);
        assert!(s.document().show_due_amount);
        assert!(!s.document().show_paid_amount);
        assert_eq!(s.document_kind(), DocumentKind::Quotation);
    }

    #[test]
    fn visibility_changes_are_persisted() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        s.apply_patch(DocumentPatch { show_due_amount: Some(false), client_name: Some("Acme".to_string()), ..Default::default() });
        s.set_document_kind(DocumentKind::Quotation);

        assert_eq!(store.get(KEY_SHOW_DUE).unwrap().as_deref(), Some("0"));
        assert_eq!(store.get(KEY_DOCUMENT_KIND).unwrap().as_deref(), Some("Quotation"));
        assert!(!s.document().show_due_amount);
        assert_eq!(s.document().client_name, "Acme");
        let page = s.render_page().to_html();
        assert!(page.contains("<h1>QUOTATION</h1>"));
        assert!(!page.contains("Due Amount:"));
    }

    #[test]
    fn item_edits_keep_totals_consistent() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        let layer = s.add_layer();
        let item = s.add_item(&layer).unwrap();
        s.update_item(&layer, &item, ItemPatch::from_input(None, Some("3"), Some("₹1,000"))).unwrap();
        assert_eq!(s.document().grand_total(), 8000.0);
        s.delete_layer(&layer).unwrap();
        assert_eq!(s.document().grand_total(), 5000.0);
        assert!(matches!(s.delete_item(&layer, &item), Err(AppError::NotFound(_))));
    }

    #[test]
    fn signatures_are_capped_and_unique() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        let err = s.add_signature("Extra", PNG_1X1).unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));

        s.remove_signature("Bharani").unwrap();
        assert!(matches!(s.add_signature("Agnel", PNG_1X1), Err(AppError::Invalid(_))));
        s.add_signature("Extra", PNG_1X1).unwrap();
        let sig = s.document().signature("Extra").unwrap();
        assert_eq!(sig.mime_type, "image/png");
        assert_eq!((sig.width, sig.height), (1, 1));
        assert!(sig.size > 0);
        assert_eq!(s.document().selected_signature_name.as_deref(), Some("Agnel"));
    }

    #[test]
    fn non_image_data_urls_are_rejected() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        s.remove_signature("Mohan").unwrap();
        let err = s.add_signature("Doc", "data:text/plain;base64,aGk=").unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[test]
    fn signature_paths_stay_under_asset_root() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        s.remove_signature("Mohan").unwrap();
        let err = s.add_signature("Leak", "../../etc/passwd").unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
        assert!(s.document().signature("Leak").is_none());
        s.add_signature("Local", "/signatures/local.png").unwrap();
        assert_eq!(s.document().signature("Local").unwrap().size, 0);
    }

    #[test]
    fn removing_selected_signature_moves_selection() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        s.remove_signature("Agnel").unwrap();
        assert_eq!(s.document().selected_signature_name.as_deref(), Some("Bharani"));
        for name in ["Bharani", "Dinesh", "Mohan"] {
            s.remove_signature(name).unwrap();
        }
        assert_eq!(s.document().selected_signature_name, None);
        assert!(matches!(s.remove_signature("Agnel"), Err(AppError::NotFound(_))));
        assert!(s.render_page().to_html().contains("No Signature"));
    }

    #[test]
    fn selecting_unknown_signature_fails() {
        let store = MemoryStore::new();
        let mut s = session(&store);
        assert!(matches!(s.select_signature(Some("Nobody")), Err(AppError::NotFound(_))));
        s.select_signature(Some("Dinesh")).unwrap();
        assert_eq!(s.document().active_signature_src(), Some("/dinesh_signature.png?v=2"));
        s.select_signature(None).unwrap();
        assert_eq!(s.document().active_signature_src(), None);
    }

    #[test]
    fn static_signature_mime_comes_from_extension() {
        assert_eq!(mime_from_path("/a/Sig.JPG?v=2"), mime::IMAGE_JPEG);
        assert_eq!(mime_from_path("/a/sig"), mime::APPLICATION_OCTET_STREAM);
    }

    struct TitleRecorder(Mutex<Option<String>>);

    impl PrintBackend for TitleRecorder {
        fn name(&self) -> &'static str {
            "title-recorder"
        }

        fn print(&self, job: &PrintJob) -> Result<PrintOutcome> {
            *self.0.lock().unwrap() = Some(job.title.clone());
            Ok(PrintOutcome { backend: "title-recorder", output: None })
        }
    }

    #[tokio::test]
    async fn print_names_job_after_document() {
        let store = MemoryStore::new();
        let s = session(&store);
        let recorder = Arc::new(TitleRecorder(Mutex::new(None)));
        let status = s.print(&PrintOptions::default(), recorder.clone()).await;
        assert!(matches!(status, PrintStatus::Printed(_)));
        assert_eq!(recorder.0.lock().unwrap().as_deref(), Some("Invoice INV-2025-01"));
    }
}
