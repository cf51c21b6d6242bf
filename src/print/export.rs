use std::path::PathBuf;
use std::process::Command;

use crate::error::{AppError, Result};
use crate::format::sanitize_filename;

use super::pdf::render_pdf;
use super::{PrintBackend, PrintJob, PrintOutcome};

/// Saves the standalone print document as `<out_dir>/<title>.html`.
#[derive(Debug, Clone)]
pub struct HtmlExport {
    pub out_dir: PathBuf,
}

impl HtmlExport {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }
}

impl PrintBackend for HtmlExport {
    fn name(&self) -> &'static str {
        "html"
    }

    fn print(&self, job: &PrintJob) -> Result<PrintOutcome> {
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}.html", sanitize_filename(&job.title)));
        std::fs::write(&path, &job.html)?;
        Ok(PrintOutcome { backend: self.name(), output: Some(path) })
    }
}

/// Sends a rendered PDF to the system print spooler (`lp` by default).
#[derive(Debug, Clone)]
pub struct SystemPrint {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for SystemPrint {
    fn default() -> Self {
        Self { command: "lp".to_string(), args: Vec::new() }
    }
}

impl PrintBackend for SystemPrint {
    fn name(&self) -> &'static str {
        "system"
    }

    fn print(&self, job: &PrintJob) -> Result<PrintOutcome> {
        let bytes = render_pdf(job)?;
        let path = job.staging_dir.join(format!("{}.pdf", sanitize_filename(&job.title)));
        std::fs::write(&path, bytes)?;

        tracing::info!(target: "print", command = %self.command, file = %path.display(), "sending job to spooler");
        let output = Command::new(&self.command)
            .args(&self.args)
            .arg("-t")
            .arg(&job.title)
            .arg(&path)
            .output()
            .map_err(|e| AppError::Spooler(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let msg = if stderr.is_empty() { output.status.to_string() } else { stderr };
            return Err(AppError::Spooler(msg));
        }
        Ok(PrintOutcome { backend: self.name(), output: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::assets::AssetReport;
    use crate::print::isolate::PageGeometry;

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("invoice-builder-export-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job(dir: &std::path::Path) -> PrintJob {
        PrintJob {
            title: "Quote 7".to_string(),
            html: "<!doctype html><p>hi</p>".to_string(),
            staged_document: dir.join("index.html"),
            staging_dir: dir.to_path_buf(),
            geometry: PageGeometry::a4(20.0),
            sheet: None,
            assets: AssetReport::default(),
        }
    }

    #[test]
    fn html_export_writes_document() {
        let dir = scratch();
        let outcome = HtmlExport::new(dir.join("out")).print(&job(&dir)).unwrap();
        let path = outcome.output.unwrap();
        assert_eq!(outcome.backend, "html");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<!doctype html><p>hi</p>");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_spooler_is_an_error() {
        let dir = scratch();
        let backend = SystemPrint { command: "invoice-builder-no-such-spooler".to_string(), args: Vec::new() };
        let err = backend.print(&job(&dir)).unwrap_err();
        assert!(matches!(err, AppError::Spooler(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn spooler_exit_status_is_checked() {
        let dir = scratch();
        let ok = SystemPrint { command: "true".to_string(), args: Vec::new() };
        assert_eq!(ok.print(&job(&dir)).unwrap(), PrintOutcome { backend: "system", output: None });
        let failing = SystemPrint { command: "false".to_string(), args: Vec::new() };
        assert!(matches!(failing.print(&job(&dir)).unwrap_err(), AppError::Spooler(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
