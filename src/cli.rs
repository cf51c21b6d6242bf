use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::auth::{self, Access, Route};
use crate::config::AppConfig;
use crate::editor::EditorSession;
use crate::model::{Document, DocumentKind};
use crate::patch::{DocumentPatch, ItemPatch, LayerPatch};
use crate::print::{HtmlExport, PdfExport, PrintBackend, PrintOptions, PrintStatus, SystemPrint};
use crate::settings::{Preferences, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "invoice-builder", version, about = "Build invoices and quotations layer by layer and print them on A4")]
pub struct Cli {
    /// JSON config file; takes precedence over INVOICE_BUILDER_CONFIG.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the start-of-session sample document.
    Sample {
        out: PathBuf,
    },

    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    LoginGoogle {
        #[arg(long)]
        email: String,
    },

    Logout,

    Whoami,

    /// Show or change the persisted preview preferences.
    Prefs {
        #[arg(long)]
        show_due: Option<bool>,
        #[arg(long)]
        show_paid: Option<bool>,
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },

    Totals {
        doc: PathBuf,
    },

    /// Change document fields.
    Set {
        doc: PathBuf,
        #[command(flatten)]
        fields: SetFields,
    },

    AddLayer {
        doc: PathBuf,
    },

    UpdateLayer {
        doc: PathBuf,
        layer: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        responsibility: Option<f64>,
        #[arg(long)]
        remarks: Option<String>,
    },

    RemoveLayer {
        doc: PathBuf,
        layer: String,
    },

    AddItem {
        doc: PathBuf,
        layer: String,
    },

    UpdateItem {
        doc: PathBuf,
        layer: String,
        item: String,
        #[arg(long)]
        description: Option<String>,
        /// Raw text; anything that is not a number counts as 0.
        #[arg(long, allow_hyphen_values = true)]
        qty: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        rate: Option<String>,
    },

    RemoveItem {
        doc: PathBuf,
        layer: String,
        item: String,
    },

    AddSignature {
        doc: PathBuf,
        #[arg(long)]
        name: String,
        /// data: URL, http(s) URL or path under the asset root.
        #[arg(long)]
        src: String,
    },

    SelectSignature {
        doc: PathBuf,
        name: Option<String>,
        /// Show no named signature.
        #[arg(long, conflicts_with = "name")]
        clear: bool,
    },

    RemoveSignature {
        doc: PathBuf,
        name: String,
    },

    /// Write the host page with the rendered preview as HTML.
    Render {
        doc: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    Print {
        doc: PathBuf,
        #[arg(long, value_enum, default_value_t = BackendArg::Pdf)]
        backend: BackendArg,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        padding_mm: Option<f32>,
        /// Extra font files to wait for and embed.
        #[arg(long = "font")]
        fonts: Vec<String>,
        /// Printer passed to the spooler (`lp -d`).
        #[arg(long)]
        printer: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Invoice,
    Quotation,
}

impl From<KindArg> for DocumentKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Invoice => DocumentKind::Invoice,
            KindArg::Quotation => DocumentKind::Quotation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Html,
    Pdf,
    System,
}

#[derive(Args, Debug, Default)]
struct SetFields {
    #[arg(long)]
    invoice_number: Option<String>,
    #[arg(long)]
    so_number: Option<String>,
    #[arg(long)]
    invoice_date: Option<String>,
    #[arg(long)]
    due_date: Option<String>,
    #[arg(long)]
    company_name: Option<String>,
    /// Issuer contact line; repeat for several lines.
    #[arg(long)]
    company_contact: Option<Vec<String>>,
    #[arg(long)]
    client_name: Option<String>,
    #[arg(long)]
    client_phone: Option<String>,
    #[arg(long)]
    client_email: Option<String>,
    #[arg(long)]
    client_address: Option<String>,
    #[arg(long)]
    bank_name: Option<String>,
    #[arg(long)]
    account_name: Option<String>,
    #[arg(long)]
    account_number: Option<String>,
    #[arg(long)]
    ifsc_code: Option<String>,
    #[arg(long)]
    signatory_name: Option<String>,
    #[arg(long)]
    signatory_role: Option<String>,
    #[arg(long)]
    signature_image: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    due_amount: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    paid_amount: Option<String>,
    #[arg(long)]
    show_due: Option<bool>,
    #[arg(long)]
    show_paid: Option<bool>,
    #[arg(long)]
    notes: Option<String>,
}

impl SetFields {
    fn into_patch(self) -> DocumentPatch {
        let mut patch = DocumentPatch {
            invoice_number: self.invoice_number,
            so_number: self.so_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            company_name: self.company_name,
            company_contact: self.company_contact,
            client_name: self.client_name,
            client_phone: self.client_phone,
            client_email: self.client_email,
            client_address: self.client_address,
            bank_name: self.bank_name,
            account_name: self.account_name,
            account_number: self.account_number,
            ifsc_code: self.ifsc_code,
            signatory_name: self.signatory_name,
            signatory_role: self.signatory_role,
            signature_image: self.signature_image,
            show_due_amount: self.show_due,
            show_paid_amount: self.show_paid,
            notes: self.notes,
            ..Default::default()
        };
        if let Some(v) = self.due_amount.as_deref() {
            patch = patch.due_amount_input(v);
        }
        if let Some(v) = self.paid_amount.as_deref() {
            patch = patch.paid_amount_input(v);
        }
        patch
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(p) => {
            let mut cfg = AppConfig::from_file(p).with_context(|| format!("reading config {}", p.display()))?;
            cfg.apply_env();
            Ok(cfg)
        }
        None => Ok(AppConfig::load()?),
    }
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Document::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn write_document(path: &Path, doc: &Document) -> anyhow::Result<()> {
    std::fs::write(path, doc.to_json()?).with_context(|| format!("writing {}", path.display()))
}

fn require_login(store: &SqliteStore) -> anyhow::Result<()> {
    match auth::guard(store, Route::Editor) {
        Access::Granted { .. } => Ok(()),
        Access::Redirect { to, from } => {
            bail!("not signed in: run `invoice-builder login` first (redirect {from} -> {to})")
        }
    }
}

fn backend_for(kind: BackendArg, out_dir: PathBuf, printer: Option<String>) -> Arc<dyn PrintBackend> {
    match kind {
        BackendArg::Html => Arc::new(HtmlExport::new(out_dir)),
        BackendArg::Pdf => Arc::new(PdfExport::new(out_dir)),
        BackendArg::System => {
            let mut spooler = SystemPrint::default();
            if let Some(p) = printer {
                spooler.args = vec!["-d".to_string(), p];
            }
            Arc::new(spooler)
        }
    }
}

/// Opens the editor on `doc`, applies `edit`, and saves the result.
fn edit_document<F, T>(store: &SqliteStore, config: &AppConfig, doc: &Path, edit: F) -> anyhow::Result<T>
where
    F: FnOnce(&mut EditorSession<&SqliteStore>) -> crate::error::Result<T>,
{
    let mut session = EditorSession::new(read_document(doc)?, store, config);
    let out = edit(&mut session)?;
    write_document(doc, session.document())?;
    Ok(out)
}

pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    if let Command::Sample { out } = &cli.command {
        write_document(out, &Document::sample())?;
        println!("{}", out.display());
        return Ok(());
    }

    let db_path = config.db_path()?;
    tracing::debug!(target: "sqlite", path = %db_path.display(), "opening settings store");
    let store = SqliteStore::open(&db_path)?;

    match cli.command {
        Command::Sample { .. } => {}

        Command::Login { username, password } => {
            auth::login_with_credentials(&store, &config.credentials, &username, &password)?;
            println!("signed in as {}", username.trim());
        }

        Command::LoginGoogle { email } => {
            auth::login_with_google_email(&store, &config.credentials, &email)?;
            println!("signed in as {}", email.trim());
        }

        Command::Logout => {
            auth::logout(&store);
            println!("signed out");
        }

        Command::Whoami => match auth::guard(&store, Route::Editor) {
            Access::Granted { user } => println!("{}", user.unwrap_or_else(|| "(unknown user)".to_string())),
            Access::Redirect { to, .. } => println!("not signed in ({to})"),
        },

        Command::Prefs { show_due, show_paid, kind } => {
            require_login(&store)?;
            let mut prefs = Preferences::load(&store, &Document::sample());
            if let Some(v) = show_due {
                prefs.save_show_due(&store, v);
            }
            if let Some(v) = show_paid {
                prefs.save_show_paid(&store, v);
            }
            if let Some(k) = kind {
                prefs.save_document_kind(&store, k.into());
            }
            println!(
                "showDueAmount={} showPaidAmount={} documentType={}",
                prefs.show_due_amount,
                prefs.show_paid_amount,
                prefs.document_kind.as_str()
            );
        }

        Command::Totals { doc } => {
            require_login(&store)?;
            let doc = read_document(&doc)?;
            for layer in &doc.layers {
                println!("{}\t{}\t{}", layer.id, layer.title, layer.subtotal());
            }
            println!("{}", serde_json::to_string_pretty(&doc.totals())?);
        }

        Command::Set { doc, fields } => {
            require_login(&store)?;
            let patch = fields.into_patch();
            if patch.is_empty() {
                bail!("nothing to change");
            }
            edit_document(&store, &config, &doc, |s| {
                s.apply_patch(patch);
                Ok(())
            })?;
        }

        Command::AddLayer { doc } => {
            require_login(&store)?;
            let id = edit_document(&store, &config, &doc, |s| Ok(s.add_layer()))?;
            println!("{id}");
        }

        Command::UpdateLayer { doc, layer, title, responsibility, remarks } => {
            require_login(&store)?;
            let patch = LayerPatch { title, responsibility_percent: responsibility, remarks };
            edit_document(&store, &config, &doc, |s| s.update_layer(&layer, patch))?;
        }

        Command::RemoveLayer { doc, layer } => {
            require_login(&store)?;
            edit_document(&store, &config, &doc, |s| s.delete_layer(&layer))?;
        }

        Command::AddItem { doc, layer } => {
            require_login(&store)?;
            let id = edit_document(&store, &config, &doc, |s| s.add_item(&layer))?;
            println!("{id}");
        }

        Command::UpdateItem { doc, layer, item, description, qty, rate } => {
            require_login(&store)?;
            let patch = ItemPatch::from_input(description.as_deref(), qty.as_deref(), rate.as_deref());
            edit_document(&store, &config, &doc, |s| s.update_item(&layer, &item, patch))?;
        }

        Command::RemoveItem { doc, layer, item } => {
            require_login(&store)?;
            edit_document(&store, &config, &doc, |s| s.delete_item(&layer, &item))?;
        }

        Command::AddSignature { doc, name, src } => {
            require_login(&store)?;
            let id = edit_document(&store, &config, &doc, |s| s.add_signature(&name, &src))?;
            println!("{id}");
        }

        Command::SelectSignature { doc, name, clear } => {
            require_login(&store)?;
            if name.is_none() && !clear {
                bail!("give a signature name or --clear");
            }
            edit_document(&store, &config, &doc, |s| s.select_signature(name.as_deref()))?;
        }

        Command::RemoveSignature { doc, name } => {
            require_login(&store)?;
            edit_document(&store, &config, &doc, |s| s.remove_signature(&name))?;
        }

        Command::Render { doc, out } => {
            require_login(&store)?;
            let session = EditorSession::new(read_document(&doc)?, &store, &config);
            let html = session.render_page().to_html();
            match out {
                Some(path) => {
                    std::fs::write(&path, html).with_context(|| format!("writing {}", path.display()))?;
                    println!("{}", path.display());
                }
                None => print!("{html}"),
            }
        }

        Command::Print { doc, backend, out_dir, title, padding_mm, fonts, printer } => {
            require_login(&store)?;
            let session = EditorSession::new(read_document(&doc)?, &store, &config);
            let options = PrintOptions {
                title,
                page_padding_mm: padding_mm.unwrap_or(config.page_padding_mm),
                cleanup_timeout: config.print_timeout(),
                extra_fonts: fonts,
                staging_root: None,
            };
            match session.print(&options, backend_for(backend, out_dir, printer)).await {
                PrintStatus::Printed(outcome) => match outcome.output {
                    Some(path) => println!("{}", path.display()),
                    None => println!("sent to {}", outcome.backend),
                },
                PrintStatus::MissingSource => bail!("nothing to print"),
                PrintStatus::TimedOut => bail!(
                    "print did not finish within {:?}; the job may still complete and write its output",
                    options.cleanup_timeout
                ),
                PrintStatus::Failed(reason) => bail!("print failed: {reason}"),
            }
        }
    }

    Ok(())
}
