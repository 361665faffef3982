mod output;
mod records;

use clap::{Parser, Subcommand};
use lasfera_core::service::annotation_service::{AnnotationService, CreateAnnotationRequest};
use lasfera_core::service::folio_import::{FolioImportRow, FolioImporter};
use lasfera_core::service::outline::load_outline;
use lasfera_core::service::reconcile::{Reconciler, RunMode};
use lasfera_core::service::stanza_import::{
    StanzaImportRow, StanzaImporter, TranslationImportRow,
};
use lasfera_core::{
    default_log_level, init_logging, load_config, open_db, stock_config_toml, Connection,
    FolioRepository, LineCode, Manuscript, PolicyConfig, RangeResolver, SqliteAnnotationRepository,
    SqliteFolioRepository, SqliteStanzaRepository, StanzaRepository,
};
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lasfera")]
#[command(about = "Maintenance passes for the La Sfera edition store")]
#[command(long_about = "\
Maintenance passes for the La Sfera edition store

Text is addressed by line codes of the form book.stanza.line (01.02.07),
optionally a range (01.02.07-01.02.12) or a variant reading (01.02.07a).

Typical order after a bulk re-import:

  lasfera import-stanzas stanzas.yaml
  lasfera import-translations translations.yaml
  lasfera import-folios folios.json       # also resolves folio membership
  lasfera reconcile --dry-run --show-text # review, then run without --dry-run

Only one maintenance process may write to a database at a time. Passes do
not lock the store against each other.

Run 'lasfera gen-config' to print the stock policy file.")]
#[command(version)]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "lasfera.sqlite3", global = true)]
    db: PathBuf,

    /// Policy file (TOML); stock policy when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Absolute directory for rotating log files; logging is off when omitted
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage manuscript witnesses
    #[command(subcommand)]
    Manuscript(ManuscriptCommand),
    /// Upsert stanzas from a JSON/YAML array of {line_code, text, language}
    ImportStanzas { file: PathBuf },
    /// Upsert translations from a JSON/YAML array of {line_code, translated_text, language}
    ImportTranslations { file: PathBuf },
    /// Import folio ranges from a JSON/YAML array of
    /// {manuscript, folio, line_code_starts, next_start_line}
    ImportFolios { file: PathBuf },
    /// Create annotations from a JSON/YAML array of create requests
    ImportAnnotations { file: PathBuf },
    /// Recompute the stanza membership of every folio
    ResolveFolios,
    /// Re-address a stanza, then recompute folio membership
    SetAddress {
        stanza_id: i64,
        /// New starting line code; `-` clears the address
        starts: String,
        /// New closing line code of a multi-line stanza
        ends: Option<String>,
    },
    /// Re-anchor annotations onto the current text
    Reconcile {
        /// Classify without writing
        #[arg(long)]
        dry_run: bool,
        /// Print the text around each match
        #[arg(long)]
        show_text: bool,
    },
    /// Print the book/stanza outline of the edition
    Outline,
    /// Print the stock policy TOML
    GenConfig,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Manuscript(_) => "manuscript",
            Self::ImportStanzas { .. } => "import-stanzas",
            Self::ImportTranslations { .. } => "import-translations",
            Self::ImportFolios { .. } => "import-folios",
            Self::ImportAnnotations { .. } => "import-annotations",
            Self::ResolveFolios => "resolve-folios",
            Self::SetAddress { .. } => "set-address",
            Self::Reconcile { .. } => "reconcile",
            Self::Outline => "outline",
            Self::GenConfig => "gen-config",
        }
    }
}

#[derive(Subcommand)]
enum ManuscriptCommand {
    /// Add a manuscript, or rename an existing one
    Add {
        siglum: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List manuscripts
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    if let Command::GenConfig = cli.command {
        print!("{}", stock_config_toml()?);
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let conn = open_db(&cli.db)?;
    info!(
        "event=cli_command module=cli status=start command={} db={}",
        cli.command.name(),
        cli.db.display()
    );
    if let Err(err) = run(&cli.command, &conn, &config) {
        error!(
            "event=cli_command module=cli status=error command={} error={err}",
            cli.command.name()
        );
        return Err(err);
    }
    Ok(())
}

fn run(
    command: &Command,
    conn: &Connection,
    config: &PolicyConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Manuscript(ManuscriptCommand::Add { siglum, name }) => {
            let folios = SqliteFolioRepository::try_new(conn)?;
            let upsert = folios.upsert_manuscript(&Manuscript {
                siglum: siglum.clone(),
                name: name.clone(),
            })?;
            let verb = if upsert.was_created() { "added" } else { "updated" };
            println!("manuscript {siglum} {verb}");
        }
        Command::Manuscript(ManuscriptCommand::List) => {
            for manuscript in SqliteFolioRepository::try_new(conn)?.list_manuscripts()? {
                match manuscript.name {
                    Some(name) => println!("{}  {name}", manuscript.siglum),
                    None => println!("{}", manuscript.siglum),
                }
            }
        }
        Command::ImportStanzas { file } => {
            let rows: Vec<StanzaImportRow> = records::load_records(file)?;
            let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(conn)?);
            let report = importer.import_stanzas(&rows)?;
            output::print_lines(&output::format_stanza_import(&report));
        }
        Command::ImportTranslations { file } => {
            let rows: Vec<TranslationImportRow> = records::load_records(file)?;
            let importer = StanzaImporter::new(SqliteStanzaRepository::try_new(conn)?);
            let report = importer.import_translations(&rows)?;
            output::print_lines(&output::format_translation_import(&report));
        }
        Command::ImportFolios { file } => {
            let rows: Vec<FolioImportRow> = records::load_records(file)?;
            let importer = FolioImporter::new(resolver(conn, config)?);
            let report = importer.import_rows(&rows)?;
            output::print_lines(&output::format_folio_import(&report));
        }
        Command::ImportAnnotations { file } => {
            let requests: Vec<CreateAnnotationRequest> = records::load_records(file)?;
            let service = AnnotationService::new(
                SqliteStanzaRepository::try_new(conn)?,
                SqliteAnnotationRepository::try_new(conn)?,
            );
            let (mut created, mut skipped) = (0, 0);
            for (index, request) in requests.into_iter().enumerate() {
                match service.create(request) {
                    Ok(annotation) => {
                        created += 1;
                        println!(
                            "row {}: annotation {} on {}",
                            index + 1,
                            annotation.id,
                            annotation.target
                        );
                    }
                    Err(err) if err.is_client_error() => {
                        skipped += 1;
                        println!("row {}: skipped: {err}", index + 1);
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            println!("Annotations: {created} created, {skipped} skipped");
        }
        Command::ResolveFolios => {
            let outcomes = resolver(conn, config)?.resolve_all()?;
            output::print_lines(&output::format_resolution(&outcomes));
        }
        Command::SetAddress {
            stanza_id,
            starts,
            ends,
        } => {
            let starts = match starts.trim() {
                "-" => None,
                value => Some(LineCode::parse(value)?),
            };
            let ends = ends.as_deref().map(LineCode::parse).transpose()?;
            SqliteStanzaRepository::try_new(conn)?.update_stanza_address(*stanza_id, starts, ends)?;
            println!("stanza {stanza_id} re-addressed");
            let outcomes = resolver(conn, config)?.resolve_all()?;
            output::print_lines(&output::format_resolution(&outcomes));
        }
        Command::Reconcile { dry_run, show_text } => {
            let reconciler = Reconciler::new(
                SqliteStanzaRepository::try_new(conn)?,
                SqliteAnnotationRepository::try_new(conn)?,
                config.reconcile.clone(),
            );
            let mode = if *dry_run {
                RunMode::DryRun
            } else {
                RunMode::Apply
            };
            let report = reconciler.run(mode)?;
            output::print_lines(&output::format_reconcile(
                &report,
                *show_text,
                config.reconcile.context_chars,
            ));
        }
        Command::Outline => {
            let outline = load_outline(&SqliteStanzaRepository::try_new(conn)?)?;
            output::print_lines(&output::format_outline(&outline));
        }
        Command::GenConfig => print!("{}", stock_config_toml()?),
    }
    Ok(())
}

type SqliteResolver<'conn> =
    RangeResolver<SqliteStanzaRepository<'conn>, SqliteFolioRepository<'conn>>;

fn resolver<'conn>(
    conn: &'conn Connection,
    config: &PolicyConfig,
) -> Result<SqliteResolver<'conn>, Box<dyn std::error::Error>> {
    Ok(RangeResolver::new(
        SqliteStanzaRepository::try_new(conn)?,
        SqliteFolioRepository::try_new(conn)?,
        config.ranges.boundary,
    ))
}
