//! Command-line interface.
//!
//! Subcommands cover the whole engine surface: scanning, indexing,
//! searching, asking, comparing, synonym management, index rebuilds and
//! package tooling.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::indexer::IndexOptions;
use crate::search::{SearchMode, SearchOptions};
use crate::storage::DEFAULT_DB_PATH;

/// casearch: hybrid retrieval and Q&A over collective agreement PDFs.
#[derive(Parser, Debug)]
#[command(name = "casearch")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the application database file.
    #[arg(long, env = "DATABASE_PATH")]
    pub db_path: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the database schema.
    Init,

    /// Scan a directory for agreement PDFs.
    Scan {
        /// Directory to scan (defaults to the configured agreements dir).
        dir: Option<PathBuf>,
    },

    /// Index one file, or every tracked file.
    Index {
        /// File id to index.
        id: Option<i64>,

        /// Index every tracked file.
        #[arg(long)]
        all: bool,

        /// Skip structure-aware chunking.
        #[arg(long)]
        no_structure: bool,

        /// Build dense embeddings per chunk.
        #[arg(long)]
        embeddings: bool,
    },

    /// Full-text search over indexed pages.
    Search {
        /// The search query (quoted phrases supported).
        query: String,

        /// Maximum results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Term mode: and, or.
        #[arg(long, default_value = "and")]
        mode: String,

        /// Restrict to one file id.
        #[arg(long)]
        file_id: Option<i64>,
    },

    /// Ask a question over the indexed corpus.
    Ask {
        /// The question.
        question: String,
    },

    /// Compare documents by topic.
    Compare {
        /// File ids to compare.
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Topic term to locate in each document.
        #[arg(short, long)]
        topic: Option<String>,

        /// Run an AI comparison instead of term highlighting.
        #[arg(long)]
        ai: bool,
    },

    /// Build a structured comparison matrix across documents.
    Matrix {
        /// File ids to compare.
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Topic to compare.
        #[arg(short, long)]
        topic: String,
    },

    /// AI analysis of search results for a query.
    Analyze {
        /// The query to analyze.
        query: String,

        /// Restrict to one file id.
        #[arg(long)]
        file_id: Option<i64>,
    },

    /// Manage custom synonyms.
    #[command(subcommand)]
    Synonyms(SynonymsCommand),

    /// Rebuild the FTS indexes from the entity tables.
    RebuildFts,

    /// Rebuild the dense-vector collection.
    RebuildSemantic {
        /// Index pages instead of chunks.
        #[arg(long)]
        pages: bool,
    },

    /// Rebuild the TF-IDF page index.
    RebuildVectors,

    /// Toggle a file's public flag.
    TogglePublic {
        /// File id.
        id: i64,
    },

    /// Build or verify an index package.
    #[command(subcommand)]
    Package(PackageCommand),

    /// Show database statistics.
    Status,
}

/// Synonym management subcommands.
#[derive(Subcommand, Debug)]
pub enum SynonymsCommand {
    /// List the merged synonym dictionary.
    List,

    /// Set the synonyms for a canonical term.
    Set {
        /// Canonical term.
        term: String,

        /// Synonyms for the term.
        #[arg(required = true)]
        synonyms: Vec<String>,
    },

    /// Remove a custom term.
    Remove {
        /// Canonical term.
        term: String,
    },
}

/// Package subcommands.
#[derive(Subcommand, Debug)]
pub enum PackageCommand {
    /// Build index-v<version>.zip with its checksum sidecar.
    #[command(disable_version_flag = true)]
    Build {
        /// Package version (semver).
        #[arg(long)]
        version: String,

        /// Output directory.
        #[arg(long, default_value = "dist")]
        out: PathBuf,
    },

    /// Verify a package's checksum and metadata.
    Verify {
        /// Path to the package zip.
        path: PathBuf,
    },

    /// Install a package: stage, swap the database, record the version.
    Install {
        /// Path to the package zip.
        path: PathBuf,
    },
}

impl Cli {
    /// Resolved settings for this invocation.
    #[must_use]
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(db_path) = &self.db_path {
            settings.database_path = db_path.clone();
        } else if settings.database_path.as_os_str().is_empty() {
            settings.database_path = PathBuf::from(DEFAULT_DB_PATH);
        }
        settings
    }

    /// Whether JSON output was requested.
    #[must_use]
    pub fn json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Executes a parsed CLI invocation and returns the output text.
pub fn execute(cli: &Cli) -> Result<String> {
    let settings = cli.settings();
    let json = cli.json();
    let engine = Engine::new(settings.clone())?;

    match &cli.command {
        Commands::Init => {
            // Engine construction already ran init + migrations
            Ok(format!(
                "Initialized database at {} (schema v{})\n",
                settings.database_path.display(),
                engine.store().schema_version()?
            ))
        }

        Commands::Scan { dir } => {
            let dir = dir.clone().unwrap_or_else(|| settings.agreements_dir.clone());
            let report = engine.scan(&dir)?;
            if json {
                return to_json(&report);
            }
            let mut out = format!(
                "Scan complete: {} new, {} changed, {} unchanged, {} missing\n",
                report.new, report.changed, report.unchanged, report.missing
            );
            for error in &report.errors {
                let _ = writeln!(out, "  error: {}: {}", error.path, error.error);
            }
            Ok(out)
        }

        Commands::Index {
            id,
            all,
            no_structure,
            embeddings,
        } => {
            let opts = IndexOptions {
                use_structure: !no_structure,
                build_embeddings: *embeddings,
            };
            if *all {
                let report = engine.reindex_all(&opts)?;
                if json {
                    return to_json(&report);
                }
                let mut out = format!(
                    "Indexed {} files, {} failed\n",
                    report.success, report.failed
                );
                for (file_id, error) in &report.errors {
                    let _ = writeln!(out, "  file {file_id}: {error}");
                }
                Ok(out)
            } else {
                let id = id.ok_or_else(|| Error::Config {
                    message: "pass a file id or --all".to_string(),
                })?;
                let report = engine.index_file(id, &opts)?;
                if json {
                    return to_json(&report);
                }
                Ok(format!(
                    "Indexed file {id}: {} pages, {} chunks, {} embeddings\n",
                    report.pages, report.chunks, report.embeddings
                ))
            }
        }

        Commands::Search {
            query,
            limit,
            mode,
            file_id,
        } => {
            let opts = SearchOptions {
                limit: *limit,
                mode: SearchMode::parse(mode),
                file_id: *file_id,
                fallback_to_or: true,
            };
            let hits = engine.search(query, &opts)?;
            if json {
                return to_json(&hits);
            }
            if hits.is_empty() {
                return Ok("No results.\n".to_string());
            }
            let mut out = String::new();
            for hit in &hits {
                let _ = writeln!(
                    out,
                    "{} p.{} (score {:.3})\n  {}",
                    hit.filename, hit.page_number, hit.score, hit.snippet
                );
            }
            Ok(out)
        }

        Commands::Ask { question } => {
            let response = engine.answer(question);
            if json {
                return to_json(&response);
            }
            let mut out = String::new();
            let _ = writeln!(out, "{}", response.answer);
            if !response.citations.is_empty() {
                let _ = writeln!(out, "\nCitations:");
                for citation in &response.citations {
                    let _ = writeln!(
                        out,
                        "  {} p.{}",
                        citation.filename, citation.page_number
                    );
                }
            }
            for warning in &response.verification_warnings {
                let _ = writeln!(out, "warning: {warning}");
            }
            Ok(out)
        }

        Commands::Compare { ids, topic, ai } => {
            if *ai {
                let result = engine.ai_compare_documents(ids, topic.as_deref());
                if json {
                    return to_json(&result);
                }
                let mut out = String::new();
                if let Some(error) = &result.error {
                    let _ = writeln!(out, "error: {error}");
                } else {
                    let _ = writeln!(out, "{}", result.analysis);
                    let _ = writeln!(out, "\nSources:");
                    for source in &result.sources {
                        let _ = writeln!(out, "  {} p.{}", source.filename, source.page_number);
                    }
                }
                return Ok(out);
            }

            let result = engine.compare_documents_multi(ids, topic.as_deref())?;
            if json {
                return to_json(&result);
            }
            let mut out = String::new();
            for doc in &result.documents {
                let _ = writeln!(
                    out,
                    "{} (file {}, {} pages)",
                    doc.filename, doc.file_id, doc.page_count
                );
            }
            let _ = writeln!(out, "{} matches", result.matches.len());
            for m in &result.matches {
                let _ = writeln!(out, "  {} p.{}: {}", m.filename, m.page_number, m.snippet);
            }
            Ok(out)
        }

        Commands::Matrix { ids, topic } => {
            let result = engine.compare_matrix(topic, ids);
            if json {
                return to_json(&result);
            }
            let mut out = String::new();
            if let Some(error) = &result.error {
                let _ = writeln!(out, "error: {error}");
                return Ok(out);
            }
            let _ = writeln!(out, "Topic: {}", result.topic);
            for aspect in &result.aspects {
                let _ = writeln!(out, "\n{aspect}:");
                for doc in &result.documents {
                    let value = doc.values.get(aspect).map_or("Not specified", String::as_str);
                    let _ = writeln!(out, "  {}: {value}", doc.name);
                }
            }
            Ok(out)
        }

        Commands::Analyze { query, file_id } => {
            let result = engine.analyze_search_results(query, *file_id);
            if json {
                return to_json(&result);
            }
            let mut out = String::new();
            if let Some(error) = &result.error {
                let _ = writeln!(out, "error: {error}");
            } else {
                let _ = writeln!(out, "{}", result.analysis);
                let _ = writeln!(out, "\nSources:");
                for source in &result.sources {
                    let _ = writeln!(out, "  {} p.{}", source.filename, source.page_number);
                }
            }
            Ok(out)
        }

        Commands::Synonyms(command) => match command {
            SynonymsCommand::List => {
                let merged = engine.synonyms().merged(engine.store())?;
                if json {
                    return to_json(&merged.forward);
                }
                let mut out = String::new();
                for (canonical, synonyms) in &merged.forward {
                    let _ = writeln!(out, "{canonical}: {}", synonyms.join(", "));
                }
                Ok(out)
            }
            SynonymsCommand::Set { term, synonyms } => {
                let mut map = std::collections::BTreeMap::new();
                map.insert(term.clone(), synonyms.clone());
                let count = engine.synonyms().save_custom(engine.store(), &map, false)?;
                Ok(format!("Saved {count} term(s)\n"))
            }
            SynonymsCommand::Remove { term } => {
                let removed = engine.synonyms().delete_custom(engine.store(), term)?;
                Ok(if removed {
                    format!("Removed {term}\n")
                } else {
                    format!("No custom entry for {term}\n")
                })
            }
        },

        Commands::RebuildFts => {
            let report = engine.rebuild_fts()?;
            if json {
                return to_json(&report);
            }
            Ok(format!("{}\n", report.message))
        }

        Commands::RebuildSemantic { pages } => {
            let report = engine.rebuild_semantic_index(!pages, None)?;
            if json {
                return to_json(&report);
            }
            Ok(format!("{}\n", report.message))
        }

        Commands::RebuildVectors => {
            let report = engine.rebuild_vector_index(None)?;
            if json {
                return to_json(&report);
            }
            Ok(format!("{}\n", report.message))
        }

        Commands::TogglePublic { id } => {
            let public = engine.toggle_public(*id)?;
            Ok(format!(
                "File {id} is now {}\n",
                if public { "public" } else { "private" }
            ))
        }

        Commands::Package(command) => match command {
            PackageCommand::Build { version, out } => {
                let built = crate::package::build_package(
                    &settings.database_path,
                    engine.store().schema_version()?,
                    version,
                    out,
                )?;
                Ok(format!(
                    "Built {}\n  sha256: {}\n",
                    built.zip_path.display(),
                    built.checksum
                ))
            }
            PackageCommand::Verify { path } => {
                let metadata = crate::package::verify_package(path)?;
                Ok(format!(
                    "OK: version {} (schema v{})\n",
                    metadata.version, metadata.schema_version
                ))
            }
            PackageCommand::Install { path } => {
                let metadata = crate::package::install_package(
                    path,
                    &settings.database_path,
                    &settings.index_dir,
                )?;
                Ok(format!("Installed index v{}\n", metadata.version))
            }
        },

        Commands::Status => {
            let stats = engine.stats()?;
            if json {
                return to_json(&stats);
            }
            Ok(format!(
                "files: {} ({} indexed, {} errors)\npages: {}\nchunks: {}\nvectors: {}\nschema: v{}\nindex version: {}\n",
                stats.total_files,
                stats.indexed_files,
                stats.error_files,
                stats.total_pages,
                stats.total_chunks,
                stats.vector_entries,
                stats.schema_version,
                crate::package::read_index_version(&settings.index_dir)
                    .unwrap_or_else(|| "none".to_string()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_settings_db_path_override() {
        let cli = Cli {
            db_path: Some(PathBuf::from("/custom/path.db")),
            format: "text".to_string(),
            command: Commands::Status,
        };
        assert_eq!(cli.settings().database_path, PathBuf::from("/custom/path.db"));
    }

    #[test]
    fn test_json_flag() {
        let cli = Cli {
            db_path: None,
            format: "JSON".to_string(),
            command: Commands::Status,
        };
        assert!(cli.json());
    }
}
