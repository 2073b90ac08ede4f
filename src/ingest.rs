//! Ingestion commands: single files, directories, and ticket exports.
//!
//! Files are read as UTF-8 text. Binary formats (PDF, Word) must be
//! extracted upstream; pass the extracted text with `--source-type pdf` to
//! keep the original source type on the resulting chunks.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use support_harness_core::ingest::{IngestDocument, IngestReport, Ingestor};
use support_harness_core::models::SourceType;

use crate::config::Config;
use crate::providers::Providers;
use crate::tickets::{documents_from_export, SkippedRecord, TicketFormat};

/// Options shared by `ingest` and `ingest-dir`.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub source_type: Option<SourceType>,
    pub product_version: Option<String>,
    pub tags: Vec<String>,
    pub section: Option<String>,
    pub replace: bool,
}

/// One document's ingestion result.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub title: String,
    pub source_type: SourceType,
    pub report: IngestReport,
}

/// Ingest documents one after another. A document rejected as invalid is
/// reported as a failure and the batch continues.
pub async fn ingest_documents(
    ingestor: &Ingestor,
    documents: Vec<IngestDocument>,
    replace: bool,
) -> Vec<std::result::Result<DocumentReport, (String, String)>> {
    let mut results = Vec::with_capacity(documents.len());
    for doc in documents {
        let outcome = if replace {
            ingestor.replace_document(&doc).await
        } else {
            ingestor.ingest_document(&doc).await
        };
        results.push(match outcome {
            Ok(report) => Ok(DocumentReport {
                title: doc.title,
                source_type: doc.source_type,
                report,
            }),
            Err(e) => Err((doc.title, e.to_string())),
        });
    }
    results
}

/// Infer the source type from a file extension, unless overridden.
pub fn resolve_source_type(path: &Path, override_type: Option<SourceType>) -> Result<SourceType> {
    if let Some(st) = override_type {
        return Ok(st);
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match SourceType::from_extension(&ext) {
        Some(SourceType::Pdf) | Some(SourceType::Docx) => bail!(
            "{} is a binary document; extract its text first and pass --source-type {}",
            path.display(),
            ext
        ),
        Some(st) => Ok(st),
        None => bail!(
            "Cannot infer source type of {}; pass --source-type",
            path.display()
        ),
    }
}

fn read_document(path: &Path, title: String, options: &FileOptions) -> Result<IngestDocument> {
    let source_type = resolve_source_type(path, options.source_type)?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;
    let mut doc = IngestDocument::new(title, source_type, text);
    doc.product_version = options.product_version.clone();
    doc.tags = options.tags.clone();
    doc.section = options.section.clone();
    doc.extra.insert(
        "path".into(),
        serde_json::Value::String(path.display().to_string()),
    );
    Ok(doc)
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Files under `root` matching `include`, as `(relative path, full path)`,
/// sorted by relative path.
pub fn scan_directory(root: &Path, include: &[String]) -> Result<Vec<(String, PathBuf)>> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }
    let include_set = build_globset(include)?;
    let exclude_set = build_globset(&[
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ])?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

pub fn default_includes() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

fn print_results(results: &[std::result::Result<DocumentReport, (String, String)>]) -> bool {
    let mut ok = true;
    for result in results {
        match result {
            Ok(doc) => {
                let r = &doc.report;
                print!(
                    "  {} ({}): {} chunk{}",
                    doc.title,
                    doc.source_type,
                    r.chunks_created,
                    if r.chunks_created == 1 { "" } else { "s" }
                );
                if r.chunks_replaced > 0 {
                    print!(", {} replaced", r.chunks_replaced);
                }
                if r.chunks_failed > 0 {
                    ok = false;
                    print!(", {} failed", r.chunks_failed);
                }
                println!();
                for err in r.errors() {
                    println!("    error: {}", err);
                }
            }
            Err((title, err)) => {
                ok = false;
                println!("  {}: skipped ({})", title, err);
            }
        }
    }
    ok
}

fn summarize(results: &[std::result::Result<DocumentReport, (String, String)>]) -> (usize, usize) {
    results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .fold((0, 0), |(docs, chunks), d| (docs + 1, chunks + d.report.chunks_created))
}

/// `support ingest <file>`
pub async fn run_ingest_file(
    config: &Config,
    path: &Path,
    title: Option<String>,
    options: FileOptions,
) -> Result<()> {
    let title = match title {
        Some(t) => t,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a title from {}", path.display()))?,
    };
    let doc = read_document(path, title, &options)?;
    let providers = Providers::from_config(config).await?;

    let results = ingest_documents(&providers.ingestor, vec![doc], options.replace).await;
    println!("Ingested {}:", path.display());
    let ok = print_results(&results);
    providers.pool.close().await;
    if !ok {
        bail!("Ingestion finished with errors");
    }
    Ok(())
}

/// `support ingest-dir <dir>`; titles are paths relative to `dir`.
pub async fn run_ingest_dir(
    config: &Config,
    dir: &Path,
    include: Vec<String>,
    options: FileOptions,
) -> Result<()> {
    let include = if include.is_empty() {
        default_includes()
    } else {
        include
    };
    let files = scan_directory(dir, &include)?;
    if files.is_empty() {
        println!("No matching files under {}", dir.display());
        return Ok(());
    }

    let mut documents = Vec::with_capacity(files.len());
    for (relative, path) in &files {
        documents.push(read_document(path, relative.clone(), &options)?);
    }

    let providers = Providers::from_config(config).await?;
    let results = ingest_documents(&providers.ingestor, documents, options.replace).await;
    println!("Ingesting {} file(s) from {}:", files.len(), dir.display());
    let ok = print_results(&results);
    let (docs, chunks) = summarize(&results);
    println!();
    println!("  {} document(s), {} chunk(s) written", docs, chunks);
    providers.pool.close().await;
    if !ok {
        bail!("Ingestion finished with errors");
    }
    Ok(())
}

/// `support import-tickets <file.json>`
pub async fn run_import_tickets(
    config: &Config,
    path: &Path,
    format: TicketFormat,
    product_version: Option<String>,
    replace: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let export: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let import = documents_from_export(format, &export, product_version.as_deref())?;

    let providers = Providers::from_config(config).await?;
    let results = ingest_documents(&providers.ingestor, import.documents, replace).await;
    println!("Importing {} tickets from {}:", format.as_str(), path.display());
    let ok = print_results(&results);
    print_skipped(&import.skipped);
    let (docs, chunks) = summarize(&results);
    println!();
    println!(
        "  {} document(s), {} chunk(s) written, {} record(s) skipped",
        docs,
        chunks,
        import.skipped.len()
    );
    providers.pool.close().await;
    if !ok {
        bail!("Import finished with errors");
    }
    Ok(())
}

fn print_skipped(skipped: &[SkippedRecord]) {
    for s in skipped {
        println!("  record {}: skipped ({})", s.index, s.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_source_type() {
        assert_eq!(
            resolve_source_type(Path::new("a/guide.md"), None).unwrap(),
            SourceType::Md
        );
        assert_eq!(
            resolve_source_type(Path::new("notes.TXT"), None).unwrap(),
            SourceType::Txt
        );
        assert!(resolve_source_type(Path::new("manual.pdf"), None).is_err());
        assert_eq!(
            resolve_source_type(Path::new("manual.pdf.txt"), Some(SourceType::Pdf)).unwrap(),
            SourceType::Pdf
        );
        assert!(resolve_source_type(Path::new("data.bin"), None).is_err());
    }

    #[test]
    fn test_scan_directory_filters_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("guides")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("guides/b.md"), "b").unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1]).unwrap();
        std::fs::write(root.join(".git/HEAD.md"), "ref").unwrap();

        let files = scan_directory(root, &default_includes()).unwrap();
        let names: Vec<&str> = files.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "guides/b.md"]);
    }

    #[test]
    fn test_scan_missing_directory() {
        assert!(scan_directory(Path::new("/definitely/not/here"), &default_includes()).is_err());
    }
}
