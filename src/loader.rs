//! Format-dispatched document loading.
//!
//! Readers are registered per file extension; adding a format means adding
//! a [`DocumentReader`] implementation and one registry entry, not editing
//! a central conditional. A single file's load failure is logged and
//! skipped — it never aborts the batch. Ledger I/O errors are fatal.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Config;
use crate::dedup::{FileSource, Ledger};
use crate::models::TextUnit;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Reads one file format into plain text.
pub trait DocumentReader {
    fn read(&self, path: &Path) -> Result<String>;
}

/// UTF-8 text files (`txt`, `md`).
struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
    }
}

struct PdfReader;

impl DocumentReader for PdfReader {
    fn read(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        pdf_extract::extract_text_from_mem(&bytes)
            .with_context(|| format!("PDF extraction failed for {}", path.display()))
    }
}

/// OOXML word processing documents: unzip, pull `w:t` text runs from
/// `word/document.xml`.
struct DocxReader;

impl DocumentReader for DocxReader {
    fn read(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        extract_docx(&bytes).with_context(|| format!("DOCX extraction failed for {}", path.display()))
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let entry = archive
        .by_name("word/document.xml")
        .context("word/document.xml not found")?;

    let mut doc_xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut doc_xml)?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!("word/document.xml exceeds size limit");
    }

    extract_text_runs(&doc_xml)
}

/// Collect the text content of every `<w:t>` element, separating paragraphs
/// (`<w:p>`) with newlines.
fn extract_text_runs(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    // No trim_text: runs like `<w:t> world</w:t>` carry significant
    // leading whitespace, and the in_text guard already drops the
    // inter-element whitespace events.
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => anyhow::bail!("invalid document XML: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Extension → reader registry.
pub struct ReaderRegistry {
    readers: HashMap<String, Box<dyn DocumentReader>>,
}

impl ReaderRegistry {
    /// Registry covering the supported formats: txt, md, pdf, docx.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            readers: HashMap::new(),
        };
        registry.register("txt", Box::new(PlainTextReader));
        registry.register("md", Box::new(PlainTextReader));
        registry.register("pdf", Box::new(PdfReader));
        registry.register("docx", Box::new(DocxReader));
        registry
    }

    pub fn register(&mut self, extension: &str, reader: Box<dyn DocumentReader>) {
        self.readers.insert(extension.to_lowercase(), reader);
    }

    pub fn get(&self, extension: &str) -> Option<&dyn DocumentReader> {
        self.readers
            .get(&extension.to_lowercase())
            .map(|r| r.as_ref())
    }
}

/// Outcome of scanning a scope's raw storage.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub units: Vec<TextUnit>,
    pub skipped_ingested: usize,
    pub skipped_unsupported: usize,
    pub failed: usize,
}

/// Enumerate `raw/<scope>/`, skip already-ingested files via the ledger,
/// and read the rest through the registry.
///
/// The ledger check runs before format dispatch, so unsupported files are
/// also recorded; the check-couples-write contract makes the two
/// inseparable (see [`Ledger::check_and_record`]).
pub fn load_new_documents(
    config: &Config,
    ledger: &mut Ledger,
    registry: &ReaderRegistry,
    scope: &str,
) -> Result<LoadOutcome> {
    let raw_dir = config.raw_dir(scope);
    let mut outcome = LoadOutcome::default();

    if !raw_dir.exists() {
        return Ok(outcome);
    }

    let mut paths: Vec<_> = WalkDir::new(&raw_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    paths.sort();

    for path in paths {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // Ledger corruption or unreadable content is fatal for the run.
        let source = FileSource::new(&path);
        if ledger.check_and_record(scope, &filename, &source)? {
            outcome.skipped_ingested += 1;
            continue;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let Some(reader) = registry.get(&extension) else {
            warn!(scope, file = %filename, ext = %extension, "unsupported extension, skipping");
            outcome.skipped_unsupported += 1;
            continue;
        };

        match reader.read(&path) {
            Ok(text) => outcome.units.push(TextUnit {
                source_file: filename,
                text,
            }),
            Err(e) => {
                warn!(scope, file = %filename, error = %e, "failed to load file, skipping");
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config(dir: &Path) -> Config {
        let toml = format!("[storage]\ndata_dir = \"{}\"\n", dir.display());
        toml::from_str(&toml).unwrap()
    }

    fn setup(dir: &tempfile::TempDir, scope: &str) -> (Config, Ledger) {
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.raw_dir(scope)).unwrap();
        let ledger = Ledger::load(&config.ledger_path()).unwrap();
        (config, ledger)
    }

    #[test]
    fn loads_txt_and_md_files() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut ledger) = setup(&dir, "docs");
        std::fs::write(config.raw_dir("docs").join("a.txt"), "alpha").unwrap();
        std::fs::write(config.raw_dir("docs").join("b.md"), "# beta").unwrap();

        let registry = ReaderRegistry::with_defaults();
        let outcome = load_new_documents(&config, &mut ledger, &registry, "docs").unwrap();

        assert_eq!(outcome.units.len(), 2);
        assert_eq!(outcome.failed, 0);
        let texts: Vec<&str> = outcome.units.iter().map(|u| u.text.as_str()).collect();
        assert!(texts.contains(&"alpha"));
        assert!(texts.contains(&"# beta"));
    }

    #[test]
    fn second_run_skips_ingested_files() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut ledger) = setup(&dir, "docs");
        std::fs::write(config.raw_dir("docs").join("a.txt"), "alpha").unwrap();

        let registry = ReaderRegistry::with_defaults();
        let first = load_new_documents(&config, &mut ledger, &registry, "docs").unwrap();
        assert_eq!(first.units.len(), 1);

        let second = load_new_documents(&config, &mut ledger, &registry, "docs").unwrap();
        assert!(second.units.is_empty());
        assert_eq!(second.skipped_ingested, 1);
    }

    #[test]
    fn unsupported_extension_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut ledger) = setup(&dir, "docs");
        std::fs::write(config.raw_dir("docs").join("img.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(config.raw_dir("docs").join("a.txt"), "alpha").unwrap();

        let registry = ReaderRegistry::with_defaults();
        let outcome = load_new_documents(&config, &mut ledger, &registry, "docs").unwrap();
        assert_eq!(outcome.units.len(), 1);
        assert_eq!(outcome.skipped_unsupported, 1);
    }

    #[test]
    fn unreadable_file_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, mut ledger) = setup(&dir, "docs");
        // Invalid UTF-8 in a .txt file makes the plain-text reader fail.
        std::fs::write(config.raw_dir("docs").join("bad.txt"), [0xff, 0xfe]).unwrap();
        std::fs::write(config.raw_dir("docs").join("ok.txt"), "fine").unwrap();

        let registry = ReaderRegistry::with_defaults();
        let outcome = load_new_documents(&config, &mut ledger, &registry, "docs").unwrap();
        assert_eq!(outcome.units.len(), 1);
        assert_eq!(outcome.failed, 1);
    }

    #[test]
    fn missing_scope_dir_is_empty_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut ledger = Ledger::load(&config.ledger_path()).unwrap();
        let registry = ReaderRegistry::with_defaults();
        let outcome = load_new_documents(&config, &mut ledger, &registry, "ghost").unwrap();
        assert!(outcome.units.is_empty());
    }

    #[test]
    fn docx_text_runs_are_extracted() {
        let xml = br#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t> world</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let text = extract_text_runs(xml).unwrap();
        assert_eq!(text, "Hello world\nSecond paragraph\n");
    }

    #[test]
    fn invalid_docx_is_an_error() {
        assert!(extract_docx(b"not a zip archive").is_err());
    }
}
