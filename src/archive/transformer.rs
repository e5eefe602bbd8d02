use super::{ArchiveEntry, StripError};
use crate::config::{ParseErrorPolicy, StripConfig};
use crate::rewrite::{self, RewriteRule};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use zip::{ZipArchive, ZipWriter};

/// Summary of one transform run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    pub entries: usize,
    pub classes: usize,
    pub rewritten_classes: usize,
    pub call_sites: usize,
    pub field_sites: usize,
    /// Class entries copied unchanged because they failed to parse
    pub passed_through: Vec<String>,
    /// Hex SHA-256 of the written archive
    pub sha256: String,
}

/// Rewrites every class in a jar so that touching the disallowed namespace
/// throws instead of linking
pub struct ArchiveTransformer {
    config: StripConfig,
    rule: RewriteRule,
}

impl ArchiveTransformer {
    pub fn new(config: StripConfig) -> Self {
        let rule = RewriteRule::from_config(&config);
        Self { config, rule }
    }

    /// Transform the jar at `input` into a new jar at `output`.
    ///
    /// `output` is created or truncated. If anything fails it is removed, so a
    /// destination is only left behind on success.
    pub fn transform(&self, input: &Path, output: &Path) -> Result<StripReport, StripError> {
        let input_path = fs::canonicalize(input).map_err(|source| StripError::OpenInput {
            path: input.to_path_buf(),
            source,
        })?;
        if fs::canonicalize(output).is_ok_and(|p| p == input_path) {
            return Err(StripError::SamePath(output.to_path_buf()));
        }

        let file = File::open(&input_path).map_err(|source| StripError::OpenInput {
            path: input.to_path_buf(),
            source,
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(StripError::Input)?;

        let out_file = File::create(output).map_err(|source| StripError::OutputFile {
            path: output.to_path_buf(),
            source,
        })?;

        let result = self
            .transform_archive(&mut archive, BufWriter::new(out_file))
            .and_then(|(mut sink, report)| {
                sink.flush().map_err(|source| StripError::OutputFile {
                    path: output.to_path_buf(),
                    source,
                })?;
                drop(sink);
                let written = fs::read(output).map_err(|source| StripError::OutputFile {
                    path: output.to_path_buf(),
                    source,
                })?;
                Ok(StripReport {
                    sha256: hex::encode(Sha256::digest(&written)),
                    ..report
                })
            });

        if result.is_err() {
            if let Err(e) = fs::remove_file(output) {
                tracing::warn!(path = %output.display(), error = %e, "Failed to remove partial output");
            }
        }
        result
    }

    /// Transform an in-memory jar
    pub fn transform_bytes(&self, input: &[u8]) -> Result<(Vec<u8>, StripReport), StripError> {
        let mut archive = ZipArchive::new(Cursor::new(input)).map_err(StripError::Input)?;
        let (cursor, report) = self.transform_archive(&mut archive, Cursor::new(Vec::new()))?;
        let bytes = cursor.into_inner();
        let report = StripReport {
            sha256: hex::encode(Sha256::digest(&bytes)),
            ..report
        };
        Ok((bytes, report))
    }

    fn transform_archive<R, W>(
        &self,
        archive: &mut ZipArchive<R>,
        sink: W,
    ) -> Result<(W, StripReport), StripError>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let mut writer = ZipWriter::new(sink);
        let mut report = StripReport::default();

        for index in 0..archive.len() {
            let entry = ArchiveEntry::read(archive, index, self.config.max_entry_size)?;
            report.entries += 1;
            let options = entry.write_options();

            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(StripError::Output)?;
                continue;
            }

            let rewritten = if entry.is_class() {
                report.classes += 1;
                self.strip_class(&entry, &mut report)?
            } else {
                None
            };

            writer
                .start_file(entry.name.as_str(), options)
                .map_err(StripError::Output)?;
            writer
                .write_all(rewritten.as_deref().unwrap_or(&entry.data))
                .map_err(|source| StripError::OutputEntry {
                    entry: entry.name.clone(),
                    source,
                })?;
        }

        let sink = writer.finish().map_err(StripError::Output)?;
        Ok((sink, report))
    }

    /// New bytes for a class entry, or `None` to copy it unchanged
    fn strip_class(
        &self,
        entry: &ArchiveEntry,
        report: &mut StripReport,
    ) -> Result<Option<Vec<u8>>, StripError> {
        match rewrite::rewrite_class(&entry.data, &self.rule) {
            Ok(result) => {
                tracing::info!(
                    entry = %entry.name,
                    class = %result.class_name,
                    calls = result.sites.calls,
                    fields = result.sites.fields,
                    "Processed class"
                );
                if result.bytes.is_some() {
                    report.rewritten_classes += 1;
                    report.call_sites += result.sites.calls;
                    report.field_sites += result.sites.fields;
                }
                Ok(result.bytes)
            }
            Err(source) => match self.config.on_parse_error {
                ParseErrorPolicy::Abort => Err(StripError::Parse {
                    entry: entry.name.clone(),
                    source,
                }),
                ParseErrorPolicy::Copy => {
                    tracing::warn!(
                        entry = %entry.name,
                        error = %source,
                        "Copying class unchanged after parse failure"
                    );
                    report.passed_through.push(entry.name.clone());
                    Ok(None)
                }
            },
        }
    }
}

impl Default for ArchiveTransformer {
    fn default() -> Self {
        Self::new(StripConfig::default())
    }
}
