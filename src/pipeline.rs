//! Conversion batch orchestration.
//!
//! Each listed file runs through its own small state machine and ends in a
//! [`ConversionOutcome`]; one file failing never stops the rest of the batch.

use crate::codec::ImageCodec;
use crate::ledger::ConversionLedger;
use crate::models::{
    ConversionOptions, ConversionOutcome, FailureKind, RemoteFile, SkipReason, HEIC_EXTENSIONS,
};
use crate::report::{CompressionReporter, Report};
use crate::resize::compute_target;
use crate::store::RemoteFileStore;
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Name fragments passed to the store when listing candidates.
pub const HEIC_NAME_FILTERS: [&str; 2] = [".heic", ".heif"];

/// Drives listing, conversion, and bookkeeping for one collection.
pub struct ConversionPipeline {
    store: Box<dyn RemoteFileStore>,
    codec: Box<dyn ImageCodec>,
    ledger: ConversionLedger,
}

/// Injectable capability bundle used to construct [`ConversionPipeline`].
pub struct PipelineServices {
    pub store: Box<dyn RemoteFileStore>,
    pub codec: Box<dyn ImageCodec>,
}

struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    fn new(kind: FailureKind, error: impl std::fmt::Display) -> Self {
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

impl ConversionPipeline {
    pub fn with_services(services: PipelineServices, ledger: ConversionLedger) -> Self {
        Self {
            store: services.store,
            codec: services.codec,
            ledger,
        }
    }

    pub fn ledger(&self) -> &ConversionLedger {
        &self.ledger
    }

    /// Convert every pending HEIC candidate and report what happened.
    ///
    /// Errors are returned only when the batch cannot start at all (output
    /// directory or listing unavailable); per-file problems end up in the
    /// report as `Failed` outcomes.
    pub async fn run(&mut self, options: &ConversionOptions) -> Result<Report> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);

        async {
            fs::create_dir_all(options.output_dir())?;

            let candidates = self
                .store
                .list(options.container_filter(), &HEIC_NAME_FILTERS)
                .await?;

            if candidates.is_empty() {
                info!("No HEIC files found");
            }

            let mut reporter = CompressionReporter::new();
            let mut claimed = HashSet::new();

            for file in &candidates {
                let outcome = self.process_file(file, options, &mut claimed).await;
                reporter.add_outcome(outcome);
            }

            let report = reporter.summary(run_id);
            info!(
                "Run complete: {} converted, {} skipped, {} failed",
                report.converted, report.skipped, report.failed
            );
            Ok::<Report, Error>(report)
        }
        .instrument(span)
        .await
    }

    async fn process_file(
        &mut self,
        file: &RemoteFile,
        options: &ConversionOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> ConversionOutcome {
        if !file.is_heic() {
            info!("Skipping {} (not a HEIC file)", file.name);
            return ConversionOutcome::Skipped {
                remote_id: file.id.clone(),
                name: file.name.clone(),
                reason: SkipReason::NotHeic,
            };
        }

        if let Some(existing) = self.ledger.get(&file.id) {
            info!(
                "Skipping {} (already converted to {})",
                file.name,
                existing.output_path.display()
            );
            return ConversionOutcome::Skipped {
                remote_id: file.id.clone(),
                name: file.name.clone(),
                reason: SkipReason::AlreadyConverted,
            };
        }

        info!("Processing {}...", file.name);

        match self.convert(file, options, claimed).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                error!(
                    "Error processing {} ({}): {}",
                    file.name, failure.kind, failure.message
                );
                ConversionOutcome::Failed {
                    remote_id: file.id.clone(),
                    name: file.name.clone(),
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        }
    }

    async fn convert(
        &mut self,
        file: &RemoteFile,
        options: &ConversionOptions,
        claimed: &mut HashSet<PathBuf>,
    ) -> std::result::Result<ConversionOutcome, Failure> {
        let heic_data = self
            .store
            .fetch(&file.id)
            .await
            .map_err(|e| Failure::new(FailureKind::Fetch, e))?;

        let image = self
            .codec
            .decode_heic(&heic_data)
            .await
            .map_err(|e| Failure::new(FailureKind::Decode, e))?;

        let (width, height) = compute_target(
            image.width(),
            image.height(),
            options.max_width(),
            options.max_height(),
        )
        .map_err(|e| Failure::new(FailureKind::Decode, e))?;

        let image = if (width, height) != (image.width(), image.height()) {
            let resized = self
                .codec
                .resize(image, width, height)
                .await
                .map_err(|e| Failure::new(FailureKind::Encode, e))?;
            info!("Resized image to {}x{}", width, height);
            resized
        } else {
            image
        };

        let jpg_data = self
            .codec
            .encode_jpeg(image, options.quality())
            .await
            .map_err(|e| Failure::new(FailureKind::Encode, e))?;
        if jpg_data.is_empty() {
            return Err(Failure::new(
                FailureKind::Encode,
                "encoder produced an empty JPG",
            ));
        }

        let output_path = self.allocate_output_path(file, options.output_dir(), claimed);
        write_new_file(options.output_dir(), &output_path, &jpg_data)
            .map_err(|e| Failure::new(FailureKind::Write, e))?;
        claimed.insert(output_path.clone());

        let original_size = heic_data.len() as u64;
        let compressed_size = jpg_data.len() as u64;

        let record = match self.ledger.record(&file.id, &output_path, original_size, compressed_size) {
            Ok(record) => record,
            Err(e) => {
                // Keep disk and ledger in agreement so a rerun starts clean
                if let Err(remove_err) = fs::remove_file(&output_path) {
                    warn!(
                        "Could not remove {} after ledger failure: {}",
                        output_path.display(),
                        remove_err
                    );
                }
                return Err(Failure::new(FailureKind::Write, e));
            }
        };

        let compression_ratio = if original_size > 0 {
            (1.0 - compressed_size as f64 / original_size as f64) * 100.0
        } else {
            0.0
        };
        info!(
            "Converted {} -> {} ({}KB -> {}KB, {:.1}% smaller)",
            file.name,
            output_path.display(),
            original_size / 1024,
            compressed_size / 1024,
            compression_ratio
        );

        Ok(ConversionOutcome::Converted(record))
    }

    /// Pick a free `<stem>.jpg` in `output_dir`, appending `_1`, `_2`, ... on collision.
    ///
    /// A name is taken when another file of this run got it, when the ledger
    /// assigns it to a different remote id, or when it already exists on disk.
    fn allocate_output_path(
        &self,
        file: &RemoteFile,
        output_dir: &Path,
        claimed: &HashSet<PathBuf>,
    ) -> PathBuf {
        let stem = output_stem(file);
        let is_taken = |candidate: &Path| {
            claimed.contains(candidate)
                || self.ledger.output_claimed(candidate, &file.id)
                || candidate.exists()
        };

        let first = output_dir.join(format!("{}.jpg", stem));
        if !is_taken(&first) {
            return first;
        }

        let mut suffix = 1usize;
        loop {
            let candidate = output_dir.join(format!("{}_{}.jpg", stem, suffix));
            if !is_taken(&candidate) {
                warn!(
                    "Output name for {} is taken, using {}",
                    file.name,
                    candidate.display()
                );
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Delete the remote originals of files converted in `report`.
    ///
    /// Returns how many were deleted; failures are logged and skipped.
    pub async fn delete_originals(&self, report: &Report) -> usize {
        let mut deleted = 0;

        for remote_id in report.converted_ids() {
            match self.store.delete(remote_id).await {
                Ok(()) => {
                    info!("Deleted original HEIC file: {}", remote_id);
                    deleted += 1;
                }
                Err(e) => error!("Error deleting file {}: {}", remote_id, e),
            }
        }

        info!("Deleted {} original HEIC files", deleted);
        deleted
    }
}

/// Sanitized file stem for the JPG produced from `file`.
pub fn output_stem(file: &RemoteFile) -> String {
    let name = file.name.as_str();
    let lower = name.to_ascii_lowercase();

    let stem = HEIC_EXTENSIONS
        .iter()
        .find_map(|ext| {
            let suffix = format!(".{}", ext);
            lower
                .ends_with(&suffix)
                .then(|| &name[..name.len() - suffix.len()])
        })
        .unwrap_or_else(|| {
            Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
        });

    let sanitized = sanitize(stem);
    if sanitized.trim_matches('.').is_empty() {
        sanitize(&file.id)
    } else {
        sanitized
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Write `data` to `path` via a temp file in `dir`, refusing to replace an existing file.
fn write_new_file(dir: &Path, path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(path)
        .map_err(|e| Error::Io(e.error))?;
    Ok(())
}
