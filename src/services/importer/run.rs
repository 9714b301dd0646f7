//! Orchestrates the ZIP importer's phases: size gate, format detection,
//! streaming parse + normalization, batched commit, hard cap, finalization.
//!
//! The archive is parsed synchronously off the filesystem on a blocking
//! thread (`zip`/`serde_json` are sync APIs). Completed batches cross to the
//! async commit loop over a bounded channel, keeping the pipeline
//! memory-bounded: at most one batch's worth of records is ever queued
//! waiting for a commit.

use std::fs::File;
use std::io::Read;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use zip::ZipArchive;

use crate::config::ImportConfig;
use crate::error::{AppError, Result};
use crate::models::{ArchiveFormat, BatchOutcome, ImportJob, ImportStatus, NormalizedPlay};
use crate::services::job_ledger::JobLedger;
use crate::services::repository::MusicRepository;

use super::format::detect_format;
use super::normalize::{normalize_account_data, normalize_extended};
use super::records::{AccountDataRecord, ExtendedRecord};
use super::streaming::stream_json_array;

pub struct ZipImporter {
    repository: MusicRepository,
    job_ledger: JobLedger,
    config: ImportConfig,
}

#[derive(Debug)]
enum ParseError {
    RecordCapExceeded(u64),
    Malformed(String),
}

struct ParseSummary {
    total_seen: u64,
    skipped_missing: u64,
}

impl ZipImporter {
    pub fn new(repository: MusicRepository, job_ledger: JobLedger, config: ImportConfig) -> Self {
        Self {
            repository,
            job_ledger,
            config,
        }
    }

    pub async fn run(&self, job: &mut ImportJob) -> Result<()> {
        let job_run = self
            .job_ledger
            .begin(job.user_id, crate::models::JobType::Import)
            .await?;

        match self.run_inner(job).await {
            Ok(outcome) => {
                let fetched = (outcome.0.inserted + outcome.0.skipped) as i64;
                self.job_ledger
                    .finish(job_run.id, fetched, outcome.0.inserted as i64, outcome.0.skipped as i64)
                    .await?;
                job.status = ImportStatus::Success.to_string();
                job.records_ingested = outcome.0.inserted as i64;
                job.earliest_played_at = outcome.0.earliest_played_at;
                job.latest_played_at = outcome.0.latest_played_at;
                job.detected_format = Some(outcome.1.as_str().to_string());
                job.updated_at = Utc::now();
                Ok(())
            }
            Err(err) => {
                self.job_ledger.fail(job_run.id, &err.to_string()).await?;
                job.status = ImportStatus::Error.to_string();
                job.error_message = Some(err.to_string());
                job.updated_at = Utc::now();
                Err(err)
            }
        }
    }

    async fn run_inner(&self, job: &ImportJob) -> Result<(BatchOutcome, ArchiveFormat)> {
        let metadata = tokio::fs::metadata(&job.archive_path)
            .await
            .map_err(|e| AppError::Internal(format!("cannot stat archive: {e}")))?;
        let size_mb = metadata.len() / (1024 * 1024);
        if size_mb > self.config.max_zip_size_mb {
            return Err(AppError::ArchiveTooLarge(format!(
                "archive is {size_mb} MB, exceeds the {} MB limit",
                self.config.max_zip_size_mb
            )));
        }

        let path = job.archive_path.clone();
        let batch_size = self.config.batch_size;
        let max_records = self.config.max_records;

        let (tx, mut rx) = mpsc::channel::<Vec<NormalizedPlay>>(2);
        let (format_tx, format_rx) = oneshot::channel::<ArchiveFormat>();

        let parse_task = tokio::task::spawn_blocking(move || {
            parse_archive_blocking(&path, batch_size, max_records, tx, format_tx)
        });

        let mut outcome = BatchOutcome::default();
        while let Some(batch) = rx.recv().await {
            let batch_outcome = self.repository.batch_process(job.user_id, &batch).await?;
            outcome.merge(batch_outcome);
        }

        let detected_format = format_rx
            .await
            .map_err(|_| AppError::UnrecognizedFormat("archive had no matching entries".to_string()))?;

        let parse_result = parse_task
            .await
            .map_err(|e| AppError::Internal(format!("import worker panicked: {e}")))?;

        match parse_result {
            Ok(summary) => {
                outcome.skipped += summary.skipped_missing;
                tracing::debug!(
                    total_seen = summary.total_seen,
                    skipped_missing = summary.skipped_missing,
                    "archive parse finished"
                );
                Ok((outcome, detected_format))
            }
            Err(ParseError::RecordCapExceeded(seen)) => Err(AppError::RecordCapExceeded(format!(
                "import exceeded {max_records} records (saw at least {seen})"
            ))),
            Err(ParseError::Malformed(message)) => Err(AppError::UnrecognizedFormat(message)),
        }
    }
}

fn parse_archive_blocking(
    path: &str,
    batch_size: usize,
    max_records: u64,
    tx: mpsc::Sender<Vec<NormalizedPlay>>,
    format_tx: oneshot::Sender<ArchiveFormat>,
) -> std::result::Result<ParseSummary, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::Malformed(format!("cannot open archive: {e}")))?;
    let mut archive = ZipArchive::new(file).map_err(|e| ParseError::Malformed(format!("not a zip archive: {e}")))?;

    let (format, entries) = detect_format(&mut archive).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let _ = format_tx.send(format);

    let mut batch: Vec<NormalizedPlay> = Vec::with_capacity(batch_size);
    let mut total_seen: u64 = 0;
    let mut skipped_missing: u64 = 0;

    for entry_name in &entries {
        let mut entry = archive
            .by_name(entry_name)
            .map_err(|e| ParseError::Malformed(format!("entry '{entry_name}' vanished: {e}")))?;

        let mut buf: Vec<u8> = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ParseError::Malformed(format!("reading '{entry_name}': {e}")))?;

        let outcome = match format {
            ArchiveFormat::Extended => stream_entry::<ExtendedRecord>(
                &buf[..],
                batch_size,
                max_records,
                &mut total_seen,
                &mut skipped_missing,
                &mut batch,
                &tx,
                normalize_extended,
            ),
            ArchiveFormat::AccountData => stream_entry::<AccountDataRecord>(
                &buf[..],
                batch_size,
                max_records,
                &mut total_seen,
                &mut skipped_missing,
                &mut batch,
                &tx,
                normalize_account_data,
            ),
        };
        outcome?;
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(std::mem::take(&mut batch));
    }

    Ok(ParseSummary {
        total_seen,
        skipped_missing,
    })
}

#[allow(clippy::too_many_arguments)]
fn stream_entry<T: serde::de::DeserializeOwned>(
    reader: impl Read,
    batch_size: usize,
    max_records: u64,
    total_seen: &mut u64,
    skipped_missing: &mut u64,
    batch: &mut Vec<NormalizedPlay>,
    tx: &mpsc::Sender<Vec<NormalizedPlay>>,
    normalize: fn(T) -> Option<NormalizedPlay>,
) -> std::result::Result<(), ParseError> {
    let mut cap_exceeded = false;
    let mut seen_local = *total_seen;

    let result = stream_json_array(reader, |record: T| {
        seen_local += 1;
        if seen_local > max_records {
            cap_exceeded = true;
            return Err("record cap exceeded".to_string());
        }
        match normalize(record) {
            Some(normalized) => batch.push(normalized),
            None => *skipped_missing += 1,
        }
        if batch.len() >= batch_size {
            let full_batch = std::mem::replace(batch, Vec::with_capacity(batch_size));
            tx.blocking_send(full_batch)
                .map_err(|_| "downstream commit loop closed".to_string())?;
        }
        Ok(())
    });

    *total_seen = seen_local;

    match result {
        Ok(()) => Ok(()),
        Err(_) if cap_exceeded => Err(ParseError::RecordCapExceeded(seen_local)),
        Err(e) => Err(ParseError::Malformed(e.to_string())),
    }
}
