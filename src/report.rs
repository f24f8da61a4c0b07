//! Aggregate compression statistics for a conversion run

use crate::models::{ConversionOutcome, FailureKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A failed file as shown in the final report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEntry {
    pub remote_id: String,
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub run_id: Uuid,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_original: u64,
    pub total_converted: u64,
    pub bytes_saved: i64,
    pub ratio_saved: f64,
    pub failures: Vec<FailureEntry>,
    pub outcomes: Vec<ConversionOutcome>,
}

impl Report {
    pub fn total(&self) -> usize {
        self.converted + self.skipped + self.failed
    }

    /// Remote ids converted during this run, in processing order.
    pub fn converted_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_converted())
            .map(|o| o.remote_id())
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} files: {} converted, {} skipped, {} failed",
            self.total(),
            self.converted,
            self.skipped,
            self.failed
        )?;
        writeln!(
            f,
            "Original: {}KB, converted: {}KB, saved: {}KB ({:.1}%)",
            self.total_original / 1024,
            self.total_converted / 1024,
            self.bytes_saved / 1024,
            self.ratio_saved * 100.0
        )?;
        for failure in &self.failures {
            writeln!(
                f,
                "  FAILED {} ({}): {} - {}",
                failure.remote_id, failure.name, failure.kind, failure.message
            )?;
        }
        Ok(())
    }
}

/// Accumulates per-file byte counts and outcome tallies.
#[derive(Debug, Default)]
pub struct CompressionReporter {
    total_original: u64,
    total_converted: u64,
    converted: usize,
    skipped: usize,
    failed: usize,
    failures: Vec<FailureEntry>,
    outcomes: Vec<ConversionOutcome>,
}

impl CompressionReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, original_bytes: u64, converted_bytes: u64) {
        self.total_original += original_bytes;
        self.total_converted += converted_bytes;
    }

    /// Tally an outcome; converted files also contribute their byte counts.
    pub fn add_outcome(&mut self, outcome: ConversionOutcome) {
        match &outcome {
            ConversionOutcome::Converted(record) => {
                self.converted += 1;
                self.add(record.original_bytes, record.converted_bytes);
            }
            ConversionOutcome::Skipped { .. } => self.skipped += 1,
            ConversionOutcome::Failed {
                remote_id,
                name,
                kind,
                message,
            } => {
                self.failed += 1;
                self.failures.push(FailureEntry {
                    remote_id: remote_id.clone(),
                    name: name.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn summary(&self, run_id: Uuid) -> Report {
        let bytes_saved = self.total_original as i64 - self.total_converted as i64;
        let ratio_saved = if self.total_original == 0 {
            0.0
        } else {
            bytes_saved as f64 / self.total_original as f64
        };

        Report {
            run_id,
            converted: self.converted,
            skipped: self.skipped,
            failed: self.failed,
            total_original: self.total_original,
            total_converted: self.total_converted,
            bytes_saved,
            ratio_saved,
            failures: self.failures.clone(),
            outcomes: self.outcomes.clone(),
        }
    }
}
