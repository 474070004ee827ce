//! Priority scoring for batch ordering.
//!
//! The scheduler asks a `PriorityStrategy` for a score per job and processes
//! higher scores first. The default `WeightedPriority` implements a named,
//! configurable weight per document signal so operators can tune ordering
//! without touching scheduler code.

use crate::config::PriorityWeights;
use crate::pipeline::types::Job;

/// Scores a job for batch ordering. Higher scores process earlier.
pub trait PriorityStrategy: Send + Sync {
    fn score(&self, job: &Job) -> f64;
}

/// Filename substrings that mark a document as likely legal material.
const LEGAL_MARKERS: &[&str] = &[
    "legal",
    "contract",
    "agreement",
    "affidavit",
    "brief",
    "deed",
    "subpoena",
    "statute",
];

/// Page-description formats that usually mean multi-page source documents.
const PAGE_FORMATS: &[&str] = &["application/pdf", "application/postscript"];

/// Additive weighted scoring over document signals, plus a submission-order
/// recency bonus that breaks ties in favor of earlier submissions.
pub struct WeightedPriority {
    weights: PriorityWeights,
}

impl WeightedPriority {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }
}

impl Default for WeightedPriority {
    fn default() -> Self {
        Self::new(PriorityWeights::default())
    }
}

impl PriorityStrategy for WeightedPriority {
    fn score(&self, job: &Job) -> f64 {
        let w = &self.weights;
        let payload = &job.payload;
        let mut score = w.base;

        if payload.bytes.len() as u64 > w.large_source_bytes {
            score += w.large_source;
        }

        if PAGE_FORMATS.contains(&payload.content_type.as_str()) {
            score += w.page_format;
        }

        let filename = payload.filename.to_lowercase();
        if LEGAL_MARKERS.iter().any(|m| filename.contains(m)) {
            score += w.legal_name;
        }

        // Small raster scans are quick wins: image sources below the pixel
        // cutoff jump the queue slightly.
        if payload.content_type.starts_with("image/") {
            if let Some(pixels) = payload.pixel_count {
                if pixels < w.small_raster_pixels {
                    score += w.small_raster;
                }
            }
        }

        score + w.recency / (job.submission_index as f64 + 1.0)
    }
}
