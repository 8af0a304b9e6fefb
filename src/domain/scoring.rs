#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Derived scoring over an idea checklist. Everything here is pure.

use crate::types::{
    Bucket, Checklist, DerivedScores, Evidence, EvidenceType, FactorKey, SubsetCoverage,
    MAX_EVIDENCE_STRENGTH, MAX_FACTOR_SCORE,
};
use itertools::Itertools;

pub const HIGH_CONFIDENCE: f64 = 0.8;
pub const GREEN_THRESHOLD: u8 = 70;
pub const YELLOW_THRESHOLD: u8 = 40;
const CORROBORATION_MIN_ITEMS: usize = 3;

/// Strength of the support behind one factor, 0..=3.
///
/// One point for having any evidence, one for a high-confidence or metric
/// item, one for at least three items drawn from two or more sources.
#[must_use]
pub fn evidence_strength(evidence: &[Evidence]) -> u8 {
    if evidence.is_empty() {
        return 0;
    }

    let strong_item = evidence.iter().any(|item| {
        item.kind == EvidenceType::Metric
            || item
                .confidence
                .is_some_and(|confidence| confidence >= HIGH_CONFIDENCE)
    });
    let corroborated = evidence.len() >= CORROBORATION_MIN_ITEMS
        && evidence.iter().map(|item| item.source.as_str()).unique().count() >= 2;

    (1 + u8::from(strong_item) + u8::from(corroborated)).min(MAX_EVIDENCE_STRENGTH)
}

#[must_use]
pub fn bucket_for(percentage: u8, coverage: SubsetCoverage) -> Bucket {
    if u16::from(coverage.evidenced) * 2 < u16::from(coverage.factors) {
        return Bucket::Unknown;
    }
    if percentage >= GREEN_THRESHOLD {
        Bucket::Green
    } else if percentage >= YELLOW_THRESHOLD {
        Bucket::Yellow
    } else {
        Bucket::Red
    }
}

fn subset_score(checklist: &Checklist, keys: &[FactorKey]) -> (u8, SubsetCoverage) {
    let items = keys.iter().map(|key| checklist.item(*key)).collect::<Vec<_>>();
    let total: u32 = items
        .iter()
        .filter_map(|item| item.score())
        .map(u32::from)
        .sum();
    let ceiling = u32::from(MAX_FACTOR_SCORE) * u32::try_from(keys.len()).unwrap_or(u32::MAX);
    let percentage = if ceiling == 0 {
        0
    } else {
        ((total * 100 + ceiling / 2) / ceiling).min(100)
    };

    let coverage = SubsetCoverage {
        factors: count_u8(keys.len()),
        scored: count_u8(items.iter().filter(|item| item.score().is_some()).count()),
        evidenced: count_u8(items.iter().filter(|item| item.has_evidence()).count()),
    };
    (u8::try_from(percentage).unwrap_or(100), coverage)
}

fn count_u8(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}

/// Potential (7 factors) and actualization (3 factors) scores with buckets.
#[must_use]
pub fn derive_scores(checklist: &Checklist) -> DerivedScores {
    let (potential_score, potential_coverage) = subset_score(checklist, &FactorKey::POTENTIAL);
    let (actualization_score, actualization_coverage) =
        subset_score(checklist, &FactorKey::ACTUALIZATION);

    DerivedScores {
        potential_score,
        actualization_score,
        potential_bucket: bucket_for(potential_score, potential_coverage),
        actualization_bucket: bucket_for(actualization_score, actualization_coverage),
        potential_coverage,
        actualization_coverage,
    }
}
