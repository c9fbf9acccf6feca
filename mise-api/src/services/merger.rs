//! Detection merger
//!
//! Fuses the local model's and the remote vision API's guesses for one image
//! into a single ranked list.
//!
//! **Algorithm:**
//! 1. Local entry: `confidence = local * 0.6`, sources `{local}`
//! 2. Remote entry for a name already present: `min((existing + remote * 0.4) * 1.2, 1.0)`,
//!    `remote` added to sources
//! 3. Remote entry for a new name: `confidence = remote * 0.4`, sources `{remote}`
//! 4. Drop everything at or below 0.3
//! 5. Stable sort by confidence, highest first, and keep the top N
//!
//! Names are normalized (trim, lowercase) before they are compared. Merging
//! never fails: blank names and non-finite confidences are skipped, other
//! confidences are clamped into [0, 1] first.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::models::{DetectedIngredient, DetectionSource, MergedIngredient};
use mise_common::validation::normalize_ingredient_name;

/// Weight of a local-only detection
pub const LOCAL_WEIGHT: f64 = 0.6;
/// Weight of a remote detection
pub const REMOTE_WEIGHT: f64 = 0.4;
/// Multiplier applied when both detectors agree
pub const AGREEMENT_BOOST: f64 = 1.2;
/// Entries must score strictly above this to be kept
pub const MIN_CONFIDENCE: f64 = 0.3;
/// Default number of merged entries returned
pub const DEFAULT_MAX_INGREDIENTS: usize = 20;

/// Combines per-image detector output
#[derive(Debug, Clone, Copy)]
pub struct DetectionMerger {
    max_ingredients: usize,
}

impl Default for DetectionMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INGREDIENTS)
    }
}

impl DetectionMerger {
    pub fn new(max_ingredients: usize) -> Self {
        Self { max_ingredients }
    }

    pub fn max_ingredients(&self) -> usize {
        self.max_ingredients
    }

    /// Merge one image's local and remote detections
    pub fn merge(
        &self,
        local: &[DetectedIngredient],
        remote: &[DetectedIngredient],
    ) -> Vec<MergedIngredient> {
        // Records in first-seen order, plus name -> position
        let mut records: Vec<MergedIngredient> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entry in local {
            let Some((name, confidence)) = sanitize(entry) else {
                continue;
            };
            let record = MergedIngredient {
                name: name.clone(),
                confidence: confidence * LOCAL_WEIGHT,
                sources: BTreeSet::from([DetectionSource::Local]),
            };
            // A repeated local name replaces the earlier record in place
            match index.get(&name) {
                Some(&pos) => records[pos] = record,
                None => {
                    index.insert(name, records.len());
                    records.push(record);
                }
            }
        }

        for entry in remote {
            let Some((name, confidence)) = sanitize(entry) else {
                continue;
            };
            match index.get(&name) {
                Some(&pos) => {
                    let record = &mut records[pos];
                    let combined = record.confidence + confidence * REMOTE_WEIGHT;
                    record.confidence = (combined * AGREEMENT_BOOST).min(1.0);
                    record.sources.insert(DetectionSource::Remote);
                }
                None => {
                    index.insert(name.clone(), records.len());
                    records.push(MergedIngredient {
                        name,
                        confidence: confidence * REMOTE_WEIGHT,
                        sources: BTreeSet::from([DetectionSource::Remote]),
                    });
                }
            }
        }

        let seen = records.len();
        records.retain(|r| r.confidence > MIN_CONFIDENCE);
        rank(&mut records);
        records.truncate(self.max_ingredients);

        debug!(
            local = local.len(),
            remote = remote.len(),
            candidates = seen,
            kept = records.len(),
            "Merged detection results"
        );

        records
    }

    /// Fold per-image results into one list
    ///
    /// Each name keeps the record with the highest confidence seen across
    /// images (the first one wins a tie). Output is ranked and capped like
    /// [`merge`](Self::merge).
    pub fn combine_across_images<I>(&self, per_image: I) -> Vec<MergedIngredient>
    where
        I: IntoIterator<Item = Vec<MergedIngredient>>,
    {
        let mut records: Vec<MergedIngredient> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for ingredient in per_image.into_iter().flatten() {
            let key = ingredient.name.to_lowercase();
            match index.get(&key) {
                Some(&pos) => {
                    if ingredient.confidence > records[pos].confidence {
                        records[pos] = ingredient;
                    }
                }
                None => {
                    index.insert(key, records.len());
                    records.push(ingredient);
                }
            }
        }

        rank(&mut records);
        records.truncate(self.max_ingredients);
        records
    }
}

/// Highest confidence first; `sort_by` is stable so ties keep insertion order
fn rank(records: &mut [MergedIngredient]) {
    records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

fn sanitize(entry: &DetectedIngredient) -> Option<(String, f64)> {
    if !entry.confidence.is_finite() {
        return None;
    }
    let name = normalize_ingredient_name(&entry.name);
    if name.is_empty() {
        return None;
    }
    Some((name, entry.confidence.clamp(0.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, confidence: f64) -> DetectedIngredient {
        DetectedIngredient::new(name, confidence, DetectionSource::Local)
    }

    fn remote(name: &str, confidence: f64) -> DetectedIngredient {
        DetectedIngredient::new(name, confidence, DetectionSource::Remote)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_local_only() {
        let merged = DetectionMerger::default().merge(&[local("tomato", 0.9)], &[]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "tomato");
        assert!(approx(merged[0].confidence, 0.54));
        assert_eq!(merged[0].sources, BTreeSet::from([DetectionSource::Local]));
    }

    #[test]
    fn test_agreement_boost() {
        let merged =
            DetectionMerger::default().merge(&[local("tomato", 0.9)], &[remote("tomato", 0.8)]);

        assert_eq!(merged.len(), 1);
        // (0.54 + 0.32) * 1.2 = 1.032, capped
        assert!(approx(merged[0].confidence, 1.0));
        assert!(merged[0].found_by(DetectionSource::Local));
        assert!(merged[0].found_by(DetectionSource::Remote));
    }

    #[test]
    fn test_agreement_below_cap() {
        let merged =
            DetectionMerger::default().merge(&[local("basil", 0.5)], &[remote("basil", 0.6)]);

        // (0.30 + 0.24) * 1.2
        assert!(approx(merged[0].confidence, 0.648));
    }

    #[test]
    fn test_low_confidence_excluded() {
        let merged = DetectionMerger::default().merge(&[local("parsley", 0.4)], &[]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_threshold_is_strict() {
        // 0.5 * 0.6 == 0.3 exactly
        let merged = DetectionMerger::default().merge(&[local("sage", 0.5)], &[]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_remote_alone_rarely_survives() {
        let merged = DetectionMerger::default().merge(&[], &[remote("lemon", 0.85)]);
        assert_eq!(merged.len(), 1);
        assert!(approx(merged[0].confidence, 0.34));

        let merged = DetectionMerger::default().merge(&[], &[remote("lime", 0.7)]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_sorted_descending() {
        let merged = DetectionMerger::default().merge(
            &[local("a_item", 0.9), local("b_item", 0.6), local("c_item", 0.7)],
            &[],
        );

        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a_item", "c_item", "b_item"]);
        assert!(merged.windows(2).all(|w| w[0].confidence > w[1].confidence));
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let merged = DetectionMerger::default().merge(
            &[local("onion", 0.8), local("garlic", 0.8), local("leek", 0.8)],
            &[],
        );
        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["onion", "garlic", "leek"]);
    }

    #[test]
    fn test_names_normalized() {
        let merged =
            DetectionMerger::default().merge(&[local("  Tomato ", 0.9)], &[remote("TOMATO", 0.8)]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "tomato");
        assert_eq!(merged[0].sources.len(), 2);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let merged = DetectionMerger::default().merge(
            &[local("   ", 0.9), local("egg", f64::NAN), local("milk", 0.9)],
            &[remote("flour", f64::INFINITY)],
        );

        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["milk"]);
    }

    #[test]
    fn test_confidence_clamped() {
        let merged =
            DetectionMerger::default().merge(&[local("rice", 7.0), local("salt", -2.0)], &[]);

        assert_eq!(merged.len(), 1);
        assert!(approx(merged[0].confidence, 0.6));
    }

    #[test]
    fn test_repeated_local_overwrites_in_place() {
        let merged = DetectionMerger::default().merge(
            &[local("carrot", 0.9), local("pea", 0.95), local("carrot", 0.6)],
            &[],
        );

        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["pea", "carrot"]);
        assert!(approx(merged[1].confidence, 0.36));
    }

    #[test]
    fn test_repeated_remote_reapplies_boost() {
        let merged = DetectionMerger::default().merge(
            &[local("pepper", 0.6)],
            &[remote("pepper", 0.5), remote("pepper", 0.5)],
        );

        // ((0.36 + 0.2) * 1.2 + 0.2) * 1.2 = 1.0464, capped
        assert!(approx(merged[0].confidence, 1.0));
    }

    #[test]
    fn test_limit_applied() {
        let local: Vec<DetectedIngredient> = (0..30)
            .map(|i| DetectedIngredient::new(format!("item{:02}", i), 0.9, DetectionSource::Local))
            .collect();

        assert_eq!(DetectionMerger::default().merge(&local, &[]).len(), 20);
        assert_eq!(DetectionMerger::new(5).merge(&local, &[]).len(), 5);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(DetectionMerger::default().merge(&[], &[]).is_empty());
    }

    #[test]
    fn test_combine_keeps_max_confidence() {
        let merger = DetectionMerger::default();
        let first = merger.merge(&[local("tomato", 0.6), local("onion", 0.9)], &[]);
        let second = merger.merge(&[local("tomato", 0.9)], &[remote("tomato", 0.5)]);

        let combined = merger.combine_across_images(vec![first, second]);
        let names: Vec<&str> = combined.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["tomato", "onion"]);
        assert!(combined[0].found_by(DetectionSource::Remote));
        assert!(approx(combined[1].confidence, 0.54));
    }
}
