//! Candidate ranking.
//!
//! `RuleBasedSelector` is the deterministic scorer. `FallbackSelector`
//! wraps whatever primary selector is injected (typically LLM-backed)
//! and falls back to the rules when the primary errors or returns
//! nothing, so ranking never fails for non-empty input and the select
//! stage never needs to escalate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use fetcharr_common::{Candidate, MediaRef, QualityPreference};

use crate::traits::Selector;

/// Release groups that earn a scoring bonus.
const KNOWN_GROUPS: [&str; 6] = ["subsplease", "erai-raws", "sparks", "geckos", "ntb", "flux"];

/// Deterministic rule-based scoring: quality match, seeder tiers,
/// known release groups, HEVC encodes.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedSelector;

impl RuleBasedSelector {
    pub fn new() -> Self {
        Self
    }

    fn score(candidate: &Candidate, quality_preference: QualityPreference) -> i32 {
        let mut score = 50;

        match candidate.quality.as_deref() {
            Some(q) if q.eq_ignore_ascii_case(quality_preference.as_str()) => score += 30,
            Some("4K") | Some("4k") => score += 20,
            Some("1080p") => score += 25,
            Some("720p") => score += 10,
            _ => {}
        }

        if candidate.seeders > 50 {
            score += 20;
        } else if candidate.seeders > 20 {
            score += 15;
        } else if candidate.seeders > 10 {
            score += 10;
        } else if candidate.seeders > 5 {
            score += 5;
        }

        if let Some(group) = &candidate.release_group {
            if KNOWN_GROUPS.contains(&group.to_lowercase().as_str()) {
                score += 15;
            }
        }

        let name = candidate.name.to_lowercase();
        if name.contains("x265") || name.contains("hevc") {
            score += 10;
        }

        score
    }

    /// Rank best-first. Total function: any input yields an ordering.
    pub fn rank_by_rules(
        &self,
        candidates: &[Candidate],
        quality_preference: QualityPreference,
    ) -> Vec<Candidate> {
        let mut scored: Vec<(i32, Candidate)> = candidates
            .iter()
            .map(|c| (Self::score(c, quality_preference), c.clone()))
            .collect();
        // Stable sort: equal scores keep search order.
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
        scored.into_iter().map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl Selector for RuleBasedSelector {
    async fn rank(
        &self,
        _media: &MediaRef,
        candidates: &[Candidate],
        quality_preference: QualityPreference,
    ) -> anyhow::Result<Vec<Candidate>> {
        Ok(self.rank_by_rules(candidates, quality_preference))
    }
}

/// Wraps a primary selector with the rule-based fallback. For non-empty
/// input this never fails and never returns empty.
pub struct FallbackSelector {
    primary: Arc<dyn Selector>,
    rules: RuleBasedSelector,
}

impl FallbackSelector {
    pub fn new(primary: Arc<dyn Selector>) -> Self {
        Self {
            primary,
            rules: RuleBasedSelector::new(),
        }
    }

    pub async fn rank(
        &self,
        media: &MediaRef,
        candidates: &[Candidate],
        quality_preference: QualityPreference,
    ) -> Vec<Candidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        match self.primary.rank(media, candidates, quality_preference).await {
            Ok(ranked) if !ranked.is_empty() => ranked,
            Ok(_) => {
                warn!(title = %media.title, "Primary selector returned nothing, using rule-based ranking");
                self.rules.rank_by_rules(candidates, quality_preference)
            }
            Err(err) => {
                warn!(title = %media.title, error = %err, "Primary selector failed, using rule-based ranking");
                self.rules.rank_by_rules(candidates, quality_preference)
            }
        }
    }
}
