//! Relaxation-ladder asset resolver.
//!
//! Resolution walks the spec's query ladder from most to least specific.
//! Within one level the search is retried under the `RetryPolicy` (transport
//! errors and empty filtered sets both count as misses); only when a level's
//! attempts are spent does the ladder advance. Relaxation is monotonic: the
//! resolver never returns to a stricter query. Exhausting every level yields
//! a placeholder result, never an error.

use crate::assets::{
    AssetResult, AssetSearch, AssetSpec, AttemptRecord, Candidate, ResolvedAsset, RetryPolicy,
};
use tracing::{debug, info, warn};

pub struct AssetResolver<'a> {
    search: &'a dyn AssetSearch,
    policy: RetryPolicy,
    /// Fractional widening of the duration window, e.g. 0.10 for ±10%
    duration_tolerance: f64,
}

impl<'a> AssetResolver<'a> {
    pub fn new(search: &'a dyn AssetSearch, policy: RetryPolicy, duration_tolerance: f64) -> Self {
        Self {
            search,
            policy,
            duration_tolerance,
        }
    }

    /// Resolve one spec. Always returns a result; `success == false` means
    /// the ladder was exhausted and the result carries a placeholder.
    pub async fn resolve(&self, spec: &AssetSpec) -> AssetResult {
        let mut trace = Vec::new();

        for level in 0..spec.levels() {
            let query = match spec.query_at(level) {
                Some(q) if !q.trim().is_empty() => q,
                _ => continue,
            };

            for attempt in 1..=self.policy.max_attempts_per_level {
                if attempt > 1 {
                    if let Some(delay) = self.policy.delay_for(attempt - 1) {
                        tokio::time::sleep(delay).await;
                    }
                }

                match self.search.search(spec.asset_type, &query).await {
                    Ok(candidates) => {
                        let accepted: Vec<Candidate> = candidates
                            .into_iter()
                            .filter(|c| self.accepts(spec, c))
                            .collect();
                        trace.push(AttemptRecord {
                            level: level as u32,
                            attempt,
                            query: query.clone(),
                            accepted_candidates: accepted.len(),
                            error: None,
                        });

                        if let Some(chosen) = accepted.into_iter().next() {
                            info!(
                                spec = %spec.id,
                                level,
                                candidate = %chosen.id,
                                "asset resolved"
                            );
                            return AssetResult {
                                spec_id: spec.id.clone(),
                                asset_type: spec.asset_type,
                                success: true,
                                relaxation_level: level as u32,
                                resolved: Some(ResolvedAsset {
                                    candidate_id: chosen.id,
                                    name: chosen.name,
                                    url: chosen.url,
                                    license: chosen.license,
                                    duration_secs: chosen.duration_secs,
                                    path: None,
                                }),
                                placeholder: false,
                                trace,
                            };
                        }
                        debug!(spec = %spec.id, level, attempt, "no accepted candidates");
                    }
                    Err(e) => {
                        debug!(spec = %spec.id, level, attempt, error = %e, "search attempt failed");
                        trace.push(AttemptRecord {
                            level: level as u32,
                            attempt,
                            query: query.clone(),
                            accepted_candidates: 0,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        warn!(spec = %spec.id, "all relaxation levels exhausted, using placeholder");
        AssetResult {
            spec_id: spec.id.clone(),
            asset_type: spec.asset_type,
            success: false,
            relaxation_level: spec.levels().saturating_sub(1) as u32,
            resolved: None,
            placeholder: true,
            trace,
        }
    }

    /// Acceptance filters: format whitelist, license substrings, and the
    /// tolerance-widened duration window.
    fn accepts(&self, spec: &AssetSpec, candidate: &Candidate) -> bool {
        if !spec.formats.is_empty()
            && !spec
                .formats
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&candidate.format))
        {
            return false;
        }

        if !spec.licenses.is_empty() {
            let license = candidate.license.to_lowercase();
            if !spec
                .licenses
                .iter()
                .any(|l| license.contains(&l.to_lowercase()))
            {
                return false;
            }
        }

        if spec.min_duration_secs.is_some() || spec.max_duration_secs.is_some() {
            let Some(duration) = candidate.duration_secs else {
                return false;
            };
            if let Some(min) = spec.min_duration_secs {
                if duration < min * (1.0 - self.duration_tolerance) {
                    return false;
                }
            }
            if let Some(max) = spec.max_duration_secs {
                if duration > max * (1.0 + self.duration_tolerance) {
                    return false;
                }
            }
        }

        true
    }
}
