//! Performance Tracker (C4): per-model success/failure counters used to rank
//! failover candidates. A larger parameter count breaks a tied score in the
//! model's favor, using the same size hint the failover handler reads off a
//! model id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::MODEL_SIZE_PATTERN;

#[derive(Debug, Clone, Default)]
struct Counters {
    successes: u64,
    failures: u64,
    cumulative_latency: Duration,
    last_failure: Option<Instant>,
}

impl Counters {
    fn calls(&self) -> u64 {
        self.successes + self.failures
    }

    /// Success ratio weighted by inverse mean latency: two models tied on
    /// success rate are broken apart by which one responds faster, but a
    /// slow, reliable model still outranks a fast, flaky one.
    fn score(&self) -> f64 {
        if self.calls() == 0 {
            return 0.0;
        }
        let success_ratio = self.successes as f64 / self.calls() as f64;
        let latency_secs = self.average_latency().as_secs_f64();
        if latency_secs <= 0.0 {
            return success_ratio;
        }
        success_ratio / (1.0 + latency_secs)
    }

    fn average_latency(&self) -> Duration {
        if self.successes == 0 {
            return Duration::ZERO;
        }
        self.cumulative_latency / self.successes as u32
    }
}

/// A ranked candidate returned by [`PerformanceTracker::get_ranked_models`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankedModel {
    pub provider_base: String,
    pub model_suffix: String,
    pub score: f64,
    pub calls: u64,
    pub average_latency: Duration,
}

/// Tracks per-(provider, model) outcome history across the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct PerformanceTracker {
    counters: HashMap<(String, String), Counters>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, provider_base: &str, model_suffix: &str, latency: Duration) {
        let counters = self
            .counters
            .entry((provider_base.to_string(), model_suffix.to_string()))
            .or_default();
        counters.successes += 1;
        counters.cumulative_latency += latency;
    }

    pub fn record_failure(&mut self, provider_base: &str, model_suffix: &str) {
        let counters = self
            .counters
            .entry((provider_base.to_string(), model_suffix.to_string()))
            .or_default();
        counters.failures += 1;
        counters.last_failure = Some(Instant::now());
    }

    /// Parameter-size hint extracted from a model id (e.g. `70` from
    /// `llama-3.1-70b-instruct`), used only to break tied scores.
    fn size_hint(model_suffix: &str) -> f64 {
        MODEL_SIZE_PATTERN
            .captures(model_suffix)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    /// Models with at least `min_calls` recorded outcomes, ranked by success
    /// rate descending, larger parameter count breaking ties.
    pub fn get_ranked_models(&self, min_calls: u64) -> Vec<RankedModel> {
        let mut ranked: Vec<RankedModel> = self
            .counters
            .iter()
            .filter(|(_, counters)| counters.calls() >= min_calls)
            .map(|((provider_base, model_suffix), counters)| RankedModel {
                provider_base: provider_base.clone(),
                model_suffix: model_suffix.clone(),
                score: counters.score(),
                calls: counters.calls(),
                average_latency: counters.average_latency(),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    Self::size_hint(&b.model_suffix)
                        .partial_cmp(&Self::size_hint(&a.model_suffix))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_model_is_excluded_from_ranking() {
        let tracker = PerformanceTracker::new();
        assert!(tracker.get_ranked_models(1).is_empty());
    }

    #[test]
    fn ranking_sorts_by_success_rate_descending() {
        let mut tracker = PerformanceTracker::new();
        tracker.record_success("ollama", "llama3.1-8b", Duration::from_millis(100));
        tracker.record_failure("ollama", "llama3.1-8b");

        tracker.record_success("ollama", "llama3.1-70b", Duration::from_millis(500));
        tracker.record_success("ollama", "llama3.1-70b", Duration::from_millis(500));

        let ranked = tracker.get_ranked_models(1);
        assert_eq!(ranked[0].model_suffix, "llama3.1-70b");
        assert!(ranked[0].score > ranked[1].score);
        assert_eq!(ranked[1].model_suffix, "llama3.1-8b");
    }

    #[test]
    fn tied_score_breaks_in_favor_of_larger_model() {
        let mut tracker = PerformanceTracker::new();
        tracker.record_success("ollama", "llama3.1-8b", Duration::from_millis(100));
        tracker.record_success("ollama", "llama3.1-70b", Duration::from_millis(100));

        let ranked = tracker.get_ranked_models(1);
        assert_eq!(ranked[0].model_suffix, "llama3.1-70b");
        assert_eq!(ranked[1].model_suffix, "llama3.1-8b");
    }

    #[test]
    fn min_calls_filters_out_thin_samples() {
        let mut tracker = PerformanceTracker::new();
        tracker.record_success("ollama", "llama3.1-8b", Duration::from_millis(100));

        assert_eq!(tracker.get_ranked_models(2).len(), 0);
        assert_eq!(tracker.get_ranked_models(1).len(), 1);
    }
}
