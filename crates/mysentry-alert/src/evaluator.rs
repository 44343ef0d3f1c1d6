use crate::Rule;
use chrono::Utc;
use mysentry_collector::ring::SampleRing;
use mysentry_common::id;
use mysentry_common::types::{format_tags, Finding};
use std::collections::HashMap;

/// Applies threshold rules to per-metric sample rings.
///
/// Stateless apart from the rule table: all history lives in the ring
/// buffers owned by the pipeline, so evaluation is a pure read.
pub struct Evaluator {
    rules_by_metric: HashMap<String, Vec<Rule>>,
}

impl Evaluator {
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut rules_by_metric: HashMap<String, Vec<Rule>> = HashMap::new();
        for rule in rules {
            rules_by_metric
                .entry(rule.metric_id.clone())
                .or_default()
                .push(rule);
        }
        Self { rules_by_metric }
    }

    pub fn rules_for(&self, metric_id: &str) -> &[Rule] {
        self.rules_by_metric
            .get(metric_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules_by_metric
            .values()
            .flatten()
            .find(|r| r.rule_id == rule_id)
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules_by_metric.values().flatten()
    }

    /// Evaluate every rule bound to `metric_id` against the ring.
    ///
    /// A rule produces a finding iff the most recent
    /// `consecutive_required` samples all satisfy its comparator and
    /// their timestamps span at most the rule window. Fewer samples
    /// than required never fire — no false positive on cold start.
    /// Rules on the same metric are independent; each may fire in the
    /// same pass.
    pub fn evaluate(&self, metric_id: &str, ring: &SampleRing) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in self.rules_for(metric_id) {
            let recent = ring.recent(rule.consecutive_required);
            if recent.len() < rule.consecutive_required {
                continue;
            }

            let all_satisfy = recent
                .iter()
                .all(|s| rule.comparator.check(s.value, rule.threshold));
            if !all_satisfy {
                continue;
            }

            // recent() is oldest-first, so span = last - first
            let span = recent[recent.len() - 1].timestamp - recent[0].timestamp;
            if span > chrono::Duration::seconds(rule.window_secs as i64) {
                continue;
            }

            let latest = recent[recent.len() - 1];
            let tags = format_tags(&latest.tags);
            let tags_display = if tags.is_empty() {
                String::new()
            } else {
                format!(" [{tags}]")
            };

            findings.push(Finding {
                id: id::generate(id::IdKind::Finding),
                rule_id: rule.rule_id.clone(),
                triggered_at: Utc::now(),
                samples: recent.iter().map(|s| (*s).clone()).collect(),
                severity: rule.severity,
                message: format!(
                    "{}{} has been {} {:.1} for {} consecutive samples (latest {:.1})",
                    rule.metric_id,
                    tags_display,
                    rule.comparator.describe(),
                    rule.threshold,
                    rule.consecutive_required,
                    latest.value,
                ),
            });
        }

        findings
    }
}
