//! Result store and eviction manager
//!
//! The authoritative in-memory table: keyed by (domain, tier), sub-keyed
//! by approach name, holding the most recent result per key, plus a flat
//! append log of every stored record for export and trial history.
//!
//! Eviction bounds the flat log via stratified sampling across
//! (domain, tier) partitions rather than a global LRU, so a burst of
//! activity in one combination never silently erases another.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::record::{DomainTierKey, TrialRecord};
use crate::stats::ComparativeAnalysis;

/// Most-recent result per approach for one (domain, tier) key.
///
/// First-insertion order of approaches is preserved for ranking
/// tie-breaks.
#[derive(Debug, Clone, Default)]
pub struct ApproachSet {
    order: Vec<String>,
    records: HashMap<String, TrialRecord>,
}

impl ApproachSet {
    /// Last-write-wins insert; no versioning.
    fn insert(&mut self, record: TrialRecord) {
        if !self.records.contains_key(&record.approach) {
            self.order.push(record.approach.clone());
        }
        self.records.insert(record.approach.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, approach: &str) -> Option<&TrialRecord> {
        self.records.get(approach)
    }

    /// Approaches in first-insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// (approach, latest record) pairs in first-insertion order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&String, &TrialRecord)> {
        self.order.iter().map(move |name| (name, &self.records[name]))
    }

    /// Approaches that participate in comparative analysis.
    pub fn comparative_names(&self) -> Vec<&String> {
        self.order
            .iter()
            .filter(|name| name.as_str() != crate::record::DEFAULT_APPROACH)
            .collect()
    }
}

/// Outcome of a store insertion.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub key: DomainTierKey,
    /// Comparative approaches now present for the key
    pub comparative_approaches: usize,
    /// Whether this insertion should trigger statistics recomputation
    pub recompute: bool,
    /// Entries removed by eviction during this insertion
    pub evicted: usize,
}

/// In-memory result store with a bounded flat log.
#[derive(Debug, Default)]
pub struct ResultStore {
    by_key: HashMap<DomainTierKey, ApproachSet>,
    log: Vec<TrialRecord>,
    analyses: HashMap<DomainTierKey, ComparativeAnalysis>,
    next_seq: u64,
    log_ceiling: usize,
}

impl ResultStore {
    pub fn new(log_ceiling: usize) -> Self {
        Self {
            log_ceiling: log_ceiling.max(1),
            ..Self::default()
        }
    }

    /// Store a validated record: append to the log, overwrite the
    /// latest-per-approach slot, and evict if the log exceeded its
    /// ceiling.
    ///
    /// Recomputation triggers whenever the inserted record is
    /// comparative and its key now holds two or more comparative
    /// approaches (every insertion at that point, not only the first
    /// crossing).
    pub fn put(&mut self, mut record: TrialRecord) -> PutOutcome {
        record.seq = self.next_seq;
        self.next_seq += 1;

        let key = record.key();
        let comparative_record = record.is_comparative();
        self.log.push(record.clone());
        let entry = self.by_key.entry(key.clone()).or_default();
        entry.insert(record);
        let comparative_approaches = entry.comparative_names().len();

        let evicted = if self.log.len() > self.log_ceiling {
            self.evict()
        } else {
            0
        };

        PutOutcome {
            key,
            comparative_approaches,
            recompute: comparative_record && comparative_approaches >= 2,
            evicted,
        }
    }

    pub fn approaches(&self, key: &DomainTierKey) -> Option<&ApproachSet> {
        self.by_key.get(key)
    }

    /// All logged records for one domain, oldest first.
    pub fn domain_results(&self, domain: &str) -> Vec<TrialRecord> {
        self.log
            .iter()
            .filter(|r| r.domain == domain)
            .cloned()
            .collect()
    }

    pub fn results_count(&self) -> usize {
        self.log.len()
    }

    pub fn log(&self) -> &[TrialRecord] {
        &self.log
    }

    pub fn set_analysis(&mut self, key: DomainTierKey, analysis: ComparativeAnalysis) {
        self.analyses.insert(key, analysis);
    }

    pub fn analysis(&self, key: &DomainTierKey) -> Option<&ComparativeAnalysis> {
        self.analyses.get(key)
    }

    pub fn analyses(&self) -> impl Iterator<Item = &ComparativeAnalysis> {
        self.analyses.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DomainTierKey> {
        self.by_key.keys()
    }

    /// Clear the store, log, and cached analyses. Idempotent.
    pub fn clear(&mut self) {
        let removed = self.log.len();
        self.by_key.clear();
        self.log.clear();
        self.analyses.clear();
        if removed > 0 {
            info!(removed, "🧹 store reset");
        }
    }

    /// Stratified eviction pass.
    ///
    /// Partitions the log by (domain, tier) and assigns each partition a
    /// quota of ceiling / (#domains × #tiers), minimum 1. Each partition
    /// keeps half its quota from the newest end and half from the oldest
    /// end, preserving temporal spread. Remaining headroom is topped up
    /// with the globally most-recent leftovers. Every partition with any
    /// entry retains at least one, so the retained size is bounded by
    /// the ceiling or one entry per partition, whichever is larger.
    fn evict(&mut self) -> usize {
        let before = self.log.len();

        let mut partitions: BTreeMap<DomainTierKey, Vec<usize>> = BTreeMap::new();
        for (idx, record) in self.log.iter().enumerate() {
            partitions.entry(record.key()).or_default().push(idx);
        }

        let domains: BTreeSet<&str> = self.log.iter().map(|r| r.domain.as_str()).collect();
        let tiers: BTreeSet<&str> = self.log.iter().map(|r| r.tier.as_str()).collect();
        let quota = (self.log_ceiling / (domains.len() * tiers.len()).max(1)).max(1);

        // Every partition already fits its quota: nothing to trim, skip
        // the rebuild. Happens when partitions outnumber the ceiling and
        // each holds at most its (floored) quota.
        if partitions.values().all(|indices| indices.len() <= quota) {
            debug!(
                partitions = partitions.len(),
                quota, "eviction pass found nothing to trim"
            );
            return 0;
        }

        let mut keep: HashSet<usize> = HashSet::new();
        for indices in partitions.values() {
            if indices.len() <= quota {
                keep.extend(indices.iter().copied());
                continue;
            }
            // Log indices within a partition are already oldest-first.
            let newest = quota - quota / 2;
            let oldest = quota / 2;
            keep.extend(indices.iter().rev().take(newest).copied());
            keep.extend(indices.iter().take(oldest).copied());
        }

        // Top up with the globally most-recent remaining entries.
        for idx in (0..self.log.len()).rev() {
            if keep.len() >= self.log_ceiling {
                break;
            }
            keep.insert(idx);
        }

        let mut retained = Vec::with_capacity(keep.len().min(self.log_ceiling));
        let mut surviving_keys: HashSet<DomainTierKey> = HashSet::new();
        for (idx, record) in self.log.drain(..).enumerate() {
            if keep.contains(&idx) {
                surviving_keys.insert(record.key());
                retained.push(record);
            }
        }
        self.log = retained;

        // Rebuild the latest-per-approach table from the surviving log so
        // no map entry points at an evicted record.
        self.by_key.clear();
        for record in &self.log {
            self.by_key
                .entry(record.key())
                .or_default()
                .insert(record.clone());
        }
        self.analyses.retain(|key, _| surviving_keys.contains(key));

        let evicted = before - self.log.len();
        debug!(
            evicted,
            retained = self.log.len(),
            partitions = partitions.len(),
            quota,
            "stratified eviction pass"
        );
        evicted
    }
}
