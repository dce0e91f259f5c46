use std::collections::{HashMap, VecDeque};

use flow_api::{FlowOutput, TopicStatistic};

/// Capacity of the in-memory output log.
pub const LOG_CAPACITY: usize = 1000;

// ═══════════════════════════════════════════════════════════════
//  OutputStore
// ═══════════════════════════════════════════════════════════════

/// Bounded most-recent-first log of FlowOutput plus per-topic statistics.
///
/// Not synchronized on its own: the monitor keeps it behind one lock so
/// insert + evict + stat update are a single step for readers.
#[derive(Debug)]
pub struct OutputStore {
    outputs: VecDeque<FlowOutput>,
    stats: HashMap<String, TopicStatistic>,
    capacity: usize,
}

impl Default for OutputStore {
    fn default() -> Self {
        Self::new(LOG_CAPACITY)
    }
}

impl OutputStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            outputs: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
            stats: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the head, evict the oldest past capacity, bump the
    /// topic statistic.
    pub fn insert(&mut self, output: FlowOutput, seen_at_ms: i64) {
        let stat = self
            .stats
            .entry(output.topic.clone())
            .or_insert_with(|| TopicStatistic {
                topic: output.topic.clone(),
                message_count: 0,
                last_seen: seen_at_ms,
            });
        stat.message_count += 1;
        stat.last_seen = seen_at_ms;

        self.outputs.push_front(output);
        if self.outputs.len() > self.capacity {
            self.outputs.pop_back();
        }
    }

    pub fn clear(&mut self) {
        self.outputs.clear();
        self.stats.clear();
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn topic_count(&self) -> usize {
        self.stats.len()
    }

    pub fn latest(&self, limit: usize) -> Vec<FlowOutput> {
        self.outputs.iter().take(limit).cloned().collect()
    }

    pub fn from_topic(&self, topic: &str) -> Vec<FlowOutput> {
        self.outputs
            .iter()
            .filter(|o| o.topic == topic)
            .cloned()
            .collect()
    }

    /// Substring match on orgUsrNode, so `acme-alice` selects every
    /// workflow of that user.
    pub fn for_org_usr_node(&self, id: &str) -> Vec<FlowOutput> {
        self.outputs
            .iter()
            .filter(|o| o.org_usr_node.contains(id))
            .cloned()
            .collect()
    }

    /// Statistics sorted by topic name.
    pub fn statistics(&self) -> Vec<TopicStatistic> {
        let mut stats: Vec<TopicStatistic> = self.stats.values().cloned().collect();
        stats.sort_by(|a, b| a.topic.cmp(&b.topic));
        stats
    }
}
