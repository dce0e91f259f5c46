use std::collections::VecDeque;

use flow_api::{FlowOutput, MonitorEvent, MonitoringStatus, TopicStatistic};

/// Local bounded log size, same as the server side.
pub const MIRROR_CAPACITY: usize = 1000;

/// Client-side projection of the monitor, driven by pushed events.
#[derive(Debug, Clone)]
pub struct MirrorState {
    outputs: VecDeque<FlowOutput>,
    stats: Option<MonitoringStatus>,
    topic_stats: Vec<TopicStatistic>,
    monitoring: bool,
    capacity: usize,
}

impl Default for MirrorState {
    fn default() -> Self {
        Self::new(MIRROR_CAPACITY)
    }
}

impl MirrorState {
    pub fn new(capacity: usize) -> Self {
        Self {
            outputs: VecDeque::with_capacity(capacity.min(MIRROR_CAPACITY)),
            stats: None,
            topic_stats: Vec::new(),
            monitoring: false,
            capacity: capacity.max(1),
        }
    }

    pub fn apply(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::FlowOutput(output) => {
                self.outputs.push_front(output);
                self.outputs.truncate(self.capacity);
            }
            MonitorEvent::MonitoringStats(status) => self.stats = Some(status),
            MonitorEvent::TopicStats(stats) => self.topic_stats = stats,
            MonitorEvent::MonitoringStarted(status) => {
                self.monitoring = true;
                self.stats = Some(status);
            }
            MonitorEvent::MonitoringStopped(status) => {
                self.monitoring = false;
                self.stats = Some(status);
            }
        }
    }

    /// Applied after the server acknowledged a clear.
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
        self.topic_stats.clear();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn monitoring_stats(&self) -> Option<&MonitoringStatus> {
        self.stats.as_ref()
    }

    pub fn topic_statistics(&self) -> &[TopicStatistic] {
        &self.topic_stats
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Most recent first.
    pub fn latest_outputs(&self, limit: usize) -> Vec<FlowOutput> {
        self.outputs.iter().take(limit).cloned().collect()
    }

    /// Substring match on orgUsrNode.
    pub fn outputs_for_workflow(&self, name: &str) -> Vec<FlowOutput> {
        self.outputs
            .iter()
            .filter(|o| o.org_usr_node.contains(name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_api::{BrokerRecord, FlowData};

    fn output(topic: &str, offset: i64) -> FlowOutput {
        FlowOutput::from_record(BrokerRecord {
            topic: topic.into(),
            partition: 0,
            offset,
            timestamp_ms: Some(1_700_000_000_000 + offset),
            key: None,
            payload: Some(format!("{{\"n\":{offset}}}").into_bytes()),
        })
    }

    fn status(active: bool, total: usize) -> MonitoringStatus {
        MonitoringStatus { active, total_outputs: total, ..MonitoringStatus::default() }
    }

    #[test]
    fn flow_outputs_prepend_and_evict() {
        let mut state = MirrorState::new(3);
        for i in 0..5 {
            state.apply(MonitorEvent::FlowOutput(output("acme-alice-intake-topic", i)));
        }
        let offsets: Vec<i64> = state.latest_outputs(10).iter().map(|o| o.offset).collect();
        assert_eq!(offsets, vec![4, 3, 2]);
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn lifecycle_events_toggle_monitoring() {
        let mut state = MirrorState::default();
        assert!(!state.is_monitoring());

        state.apply(MonitorEvent::MonitoringStarted(status(true, 0)));
        assert!(state.is_monitoring());

        // stats never flip the flag
        state.apply(MonitorEvent::MonitoringStats(status(false, 7)));
        assert!(state.is_monitoring());
        assert_eq!(state.monitoring_stats().map(|s| s.total_outputs), Some(7));

        state.apply(MonitorEvent::MonitoringStopped(status(false, 7)));
        assert!(!state.is_monitoring());
    }

    #[test]
    fn topic_stats_replace_wholesale() {
        let mut state = MirrorState::default();
        let stat = |t: &str| TopicStatistic { topic: t.into(), message_count: 1, last_seen: 1 };
        state.apply(MonitorEvent::TopicStats(vec![stat("a-topic"), stat("b-topic")]));
        state.apply(MonitorEvent::TopicStats(vec![stat("c-topic")]));
        assert_eq!(state.topic_statistics().len(), 1);
        assert_eq!(state.topic_statistics()[0].topic, "c-topic");
    }

    #[test]
    fn workflow_filter_and_clear() {
        let mut state = MirrorState::default();
        state.apply(MonitorEvent::FlowOutput(output("acme-alice-intake-topic", 1)));
        state.apply(MonitorEvent::FlowOutput(output("acme-bob-billing-topic", 2)));
        state.apply(MonitorEvent::TopicStats(vec![TopicStatistic {
            topic: "acme-bob-billing-topic".into(),
            message_count: 1,
            last_seen: 2,
        }]));
        state.apply(MonitorEvent::MonitoringStarted(status(true, 2)));

        let intake = state.outputs_for_workflow("intake");
        assert_eq!(intake.len(), 1);
        assert_eq!(intake[0].data, FlowData::Structured(serde_json::json!({"n": 1})));

        state.clear_outputs();
        assert!(state.is_empty());
        assert!(state.topic_statistics().is_empty());
        assert!(state.is_monitoring());
    }
}
