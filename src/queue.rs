//! The playout queue. A total order over rendered segments:
//! pinned first, then priority, then arrival. Every mutation re-sorts.

use crate::error::{Result, StationError};
use crate::segment::{clamp_priority, RenderedSegment, SegmentSource};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a queued item sits where it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationReason {
    ManualPinned,
    ManualPriority,
    AutoPriority,
}

/// A rendered segment plus its arrival bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub segment: RenderedSegment,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic arrival number, the deterministic tie-break.
    seq: u64,
}

impl QueueItem {
    pub fn reason(&self) -> ArbitrationReason {
        match (self.segment.source, self.segment.pinned) {
            (SegmentSource::Manual, true) => ArbitrationReason::ManualPinned,
            (SegmentSource::Manual, false) => ArbitrationReason::ManualPriority,
            (SegmentSource::Auto, _) => ArbitrationReason::AutoPriority,
        }
    }
}

/// Dashboard view of one queue slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemView {
    pub segment: RenderedSegment,
    pub enqueued_at: DateTime<Utc>,
    pub reason: ArbitrationReason,
}

#[derive(Default)]
pub struct SegmentQueue {
    items: Vec<QueueItem>,
    next_seq: u64,
}

impl SegmentQueue {
    pub fn new() -> Self {
        SegmentQueue::default()
    }

    /// Insert a segment and restore the total order. The stored priority is
    /// clamped to the valid range.
    pub fn enqueue(&mut self, mut segment: RenderedSegment) {
        segment.priority = clamp_priority(segment.priority as i64);
        self.items.push(QueueItem {
            segment,
            enqueued_at: Utc::now(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.resort();
    }

    /// Remove by segment id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.segment.id != id);
        before != self.items.len()
    }

    /// Patch priority and/or pinned flag, then restore the order.
    pub fn update(&mut self, id: &str, priority: Option<i64>, pinned: Option<bool>) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.segment.id == id)
            .ok_or_else(|| StationError::QueueMiss(id.to_string()))?;
        if let Some(p) = priority {
            item.segment.priority = clamp_priority(p);
        }
        if let Some(pin) = pinned {
            item.segment.pinned = pin;
        }
        self.resort();
        Ok(())
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn pop(&mut self) -> Option<QueueItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Sum of queued durations, the per-segment-mode buffer measure.
    pub fn total_duration_secs(&self) -> f64 {
        self.items.iter().map(|i| i.segment.duration_secs).sum()
    }

    pub fn views(&self) -> Vec<QueueItemView> {
        self.items
            .iter()
            .map(|item| QueueItemView {
                segment: item.segment.clone(),
                enqueued_at: item.enqueued_at,
                reason: item.reason(),
            })
            .collect()
    }

    fn resort(&mut self) {
        self.items.sort_by(|a, b| {
            b.segment
                .pinned
                .cmp(&a.segment.pinned)
                .then(b.segment.priority.cmp(&a.segment.priority))
                .then(a.seq.cmp(&b.seq))
        });
    }
}
