//! Queue cursor over the videos eligible for viewing
//!
//! Skip-eligible entries (deleted, inactive, or on hold) are passed over.
//! The cursor loops back to the head after the last entry.

use crate::{VideoDescriptor, VideoId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VideoQueue {
    videos: Vec<VideoDescriptor>,
    index: Option<usize>,
    hold_window: Duration,
}

impl VideoQueue {
    /// Create an empty queue using `hold_window` for eligibility
    pub fn new(hold_window: Duration) -> Self {
        Self {
            videos: Vec::new(),
            index: None,
            hold_window,
        }
    }

    /// Number of queued entries, eligible or not
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Get all queued entries in order
    pub fn videos(&self) -> &[VideoDescriptor] {
        &self.videos
    }

    /// Get the entry under the cursor
    pub fn current(&self) -> Option<&VideoDescriptor> {
        self.index.and_then(|i| self.videos.get(i))
    }

    /// Get the ID of the entry under the cursor
    pub fn current_id(&self) -> Option<&VideoId> {
        self.current().map(|video| &video.id)
    }

    /// Replace the list wholesale and point at the first eligible entry
    pub fn replace(&mut self, videos: Vec<VideoDescriptor>, now: DateTime<Utc>) {
        self.videos = dedupe(videos);
        self.index = self.next_eligible_from(0, now);
        debug!(len = self.videos.len(), index = ?self.index, "Queue replaced");
    }

    /// Append entries not already queued; the cursor does not move unless
    /// it had nothing to point at
    pub fn extend(&mut self, videos: Vec<VideoDescriptor>, now: DateTime<Utc>) -> usize {
        let known: HashSet<VideoId> = self.videos.iter().map(|v| v.id.clone()).collect();
        let before = self.videos.len();
        for video in dedupe(videos) {
            if !known.contains(&video.id) {
                self.videos.push(video);
            }
        }
        if self.current().is_none() {
            self.index = self.next_eligible_from(0, now);
        }
        self.videos.len() - before
    }

    /// Move to the next eligible entry, wrapping around. Returns the new
    /// current video, which may be the same one when it is the only
    /// eligible entry.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<&VideoDescriptor> {
        let start = self.index.map(|i| i + 1).unwrap_or(0);
        self.index = self.next_eligible_from(start, now);
        self.current()
    }

    /// Eligible entries after the cursor, without wrapping
    pub fn remaining(&self, now: DateTime<Utc>) -> usize {
        let start = self.index.map(|i| i + 1).unwrap_or(0);
        self.videos
            .iter()
            .skip(start)
            .filter(|video| !video.is_skip_eligible(now, self.hold_window))
            .count()
    }

    fn next_eligible_from(&self, start: usize, now: DateTime<Utc>) -> Option<usize> {
        let len = self.videos.len();
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| !self.videos[i].is_skip_eligible(now, self.hold_window))
    }
}

fn dedupe(videos: Vec<VideoDescriptor>) -> Vec<VideoDescriptor> {
    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|video| seen.insert(video.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoStatus;

    fn queue_of(ids: &[&str]) -> VideoQueue {
        let mut queue = VideoQueue::new(Duration::minutes(10));
        queue.replace(
            ids.iter()
                .map(|id| VideoDescriptor::new(*id, "dQw4w9WgXcQ", 30, 10))
                .collect(),
            Utc::now(),
        );
        queue
    }

    #[test]
    fn test_advance_and_loop() {
        let mut queue = queue_of(&["a", "b", "c"]);
        let now = Utc::now();
        assert_eq!(queue.current_id(), Some(&VideoId::from("a")));
        assert_eq!(queue.remaining(now), 2);
        assert_eq!(queue.advance(now).map(|v| v.id.0.as_str()), Some("b"));
        assert_eq!(queue.advance(now).map(|v| v.id.0.as_str()), Some("c"));
        assert_eq!(queue.remaining(now), 0);
        assert_eq!(queue.advance(now).map(|v| v.id.0.as_str()), Some("a"));
    }

    #[test]
    fn test_ineligible_entries_skipped() {
        let now = Utc::now();
        let mut deleted = VideoDescriptor::new("a", "dQw4w9WgXcQ", 30, 10);
        deleted.deleted = true;
        let mut held = VideoDescriptor::new("b", "dQw4w9WgXcQ", 30, 10);
        held.hold_started_at = Some(now - Duration::minutes(1));
        let mut paused = VideoDescriptor::new("c", "dQw4w9WgXcQ", 30, 10);
        paused.status = VideoStatus::Paused;
        let ok = VideoDescriptor::new("d", "dQw4w9WgXcQ", 30, 10);

        let mut queue = VideoQueue::new(Duration::minutes(10));
        queue.replace(vec![deleted, held, paused, ok], now);
        assert_eq!(queue.current_id(), Some(&VideoId::from("d")));
        assert_eq!(queue.advance(now).map(|v| v.id.0.as_str()), Some("d"));
    }

    #[test]
    fn test_nothing_eligible() {
        let now = Utc::now();
        let mut deleted = VideoDescriptor::new("a", "dQw4w9WgXcQ", 30, 10);
        deleted.deleted = true;
        let mut queue = VideoQueue::new(Duration::minutes(10));
        queue.replace(vec![deleted], now);
        assert!(queue.current().is_none());
        assert!(queue.advance(now).is_none());

        let mut empty = VideoQueue::new(Duration::minutes(10));
        assert!(empty.advance(now).is_none());
        assert_eq!(empty.remaining(now), 0);
    }

    #[test]
    fn test_extend_skips_known_ids() {
        let now = Utc::now();
        let mut queue = queue_of(&["a", "b"]);
        let added = queue.extend(
            vec![
                VideoDescriptor::new("b", "dQw4w9WgXcQ", 30, 10),
                VideoDescriptor::new("c", "dQw4w9WgXcQ", 30, 10),
                VideoDescriptor::new("c", "dQw4w9WgXcQ", 30, 10),
            ],
            now,
        );
        assert_eq!(added, 1);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.current_id(), Some(&VideoId::from("a")));
    }
}
