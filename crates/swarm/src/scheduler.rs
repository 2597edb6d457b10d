// Buffer scheduler: the pending-download queue and VOD buffer filling.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use crate::state::SessionState;

/// A segment waiting to be downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub uri: String,
    pub duration: f64,
    pub sequence: u64,
}

/// FIFO of segments waiting for the fetcher.
///
/// Keeps the uris and sequences it holds in side tables so duplicate checks
/// do not scan the queue.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<QueueEntry>,
    /// uri -> number of queued entries using it
    uris: HashMap<String, usize>,
    sequences: HashSet<u64>,
    queued_duration: f64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends unless an entry with the same uri is queued. Used for live playlists,
    /// whose sequence numbering is not trusted across refreshes.
    pub fn push_unique_uri(&mut self, entry: QueueEntry) -> bool {
        if self.uris.contains_key(&entry.uri) {
            return false;
        }
        self.push(entry);
        true
    }

    /// Appends unless an entry with the same sequence is queued. Used for VOD,
    /// where one uri may back several byte-range segments.
    pub fn push_unique_sequence(&mut self, entry: QueueEntry) -> bool {
        if self.sequences.contains(&entry.sequence) {
            return false;
        }
        self.push(entry);
        true
    }

    fn push(&mut self, entry: QueueEntry) {
        self.queued_duration += entry.duration;
        *self.uris.entry(entry.uri.clone()).or_default() += 1;
        self.sequences.insert(entry.sequence);
        self.entries.push_back(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        let entry = self.entries.pop_front()?;
        if let Some(count) = self.uris.get_mut(&entry.uri) {
            *count -= 1;
            if *count == 0 {
                self.uris.remove(&entry.uri);
            }
        }
        self.sequences.remove(&entry.sequence);
        self.queued_duration = if self.entries.is_empty() {
            0.0
        } else {
            (self.queued_duration - entry.duration).max(0.0)
        };
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.uris.clear();
        self.sequences.clear();
        self.queued_duration = 0.0;
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.uris.contains_key(uri)
    }

    pub fn contains_sequence(&self, sequence: u64) -> bool {
        self.sequences.contains(&sequence)
    }

    /// Seconds of media waiting in the queue
    pub fn queued_duration(&self) -> f64 {
        self.queued_duration
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }
}

/// Queues VOD segments until buffered plus queued media reaches the target,
/// or the segment list runs out. Returns the number of segments queued.
///
/// Starts right after the last downloaded or last queued index, whichever is
/// further, so repeated calls never queue an index twice.
pub fn fill_for_vod(state: &mut SessionState) -> usize {
    let Some(vod) = state.vod.as_ref() else {
        return 0;
    };

    let next_after = |seq: Option<u64>| seq.map_or(0, |s| s + 1);
    let start = next_after(state.last_downloaded_sequence).max(next_after(vod.last_added_index));
    let segments = vod.segments.clone();

    let target = state.target_buffer;
    let mut accumulated = state.buffered_duration + state.queue.queued_duration();
    let mut index = start;
    let mut added = 0;

    while accumulated < target {
        let Some(segment) = usize::try_from(index).ok().and_then(|i| segments.get(i)) else {
            break;
        };
        let entry = QueueEntry {
            uri: segment.uri.clone(),
            duration: segment.duration,
            sequence: index,
        };
        if state.queue.push_unique_sequence(entry) {
            accumulated += segment.duration;
            added += 1;
        }
        index += 1;
    }

    if let Some(vod) = state.vod.as_mut()
        && index > start
    {
        vod.last_added_index = Some(index - 1);
    }

    if added > 0 {
        trace!(
            from = start,
            added,
            queued_secs = state.queue.queued_duration(),
            "Queued VOD segments"
        );
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::Segment;
    use crate::state::{SessionState, StreamType};

    fn vod_state(count: usize, duration: f64, target: f64) -> SessionState {
        let segments = (0..count)
            .map(|i| Segment {
                uri: format!("seg{i}.ts"),
                duration,
                sequence: i as u64,
            })
            .collect();
        let mut state = SessionState::new(
            url::Url::parse("https://cdn.example.com/vod/stream.m3u8").unwrap(),
            url::Url::parse("https://cdn.example.com/").unwrap(),
            None,
            StreamType::Vod,
            target,
        );
        state.set_vod_segments(segments);
        state
    }

    fn entry(uri: &str, sequence: u64) -> QueueEntry {
        QueueEntry {
            uri: uri.to_string(),
            duration: 6.0,
            sequence,
        }
    }

    #[test]
    fn queue_rejects_duplicates_by_policy() {
        let mut queue = PendingQueue::new();
        assert!(queue.push_unique_uri(entry("a.ts", 1)));
        assert!(!queue.push_unique_uri(entry("a.ts", 2)));
        assert!(!queue.push_unique_sequence(entry("b.ts", 1)));
        assert!(queue.push_unique_sequence(entry("a.ts", 3)));
        assert_eq!(queue.len(), 2);
        assert!((queue.queued_duration() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn queue_is_fifo_and_forgets_popped_entries() {
        let mut queue = PendingQueue::new();
        queue.push_unique_uri(entry("a.ts", 1));
        queue.push_unique_uri(entry("b.ts", 2));

        assert_eq!(queue.pop_front().unwrap().sequence, 1);
        assert!(!queue.contains_uri("a.ts"));
        assert!(!queue.contains_sequence(1));
        assert!(queue.contains_uri("b.ts"));
        assert_eq!(queue.pop_front().unwrap().sequence, 2);
        assert!(queue.pop_front().is_none());
        assert_eq!(queue.queued_duration(), 0.0);
    }

    #[test]
    fn fill_for_vod_queues_ceil_of_target_over_duration() {
        for (count, duration, target, expected) in [
            (100, 6.0, 40.0, 7),
            (100, 4.0, 40.0, 10),
            (100, 10.0, 40.0, 4),
            (100, 6.0, 1.0, 1),
            (3, 6.0, 40.0, 3),
        ] {
            let mut state = vod_state(count, duration, target);
            let added = fill_for_vod(&mut state);
            assert_eq!(added, expected, "count={count} duration={duration} target={target}");
            assert_eq!(state.queue.len(), expected);
            let sequences: Vec<u64> = state.queue.iter().map(|e| e.sequence).collect();
            assert_eq!(sequences, (0..expected as u64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn fill_for_vod_counts_already_buffered_media() {
        let mut state = vod_state(100, 6.0, 40.0);
        state.buffered_duration = 30.0;
        state.last_downloaded_sequence = Some(4);

        assert_eq!(fill_for_vod(&mut state), 2);
        let sequences: Vec<u64> = state.queue.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![5, 6]);
    }

    #[test]
    fn fill_for_vod_is_idempotent() {
        let mut state = vod_state(100, 6.0, 40.0);
        assert_eq!(fill_for_vod(&mut state), 7);
        assert_eq!(fill_for_vod(&mut state), 0);
        assert_eq!(state.queue.len(), 7);

        // Draining the queue without buffering must not re-queue the same indices.
        state.queue.pop_front();
        state.queue.pop_front();
        fill_for_vod(&mut state);
        let sequences: Vec<u64> = state.queue.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn fill_for_vod_stops_at_end_of_list() {
        let mut state = vod_state(10, 6.0, 40.0);
        state.last_downloaded_sequence = Some(9);
        assert_eq!(fill_for_vod(&mut state), 0);
        assert!(state.queue.is_empty());
        assert_eq!(state.vod.as_ref().unwrap().last_added_index, None);
    }
}
