use raft3d_core::LogEntry;

/// Logic for advancing a follower's log position.
pub struct CheckpointManager;

impl CheckpointManager {
    /// The entries that extend a log ending at `last_index` without a hole.
    ///
    /// Entries at or below `last_index` are already held and skipped. For
    /// example, with `last_index` 0 and entries [1, 2, 4, 5], only 1 and 2
    /// are returned because 3 is missing.
    pub fn contiguous_after(last_index: u64, entries: &[LogEntry]) -> Vec<&LogEntry> {
        let mut sorted: Vec<_> = entries.iter().filter(|e| e.index > last_index).collect();
        sorted.sort_by_key(|e| e.index);

        let mut next = Self::next_expected_index(last_index);
        let mut run = Vec::new();
        for entry in sorted {
            if entry.index == next {
                run.push(entry);
                next += 1;
            } else if entry.index > next {
                // Gap detected, stop here
                break;
            }
            // Same index twice in one page; keep the first.
        }
        run
    }

    /// Get the next index a follower expects.
    pub fn next_expected_index(last_index: u64) -> u64 {
        last_index + 1
    }
}
