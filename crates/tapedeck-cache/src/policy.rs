//! Connection-decision policy for [`crate::CachedFile`].
//!
//! Extracted as a pure function over a snapshot of the cache state so the
//! decision table is testable without network or timing.

use std::ops::Range;

use tapedeck_storage::ByteRanges;

/// Snapshot of the cache state the decision looks at.
#[derive(Debug)]
pub struct PolicyInputs<'a> {
    /// Undownloaded span of the current connection, if one is in flight.
    pub connection_remaining: Option<Range<u64>>,
    /// Range of the oldest pending read, if any.
    pub request: Option<Range<u64>>,
    /// Ranges already held by the buffer.
    pub have: &'a ByteRanges,
    /// End of the most recently resolved read, if any.
    pub last_resolved_end: Option<u64>,
    pub cache_budget: u64,
    pub file_size: u64,
    pub close_enough: u64,
}

/// Outcome of a policy evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionDecision {
    /// Keep whatever connection exists (possibly none); the cache-hit pass
    /// or the in-flight stream will satisfy the request.
    Keep,
    /// Replace any existing connection with one covering this range.
    Open(Range<u64>),
}

/// Decide whether the oldest pending read needs a new connection.
#[must_use]
pub fn decide_connection(inputs: &PolicyInputs<'_>) -> ConnectionDecision {
    let Some(request) = inputs.request.clone() else {
        return ConnectionDecision::Keep;
    };

    let missing = inputs.have.missing(request.clone());
    let Some(gap) = missing.first() else {
        // Fully downloaded; the cache-hit pass picks it up.
        return ConnectionDecision::Keep;
    };

    if let Some(remaining) = inputs.connection_remaining.clone() {
        let inside_gap = missing
            .iter()
            .any(|m| m.start <= remaining.start && remaining.start < m.end);
        let close_before_gap = remaining.start < gap.start
            && gap.start - remaining.start <= inputs.close_enough;
        if inside_gap || close_before_gap {
            // Sequential delivery will cover the request soon.
            return ConnectionDecision::Keep;
        }
    }

    let start = gap.start;
    let mut end = request
        .end
        .min(start.saturating_add(inputs.cache_budget));
    if let Some(next_have) = inputs.have.next_start_at_or_after(start.saturating_add(1)) {
        end = end.min(next_have);
    }

    // A read that picks up exactly where the last one ended signals a
    // sequential scan; extend the stream toward EOF as readahead.
    if inputs.last_resolved_end == Some(request.start) {
        let readahead_end = inputs
            .file_size
            .min(start.saturating_add(inputs.cache_budget));
        let capped = match inputs.have.next_start_at_or_after(start.saturating_add(1)) {
            Some(next_have) => readahead_end.min(next_have),
            None => readahead_end,
        };
        end = end.max(capped);
    }

    ConnectionDecision::Open(start..end.max(start + 1))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn have(parts: &[Range<u64>]) -> ByteRanges {
        parts.iter().cloned().collect()
    }

    fn inputs<'a>(ranges: &'a ByteRanges) -> PolicyInputs<'a> {
        PolicyInputs {
            connection_remaining: None,
            request: None,
            have: ranges,
            last_resolved_end: None,
            cache_budget: 1000,
            file_size: 10_000,
            close_enough: 50,
        }
    }

    #[test]
    fn no_pending_read_keeps() {
        let ranges = have(&[]);
        let i = inputs(&ranges);
        assert_eq!(decide_connection(&i), ConnectionDecision::Keep);
    }

    #[test]
    fn fully_cached_request_keeps() {
        let ranges = have(&[0..500]);
        let mut i = inputs(&ranges);
        i.request = Some(100..400);
        assert_eq!(decide_connection(&i), ConnectionDecision::Keep);
    }

    #[test]
    fn cold_request_opens_exact_range() {
        let ranges = have(&[]);
        let mut i = inputs(&ranges);
        i.request = Some(100..400);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(100..400));
    }

    #[test]
    fn open_starts_at_first_missing_byte() {
        let ranges = have(&[100..250]);
        let mut i = inputs(&ranges);
        i.request = Some(100..400);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(250..400));
    }

    #[test]
    fn open_is_capped_by_next_downloaded_range() {
        let ranges = have(&[300..350]);
        let mut i = inputs(&ranges);
        i.request = Some(0..400);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(0..300));
    }

    #[test]
    fn open_is_capped_by_cache_budget() {
        let ranges = have(&[]);
        let mut i = inputs(&ranges);
        i.cache_budget = 200;
        i.request = Some(0..400);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(0..200));
    }

    #[rstest]
    #[case::inside_gap(120)]
    #[case::at_gap_start(100)]
    #[case::close_before_gap(60)]
    #[case::touching_gap(99)]
    fn nearby_connection_is_kept(#[case] remaining_start: u64) {
        let ranges = have(&[]);
        let mut i = inputs(&ranges);
        i.request = Some(100..400);
        i.connection_remaining = Some(remaining_start..10_000);
        assert_eq!(decide_connection(&i), ConnectionDecision::Keep);
    }

    #[rstest]
    #[case::too_far_before(40)]
    #[case::past_request(500)]
    fn distant_connection_is_replaced(#[case] remaining_start: u64) {
        let ranges = have(&[]);
        let mut i = inputs(&ranges);
        i.request = Some(100..400);
        i.connection_remaining = Some(remaining_start..10_000);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(100..400));
    }

    #[test]
    fn sequential_read_extends_to_readahead() {
        let ranges = have(&[0..100]);
        let mut i = inputs(&ranges);
        i.request = Some(100..200);
        i.last_resolved_end = Some(100);
        // Readahead runs toward EOF, bounded by the budget.
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(100..1100));
    }

    #[test]
    fn readahead_is_capped_by_file_size() {
        let ranges = have(&[0..100]);
        let mut i = inputs(&ranges);
        i.file_size = 600;
        i.request = Some(100..200);
        i.last_resolved_end = Some(100);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(100..600));
    }

    #[test]
    fn readahead_stops_at_next_downloaded_range() {
        let ranges = have(&[0..100, 500..600]);
        let mut i = inputs(&ranges);
        i.request = Some(100..200);
        i.last_resolved_end = Some(100);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(100..500));
    }

    #[test]
    fn non_sequential_read_gets_no_readahead() {
        let ranges = have(&[]);
        let mut i = inputs(&ranges);
        i.request = Some(5000..5100);
        i.last_resolved_end = Some(100);
        assert_eq!(decide_connection(&i), ConnectionDecision::Open(5000..5100));
    }
}
