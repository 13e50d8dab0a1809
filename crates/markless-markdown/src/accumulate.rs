use markless_core::decoration::DecorationKey;
use markless_core::decoration::DecorationStyle;
use markless_core::decoration::is_valid_range;
use std::collections::BTreeMap;
use std::ops::Range;

/// Ranges collected for one decoration key during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lane {
    /// Style used when the host decoration type for this key is first created.
    pub style: DecorationStyle,
    pub ranges: Vec<Range<usize>>,
}

/// Per-key range collections for a single pass.
///
/// Rebuilt from scratch every pass; the controller diffs the result against what is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecorationLanes {
    lanes: BTreeMap<DecorationKey, Lane>,
}

impl DecorationLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `range` under `key`. Empty or out-of-bounds ranges (for a text of `text_len`
    /// bytes) are dropped.
    pub fn add(
        &mut self,
        key: DecorationKey,
        style: impl FnOnce() -> DecorationStyle,
        range: Range<usize>,
        text_len: usize,
    ) {
        if !is_valid_range(&range, text_len) {
            return;
        }
        self.lanes
            .entry(key)
            .or_insert_with(|| Lane {
                style: style(),
                ranges: Vec::new(),
            })
            .ranges
            .push(range);
    }

    /// Sorts every lane into document order and drops exact duplicates.
    pub fn finish(&mut self) {
        for lane in self.lanes.values_mut() {
            lane.ranges.sort_by_key(|r| (r.start, r.end));
            lane.ranges.dedup();
        }
    }

    pub fn get(&self, key: &DecorationKey) -> Option<&Lane> {
        self.lanes.get(key)
    }

    pub fn ranges(&self, key: &DecorationKey) -> &[Range<usize>] {
        self.lanes
            .get(key)
            .map(|lane| lane.ranges.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DecorationKey, &Lane)> {
        self.lanes.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DecorationKey> {
        self.lanes.keys()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Every range that hides source text (markers, images standing in for text).
    pub fn hidden_ranges(&self) -> impl Iterator<Item = &Range<usize>> {
        self.lanes
            .iter()
            .filter(|(key, _)| key.hides_text())
            .flat_map(|(_, lane)| lane.ranges.iter())
    }
}

/// An image discovered during a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageEntry {
    pub range: Range<usize>,
    /// Destination resolved against the configured base URL.
    pub url: String,
    /// Alt text, `" "` when the source has none.
    pub alt: String,
}
