//! Trie construction from sorted records.
//!
//! The builder consumes records in one pass, depth-first: at each node it
//! groups the record range by the key byte at the current position, finds a
//! base address whose child slots are all vacant, reserves them, and
//! recurses into each group. Ranges of a single record stop branching and
//! move to the tail array as a leaf.
//!
//! Records must be pre-sorted in ascending key order with no duplicates;
//! the builder rejects violations rather than repairing them.

use std::io::Write;
use std::marker::PhantomData;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::chartable::CharTable;
use crate::double_array::DoubleArray;
use crate::element::{Element5, ElementLayout};
use crate::format::{self, write_chunk_header, CHUNK_HEADER_BYTES, SDAT_HEADER_BYTES};
use crate::tail::TailWriter;
use crate::vacancy::VacancyList;
use crate::value::TailValue;
use crate::{key_byte, TrieError, INITIAL_INDEX, NUM_CHARS};

/// One input record: a key and its value.
#[derive(Clone, Debug)]
pub struct Record<V> {
    pub key: Vec<u8>,
    pub value: V,
}

impl<V> Record<V> {
    pub fn new(key: impl Into<Vec<u8>>, value: V) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Statistics of a finished build. Observability only; nothing here feeds
/// back into construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
    /// Size of the double array in bytes.
    pub da_bytes: usize,
    /// Number of elements in the double array.
    pub da_elements: usize,
    /// Number of elements actually in use.
    pub da_used: usize,
    /// Number of internal nodes.
    pub da_nodes: usize,
    /// Number of leaves.
    pub da_leaves: usize,
    /// Fraction of elements in use.
    pub da_utilization: f64,
    /// Size of the tail array in bytes.
    pub tail_bytes: usize,
    /// Total vacancy probes across all base placements.
    pub base_trials: usize,
    /// Average vacancy probes per element.
    pub avg_base_trials: f64,
}

/// Progress callback: `(records_stored, records_total)`, invoked once per
/// record as its leaf is emitted. `records_stored` is non-decreasing.
pub type ProgressFn = Box<dyn FnMut(usize, usize)>;

/// Builds a double-array trie from sorted records.
///
/// `V` is the record value type, `E` the element width. The finished
/// structures are either serialized with [`write`](Builder::write) or moved
/// into a [`Trie`](crate::Trie) without copying via
/// [`Trie::from_builder`](crate::Trie::from_builder).
pub struct Builder<V, E = Element5> {
    da: DoubleArray<E>,
    tail: TailWriter,
    table: CharTable,
    vacancies: VacancyList,
    used_bases: Vec<bool>,
    stats: BuildStats,
    progress: Option<ProgressFn>,
    records_done: usize,
    num_records: usize,
    _value: PhantomData<V>,
}

struct ChildRange {
    c: u8,
    offset: usize,
    first: usize,
    last: usize,
}

impl<V: TailValue, E: ElementLayout> Builder<V, E> {
    pub fn new() -> Self {
        Self {
            da: DoubleArray::new(),
            tail: TailWriter::new(),
            table: CharTable::identity(),
            vacancies: VacancyList::new(),
            used_bases: Vec::new(),
            stats: BuildStats::default(),
            progress: None,
            records_done: 0,
            num_records: 0,
            _value: PhantomData,
        }
    }

    /// Installs a progress callback. The callback runs synchronously on the
    /// building thread and must not call back into the builder.
    pub fn set_progress(&mut self, f: impl FnMut(usize, usize) + 'static) {
        self.progress = Some(Box::new(f));
    }

    /// Statistics of the last completed build.
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Number of records stored by the last build.
    pub fn len(&self) -> usize {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    fn clear(&mut self) {
        self.da = DoubleArray::new();
        self.tail.reset();
        self.table = CharTable::identity();
        self.vacancies = VacancyList::new();
        self.used_bases.clear();
        self.stats = BuildStats::default();
        self.records_done = 0;
        self.num_records = 0;
    }

    /// Consumes sorted, unique records and populates the trie structures.
    ///
    /// # Errors
    ///
    /// - [`TrieError::InvalidKey`] for an empty key or one containing an
    ///   interior NUL byte.
    /// - [`TrieError::UnsortedInput`] when keys are not ascending.
    /// - [`TrieError::DuplicateKey`] for an exact repeat.
    /// - [`TrieError::CapacityExceeded`] when a base or tail offset leaves
    ///   the element width's range.
    pub fn build(&mut self, records: &[Record<V>]) -> Result<(), TrieError> {
        self.clear();
        let result = self.try_build(records);
        if result.is_err() {
            // No partial artifact survives a failed build.
            self.clear();
        }
        result
    }

    fn try_build(&mut self, records: &[Record<V>]) -> Result<(), TrieError> {
        for rec in records {
            if rec.key.is_empty() || rec.key.contains(&0) {
                return Err(TrieError::InvalidKey);
            }
        }

        self.num_records = records.len();
        self.table = CharTable::from_keys(records.iter().map(|r| r.key.as_slice()));

        // Create the root; its base holds a placeholder until the top-level
        // arrangement returns the real one.
        self.da.grow_to(INITIAL_INDEX + 1);
        self.vacancies.grow_to(INITIAL_INDEX + 1);
        self.da.set_base(INITIAL_INDEX, 1);
        self.vacancies.mark_used(INITIAL_INDEX);

        if !records.is_empty() {
            let root_base = self.arrange(0, records, 0, records.len())?;
            self.da.set_base(INITIAL_INDEX, root_base);
        }

        self.compute_stats();
        Ok(())
    }

    /// Recursively places `records[first..last]`, branching on the key byte
    /// at position `p`. Returns the base value for the caller's slot: the
    /// child base for an internal node, or a negated tail offset for a leaf.
    fn arrange(
        &mut self,
        p: usize,
        records: &[Record<V>],
        first: usize,
        last: usize,
    ) -> Result<i32, TrieError> {
        // A range of one record stops branching: store the key postfix and
        // the value in the tail and let this slot address it.
        if first + 1 == last {
            let rec = &records[first];
            let offset = self.tail.tell();
            if offset > E::MAX_BASE as usize {
                return Err(TrieError::CapacityExceeded);
            }
            self.tail.write_suffix(&rec.key, p);
            rec.value.write_tail(&mut self.tail);

            self.records_done += 1;
            if let Some(cb) = self.progress.as_mut() {
                cb(self.records_done, self.num_records);
            }
            self.stats.da_leaves += 1;
            return Ok(-(offset as i32));
        }

        // Group the range by the byte at position p. Groups must appear in
        // strictly ascending byte order; anything else means the caller's
        // sort precondition does not hold.
        let mut children: Vec<ChildRange> = Vec::new();
        let mut max_offset = 0usize;
        let mut prev_c: i32 = -1;
        for idx in first..last {
            let c = key_byte(&records[idx].key, p) as i32;
            if prev_c < c {
                if let Some(open) = children.last_mut() {
                    open.last = idx;
                }
                let offset = self.table.get(c as u8) as usize + 1;
                max_offset = max_offset.max(offset);
                children.push(ChildRange {
                    c: c as u8,
                    offset,
                    first: idx,
                    last: idx,
                });
            } else if c < prev_c {
                return Err(TrieError::UnsortedInput);
            }
            prev_c = c;
        }
        if let Some(open) = children.last_mut() {
            open.last = last;
        }

        // Find a base that can hold every child. Rather than testing base
        // candidates one by one, walk the vacancy list for the first child's
        // slot and compute the base back from it.
        let first_offset = children[0].offset;
        let mut index = 0usize;
        let base = loop {
            self.stats.base_trials += 1;

            index = self.vacancies.next_free(index);
            if index < INITIAL_INDEX + first_offset {
                // Too small to yield a positive base.
                continue;
            }
            let base = index - first_offset;

            if base < self.used_bases.len() && self.used_bases[base] {
                continue;
            }

            self.da.grow_to(base + max_offset + 1);
            self.vacancies.grow_to(base + max_offset + 1);

            if children[1..]
                .iter()
                .all(|ch| !self.da.in_use(base + ch.offset))
            {
                break base;
            }
        };

        if E::MAX_BASE as usize <= base + max_offset {
            return Err(TrieError::CapacityExceeded);
        }

        // No two nodes may share a base, or their children would collide.
        if self.used_bases.len() <= base {
            self.used_bases.resize(base + 1, false);
        }
        self.used_bases[base] = true;

        // Reserve every child slot with a tentative base before recursing,
        // so descendants cannot claim them.
        for ch in &children {
            self.da.set_base(base + ch.offset, 1);
            self.vacancies.mark_used(base + ch.offset);
        }

        for ch_idx in 0..children.len() {
            let (c, offset, ch_first, ch_last) = {
                let ch = &children[ch_idx];
                (ch.c, ch.offset, ch.first, ch.last)
            };
            let child_base = if c != 0 {
                self.arrange(p + 1, records, ch_first, ch_last)?
            } else {
                // The terminator group: a key ends here. More than one
                // record can only mean the same key twice.
                if ch_first + 1 != ch_last {
                    return Err(TrieError::DuplicateKey);
                }
                // Recurse at the same position to force the leaf branch,
                // storing an empty postfix plus the value.
                self.arrange(p, records, ch_first, ch_last)?
            };
            self.da.set_base(base + offset, child_base);
            self.da.set_check(base + offset, (offset - 1) as u8);
        }

        self.stats.da_nodes += 1;
        Ok(base as i32)
    }

    fn compute_stats(&mut self) {
        self.stats.da_elements = self.da.len();
        self.stats.da_bytes = self.da.len() * E::WIDTH;
        self.stats.da_used = (0..self.da.len()).filter(|&i| self.da.in_use(i)).count();
        self.stats.da_utilization = self.stats.da_used as f64 / self.stats.da_elements as f64;
        self.stats.tail_bytes = self.tail.tell();
        self.stats.avg_base_trials =
            self.stats.base_trials as f64 / self.stats.da_elements as f64;
    }

    /// Serializes the trie as one `SDAT` container.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), TrieError> {
        let tblu_size = CHUNK_HEADER_BYTES + NUM_CHARS;
        let sda_size = CHUNK_HEADER_BYTES + self.da.as_bytes().len();
        let tail_size = CHUNK_HEADER_BYTES + self.tail.tell();
        let total_size = SDAT_HEADER_BYTES + tblu_size + sda_size + tail_size;

        write_chunk_header(w, format::SDAT_ID, total_size as u32)?;
        w.write_u32::<LittleEndian>(SDAT_HEADER_BYTES as u32)?;
        w.write_u32::<LittleEndian>(self.num_records as u32)?;

        write_chunk_header(w, format::TBLU_ID, tblu_size as u32)?;
        w.write_all(self.table.as_bytes())?;

        write_chunk_header(w, E::CHUNK_ID, sda_size as u32)?;
        w.write_all(self.da.as_bytes())?;

        write_chunk_header(w, format::TAIL_ID, tail_size as u32)?;
        w.write_all(self.tail.as_bytes())?;

        Ok(())
    }

    /// Serializes the trie into a byte vector.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>, TrieError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<u8>, CharTable, usize) {
        (
            self.da.into_bytes(),
            self.tail.into_bytes(),
            self.table,
            self.num_records,
        )
    }
}

impl<V: TailValue, E: ElementLayout> Default for Builder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element4;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn records(pairs: &[(&str, i32)]) -> Vec<Record<i32>> {
        pairs.iter().map(|&(k, v)| Record::new(k, v)).collect()
    }

    // -------------------- Input validation --------------------

    #[test]
    fn unsorted_input_is_rejected() {
        let mut b = Builder::<i32>::new();
        let err = b.build(&records(&[("b", 1), ("a", 2)])).unwrap_err();
        assert!(matches!(err, TrieError::UnsortedInput));
    }

    #[test]
    fn unsorted_at_deeper_position_is_rejected() {
        let mut b = Builder::<i32>::new();
        let err = b
            .build(&records(&[("ab", 1), ("aa", 2)]))
            .unwrap_err();
        assert!(matches!(err, TrieError::UnsortedInput));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut b = Builder::<i32>::new();
        let err = b.build(&records(&[("x", 1), ("x", 2)])).unwrap_err();
        assert!(matches!(err, TrieError::DuplicateKey));
    }

    #[test]
    fn prefix_pair_is_not_a_duplicate() {
        let mut b = Builder::<i32>::new();
        b.build(&records(&[("a", 1), ("ab", 2)])).unwrap();
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn empty_or_nul_keys_are_rejected() {
        let mut b = Builder::<i32>::new();
        assert!(matches!(
            b.build(&[Record::new("", 1)]).unwrap_err(),
            TrieError::InvalidKey
        ));
        assert!(matches!(
            b.build(&[Record::new(vec![b'a', 0, b'b'], 1)]).unwrap_err(),
            TrieError::InvalidKey
        ));
    }

    #[test]
    fn empty_input_builds_an_empty_trie() {
        let mut b = Builder::<i32>::new();
        b.build(&[]).unwrap();
        assert!(b.is_empty());
        assert_eq!(b.stats().da_leaves, 0);
    }

    // -------------------- Statistics --------------------

    #[test]
    fn stats_count_leaves_and_nodes() {
        let mut b = Builder::<i32>::new();
        b.build(&records(&[("car", 1), ("card", 2), ("care", 3)]))
            .unwrap();
        let s = b.stats();
        assert_eq!(s.da_leaves, 3);
        assert!(s.da_nodes >= 1);
        assert!(s.da_used > 0 && s.da_used <= s.da_elements);
        assert!(s.da_utilization > 0.0 && s.da_utilization <= 1.0);
        assert_eq!(s.da_bytes, s.da_elements * 5);
        assert!(s.tail_bytes > 1);
        assert!(s.base_trials >= s.da_nodes);
    }

    // -------------------- Progress callback --------------------

    #[test]
    fn progress_reports_every_record_in_order() {
        let seen: Rc<RefCell<Vec<(usize, usize)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let mut b = Builder::<i32>::new();
        b.set_progress(move |done, total| sink.borrow_mut().push((done, total)));
        b.build(&records(&[("one", 1), ("three", 3), ("two", 2)]))
            .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        for (i, &(done, total)) in seen.iter().enumerate() {
            assert_eq!(done, i + 1);
            assert_eq!(total, 3);
        }
    }

    // -------------------- Serialization --------------------

    #[test]
    fn container_starts_with_sdat_and_declares_its_size() {
        let mut b = Builder::<i32>::new();
        b.build(&records(&[("a", 1), ("b", 2)])).unwrap();
        let bytes = b.write_to_bytes().unwrap();

        assert_eq!(&bytes[0..4], b"SDAT");
        let total = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(total as usize, bytes.len());
        let header = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(header, 16);
        let n = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(n, 2);
        assert_eq!(&bytes[16..20], b"TBLU");
    }

    #[test]
    fn element4_build_writes_sda4_chunk() {
        let mut b = Builder::<i32, Element4>::new();
        b.build(&records(&[("a", 1), ("b", 2)])).unwrap();
        let bytes = b.write_to_bytes().unwrap();
        assert!(bytes
            .windows(4)
            .any(|w| w == b"SDA4"));
        assert!(!bytes.windows(4).any(|w| w == b"SDA5"));
    }

    #[test]
    fn builds_are_deterministic() {
        let recs = records(&[("eight", 8), ("five", 5), ("four", 4), ("nine", 9)]);
        let mut a = Builder::<i32>::new();
        a.build(&recs).unwrap();
        let mut b = Builder::<i32>::new();
        b.build(&recs).unwrap();
        assert_eq!(a.write_to_bytes().unwrap(), b.write_to_bytes().unwrap());
    }

    #[test]
    fn rebuilding_replaces_previous_state() {
        let mut b = Builder::<i32>::new();
        b.build(&records(&[("stale", 1)])).unwrap();
        b.build(&records(&[("fresh", 2)])).unwrap();
        assert_eq!(b.len(), 1);
        let bytes = b.write_to_bytes().unwrap();

        let mut fresh = Builder::<i32>::new();
        fresh.build(&records(&[("fresh", 2)])).unwrap();
        assert_eq!(bytes, fresh.write_to_bytes().unwrap());
    }

    // -------------------- Failed builds leave no artifact --------------------

    #[test]
    fn failed_build_reports_zero_records() {
        let mut b = Builder::<i32>::new();
        b.build(&records(&[("keep", 1)])).unwrap();
        assert!(b.build(&records(&[("b", 1), ("a", 2)])).is_err());
        assert_eq!(b.len(), 0);
    }
}
