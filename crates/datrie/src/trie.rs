//! Read access to a finished trie.
//!
//! A [`Trie`] walks the double array one key byte at a time (plus one step
//! for the implicit terminator). Descending from node `i` on byte `c` lands
//! at `base(i) + table[c] + 1`, valid only when that slot's check byte is
//! `table[c]`. A negative base ends the walk at a leaf whose magnitude
//! addresses the remaining key suffix and the value in the tail array.
//!
//! The buffers may be owned (loaded from a stream, or moved out of a
//! [`Builder`]) or borrowed from caller-supplied bytes such as a read-only
//! memory map. A `Trie` is immutable and safe to share across threads;
//! each [`PrefixCursor`] carries its own traversal state.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};
use std::marker::PhantomData;

use crate::builder::Builder;
use crate::chartable::CharTable;
use crate::element::{Element5, ElementLayout};
use crate::format::{self, CHUNK_HEADER_BYTES, SDAT_HEADER_BYTES};
use crate::tail::TailReader;
use crate::value::TailValue;
use crate::{key_byte, TrieError, INITIAL_INDEX, INVALID_INDEX};

/// A read-only double-array trie.
pub struct Trie<'a, V, E = Element5> {
    num_records: usize,
    table: CharTable,
    da: Cow<'a, [u8]>,
    tail: Cow<'a, [u8]>,
    _marker: PhantomData<(V, E)>,
}

impl<'a, V, E> std::fmt::Debug for Trie<'a, V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie")
            .field("num_records", &self.num_records)
            .field("table", &self.table)
            .field("da", &self.da)
            .field("tail", &self.tail)
            .finish()
    }
}

/// One hit yielded by a [`PrefixCursor`]: a stored key of `length` bytes
/// that prefixes the query, together with its value.
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixMatch<V> {
    pub length: usize,
    pub value: V,
}

impl<'a, V: TailValue, E: ElementLayout> Trie<'a, V, E> {
    /// Takes ownership of a builder's finished arrays without copying.
    pub fn from_builder(builder: Builder<V, E>) -> Trie<'static, V, E> {
        let (da, tail, table, num_records) = builder.into_parts();
        Trie {
            num_records,
            table,
            da: Cow::Owned(da),
            tail: Cow::Owned(tail),
            _marker: PhantomData,
        }
    }

    /// Parses a container image, borrowing the element and tail buffers
    /// from `block`. Returns the trie and the number of bytes consumed;
    /// data following the container is left untouched.
    pub fn from_bytes(block: &'a [u8]) -> Result<(Self, usize), TrieError> {
        let raw = format::parse_container(block, E::CHUNK_ID, E::WIDTH)?;
        let table = match raw.table {
            Some(bytes) => CharTable::from_bytes(bytes),
            None => CharTable::identity(),
        };
        Ok((
            Self {
                num_records: raw.num_records as usize,
                table,
                da: Cow::Borrowed(raw.elements),
                tail: Cow::Borrowed(raw.tail),
                _marker: PhantomData,
            },
            raw.total_size,
        ))
    }

    /// Reads a container from a stream into owned buffers.
    ///
    /// On any failure — truncation, bad magic, inconsistent sizes, element
    /// width mismatch, stream error — the stream is rewound to its
    /// position at the time of the call before the error is returned.
    pub fn from_reader<R: Read + Seek>(r: &mut R) -> Result<Trie<'static, V, E>, TrieError> {
        let start = r.stream_position()?;

        let mut header = [0u8; CHUNK_HEADER_BYTES];
        if let Err(e) = r.read_exact(&mut header) {
            return fail_rewound(r, start, read_failure(e));
        }
        if header[0..4] != format::SDAT_ID {
            return fail_rewound(r, start, TrieError::InvalidFormat);
        }
        let total = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if total < SDAT_HEADER_BYTES {
            return fail_rewound(r, start, TrieError::InvalidFormat);
        }

        let mut block = vec![0u8; total];
        block[..CHUNK_HEADER_BYTES].copy_from_slice(&header);
        if let Err(e) = r.read_exact(&mut block[CHUNK_HEADER_BYTES..]) {
            return fail_rewound(r, start, read_failure(e));
        }

        match Trie::<V, E>::from_bytes(&block) {
            Ok((trie, _)) => Ok(trie.into_owned()),
            Err(e) => fail_rewound(r, start, e),
        }
    }

    fn into_owned(self) -> Trie<'static, V, E> {
        Trie {
            num_records: self.num_records,
            table: self.table,
            da: Cow::Owned(self.da.into_owned()),
            tail: Cow::Owned(self.tail.into_owned()),
            _marker: PhantomData,
        }
    }

    /// Number of records stored in the trie.
    pub fn len(&self) -> usize {
        self.num_records
    }

    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Whether an exact record with `key` exists.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.locate(key).is_some()
    }

    /// Looks up `key` and deserializes its value.
    ///
    /// A miss is `Ok(None)`; an error means the tail bytes behind a located
    /// key could not be decoded (corrupt data).
    pub fn find(&self, key: &[u8]) -> Result<Option<V>, TrieError> {
        match self.locate(key) {
            Some(value_at) => {
                let mut tail = self.tail_reader();
                tail.seek(value_at);
                V::read_tail(&mut tail).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Looks up `key`, returning `default` when it is absent.
    pub fn get(&self, key: &[u8], default: V) -> V {
        match self.find(key) {
            Ok(Some(v)) => v,
            _ => default,
        }
    }

    /// Starts a cursor over every stored key that prefixes `query`.
    pub fn prefix<'c>(&'c self, query: &'c [u8]) -> PrefixCursor<'c, 'a, V, E> {
        PrefixCursor {
            trie: self,
            query,
            length: 0,
            cur: INITIAL_INDEX,
        }
    }

    fn da_len(&self) -> usize {
        self.da.len() / E::WIDTH
    }

    fn base_at(&self, i: usize) -> i32 {
        E::base(&self.da[i * E::WIDTH..(i + 1) * E::WIDTH])
    }

    fn check_at(&self, i: usize) -> u8 {
        E::check(&self.da[i * E::WIDTH..(i + 1) * E::WIDTH])
    }

    fn tail_reader(&self) -> TailReader<'_> {
        TailReader::new(&self.tail)
    }

    /// One transition from node `i` on raw byte `c`.
    fn descend(&self, i: usize, c: u8) -> Option<usize> {
        if self.da_len() <= i {
            return None;
        }
        let base = self.base_at(i);
        if base <= 0 {
            return None;
        }
        let check = self.table.get(c);
        let next = base as usize + check as usize + 1;
        if self.da_len() <= next || self.check_at(next) != check {
            return None;
        }
        Some(next)
    }

    /// Walks the whole key. On a hit, returns the tail offset of the value
    /// (just past the stored suffix's terminator).
    fn locate(&self, key: &[u8]) -> Option<usize> {
        if self.da_len() <= INITIAL_INDEX {
            return None;
        }

        let mut cur = INITIAL_INDEX;
        let mut p = 0usize;
        let offset;

        let root_base = self.base_at(INITIAL_INDEX);
        if root_base < 0 {
            // A single-record trie keeps its lone leaf in the root slot.
            offset = -(root_base as i64) as usize;
        } else {
            loop {
                let c = key_byte(key, p);
                cur = self.descend(cur, c)?;
                let base = self.base_at(cur);
                if base < 0 {
                    if c != 0 {
                        p += 1;
                    }
                    offset = -(base as i64) as usize;
                    break;
                }
                if c == 0 {
                    // Out of key bytes without reaching a leaf.
                    return None;
                }
                p += 1;
            }
        }

        let suffix = &key[p..];
        let mut tail = self.tail_reader();
        tail.seek(offset);
        if tail.match_str(suffix) {
            Some(offset + suffix.len() + 1)
        } else {
            None
        }
    }
}

fn read_failure(e: io::Error) -> TrieError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        TrieError::InvalidFormat
    } else {
        TrieError::Io(e)
    }
}

fn fail_rewound<R: Seek, T>(r: &mut R, start: u64, err: TrieError) -> Result<T, TrieError> {
    r.seek(SeekFrom::Start(start))?;
    Err(err)
}

/// Enumerates stored keys that are prefixes of a query, shortest first.
///
/// Obtained from [`Trie::prefix`]. Each call to [`next`](PrefixCursor::next)
/// resumes the descent where the previous hit left off.
pub struct PrefixCursor<'c, 'a, V, E> {
    trie: &'c Trie<'a, V, E>,
    query: &'c [u8],
    length: usize,
    cur: usize,
}

impl<V: TailValue, E: ElementLayout> PrefixCursor<'_, '_, V, E> {
    /// Advances to the next stored key that prefixes the query.
    ///
    /// `Ok(None)` means the enumeration is exhausted. An error reports a
    /// structurally corrupt trie (a walk state no well-formed build can
    /// produce), or a value that failed to decode.
    pub fn next(&mut self) -> Result<Option<PrefixMatch<V>>, TrieError> {
        let trie = self.trie;
        let query = self.query;

        if query.len() <= self.length {
            return Ok(None);
        }
        if self.cur == INVALID_INDEX {
            return Ok(None);
        }

        if self.cur == INITIAL_INDEX && self.length == 0 {
            if trie.da_len() <= INITIAL_INDEX {
                return Ok(None);
            }
            let root_base = trie.base_at(INITIAL_INDEX);
            if root_base < 0 {
                // Single-record trie: the root leaf is the only candidate.
                self.cur = INVALID_INDEX;
                return self.leaf_hit(-(root_base as i64) as usize, 0);
            }
        }

        loop {
            let c = key_byte(query, self.length);
            self.cur = match trie.descend(self.cur, c) {
                Some(next) => next,
                None => {
                    self.cur = INVALID_INDEX;
                    return Ok(None);
                }
            };

            let base = trie.base_at(self.cur);
            if base < 0 {
                if c != 0 {
                    self.length += 1;
                }
                return self.leaf_hit(-(base as i64) as usize, self.length);
            }

            // A stored key may end exactly here; its record hangs off the
            // terminator child of the node just entered.
            if let Some(nul) = trie.descend(self.cur, 0) {
                let nul_base = trie.base_at(nul);
                if nul_base != 0 {
                    if nul_base > 0 {
                        return Err(TrieError::InvalidFormat);
                    }
                    let offset = -(nul_base as i64) as usize;
                    let mut tail = trie.tail_reader();
                    tail.seek(offset);
                    if tail.strlen() != Some(0) {
                        return Err(TrieError::InvalidFormat);
                    }
                    self.length += 1;
                    tail.seek(offset + 1);
                    let value = V::read_tail(&mut tail)?;
                    return Ok(Some(PrefixMatch {
                        length: self.length,
                        value,
                    }));
                }
            }

            if c == 0 {
                return Ok(None);
            }
            self.length += 1;
        }
    }

    /// Finishes a hit on a leaf whose suffix starts at `offset` with
    /// `consumed` query bytes already matched in the double array.
    fn leaf_hit(
        &mut self,
        offset: usize,
        consumed: usize,
    ) -> Result<Option<PrefixMatch<V>>, TrieError> {
        let trie = self.trie;
        let remainder = &self.query[consumed..];
        let mut tail = trie.tail_reader();
        tail.seek(offset);
        match tail.match_str_prefix(remainder) {
            Some(n) => {
                self.length = consumed + n;
                tail.seek(offset + n + 1);
                let value = V::read_tail(&mut tail)?;
                Ok(Some(PrefixMatch {
                    length: self.length,
                    value,
                }))
            }
            None => Ok(None),
        }
    }
}
