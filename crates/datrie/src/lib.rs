//! # datrie — Static Double-Array Trie
//!
//! An immutable, compact associative array built from a lexicographically
//! sorted list of `(key, value)` records. Lookups cost O(1) per key byte;
//! prefix enumeration walks the same structure. Once built, a trie is
//! **write-once, read-many** — there is no insert or delete.
//!
//! The trie is stored in two flat buffers: a *double array* of fixed-width
//! `(base, check)` elements encoding the branching structure, and a *tail
//! array* holding non-branching key suffixes together with their serialized
//! values. A 256-byte character table remaps input bytes by corpus frequency
//! so that children pack densely near their parent's base.
//!
//! ## Container layout (v1)
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ "SDAT" | total_size (u32)                     │  outer chunk header
//! │ sdat_header_size (u32 = 16) | num_records     │
//! ├───────────────────────────────────────────────┤
//! │ "TBLU" | size | table[256]                    │  character table
//! ├───────────────────────────────────────────────┤
//! │ "SDA4"/"SDA5" | size | raw elements           │  double array
//! ├───────────────────────────────────────────────┤
//! │ "TAIL" | size | raw tail bytes                │  suffixes + values
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Every chunk `size` covers its own 8-byte
//! header. The element chunk ID selects the element width (4 or 5 bytes);
//! the in-memory element array is byte-identical to the chunk payload, so a
//! reader can borrow a memory-mapped buffer directly.
//!
//! ## Quick start
//!
//! ```
//! use datrie::{Builder, Record, Trie};
//!
//! let records = vec![
//!     Record::new("one", 1i32),
//!     Record::new("three", 3i32),
//!     Record::new("two", 2i32),
//! ];
//! let mut builder = Builder::<i32>::new();
//! builder.build(&records).unwrap();
//!
//! let trie = Trie::from_builder(builder);
//! assert_eq!(trie.find(b"two").unwrap(), Some(2));
//! assert!(!trie.contains(b"four"));
//! ```

use std::io;

use thiserror::Error;

mod builder;
mod chartable;
mod double_array;
mod element;
mod format;
mod tail;
mod trie;
mod vacancy;
mod value;

pub use builder::{BuildStats, Builder, Record};
pub use element::{Element4, Element5, ElementLayout};
pub use tail::{TailReader, TailWriter};
pub use trie::{PrefixCursor, PrefixMatch, Trie};
pub use value::TailValue;

/// Index 0 of the double array; reserved as the "no node" sentinel.
pub const INVALID_INDEX: usize = 0;
/// Index of the root node.
pub const INITIAL_INDEX: usize = 1;
/// Size of the byte alphabet and of the character table.
pub const NUM_CHARS: usize = 256;

/// Errors reported by the builder and the reader.
#[derive(Debug, Error)]
pub enum TrieError {
    /// The input records violated the ascending-key precondition.
    #[error("records are not sorted in dictionary order of keys")]
    UnsortedInput,
    /// Two input records share an exact key.
    #[error("duplicate keys detected")]
    DuplicateKey,
    /// A key was empty or contained an interior NUL byte.
    #[error("key is empty or contains an interior NUL byte")]
    InvalidKey,
    /// A base value or tail offset exceeded the element width's range.
    #[error("the double array has no space left at this element width")]
    CapacityExceeded,
    /// A container image was truncated, mis-sized, or otherwise corrupt.
    #[error("invalid or corrupt trie data")]
    InvalidFormat,
    /// The underlying byte source or sink failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The byte of `key` at position `p`, with `p == key.len()` reading the
/// implicit `0x00` terminator.
pub(crate) fn key_byte(key: &[u8], p: usize) -> u8 {
    key.get(p).copied().unwrap_or(0)
}
