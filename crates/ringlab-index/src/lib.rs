//! Per-peer ordered key index.
//!
//! Each peer in the lab owns one [`LocalIndex`]: a B+ tree mapping string
//! keys to a non-empty list of values. It is the only place peer state is
//! actually stored - the rest of a peer (Chord's finger table, Pastry's leaf
//! set) is routing metadata pointing at *other* peers' indexes, never a copy
//! of their contents.
//!
//! The tree is built over an arena (`Vec<Node<V>>`, indices instead of
//! pointers) rather than boxed child pointers with back-references, since
//! Rust's ownership model makes a doubly-linked tree with parent pointers
//! awkward to express any other way without `unsafe`.

mod tree;

pub use tree::LocalIndex;
