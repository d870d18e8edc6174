//! Slab-backed ordered map used as the DDT's ZAP-like index and as the
//! generic ordered collection the allocator and dataset layers build on.
mod generic;

pub use generic::{Address, BTreeMap, Balance, Item, Node, WouldUnderflow, M};
