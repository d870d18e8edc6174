pub mod map;
pub mod node;

pub use map::{Address, BTreeMap};
pub use node::{Balance, Item, Node, WouldUnderflow, M};
