//! A name-value pair list (`nvlist_t`), the generic structured-data
//! container used throughout the pool for on-disk config blobs (vdev
//! labels), ioctl argument/result passing, and draid config validation.
//!
//! Unlike the teacher's placeholder (a bare struct mirroring `nvlist_t`'s
//! header fields with name/value access done via raw pointer arithmetic
//! over an assumed packed encoding — unsound once there is no actual
//! packed buffer behind it), this is a safe ordered map from name to
//! [`NvValue`]. Ordering is preserved on insert, matching `nvlist_add_*`
//! appending to the pair list rather than resorting it.

use crate::nvpair::{DataType, NvValue, Nvpair};
use bitflags::bitflags;

bitflags! {
    /// nvlist pack encoding
    pub struct NvEncode: u8 {
        const NATIVE = 0;
        const XDR = 1;
    }
}

bitflags! {
    /// nvlist persistent unique name flags, stored in nvl_nvflags
    pub struct NvUnique: u8 {
        const NAME = 0x1;
        const NAME_TYPE = 0x2;
    }
}

/// nvlist lookup pairs related flags
pub const NV_FLAG_NOENTOK: u8 = 0x1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NvList {
    unique: Option<NvUniqueMode>,
    pairs: Vec<Nvpair>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NvUniqueMode {
    Name,
    NameType,
}

impl NvList {
    pub fn new() -> Self {
        NvList { unique: None, pairs: Vec::new() }
    }

    /// Enforce `NV_UNIQUE_NAME` semantics: a later `add` of an existing
    /// name replaces the prior pair instead of appending a duplicate.
    pub fn new_unique_names() -> Self {
        NvList { unique: Some(NvUniqueMode::Name), pairs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn insert(&mut self, name: impl Into<String>, value: NvValue) {
        let name = name.into();
        if self.unique.is_some() {
            if let Some(existing) = self.pairs.iter_mut().find(|p| p.name == name) {
                existing.value = value;
                return;
            }
        }
        self.pairs.push(Nvpair::new(name, value));
    }

    pub fn add_boolean(&mut self, name: impl Into<String>) {
        self.insert(name, NvValue::Boolean);
    }

    pub fn add_boolean_value(&mut self, name: impl Into<String>, v: bool) {
        self.insert(name, NvValue::BooleanValue(v));
    }

    pub fn add_byte(&mut self, name: impl Into<String>, v: u8) {
        self.insert(name, NvValue::Byte(v));
    }

    pub fn add_uint32(&mut self, name: impl Into<String>, v: u32) {
        self.insert(name, NvValue::Uint32(v));
    }

    pub fn add_uint64(&mut self, name: impl Into<String>, v: u64) {
        self.insert(name, NvValue::Uint64(v));
    }

    pub fn add_string(&mut self, name: impl Into<String>, v: impl Into<String>) {
        self.insert(name, NvValue::String(v.into()));
    }

    pub fn add_byte_array(&mut self, name: impl Into<String>, v: impl Into<Vec<u8>>) {
        self.insert(name, NvValue::ByteArray(v.into()));
    }

    pub fn add_uint64_array(&mut self, name: impl Into<String>, v: impl Into<Vec<u64>>) {
        self.insert(name, NvValue::Uint64Array(v.into()));
    }

    pub fn add_string_array(&mut self, name: impl Into<String>, v: Vec<String>) {
        self.insert(name, NvValue::StringArray(v));
    }

    pub fn add_nvlist(&mut self, name: impl Into<String>, v: NvList) {
        self.insert(name, NvValue::NvList(v));
    }

    pub fn add_nvlist_array(&mut self, name: impl Into<String>, v: Vec<NvList>) {
        self.insert(name, NvValue::NvListArray(v));
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.pairs.len();
        self.pairs.retain(|p| p.name != name);
        self.pairs.len() != before
    }

    pub fn exists(&self, name: &str) -> bool {
        self.pairs.iter().any(|p| p.name == name)
    }

    pub fn lookup(&self, name: &str) -> Option<&NvValue> {
        self.pairs.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn lookup_uint64(&self, name: &str) -> Option<u64> {
        self.lookup(name).and_then(NvValue::as_u64)
    }

    pub fn lookup_boolean_value(&self, name: &str) -> Option<bool> {
        self.lookup(name).and_then(NvValue::as_bool)
    }

    pub fn lookup_string(&self, name: &str) -> Option<&str> {
        self.lookup(name).and_then(NvValue::as_str)
    }

    pub fn lookup_uint64_array(&self, name: &str) -> Option<&[u64]> {
        self.lookup(name).and_then(NvValue::as_u64_array)
    }

    pub fn lookup_nvlist(&self, name: &str) -> Option<&NvList> {
        self.lookup(name).and_then(NvValue::as_nvlist)
    }

    /// `nvlist_next_nvpair`: iterate pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Nvpair> {
        self.pairs.iter()
    }

    pub fn data_type_of(&self, name: &str) -> Option<DataType> {
        self.lookup(name).map(NvValue::data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_roundtrips_values() {
        let mut nvl = NvList::new();
        nvl.add_uint64("children", 8);
        nvl.add_uint64_array("perm", vec![0, 1, 2, 3, 4, 5, 6, 7]);
        nvl.add_string("name", "tank");
        assert_eq!(nvl.lookup_uint64("children"), Some(8));
        assert_eq!(nvl.lookup_uint64_array("perm").unwrap().len(), 8);
        assert_eq!(nvl.lookup_string("name"), Some("tank"));
        assert_eq!(nvl.lookup_uint64("missing"), None);
    }

    #[test]
    fn unique_name_replaces_rather_than_duplicates() {
        let mut nvl = NvList::new_unique_names();
        nvl.add_uint64("txg", 1);
        nvl.add_uint64("txg", 2);
        assert_eq!(nvl.len(), 1);
        assert_eq!(nvl.lookup_uint64("txg"), Some(2));
    }

    #[test]
    fn nested_nvlist() {
        let mut inner = NvList::new();
        inner.add_string("type", "mirror");
        let mut outer = NvList::new();
        outer.add_nvlist("vdev_tree", inner);
        assert_eq!(
            outer.lookup_nvlist("vdev_tree").unwrap().lookup_string("type"),
            Some("mirror")
        );
    }
}
