//! Pool-wide tunables (§9 redesign flag: no global mutable state). A caller
//! constructs one of these explicitly and threads it through [`crate::spa::Spa`]
//! rather than reaching for a `zfs_*` module-global the way the original
//! sources do; it is `serde`-serializable so it can be persisted/restored
//! the way `zpool get`/`set` would round-trip tunables through an nvlist.
use serde::{Deserialize, Serialize};

use crate::sio::{SIOChecksum, SIOCompress};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaConfig {
    /// Default checksum algorithm for newly written blocks when the
    /// caller asks for `on` rather than a specific algorithm.
    pub default_checksum: SIOChecksum,
    /// Default compression algorithm for `on`.
    pub default_compression: SIOCompress,
    /// Starting write throttle ceiling in bytes (§4.5); adaptively reduced
    /// under memory pressure but never below `write_limit_floor`.
    pub write_limit: u64,
    pub write_limit_floor: u64,
    /// `vdev_queue`'s aggregation window (§4.3).
    pub aggregation_limit: u64,
    pub read_gap_limit: u64,
    pub write_gap_limit: u64,
    /// Async-write throttle curve endpoints (§4.3).
    pub active_min_dirty_percent: u8,
    pub active_max_dirty_percent: u8,
    /// Per-class concurrency caps (§4.3), indexed by [`crate::vdev::queue::Priority`].
    pub min_active: [u32; 5],
    pub max_active: [u32; 5],
    pub vdev_max_active: u32,
    /// Metaslab size in bytes (§3.4); shrunk from the real 2^34 default so
    /// tests can exercise gang/metaslab-exhaustion paths on file-backed
    /// vdevs of a few megabytes.
    pub metaslab_size: u64,
    /// Occupancy ratio past which a metaslab's space map is condensed
    /// (§4.2).
    pub space_map_condense_ratio: f64,
    /// Dedup enabled for newly written blocks in datasets that request it.
    pub dedup_enabled: bool,
    /// Fixed per-block size DMU writes are split at (`zfs recordsize`).
    /// Real ZFS grows the dnode's indirection tree to cover arbitrarily
    /// large objects; this core targets a single level of direct blocks,
    /// so every write past one recordsize's worth of a blkid is a
    /// separate, independently-checksummed block rather than triggering
    /// an indirect-block split.
    pub recordsize: u64,
}

impl Default for SpaConfig {
    fn default() -> Self {
        SpaConfig {
            default_checksum: SIOChecksum::Fletcher4,
            default_compression: SIOCompress::Lz4,
            write_limit: 1 << 20,
            write_limit_floor: 64 << 10,
            aggregation_limit: 1 << 20,
            read_gap_limit: 32 << 10,
            write_gap_limit: 4 << 10,
            active_min_dirty_percent: 10,
            active_max_dirty_percent: 60,
            min_active: [1, 1, 1, 1, 1],
            max_active: [10, 10, 3, 10, 2],
            vdev_max_active: 1000,
            metaslab_size: 1 << 20,
            space_map_condense_ratio: 0.5,
            dedup_enabled: false,
            recordsize: 128 * 1024,
        }
    }
}

impl SpaConfig {
    /// Scale `write_limit` down under memory pressure (§4.8), never below
    /// the configured floor.
    pub fn apply_memory_pressure(&mut self, bytes_in_use: u64) {
        let scaled = (bytes_in_use / 4).max(self.write_limit_floor);
        self.write_limit = self.write_limit.min(scaled).max(self.write_limit_floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pressure_never_drops_below_floor() {
        let mut cfg = SpaConfig::default();
        cfg.apply_memory_pressure(1);
        assert_eq!(cfg.write_limit, cfg.write_limit_floor);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = SpaConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SpaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.write_limit, cfg.write_limit);
    }
}
