//! `zfs_pretty_*` flag-name registry (§8 property 8, §6.4's event metadata
//! formatting): renders a bitflags value as the list of its set flag names
//! and parses that list back, independent of bit order. Used for logging
//! and for [`crate::event`] payloads where a raw `u32` is much less useful
//! to a human than `"RESILVER|RESILVER_DONE"`.
use crate::{SCL, SpaAsync};

/// One (name, bit) pair in a registry, ordered from lowest bit to highest
/// so [`bits_to_str`] always renders names in a stable order.
pub struct FlagName {
    pub name: &'static str,
    pub bit: u32,
}

const SPA_ASYNC_NAMES: &[FlagName] = &[
    FlagName { name: "CONFIG_UPDATE", bit: SpaAsync::CONFIG_UPDATE.bits() },
    FlagName { name: "REMOVE", bit: SpaAsync::REMOVE.bits() },
    FlagName { name: "PROBE", bit: SpaAsync::PROBE.bits() },
    FlagName { name: "RESILVER_DONE", bit: SpaAsync::RESILVER_DONE.bits() },
    FlagName { name: "RESILVER", bit: SpaAsync::RESILVER.bits() },
    FlagName { name: "AUTOEXPAND", bit: SpaAsync::AUTOEXPAND.bits() },
    FlagName { name: "REMOVE_DONE", bit: SpaAsync::REMOVE_DONE.bits() },
    FlagName { name: "REMOVE_STOP", bit: SpaAsync::REMOVE_STOP.bits() },
    FlagName { name: "INITIALIZE_RESTART", bit: SpaAsync::INITIALIZE_RESTART.bits() },
    FlagName { name: "TRIM_RESTART", bit: SpaAsync::TRIM_RESTART.bits() },
    FlagName { name: "AUTOTRIM_RESTART", bit: SpaAsync::AUTOTRIM_RESTART.bits() },
    FlagName { name: "L2CACHE_REBUILD", bit: SpaAsync::L2CACHE_REBUILD.bits() },
    FlagName { name: "L2CACHE_TRIM", bit: SpaAsync::L2CACHE_TRIM.bits() },
    FlagName { name: "BEBUILD_DONE", bit: SpaAsync::BEBUILD_DONE.bits() },
];

const SCL_NAMES: &[FlagName] = &[
    FlagName { name: "CONFIG", bit: SCL::CONFIG.bits() },
    FlagName { name: "STATE", bit: SCL::STATE.bits() },
    FlagName { name: "L2ARC", bit: SCL::L2ARC.bits() },
    FlagName { name: "ALLOC", bit: SCL::ALLOC.bits() },
    FlagName { name: "SIO", bit: SCL::SIO.bits() },
    FlagName { name: "FREE", bit: SCL::FREE.bits() },
    FlagName { name: "VDEV", bit: SCL::VDEV.bits() },
];

/// Render every bit set in `bits` as its registered name, joined with
/// `|`, in registry order. Unrecognized bits are rendered as `0x%x` so
/// the output never silently drops information.
pub fn bits_to_str(bits: u32, registry: &[FlagName]) -> String {
    let mut parts: Vec<String> = registry
        .iter()
        .filter(|f| bits & f.bit == f.bit && f.bit != 0)
        .map(|f| f.name.to_string())
        .collect();
    let known: u32 = registry.iter().map(|f| f.bit).fold(0, |a, b| a | b);
    let unknown = bits & !known;
    if unknown != 0 {
        parts.push(format!("0x{unknown:x}"));
    }
    parts.join("|")
}

/// Parse a `bits_to_str`-shaped string back into a bitmask. Unknown names
/// are ignored (matching the registry's forward-compatible intent: a
/// newer pool's event string naming a flag this build doesn't know about
/// shouldn't fail parsing entirely).
pub fn str_to_bits(s: &str, registry: &[FlagName]) -> u32 {
    s.split('|')
        .filter_map(|part| registry.iter().find(|f| f.name == part).map(|f| f.bit))
        .fold(0, |a, b| a | b)
}

pub fn spa_async_to_str(bits: u32) -> String {
    bits_to_str(bits, SPA_ASYNC_NAMES)
}

pub fn spa_async_from_str(s: &str) -> u32 {
    str_to_bits(s, SPA_ASYNC_NAMES)
}

pub fn scl_to_str(bits: u32) -> String {
    bits_to_str(bits, SCL_NAMES)
}

pub fn scl_from_str(s: &str) -> u32 {
    str_to_bits(s, SCL_NAMES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spa_async_round_trips_a_multi_flag_set() {
        let bits = (SpaAsync::RESILVER | SpaAsync::AUTOEXPAND | SpaAsync::PROBE).bits();
        let s = spa_async_to_str(bits);
        assert_eq!(spa_async_from_str(&s), bits);
    }

    #[test]
    fn scl_round_trips_every_single_flag() {
        for f in SCL_NAMES {
            let s = scl_to_str(f.bit);
            assert_eq!(s, f.name);
            assert_eq!(scl_from_str(&s), f.bit);
        }
    }

    #[test]
    fn unknown_bits_render_as_hex_and_are_dropped_on_reparse() {
        let s = bits_to_str(0x80000000, SCL_NAMES);
        assert_eq!(s, "0x80000000");
        assert_eq!(str_to_bits(&s, SCL_NAMES), 0);
    }

    #[test]
    fn empty_bits_render_as_empty_string() {
        assert_eq!(spa_async_to_str(0), "");
    }
}
