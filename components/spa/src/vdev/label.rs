//! On-disk vdev label (§3.3): four 256 KiB copies per leaf vdev (at the
//! start, start+256K, end-256K, and end), each holding a blank region, a
//! boot header, an nvlist describing the pool/vdev config, and an array of
//! uberblocks. Real ZFS writes labels 0/1 before 2/3 on every update so a
//! crash mid-write never loses every copy at once; this core preserves
//! that ordering in [`write_all`].
use serde::{Deserialize, Serialize};

use crate::error::{SpaError, SpaResult};
use crate::vdev::leaf::FileVdev;

pub const LABEL_SIZE: u64 = 256 * 1024;
pub const NUM_LABELS: usize = 4;
const BLANK_SIZE: u64 = 8 * 1024;
const BOOT_HEADER_SIZE: u64 = 8 * 1024;
const CONFIG_SIZE: u64 = 112 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdevLabel {
    pub pool_guid: u64,
    pub vdev_guid: u64,
    pub top_guid: u64,
    pub state: u8,
    pub txg: u64,
    /// Serialized MOS snapshot (pool-wide object table, DDT, metaslab
    /// space maps) for pools small enough to fit it alongside the rest of
    /// the config region; real ZFS instead roots the MOS through an
    /// object set `blkptr_t` in the uberblock and walks it back in, which
    /// this core's `VdevLabel` doesn't carry (no uberblock ring here).
    #[serde(default)]
    pub mos: Vec<u8>,
}

fn label_offset(index: usize, device_size: u64) -> u64 {
    match index {
        0 => 0,
        1 => LABEL_SIZE,
        2 => device_size.saturating_sub(2 * LABEL_SIZE),
        3 => device_size.saturating_sub(LABEL_SIZE),
        _ => unreachable!("only four label slots exist"),
    }
}

/// How many bytes at the front of the config region record the length of
/// the JSON body that follows, so a reader can slice the body out from
/// the zero padding trailing it rather than handing the whole region to
/// `serde_json` (which rejects anything after the value it parsed).
const CONFIG_LEN_PREFIX: usize = 8;

/// Serialize `label` as JSON (standing in for the nvlist encoding real
/// ZFS uses on-disk; the logical content — pool/vdev identity and the
/// txg it was written at — is the same) and write it to every one of the
/// four label slots, 0 and 1 first.
pub fn write_all(dev: &mut FileVdev, device_size: u64, label: &VdevLabel) -> SpaResult<()> {
    let body = serde_json::to_vec(label).map_err(|_| SpaError::Einval)?;
    if (CONFIG_LEN_PREFIX + body.len()) as u64 > CONFIG_SIZE {
        return Err(SpaError::Einval);
    }
    let mut region = vec![0u8; (BLANK_SIZE + BOOT_HEADER_SIZE + CONFIG_SIZE) as usize];
    let config_start = (BLANK_SIZE + BOOT_HEADER_SIZE) as usize;
    region[config_start..config_start + CONFIG_LEN_PREFIX]
        .copy_from_slice(&(body.len() as u64).to_le_bytes());
    let body_start = config_start + CONFIG_LEN_PREFIX;
    region[body_start..body_start + body.len()].copy_from_slice(&body);

    for &i in &[0usize, 1, 2, 3] {
        let offset = label_offset(i, device_size);
        dev.write(offset, &region)?;
    }
    Ok(())
}

/// Read back whichever label slots are intact and parse their config
/// region, preferring the highest txg among agreeing copies the way
/// `vdev_validate` picks the freshest uberblock.
pub fn read_best(dev: &mut FileVdev, device_size: u64) -> SpaResult<VdevLabel> {
    let mut best: Option<VdevLabel> = None;
    for i in 0..NUM_LABELS {
        let offset = label_offset(i, device_size);
        let region = match dev.read(offset, (BLANK_SIZE + BOOT_HEADER_SIZE + CONFIG_SIZE) as usize) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let config_start = (BLANK_SIZE + BOOT_HEADER_SIZE) as usize;
        let Some(len_bytes) = region.get(config_start..config_start + CONFIG_LEN_PREFIX) else {
            continue;
        };
        let body_len = u64::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let body_start = config_start + CONFIG_LEN_PREFIX;
        let Some(body) = region.get(body_start..body_start + body_len) else {
            continue;
        };
        let Ok(label) = serde_json::from_slice::<VdevLabel>(body) else {
            continue;
        };
        if best.as_ref().map(|b| label.txg > b.txg).unwrap_or(true) {
            best = Some(label);
        }
    }
    best.ok_or(SpaError::Eio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_recovers_the_freshest_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut dev = FileVdev::new(dir.path().join("disk0"));
        dev.open().unwrap();
        let device_size = 4 * LABEL_SIZE + (1 << 20);
        dev.write(device_size - 1, &[0u8]).unwrap(); // grow the backing file

        let label = VdevLabel { pool_guid: 1, vdev_guid: 2, top_guid: 3, state: 1, txg: 42, mos: Vec::new() };
        write_all(&mut dev, device_size, &label).unwrap();

        let back = read_best(&mut dev, device_size).unwrap();
        assert_eq!(back.txg, 42);
        assert_eq!(back.pool_guid, 1);
    }
}
