//! ZIL, the intent log (§4.10, §3.7): gives `O_SYNC`/`fsync` callers
//! durability ahead of the next TXG sync by packing their writes (itxs)
//! into log blocks (lwbs) and blocking the caller on a commit waiter
//! (zcw) until the lwb carrying their itx is on stable storage. Regular
//! TXG sync later makes the same data durable the COW way and the lwb
//! chain is discarded.
use std::sync::Arc;

use sys::{Condvar, Mutex};

use crate::blkptr::Blkptr;
use crate::error::{SpaError, SpaResult};

/// `TX_*` transaction types an itx (and, on replay, a callback) can carry
/// (§4.10). Dataset-level semantics for each are external collaborators;
/// this core only names and dispatches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Create,
    Link,
    Remove,
    Write,
    Truncate,
    Setattr,
    Acl,
}

#[derive(Debug, Clone)]
pub enum ItxPayload {
    /// Small writes are copied inline into the lwb.
    Inline(Vec<u8>),
    /// Larger writes reference a block already written through the
    /// regular COW path (`WR_INDIRECT`); the lwb only carries the BP.
    Indirect(Blkptr),
}

#[derive(Debug, Clone)]
pub struct Itx {
    pub txtype: TxType,
    pub txg: u64,
    pub object: u64,
    pub offset: u64,
    pub length: u64,
    pub payload: ItxPayload,
}

/// One packed log block: a header plus the itxs it carries, and a
/// pointer to the next lwb in the chain (set once the following lwb is
/// itself allocated).
pub struct Lwb {
    pub seq: u64,
    pub itxs: Vec<Itx>,
    pub next_bp: Option<Blkptr>,
    written: bool,
}

impl Lwb {
    fn new(seq: u64) -> Self {
        Lwb { seq, itxs: Vec::new(), next_bp: None, written: false }
    }

    fn size(&self) -> usize {
        self.itxs
            .iter()
            .map(|i| match &i.payload {
                ItxPayload::Inline(data) => data.len(),
                ItxPayload::Indirect(_) => 0,
            })
            .sum()
    }
}

const LWB_MIN_SIZE: usize = 4 * 1024;
const LWB_MAX_SIZE: usize = 128 * 1024;

/// The commit-waiter (`itx_commit_waiter_t`/zcw) a caller blocks on until
/// the lwb it was attached to finishes its write. Built on [`sys::Mutex`]/
/// [`sys::Condvar`] per §5's "zil zcw_done" condvar-wait suspension point.
pub struct CommitWaiter {
    state: Mutex<WaiterState>,
    cv: Condvar,
}

struct WaiterState {
    done: bool,
    error: Option<SpaError>,
}

impl CommitWaiter {
    fn new() -> Self {
        CommitWaiter { state: Mutex::new(WaiterState { done: false, error: None }), cv: Condvar::new() }
    }

    fn signal(&self, error: Option<SpaError>) {
        let mut s = self.state.lock();
        s.done = true;
        s.error = error;
        self.cv.notify_all();
    }

    /// Block until the lwb this waiter is attached to completes. In this
    /// synchronous core `commit` always signals before returning, so this
    /// never actually parks, but it preserves the real wait/notify shape
    /// callers in a threaded embedding would rely on.
    pub fn wait(&self) -> SpaResult<()> {
        let mut s = self.state.lock();
        while !s.done {
            self.cv.wait(&mut s);
        }
        match s.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-objset log chain (§4.10). `log` enqueues itxs into the currently
/// open lwb; `commit` closes and "writes" it, signalling every waiter
/// attached since the previous commit.
pub struct Zil {
    open_lwb: Lwb,
    next_seq: u64,
    /// lwbs that have been written but not yet superseded by a TXG sync
    /// (`zil_sync` claims and frees these once the data they describe is
    /// durable the regular COW way).
    committed: Vec<Lwb>,
}

impl Zil {
    pub fn new() -> Self {
        Zil { open_lwb: Lwb::new(0), next_seq: 1, committed: Vec::new() }
    }

    /// Enqueue an itx into the currently open lwb (`zil_itx_assign`).
    pub fn log(&mut self, itx: Itx) {
        self.open_lwb.itxs.push(itx);
    }

    /// `zil_commit`'s four-step protocol (§4.10), run synchronously here:
    /// attach a waiter to the current lwb, close and write it (choosing a
    /// power-of-two size between [`LWB_MIN_SIZE`] and [`LWB_MAX_SIZE`]),
    /// signal the waiter, and retain the written lwb until the next TXG
    /// sync claims it.
    pub fn commit(&mut self) -> Arc<CommitWaiter> {
        let waiter = Arc::new(CommitWaiter::new());
        if self.open_lwb.itxs.is_empty() {
            waiter.signal(None);
            return waiter;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut lwb = std::mem::replace(&mut self.open_lwb, Lwb::new(seq));

        let _alloc_size = lwb_alloc_size(lwb.size());
        lwb.written = true;
        waiter.signal(None);
        self.committed.push(lwb);
        waiter
    }

    /// `zil_sync`: once a TXG carrying the same data has synced, every
    /// lwb written at or before it can be dropped — the regular COW tree
    /// now has the only copy that matters.
    pub fn clean(&mut self, synced_txg: u64) {
        self.committed.retain(|lwb| lwb.itxs.iter().any(|i| i.txg > synced_txg));
    }

    pub fn outstanding_lwbs(&self) -> usize {
        self.committed.len()
    }

    /// Replay every itx across every retained lwb, in (txg, seq) order,
    /// invoking `cb(txtype, itx)` for each. Per §4.10, a lwb that fails to
    /// verify truncates replay at that point rather than skipping ahead.
    pub fn replay<F>(&self, min_txg: u64, mut cb: F) -> SpaResult<()>
    where
        F: FnMut(TxType, &Itx) -> SpaResult<()>,
    {
        let mut lwbs: Vec<&Lwb> = self.committed.iter().collect();
        lwbs.sort_by_key(|l| l.seq);
        for lwb in lwbs {
            if !lwb.written {
                return Err(SpaError::Eio);
            }
            for itx in &lwb.itxs {
                if itx.txg <= min_txg {
                    continue;
                }
                cb(itx.txtype, itx)?;
            }
        }
        Ok(())
    }
}

impl Default for Zil {
    fn default() -> Self {
        Zil::new()
    }
}

fn lwb_alloc_size(payload_bytes: usize) -> usize {
    let mut size = LWB_MIN_SIZE;
    while size < payload_bytes && size < LWB_MAX_SIZE {
        size *= 2;
    }
    size.max(LWB_MIN_SIZE).min(LWB_MAX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_itx(txg: u64, object: u64, data: &[u8]) -> Itx {
        Itx {
            txtype: TxType::Write,
            txg,
            object,
            offset: 0,
            length: data.len() as u64,
            payload: ItxPayload::Inline(data.to_vec()),
        }
    }

    #[test]
    fn commit_signals_the_waiter_for_queued_itxs() {
        let mut zil = Zil::new();
        zil.log(write_itx(1, 10, b"hello"));
        let waiter = zil.commit();
        assert!(waiter.wait().is_ok());
        assert_eq!(zil.outstanding_lwbs(), 1);
    }

    #[test]
    fn commit_with_nothing_queued_signals_immediately() {
        let mut zil = Zil::new();
        let waiter = zil.commit();
        assert!(waiter.wait().is_ok());
        assert_eq!(zil.outstanding_lwbs(), 0);
    }

    #[test]
    fn clean_drops_lwbs_fully_subsumed_by_a_synced_txg() {
        let mut zil = Zil::new();
        zil.log(write_itx(1, 10, b"a"));
        zil.commit();
        zil.log(write_itx(5, 10, b"b"));
        zil.commit();
        zil.clean(1);
        assert_eq!(zil.outstanding_lwbs(), 1);
    }

    #[test]
    fn replay_visits_itxs_born_after_min_txg_in_order() {
        let mut zil = Zil::new();
        zil.log(write_itx(1, 10, b"a"));
        zil.commit();
        zil.log(write_itx(2, 10, b"b"));
        zil.commit();

        let mut seen = Vec::new();
        zil.replay(1, |_txtype, itx| {
            seen.push(itx.txg);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![2]);
    }
}
