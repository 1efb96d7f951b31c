//! In-process message-passing transport
//!
//! Realizes the spec's "participant" abstraction without requiring a system
//! MPI installation: each participant is either the current thread
//! (participant count 1, transport-free) or one of a pool of worker threads
//! wired together with [`crossbeam_channel`]s. The wire contract (explicit
//! send/recv, a blocking wait, a rank-ordered reduction) matches the halo
//! exchange and DOT protocols described in the spec; only the fabric
//! underneath is local.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Setup-phase: negotiating neighbor bucket sizes.
pub const PHASE_HALO_SIZE: u8 = 1;
/// Setup-phase: a participant tells a neighbor which global ids it wants.
/// The owner translates them to local row indices in the same order and
/// keeps the result — no reply is needed, since message order already
/// gives both sides the same correspondence (see `halo` module docs).
pub const PHASE_HALO_WANT_IDS: u8 = 2;
/// Runtime: halo values of a distributed vector.
pub const PHASE_HALO_VALUES: u8 = 4;
/// Runtime: a DOT product's global reduction.
pub const PHASE_REDUCE: u8 = 5;

/// Pack a (phase, level) pair into a single correlation tag. Reused safely
/// across iterations because message delivery for a given (sender, tag)
/// pair is FIFO — see module docs.
pub fn compose_tag(phase: u8, level: u8) -> u32 {
    (phase as u32) | ((level as u32) << 8)
}

/// Message-passing operations needed by halo exchange and global reductions.
///
/// A no-op/degenerate implementation is expected for `size() == 1`; callers
/// are expected to skip calling it entirely in that case rather than rely
/// on a working single-participant transport (matching the spec's "no-op in
/// single-participant configurations").
pub trait Transport: Send + Sync {
    /// This participant's rank.
    fn rank(&self) -> usize;
    /// Total number of participants.
    fn size(&self) -> usize;
    /// Buffer `data` for delivery to `to` under `tag`. Non-blocking: the
    /// local transport simply appends to the receiver's inbox.
    fn send(&self, to: usize, tag: u32, data: &[f64]);
    /// Block until a message from `from` under `tag` is available, then
    /// copy it into `buf` (which must be exactly the sent length).
    fn recv_into(&self, from: usize, tag: u32, buf: &mut [f64]);
    /// Sum `value` across all participants, synchronizing everyone before
    /// returning. Deterministic in participant rank order.
    fn all_reduce_sum(&self, value: f64) -> f64;
}

struct Msg {
    from: usize,
    tag: u32,
    data: Vec<f64>,
}

/// Thread-backed [`Transport`]. One instance is handed to each worker
/// thread; instances for the same run share a set of channels wired at
/// construction time by [`spawn_participants`].
pub struct LocalTransport {
    rank: usize,
    size: usize,
    senders: Vec<Sender<Msg>>,
    receiver: Receiver<Msg>,
    pending: Mutex<HashMap<(usize, u32), VecDeque<Vec<f64>>>>,
}

impl LocalTransport {
    fn fill_from_pending(&self, from: usize, tag: u32, buf: &mut [f64]) -> bool {
        if let Some(q) = self.pending.lock().unwrap().get_mut(&(from, tag)) {
            if let Some(data) = q.pop_front() {
                assert_eq!(data.len(), buf.len(), "halo message length mismatch");
                buf.copy_from_slice(&data);
                return true;
            }
        }
        false
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, to: usize, tag: u32, data: &[f64]) {
        self.senders[to]
            .send(Msg {
                from: self.rank,
                tag,
                data: data.to_vec(),
            })
            .expect("participant channel closed");
    }

    fn recv_into(&self, from: usize, tag: u32, buf: &mut [f64]) {
        if self.fill_from_pending(from, tag, buf) {
            return;
        }
        loop {
            let msg = self
                .receiver
                .recv()
                .expect("participant channel closed while waiting for a message");
            if msg.from == from && msg.tag == tag {
                assert_eq!(msg.data.len(), buf.len(), "halo message length mismatch");
                buf.copy_from_slice(&msg.data);
                return;
            }
            self.pending
                .lock()
                .unwrap()
                .entry((msg.from, msg.tag))
                .or_default()
                .push_back(msg.data);
        }
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        let tag = compose_tag(PHASE_REDUCE, 0xff);
        if self.rank == 0 {
            let mut sum = value;
            for r in 1..self.size {
                let mut buf = [0.0f64; 1];
                self.recv_into(r, tag, &mut buf);
                sum += buf[0];
            }
            for r in 1..self.size {
                self.send(r, tag, &[sum]);
            }
            sum
        } else {
            self.send(0, tag, &[value]);
            let mut buf = [0.0f64; 1];
            self.recv_into(0, tag, &mut buf);
            buf[0]
        }
    }
}

/// Build one [`LocalTransport`] per participant, fully connected.
pub fn make_local_transports(size: usize) -> Vec<Arc<LocalTransport>> {
    let (senders, receivers): (Vec<Sender<Msg>>, Vec<Receiver<Msg>>) =
        (0..size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, receiver)| {
            Arc::new(LocalTransport {
                rank,
                size,
                senders: senders.clone(),
                receiver,
                pending: Mutex::new(HashMap::new()),
            })
        })
        .collect()
}

/// Run `body` once per participant, on its own thread for `size > 1`
/// (participant 0 runs on the calling thread when `size == 1`), collecting
/// results in rank order.
pub fn run_participants<T, F>(size: usize, body: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(Arc<LocalTransport>) -> T + Send + Sync + 'static,
{
    let transports = make_local_transports(size);
    if size == 1 {
        return vec![body(transports.into_iter().next().unwrap())];
    }
    let body = Arc::new(body);
    let handles: Vec<_> = transports
        .into_iter()
        .map(|t| {
            let body = Arc::clone(&body);
            std::thread::spawn(move || body(t))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("participant thread panicked"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_point_roundtrip() {
        let transports = make_local_transports(2);
        let t0 = Arc::clone(&transports[0]);
        let t1 = Arc::clone(&transports[1]);
        let h = std::thread::spawn(move || {
            t1.send(0, compose_tag(PHASE_HALO_VALUES, 0), &[1.0, 2.0, 3.0]);
        });
        let mut buf = [0.0; 3];
        t0.recv_into(1, compose_tag(PHASE_HALO_VALUES, 0), &mut buf);
        h.join().unwrap();
        assert_eq!(buf, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn out_of_order_tags_are_buffered() {
        let transports = make_local_transports(2);
        let t0 = Arc::clone(&transports[0]);
        let t1 = Arc::clone(&transports[1]);
        let h = std::thread::spawn(move || {
            t1.send(0, compose_tag(PHASE_HALO_VALUES, 1), &[9.0]);
            t1.send(0, compose_tag(PHASE_HALO_VALUES, 0), &[1.0]);
        });
        h.join().unwrap();
        let mut a = [0.0; 1];
        let mut b = [0.0; 1];
        // Ask for level 0 first even though it was sent second.
        t0.recv_into(1, compose_tag(PHASE_HALO_VALUES, 0), &mut a);
        t0.recv_into(1, compose_tag(PHASE_HALO_VALUES, 1), &mut b);
        assert_eq!(a, [1.0]);
        assert_eq!(b, [9.0]);
    }

    #[test]
    fn all_reduce_sums_all_participants() {
        let results = run_participants(4, |t| t.all_reduce_sum((t.rank() + 1) as f64));
        for r in results {
            assert_eq!(r, 10.0);
        }
    }

    #[test]
    fn fifo_delivery_keeps_repeated_tags_in_order() {
        let transports = make_local_transports(2);
        let t0 = Arc::clone(&transports[0]);
        let t1 = Arc::clone(&transports[1]);
        let tag = compose_tag(PHASE_HALO_VALUES, 2);
        let h = std::thread::spawn(move || {
            for i in 0..5 {
                t1.send(0, tag, &[i as f64]);
            }
        });
        h.join().unwrap();
        for i in 0..5 {
            let mut buf = [0.0; 1];
            t0.recv_into(1, tag, &mut buf);
            assert_eq!(buf[0], i as f64);
        }
    }
}
