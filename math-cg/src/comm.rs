//! Cross-partition communication
//!
//! A [`Communicator`] provides the collectives a partitioned solve needs:
//! a sum all-reduce for inner products and an all-gather for exchanging
//! external vector entries. Payloads are `f64` buffers; scalars are packed
//! as (real, imaginary) pairs.
//!
//! - [`SingleProcess`]: one partition, every collective is the identity
//! - [`ThreadComm`]: partitions running as threads of one process

use crate::traits::Scalar;
use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Collective operations over a fixed group of partitions.
///
/// Every partition of the group must enter each collective in the same
/// order; a collective returns only after all partitions have joined it.
pub trait Communicator: Send + Sync {
    /// Index of this partition in `0..size()`
    fn rank(&self) -> usize;

    /// Number of partitions in the group
    fn size(&self) -> usize;

    /// Collect every partition's buffer, indexed by rank.
    fn all_gather(&self, local: &[f64]) -> Vec<Vec<f64>>;

    /// Element-wise sum of `values` across partitions, in place.
    ///
    /// Contributions are added in rank order so all partitions obtain
    /// identical bits.
    fn all_reduce_sum(&self, values: &mut [f64]) {
        if self.size() == 1 {
            return;
        }
        let gathered = self.all_gather(values);
        for (i, v) in values.iter_mut().enumerate() {
            *v = gathered
                .iter()
                .map(|buf| buf.get(i).copied().unwrap_or(0.0))
                .fold(0.0, |acc, x| acc + x);
        }
    }

    /// Block until every partition reaches this point.
    fn barrier(&self);
}

/// The communicator of a non-partitioned run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, local: &[f64]) -> Vec<Vec<f64>> {
        vec![local.to_vec()]
    }

    fn barrier(&self) {}
}

/// Panic payload raised in the partitions still inside a collective when
/// another member of their group has left it, by panicking or returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionAborted {
    /// Rank that observed the departure
    pub rank: usize,
}

impl std::fmt::Display for PartitionAborted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "partition {} aborted: a peer left the group", self.rank)
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    departed: usize,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
    slots: Mutex<Vec<Vec<f64>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Generation barrier that gives up once any member has departed.
    fn wait(&self, rank: usize) {
        let mut state = self.state();
        if state.departed > 0 {
            drop(state);
            std::panic::panic_any(PartitionAborted { rank });
        }
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation && state.departed == 0 {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation == generation {
            drop(state);
            std::panic::panic_any(PartitionAborted { rank });
        }
    }

    fn depart(&self) {
        self.state().departed += 1;
        self.released.notify_all();
    }
}

/// Marks its partition as gone when dropped, on return or unwind alike.
struct DepartureGuard(Arc<Shared>);

impl Drop for DepartureGuard {
    fn drop(&mut self) {
        self.0.depart();
    }
}

/// Communicator for partitions that run as threads of one process.
///
/// Built in groups with [`ThreadComm::group`]; each member is moved to the
/// thread that owns the partition. Under [`run_partitioned`], a partition
/// that panics or returns makes every collective still waiting on it panic
/// with [`PartitionAborted`] instead of blocking forever.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create one communicator per partition (at least one).
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Vec<f64>>> {
        self.shared
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_gather(&self, local: &[f64]) -> Vec<Vec<f64>> {
        self.slots()[self.rank] = local.to_vec();
        self.shared.wait(self.rank);
        let gathered = self.slots().clone();
        // slots must not be overwritten by the next collective before all have read
        self.shared.wait(self.rank);
        gathered
    }

    fn barrier(&self) {
        self.shared.wait(self.rank);
    }
}

/// Run `f` once per partition on its own thread and collect the results by rank.
///
/// If any partition panics, the panic is resumed here once every thread
/// has finished. The originating panic is preferred over the
/// [`PartitionAborted`] panics it caused in the other partitions.
pub fn run_partitioned<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ThreadComm) -> R + Sync,
{
    let comms = ThreadComm::group(size);
    let f = &f;
    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                scope.spawn(move || {
                    let _guard = DepartureGuard(Arc::clone(&comm.shared));
                    f(comm)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut results = Vec::with_capacity(outcomes.len());
    let mut first_panic = None;
    for outcome in outcomes {
        match outcome {
            Ok(r) => results.push(r),
            Err(panic) => {
                let secondary = panic.downcast_ref::<PartitionAborted>().is_some();
                let replace = match &first_panic {
                    None => true,
                    Some((was_secondary, _)) => *was_secondary && !secondary,
                };
                if replace {
                    first_panic = Some((secondary, panic));
                }
            }
        }
    }
    if let Some((_, panic)) = first_panic {
        std::panic::resume_unwind(panic);
    }
    results
}

fn real_to_f64<R: ToPrimitive>(r: R) -> f64 {
    r.to_f64().unwrap_or(f64::NAN)
}

fn real_from_f64<R: Float + FromPrimitive>(v: f64) -> R {
    R::from_f64(v).unwrap_or_else(R::nan)
}

/// Flatten scalars into (re, im) pairs.
pub fn pack_scalars<T: Scalar>(values: &[T]) -> Vec<f64> {
    let mut buf = Vec::with_capacity(values.len() * 2);
    for v in values {
        buf.push(real_to_f64(v.re()));
        buf.push(real_to_f64(v.im()));
    }
    buf
}

/// Rebuild a scalar from a packed (re, im) pair.
pub fn unpack_scalar<T: Scalar>(re: f64, im: f64) -> T {
    T::from_re_im(real_from_f64(re), real_from_f64(im))
}

/// Sum a scalar over all partitions.
pub fn global_sum<T: Scalar, C: Communicator>(comm: &C, local: T) -> T {
    if comm.size() == 1 {
        return local;
    }
    let mut buf = pack_scalars(&[local]);
    comm.all_reduce_sum(&mut buf);
    unpack_scalar(buf[0], buf[1])
}

/// Sum a magnitude over all partitions.
pub fn global_sum_real<R, C>(comm: &C, local: R) -> R
where
    R: Float + FromPrimitive + ToPrimitive,
    C: Communicator,
{
    if comm.size() == 1 {
        return local;
    }
    let mut buf = [real_to_f64(local)];
    comm.all_reduce_sum(&mut buf);
    real_from_f64(buf[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_single_process_identity() {
        let comm = SingleProcess;
        let mut v = [1.5, 2.5];
        comm.all_reduce_sum(&mut v);
        assert_eq!(v, [1.5, 2.5]);
        assert_eq!(comm.all_gather(&[3.0]), vec![vec![3.0]]);
        assert_eq!(global_sum(&comm, 4.0_f64), 4.0);
    }

    #[test]
    fn test_thread_all_reduce_identical_on_all_ranks() {
        let results = run_partitioned(4, |comm| {
            let mut v = [comm.rank() as f64 + 0.1, 1.0];
            comm.all_reduce_sum(&mut v);
            v
        });
        assert_eq!(results.len(), 4);
        for r in &results {
            assert_eq!(r[0].to_bits(), results[0][0].to_bits());
            assert_eq!(r[1], 4.0);
        }
    }

    #[test]
    fn test_thread_all_gather_rank_order() {
        let results = run_partitioned(3, |comm| {
            let first = comm.all_gather(&[comm.rank() as f64]);
            let second = comm.all_gather(&[10.0 * comm.rank() as f64, 1.0]);
            (first, second)
        });
        for (first, second) in results {
            assert_eq!(first, vec![vec![0.0], vec![1.0], vec![2.0]]);
            assert_eq!(second[2], vec![20.0, 1.0]);
        }
    }

    #[test]
    fn test_global_sum_complex() {
        let results = run_partitioned(2, |comm| {
            let local = Complex64::new(1.0, comm.rank() as f64);
            global_sum(&comm, local)
        });
        assert_eq!(results, vec![Complex64::new(2.0, 1.0); 2]);
    }

    fn run_with_deadline<F>(f: F) -> std::thread::Result<()>
    where
        F: FnOnce() + Send + std::panic::UnwindSafe + 'static,
    {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(std::panic::catch_unwind(f));
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("partitions still blocked after 5s")
    }

    #[test]
    fn test_panicking_partition_releases_peers() {
        let outcome = run_with_deadline(|| {
            run_partitioned(2, |comm| {
                if comm.rank() == 1 {
                    panic!("rank 1 failed");
                }
                comm.barrier();
            });
        });

        let panic = outcome.unwrap_err();
        assert_eq!(panic.downcast_ref::<&str>(), Some(&"rank 1 failed"));
    }

    #[test]
    fn test_returning_partition_aborts_pending_collective() {
        let outcome = run_with_deadline(|| {
            run_partitioned(3, |comm| {
                if comm.rank() != 2 {
                    comm.all_gather(&[1.0]);
                }
            });
        });

        let panic = outcome.unwrap_err();
        let aborted = panic.downcast_ref::<PartitionAborted>().copied();
        assert!(matches!(aborted, Some(PartitionAborted { rank: 0 | 1 })));
    }

    #[test]
    fn test_barrier_reusable_across_generations() {
        let results = run_partitioned(3, |comm| {
            for _ in 0..50 {
                comm.barrier();
            }
            comm.all_gather(&[comm.rank() as f64]).len()
        });
        assert_eq!(results, vec![3, 3, 3]);
    }

    #[test]
    fn test_group_of_zero_becomes_one() {
        let group = ThreadComm::group(0);
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].size(), 1);
        assert_eq!(global_sum_real(&group[0], 2.0_f32), 2.0);
    }
}
