//! Execution spaces for the vector kernels
//!
//! An [`ExecutionSpace`] runs the two kernel shapes the solver needs:
//! a parallel-for writing one output element per index, and a sum
//! reduction over an index range.
//!
//! - [`Serial`]: one thread
//! - [`Threaded`]: rayon pool (requires the `rayon` feature)
//! - [`WorkGroup`]: nd-range style launch with fixed work groups, the
//!   layout accelerator kernels use
//!
//! `Serial` and `Threaded` share the same blocked pairwise reduction tree,
//! so their results are bit-identical. `WorkGroup` is deterministic for a
//! fixed launch shape.

use crate::comm::{Communicator, SingleProcess};
use crate::parallel;
use num_traits::Zero;

#[cfg(feature = "rayon")]
use std::sync::Arc;

/// Number of elements reduced per block before the partials are combined.
pub const REDUCTION_BLOCK: usize = 1024;

/// Below this length a block is summed sequentially.
const PAIRWISE_LEAF: usize = 8;

/// Minimum elements handed to one rayon task by `Threaded::for_each_mut`.
#[cfg(feature = "rayon")]
const PARALLEL_MIN_LEN: usize = 512;

/// Capability interface for data-parallel kernels.
pub trait ExecutionSpace: Send + Sync {
    /// One-line description for diagnostics
    fn describe(&self) -> String;

    /// Call `f(i, &mut out[i])` for every index; returns once all are done.
    fn for_each_mut<T, F>(&self, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send;

    /// Sum `f(i)` over `0..n`.
    fn reduce_sum<S, F>(&self, n: usize, f: F) -> S
    where
        S: Zero + Copy + Send,
        F: Fn(usize) -> S + Sync + Send;
}

/// Pairwise (recursive halving) sum of `f(start..end)`.
fn pairwise_sum<S, F>(start: usize, end: usize, f: &F) -> S
where
    S: Zero + Copy,
    F: Fn(usize) -> S,
{
    let len = end - start;
    if len <= PAIRWISE_LEAF {
        let mut acc = S::zero();
        for i in start..end {
            acc = acc + f(i);
        }
        acc
    } else {
        let mid = start + len / 2;
        pairwise_sum(start, mid, f) + pairwise_sum(mid, end, f)
    }
}

/// Combine partials with a fixed binary tree: neighbors first, then pairs of pairs.
fn tree_combine<S: Zero + Copy>(mut partials: Vec<S>) -> S {
    if partials.is_empty() {
        return S::zero();
    }
    while partials.len() > 1 {
        partials = partials
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => *a + *b,
                [a] => *a,
                _ => S::zero(),
            })
            .collect();
    }
    partials[0]
}

fn block_sum<S, F>(block: usize, n: usize, f: &F) -> S
where
    S: Zero + Copy,
    F: Fn(usize) -> S,
{
    let start = block * REDUCTION_BLOCK;
    let end = (start + REDUCTION_BLOCK).min(n);
    pairwise_sum(start, end, f)
}

/// Single-threaded execution.
#[derive(Clone, Copy, Debug, Default)]
pub struct Serial;

impl ExecutionSpace for Serial {
    fn describe(&self) -> String {
        "serial".to_string()
    }

    fn for_each_mut<T, F>(&self, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        for (i, v) in out.iter_mut().enumerate() {
            f(i, v);
        }
    }

    fn reduce_sum<S, F>(&self, n: usize, f: F) -> S
    where
        S: Zero + Copy + Send,
        F: Fn(usize) -> S + Sync + Send,
    {
        let partials: Vec<S> = (0..n.div_ceil(REDUCTION_BLOCK))
            .map(|b| block_sum(b, n, &f))
            .collect();
        tree_combine(partials)
    }
}

/// Multi-threaded execution on a rayon pool.
///
/// Uses the global pool unless built with [`Threaded::with_threads`].
#[cfg(feature = "rayon")]
#[derive(Clone, Debug, Default)]
pub struct Threaded {
    pool: Option<Arc<rayon::ThreadPool>>,
}

#[cfg(feature = "rayon")]
impl Threaded {
    /// Run on the global rayon pool
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Run on a dedicated pool of `num_threads` workers
    pub fn with_threads(num_threads: usize) -> crate::error::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

#[cfg(feature = "rayon")]
impl ExecutionSpace for Threaded {
    fn describe(&self) -> String {
        let threads = self.install(parallel::current_num_threads);
        format!("threaded ({threads} threads)")
    }

    fn for_each_mut<T, F>(&self, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        self.install(|| parallel::parallel_for_each_indexed_mut(out, PARALLEL_MIN_LEN, f));
    }

    fn reduce_sum<S, F>(&self, n: usize, f: F) -> S
    where
        S: Zero + Copy + Send,
        F: Fn(usize) -> S + Sync + Send,
    {
        let partials = self.install(|| {
            parallel::parallel_map_indexed(n.div_ceil(REDUCTION_BLOCK), |b| block_sum(b, n, &f))
        });
        tree_combine(partials)
    }
}

/// Work-group execution modelled on an accelerator nd-range launch.
///
/// Reductions launch `groups` groups of `items_per_group` items. Each item
/// sums a contiguous run of `ceil(n / (groups * items_per_group))`
/// elements, each group folds its items with a halving tree in local
/// memory, and the group partials are summed in group order on the host.
#[derive(Clone, Copy, Debug)]
pub struct WorkGroup {
    groups: usize,
    items_per_group: usize,
}

impl Default for WorkGroup {
    fn default() -> Self {
        Self::new(64, 256)
    }
}

impl WorkGroup {
    /// `items_per_group` is rounded up to a power of two.
    pub fn new(groups: usize, items_per_group: usize) -> Self {
        Self {
            groups: groups.max(1),
            items_per_group: items_per_group.max(1).next_power_of_two(),
        }
    }

    /// Number of work groups per reduction launch
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Work items per group
    pub fn items_per_group(&self) -> usize {
        self.items_per_group
    }
}

impl ExecutionSpace for WorkGroup {
    fn describe(&self) -> String {
        format!(
            "work-group ({} groups x {} items, parallel={})",
            self.groups,
            self.items_per_group,
            parallel::is_parallel_available()
        )
    }

    fn for_each_mut<T, F>(&self, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        let ipg = self.items_per_group;
        parallel::parallel_chunks_mut(out, ipg, |group, chunk| {
            for (local_id, v) in chunk.iter_mut().enumerate() {
                f(group * ipg + local_id, v);
            }
        });
    }

    fn reduce_sum<S, F>(&self, n: usize, f: F) -> S
    where
        S: Zero + Copy + Send,
        F: Fn(usize) -> S + Sync + Send,
    {
        if n == 0 {
            return S::zero();
        }
        let ipg = self.items_per_group;
        let elements_per_item = n.div_ceil(self.groups * ipg);

        let partials = parallel::parallel_map_indexed(self.groups, |group| {
            let mut local: Vec<S> = (0..ipg)
                .map(|local_id| {
                    let first = (group * ipg + local_id) * elements_per_item;
                    let last = (first + elements_per_item).min(n);
                    let mut acc = S::zero();
                    for i in first..last {
                        acc = acc + f(i);
                    }
                    acc
                })
                .collect();
            let mut stride = ipg / 2;
            while stride > 0 {
                for local_id in 0..stride {
                    local[local_id] = local[local_id] + local[local_id + stride];
                }
                stride /= 2;
            }
            local[0]
        });

        partials.into_iter().fold(S::zero(), |acc, p| acc + p)
    }
}

/// Execution space and communicator used by one partition of a solve.
#[derive(Clone, Debug, Default)]
pub struct ExecContext<E: ExecutionSpace, C: Communicator> {
    /// Kernel execution space
    pub space: E,
    /// Cross-partition communicator
    pub comm: C,
}

impl<E: ExecutionSpace, C: Communicator> ExecContext<E, C> {
    /// Bundle a space and a communicator
    pub fn new(space: E, comm: C) -> Self {
        Self { space, comm }
    }

    /// Whether this partition prints progress output
    pub fn is_root(&self) -> bool {
        self.comm.rank() == 0
    }
}

impl ExecContext<Serial, SingleProcess> {
    /// Single-threaded, single-partition context
    pub fn serial() -> Self {
        Self::new(Serial, SingleProcess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 7919) % 1000) as f64 / 997.0 - 0.4).collect()
    }

    #[test]
    fn test_tree_combine_shape() {
        assert_eq!(tree_combine::<f64>(vec![]), 0.0);
        assert_eq!(tree_combine(vec![1.0, 2.0, 3.0]), 6.0);
        assert_eq!(tree_combine(vec![1, 2, 3, 4, 5]), 15);
    }

    #[test]
    fn test_serial_reduce_matches_naive() {
        let data = values(5000);
        let got = Serial.reduce_sum(data.len(), |i| data[i]);
        let naive: f64 = data.iter().sum();
        assert_relative_eq!(got, naive, epsilon = 1e-9);
    }

    #[test]
    fn test_reduce_empty_range() {
        assert_eq!(Serial.reduce_sum(0, |_| 1.0_f64), 0.0);
        assert_eq!(WorkGroup::default().reduce_sum(0, |_| 1.0_f64), 0.0);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_threaded_bit_identical_to_serial() {
        let data = values(10_007);
        let serial = Serial.reduce_sum(data.len(), |i| data[i] * data[i]);
        let threaded = Threaded::new().reduce_sum(data.len(), |i| data[i] * data[i]);
        assert_eq!(serial.to_bits(), threaded.to_bits());

        let pooled = Threaded::with_threads(3).unwrap();
        let again = pooled.reduce_sum(data.len(), |i| data[i] * data[i]);
        assert_eq!(serial.to_bits(), again.to_bits());
    }

    #[test]
    fn test_work_group_reduce() {
        let data = values(3001);
        let space = WorkGroup::new(4, 6);
        assert_eq!(space.items_per_group(), 8);
        let got = space.reduce_sum(data.len(), |i| data[i]);
        let naive: f64 = data.iter().sum();
        assert_relative_eq!(got, naive, epsilon = 1e-9);
        let twice = space.reduce_sum(data.len(), |i| data[i]);
        assert_eq!(got.to_bits(), twice.to_bits());
    }

    #[test]
    fn test_work_group_fewer_elements_than_items() {
        let space = WorkGroup::new(64, 256);
        let got = space.reduce_sum(10, |i| i as f64);
        assert_relative_eq!(got, 45.0);
    }

    #[test]
    fn test_for_each_mut_all_spaces() {
        let mut a = vec![0usize; 777];
        Serial.for_each_mut(&mut a, |i, v| *v = i + 1);
        let mut b = vec![0usize; 777];
        WorkGroup::new(2, 64).for_each_mut(&mut b, |i, v| *v = i + 1);
        assert_eq!(a, b);
        #[cfg(feature = "rayon")]
        {
            let mut c = vec![0usize; 777];
            Threaded::new().for_each_mut(&mut c, |i, v| *v = i + 1);
            assert_eq!(a, c);
        }
    }

    #[test]
    fn test_serial_context_is_root() {
        assert!(ExecContext::serial().is_root());
    }
}
