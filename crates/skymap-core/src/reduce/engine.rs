use std::fmt;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SkymapError};

/// A private partial result that can absorb another of its kind.
///
/// `merge` must be associative and commutative up to floating-point rounding:
/// the engine merges worker partials in block order, but the split into
/// blocks depends on the thread count.
pub trait Accumulator: Send {
    fn merge(&mut self, other: &Self);
}

/// How accumulation work is split across workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Pick per model: planes for per-pixel maps, frames otherwise.
    #[default]
    Auto,
    /// Contiguous blocks of frames, one private accumulator per worker.
    Frames,
    /// One worker per destination plane, writing straight into the master.
    Planes,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Frames => write!(f, "Frames"),
            Self::Planes => write!(f, "Planes"),
        }
    }
}

/// The merged result of a parallel reduction.
#[derive(Debug)]
pub struct Reduced<P> {
    pub merged: P,
    pub contributions: usize,
    pub workers: usize,
}

/// Fork-join executor over a fixed-size thread pool.
pub struct ReductionEngine {
    pool: ThreadPool,
    threads: usize,
}

impl fmt::Debug for ReductionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReductionEngine")
            .field("threads", &self.threads)
            .finish()
    }
}

impl ReductionEngine {
    /// Create an engine with `threads` workers; zero means one per core.
    pub fn new(threads: usize) -> Result<Self> {
        let threads = if threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            threads
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("skymap-worker-{i}"))
            .build()
            .map_err(|e| SkymapError::ThreadPool(e.to_string()))?;

        debug!(threads, "Reduction engine ready");
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` inside the engine's pool so nested rayon calls use it.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Split `items` into at most `threads` contiguous, non-empty blocks.
    pub fn blocks<'a, T>(&self, items: &'a [T]) -> Vec<&'a [T]> {
        if items.is_empty() {
            return Vec::new();
        }
        let block = items.len().div_ceil(self.threads);
        items.chunks(block).collect()
    }

    /// Reduce `items` with one private accumulator per block, merged
    /// sequentially in block order after all workers have joined.
    ///
    /// `work` processes one item and returns how many samples it contributed.
    pub fn reduce<T, P, I, W>(&self, items: &[T], init: I, work: W) -> Reduced<P>
    where
        T: Sync,
        P: Accumulator,
        I: Fn() -> P + Sync,
        W: Fn(&mut P, &T) -> usize + Sync,
    {
        let blocks = self.blocks(items);
        let workers = blocks.len();

        let partials: Vec<(P, usize)> = self.pool.install(|| {
            blocks
                .par_iter()
                .map(|block| {
                    let mut partial = init();
                    let count = block.iter().map(|item| work(&mut partial, item)).sum();
                    (partial, count)
                })
                .collect()
        });

        let mut iter = partials.into_iter();
        let Some((mut merged, mut contributions)) = iter.next() else {
            return Reduced {
                merged: init(),
                contributions: 0,
                workers: 0,
            };
        };
        for (partial, count) in iter {
            merged.merge(&partial);
            contributions += count;
        }

        Reduced {
            merged,
            contributions,
            workers,
        }
    }

    /// Reduce into an existing `master`. A single-threaded engine writes
    /// straight into the master without allocating a partial.
    pub fn reduce_into<T, P, I, W>(&self, master: &mut P, items: &[T], init: I, work: W) -> usize
    where
        T: Sync,
        P: Accumulator,
        I: Fn() -> P + Sync,
        W: Fn(&mut P, &T) -> usize + Sync,
    {
        if self.threads == 1 || items.len() <= 1 {
            return items.iter().map(|item| work(master, item)).sum();
        }
        let reduced = self.reduce(items, init, work);
        master.merge(&reduced.merged);
        reduced.contributions
    }

    /// Apply `op` to every element in parallel; each element has one writer.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(k, item)| op(k, item))
        });
    }
}
