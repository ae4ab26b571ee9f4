//! Fan independent shards (one per source recording) out to worker threads.

use crossbeam_channel::unbounded;
use log::debug;
use std::thread;

/// Worker count when none is configured.
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Run `f` over every shard on up to `workers` scoped threads.
///
/// Shards are pulled from a shared queue, so a slow file does not hold up
/// the others. Results come back in shard order regardless of completion
/// order. A panicking worker propagates the panic to the caller.
pub fn run_sharded<S, R, F>(shards: Vec<S>, workers: usize, f: F) -> Vec<R>
where
    S: Send,
    R: Send,
    F: Fn(S) -> R + Sync,
{
    let n = shards.len();
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, n);
    debug!("Dispatching {} shards to {} workers", n, workers);

    let (job_tx, job_rx) = unbounded::<(usize, S)>();
    let (result_tx, result_rx) = unbounded::<(usize, R)>();
    for job in shards.into_iter().enumerate() {
        if job_tx.send(job).is_err() {
            break;
        }
    }
    drop(job_tx);

    let f = &f;
    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (i, shard) in job_rx.iter() {
                    if result_tx.send((i, f(shard))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<R>> = (0..n).map(|_| None).collect();
    for (i, r) in result_rx.try_iter() {
        slots[i] = Some(r);
    }
    slots.into_iter().flatten().collect()
}
