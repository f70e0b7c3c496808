// 🧵 Fetch Pool - bounded worker threads feeding one aggregation consumer
//
// Workers pull (index, key) jobs and push outcomes back on a channel. The
// consumer re-sequences by index, so `on_outcome` sees outcomes in exactly
// the order of `keys` whatever the worker count.

use crate::deduplication::AddressChainKey;
use crate::explorer::{FetchResult, SummarySource};
use crossbeam::channel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::thread;
use tracing::debug;

/// One fetched pair, ready to fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub key: AddressChainKey,
    pub result: FetchResult,
}

/// Fetch every key through `source` using `workers` threads and hand each
/// outcome to `on_outcome` in input order.
pub fn fetch_all<F>(
    keys: &[AddressChainKey],
    source: &dyn SummarySource,
    workers: usize,
    mut on_outcome: F,
) where
    F: FnMut(FetchOutcome),
{
    let workers = workers.clamp(1, keys.len().max(1));

    let (job_tx, job_rx) = channel::bounded::<(usize, &AddressChainKey)>(workers * 2);
    let (done_tx, done_rx) = channel::unbounded::<(usize, FetchOutcome)>();

    thread::scope(|scope| {
        for worker_id in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for (index, key) in job_rx.iter() {
                    debug!(worker = worker_id, pair = %key, "fetching");
                    let result = source.fetch_summary(key);
                    let outcome = FetchOutcome {
                        key: key.clone(),
                        result,
                    };
                    if done_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(done_tx);
        drop(job_rx);

        scope.spawn(move || {
            for job in keys.iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        let mut pending: BTreeMap<usize, FetchOutcome> = BTreeMap::new();
        let mut next = 0;
        for (index, outcome) in done_rx.iter() {
            pending.insert(index, outcome);
            while let Some(outcome) = pending.remove(&next) {
                on_outcome(outcome);
                next += 1;
            }
        }
    });
}
