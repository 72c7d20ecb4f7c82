//! Bounded parallel work over file lists.
//!
//! Reading image headers or whole stacks opens one file handle per item, so
//! every helper here runs the items in rayon batches of at most
//! `max_concurrent`. Shape surveys use [`par_fan_in`], which keeps going past
//! unreadable files. Channel preprocessing uses [`try_par_map_limited`],
//! where the first failing file ends the run.

use std::collections::BTreeMap;

use rayon::prelude::*;

/// Splits `items` into the batches that may be in flight together.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
fn batches<T>(items: &[T], max_concurrent: usize) -> std::slice::Chunks<'_, T> {
    assert!(max_concurrent > 0, "max_concurrent must be > 0");
    items.chunks(max_concurrent)
}

/// Maps `f` over `items` with at most `max_concurrent` calls running at once.
///
/// Output order matches input order, so results can be zipped back onto the
/// file list they came from.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: &[T], max_concurrent: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    batches(items, max_concurrent).fold(Vec::with_capacity(items.len()), |mut out, batch| {
        out.par_extend(batch.par_iter().map(&f));
        out
    })
}

/// Fallible [`par_map_limited`] that stops after the first failing batch.
///
/// Batches after the failing one never start, so no further files are read
/// or written. Other items of the failing batch may already have run. The
/// error returned is the first one in input order within that batch.
pub fn try_par_map_limited<T, R, E, F>(
    items: &[T],
    max_concurrent: usize,
    f: F,
) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    let mut out = Vec::with_capacity(items.len());
    for batch in batches(items, max_concurrent) {
        let done: Vec<Result<R, E>> = batch.par_iter().map(&f).collect();
        for outcome in done {
            out.push(outcome?);
        }
    }
    Ok(out)
}

/// Results of [`par_fan_in`], keyed by item identity.
#[derive(Debug)]
pub struct FanIn<K, R, E> {
    pub succeeded: BTreeMap<K, R>,
    pub failed: BTreeMap<K, E>,
}

impl<K, R, E> Default for FanIn<K, R, E> {
    fn default() -> Self {
        Self {
            succeeded: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

/// Runs a fallible `f` over every item and collects the outcomes by key.
///
/// Unlike [`try_par_map_limited`], a failing item never stops the batch:
/// its error is recorded under its key and the remaining items still run.
/// Duplicate keys keep the outcome of the last item with that key.
pub fn par_fan_in<T, K, R, E, KF, F>(
    items: &[T],
    max_concurrent: usize,
    key: KF,
    f: F,
) -> FanIn<K, R, E>
where
    T: Sync,
    K: Ord + Send,
    R: Send,
    E: Send,
    KF: Fn(&T) -> K + Sync,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    let outcomes = par_map_limited(items, max_concurrent, |item| (key(item), f(item)));

    let mut fan_in = FanIn::default();
    for (k, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                fan_in.succeeded.insert(k, value);
            }
            Err(err) => {
                fan_in.failed.insert(k, err);
            }
        }
    }
    fan_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_par_map_limited_preserves_order() {
        let items: Vec<i32> = (0..100).collect();
        let result = par_map_limited(&items, 4, |&x| x * 2);
        let expected: Vec<i32> = (0..100).map(|x| x * 2).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_par_map_limited_empty() {
        let items: Vec<i32> = vec![];
        let result = par_map_limited(&items, 3, |&x| x);
        assert!(result.is_empty());
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_par_map_limited_zero_panics() {
        par_map_limited(&[1, 2, 3], 0, |&x| x);
    }

    #[test]
    fn test_par_map_limited_concurrency_cap() {
        let items: Vec<i32> = (0..20).collect();
        let in_flight = AtomicUsize::new(0);
        let max_observed = AtomicUsize::new(0);

        par_map_limited(&items, 3, |&x| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_observed.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            x
        });

        let max = max_observed.load(Ordering::SeqCst);
        assert!(max <= 3, "max in-flight was {max}, expected <= 3");
    }

    #[test]
    fn test_try_par_map_limited_err() {
        let items: Vec<i32> = (0..10).collect();
        let result: Result<Vec<i32>, String> = try_par_map_limited(&items, 3, |&x| {
            if x == 5 {
                Err("bad".to_string())
            } else {
                Ok(x)
            }
        });
        assert_eq!(result, Err("bad".to_string()));
    }

    #[test]
    fn test_try_par_map_limited_skips_later_batches() {
        let items: Vec<i32> = (0..12).collect();
        let calls = AtomicUsize::new(0);
        let result: Result<Vec<i32>, i32> = try_par_map_limited(&items, 4, |&x| {
            calls.fetch_add(1, Ordering::SeqCst);
            if x == 2 || x == 3 {
                Err(x)
            } else {
                Ok(x)
            }
        });
        assert_eq!(result, Err(2));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_try_par_map_limited_keeps_order() {
        let items = ["a.tif", "bb.tif", "ccc.tif"];
        let lengths: Result<Vec<usize>, ()> = try_par_map_limited(&items, 2, |s| Ok(s.len()));
        assert_eq!(lengths, Ok(vec![5, 6, 7]));
    }

    #[test]
    fn test_par_fan_in_isolates_failures() {
        let items: Vec<u32> = (0..12).collect();
        let fan_in: FanIn<u32, u32, String> = par_fan_in(
            &items,
            4,
            |&x| x,
            |&x| {
                if x % 5 == 0 {
                    Err(format!("item {x} failed"))
                } else {
                    Ok(x * 10)
                }
            },
        );

        assert_eq!(fan_in.failed.len(), 3);
        assert_eq!(fan_in.succeeded.len(), 9);
        assert_eq!(fan_in.succeeded[&7], 70);
        assert_eq!(fan_in.failed[&10], "item 10 failed");
    }

    #[test]
    fn test_par_fan_in_all_ok() {
        let items = ["a", "bb", "ccc"];
        let fan_in: FanIn<String, usize, ()> =
            par_fan_in(&items, 2, |s| s.to_string(), |s| Ok(s.len()));
        assert!(fan_in.failed.is_empty());
        assert_eq!(fan_in.succeeded["ccc"], 3);
    }
}
