// Synchronized test suite.
//
// Invariants exercised:
// - Exclusivity: concurrent guarded updates are never lost.
// - Scoped release: the lock is free again after normal exit, early
//   return, and unwinding.
// - Mapping: a narrowed guard keeps the original lock.
use shardlock::{Access, Synchronized};
use std::collections::VecDeque;
use std::thread;

// Test: two writers appending one character at a time.
// Assumes: every append happens under its own guard.
// Verifies: the final length is exactly the number of appends.
#[test]
fn concurrent_appends_are_not_lost() {
    let common = Synchronized::new(String::new());
    let add_count = 50_000;
    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..add_count {
                    common.access().push('a');
                }
            });
        }
    });
    assert_eq!(common.access().len(), 2 * add_count);
}

// Test: counters updated from many threads.
// Assumes: a guard gives exclusive &mut access.
// Verifies: N threads x M increments == N*M.
#[test]
fn many_threads_increment_exactly() {
    let counter = Synchronized::new(0u64);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..10_000 {
                    *counter.access() += 1;
                }
            });
        }
    });
    assert_eq!(counter.into_inner(), 80_000);
}

// Test: a panicking holder.
// Assumes: the mutex does not poison.
// Verifies: another thread can lock and sees the pre-panic write.
#[test]
fn panic_in_one_thread_releases_lock_for_others() {
    let cell = Synchronized::new(Vec::<u32>::new());
    thread::scope(|s| {
        let res = s
            .spawn(|| {
                let mut v = cell.access();
                v.push(1);
                panic!("worker failed mid-update");
            })
            .join();
        assert!(res.is_err());
        let seen = s.spawn(|| cell.access().clone()).join().unwrap();
        assert_eq!(seen, vec![1]);
    });
}

// Test: early exit through `?`.
// Assumes: Access is dropped when the function returns.
// Verifies: the lock is free after an error path.
#[test]
fn lock_released_on_error_propagation() {
    fn pop_front_doubled(q: &Synchronized<VecDeque<i32>>) -> Result<i32, &'static str> {
        let mut g = q.access();
        let front = g.pop_front().ok_or("empty")?;
        Ok(front * 2)
    }
    let q = Synchronized::new(VecDeque::from(vec![4]));
    assert_eq!(pop_front_doubled(&q), Ok(8));
    assert_eq!(pop_front_doubled(&q), Err("empty"));
    assert!(q.try_access().is_some());
}

// Test: guard narrowing.
// Assumes: Access::map reuses the cell's lock.
// Verifies: the cell stays locked while the mapped guard lives.
#[test]
fn mapped_access_holds_the_same_lock() {
    let cell = Synchronized::new(vec![String::from("x"), String::from("y")]);
    let mut second = Access::map(cell.access(), |v| &mut v[1]);
    second.push('!');
    thread::scope(|s| {
        assert!(s.spawn(|| cell.try_access().is_none()).join().unwrap());
    });
    drop(second);
    assert_eq!(cell.access()[1], "y!");
}
