mod condvar;
mod mutex;
mod semaphore;

pub use condvar::*;
pub use mutex::*;
pub use semaphore::*;

use libc::c_int;

/// pthread calls only fail on misuse, so a non-zero code is a bug.
fn check(code: c_int, op: &str) {
    if code != 0 {
        panic!("Operation {op} failed: Code {code}");
    }
}
