/*!
# Stepper

Produces successive trapezoidal estimates of `∫f` over `[a, b]` at doubling resolution.

The first estimate uses only the end points, `T_0 = (b - a) (f(a) + f(b)) / 2`. Every further
round halves the spacing `h` and only evaluates the new midpoints:

```text
T_k = T_{k-1} / 2 + h * Σ f(new midpoints)
```

Round `k` adds `2^(k-1)` evaluations. Evaluations are distributed over a fixed set of worker
threads that read points from a bounded work queue and publish values on a result queue.
While a round is in progress, the coordinator races "send the next point" against "receive a
result", so neither side can stall the other when the work queue is full.

The stepper is a lazy [`Iterator`]: calling `next` requests the next round, dropping the
stepper closes the work queue and lets the workers exit. Workers live inside a
[`std::thread::Scope`], so they are joined when the scope ends.

## Example

```rust
use mini_quad::stepper::Stepper;

let f = |x: f64| x * x;
let estimates: Vec<f64> = std::thread::scope(|scope| {
    Stepper::spawn(scope, 4, &f, 0.0, 1.0).take(12).collect()
});
assert_eq!(estimates.len(), 12);
assert!((estimates[11] - 1.0 / 3.0).abs() < 1e-6);
```
*/

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, Scope};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::trace;

/// Capacity of the queue of points waiting to be evaluated.
const WORK_CAPACITY: usize = 2;

/// What a worker sends back: the function value, or the payload of a panic raised by it.
type Evaluation = thread::Result<f64>;

/// Lazily refined sequence of trapezoidal estimates, evaluated by a pool of workers.
pub struct Stepper {
    work: Sender<f64>,
    results: Receiver<Evaluation>,
    a: f64,
    b: f64,
    h: f64,
    integral: f64,
    /// New midpoints in the next round; zero until the end points have been evaluated.
    n: usize,
    evaluations: usize,
}

impl Stepper {
    /// Spawns `workers` (at least one) evaluation threads inside `scope` and returns the
    /// stepper that coordinates them.
    ///
    /// The function is borrowed for the lifetime of the scope. With more than one worker it
    /// is called concurrently.
    pub fn spawn<'scope, 'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        workers: usize,
        function: &'env F,
        a: f64,
        b: f64,
    ) -> Self
    where
        F: Fn(f64) -> f64 + Sync + ?Sized,
    {
        let workers = workers.max(1);
        let (work, jobs) = bounded::<f64>(WORK_CAPACITY);
        let (report, results) = bounded::<Evaluation>(workers);

        for _ in 0..workers {
            let jobs = jobs.clone();
            let report = report.clone();
            scope.spawn(move || {
                for x in jobs.iter() {
                    let value = panic::catch_unwind(AssertUnwindSafe(|| function(x)));
                    let failed = value.is_err();
                    if report.send(value).is_err() || failed {
                        break;
                    }
                }
            });
        }

        Self {
            work,
            results,
            a,
            b,
            h: b - a,
            integral: 0.0,
            n: 0,
            evaluations: 0,
        }
    }

    /// Number of function evaluations consumed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluates `count` points `first + i * spacing` on the workers and returns their sum.
    ///
    /// Returns `None` if the workers are gone. A panic raised by the function is resumed here.
    fn gather(&mut self, first: f64, spacing: f64, count: usize) -> Option<f64> {
        let (mut sent, mut received) = (0, 0);
        let mut sum = 0.0;
        while received < count {
            // `None` means a point went out, `Some` that a value came back.
            let outcome = if sent < count {
                let x = first + sent as f64 * spacing;
                select! {
                    send(self.work, x) -> res => res.ok().map(|()| None),
                    recv(self.results) -> res => res.ok().map(Some),
                }
            } else {
                self.results.recv().ok().map(Some)
            };
            match outcome? {
                None => sent += 1,
                Some(Ok(y)) => {
                    sum += y;
                    received += 1;
                }
                Some(Err(payload)) => panic::resume_unwind(payload),
            }
        }
        self.evaluations += count;
        Some(sum)
    }
}

impl Iterator for Stepper {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.n == 0 {
            let ends = self.gather(self.a, self.b - self.a, 2)?;
            self.integral = 0.5 * self.h * ends;
            self.n = 1;
        } else {
            let spacing = (self.b - self.a) / self.n as f64;
            let mids = self.gather(self.a + 0.5 * spacing, spacing, self.n)?;
            self.h *= 0.5;
            self.integral = 0.5 * self.integral + self.h * mids;
            self.n *= 2;
        }
        trace!(
            evaluations = self.evaluations,
            estimate = self.integral,
            "trapezoidal round"
        );
        Some(self.integral)
    }
}
