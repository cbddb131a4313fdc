//! Periodic tasks.
//!
//! A [`TickingTask`] occupies its worker thread for its whole lifetime and
//! repeatedly calls [`TickHandler::tick`] until it is terminated. With a tick
//! interval configured, every loop iteration waits one update interval and
//! the tick fires once the accumulated wait reaches the tick interval. Without
//! one, it ticks back to back and never waits.

use super::{BoxedTask, Task, TerminationFlag};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Numeric interval type usable by [`TickingTask`].
///
/// Integers count milliseconds, floats count seconds.
pub trait TickInterval: Copy + PartialOrd + Default + Send + Sync + std::fmt::Debug + 'static {
    /// `self + other`, saturating where the type can overflow.
    fn accumulate(self, other: Self) -> Self;

    /// Real time this interval stands for.
    fn to_duration(self) -> Duration;
}

impl TickInterval for Duration {
    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn to_duration(self) -> Duration {
        self
    }
}

macro_rules! impl_millis_interval {
    ($($t:ty),* $(,)?) => {
        $(
            impl TickInterval for $t {
                fn accumulate(self, other: Self) -> Self {
                    self.saturating_add(other)
                }

                fn to_duration(self) -> Duration {
                    u64::try_from(self)
                        .map(Duration::from_millis)
                        .unwrap_or(Duration::ZERO)
                }
            }
        )*
    };
}

impl_millis_interval!(u16, u32, u64, usize, i16, i32, i64, isize);

macro_rules! impl_secs_interval {
    ($($t:ty),* $(,)?) => {
        $(
            impl TickInterval for $t {
                fn accumulate(self, other: Self) -> Self {
                    self + other
                }

                fn to_duration(self) -> Duration {
                    Duration::try_from_secs_f64(self as f64).unwrap_or(Duration::ZERO)
                }
            }
        )*
    };
}

impl_secs_interval!(f32, f64);

/// The periodic payload of a [`TickingTask`].
pub trait TickHandler<T: TickInterval>: Send + Sync + 'static {
    /// One tick of work.
    fn tick(&self) -> Result<()>;

    /// Wait primitive used between ticks. Override to fake time in tests.
    fn sleep_for(&self, interval: T) {
        thread::sleep(interval.to_duration());
    }

    /// Forwarded from [`Task::finishing`].
    fn finishing(&self) {}

    /// Forwarded from [`Task::on_exception`].
    fn on_exception(&self, error: Error) -> Result<()> {
        Err(error)
    }
}

/// Adapts a closure into a [`TickHandler`].
pub struct TickFn<F>(pub F);

impl<T, F> TickHandler<T> for TickFn<F>
where
    T: TickInterval,
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn tick(&self) -> Result<()> {
        (self.0)()
    }
}

impl<F> std::fmt::Debug for TickFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TickFn")
    }
}

#[derive(Debug, Clone, Copy)]
struct Schedule<T> {
    update: T,
    tick: T,
    elapsed: T,
}

/// Task that calls its [`TickHandler`] repeatedly until terminated.
pub struct TickingTask<T: TickInterval, H> {
    handler: H,
    flag: TerminationFlag,
    tick_enabled: AtomicBool,
    schedule: Mutex<Schedule<T>>,
}

impl<T, H> TickingTask<T, H>
where
    T: TickInterval,
    H: TickHandler<T>,
{
    /// Ticks back to back, without waiting, until terminated.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            flag: TerminationFlag::new(),
            tick_enabled: AtomicBool::new(false),
            schedule: Mutex::new(Schedule {
                update: T::default(),
                tick: T::default(),
                elapsed: T::default(),
            }),
        }
    }

    /// Waits `update` per iteration and ticks every `tick` of accumulated wait.
    pub fn with_interval(handler: H, update: T, tick: T) -> Self {
        let task = Self::new(handler);
        task.set_interval(update, tick);
        task
    }

    /// Set both intervals and switch tick-interval mode on.
    pub fn set_interval(&self, update: T, tick: T) {
        {
            let mut schedule = self.schedule.lock();
            schedule.update = update;
            schedule.tick = tick;
        }
        self.tick_enabled.store(true, Ordering::SeqCst);
    }

    /// Tick on every loop iteration from now on, skipping the wait entirely.
    pub fn disable_tick_interval(&self) {
        self.tick_enabled.store(false, Ordering::SeqCst);
    }

    /// Whether iterations currently wait between ticks.
    pub fn is_tick_interval_enabled(&self) -> bool {
        self.tick_enabled.load(Ordering::SeqCst)
    }

    /// Current `(update, tick)` intervals.
    pub fn interval(&self) -> (T, T) {
        let schedule = self.schedule.lock();
        (schedule.update, schedule.tick)
    }

    /// Wait time accumulated since the last tick.
    pub fn elapsed(&self) -> T {
        self.schedule.lock().elapsed
    }

    /// The tick handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Box the task for a runner or pool.
    pub fn boxed(self) -> BoxedTask {
        Box::new(self)
    }

    // one iteration of the tick-interval mode
    fn wait_and_maybe_tick(&self) -> Result<()> {
        let update = self.schedule.lock().update;
        self.handler.sleep_for(update);

        if self.flag.is_requested() {
            return Ok(());
        }

        let due = {
            let mut schedule = self.schedule.lock();
            schedule.elapsed = schedule.elapsed.accumulate(update);
            if schedule.elapsed >= schedule.tick {
                schedule.elapsed = T::default();
                true
            } else {
                false
            }
        };

        if due {
            self.handler.tick()?;
        }
        Ok(())
    }
}

impl<T, F> TickingTask<T, TickFn<F>>
where
    T: TickInterval,
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    /// Ticking task calling `f` on every tick.
    pub fn from_fn(f: F) -> Self {
        Self::new(TickFn(f))
    }
}

impl<T, H> Task for TickingTask<T, H>
where
    T: TickInterval,
    H: TickHandler<T>,
{
    fn run(&self) -> Result<()> {
        while !self.flag.is_requested() {
            if self.is_tick_interval_enabled() {
                self.wait_and_maybe_tick()?;
            } else {
                self.handler.tick()?;
            }
        }
        Ok(())
    }

    fn finishing(&self) {
        self.handler.finishing();
    }

    fn terminate(&self) {
        self.flag.request();
    }

    fn on_exception(&self, error: Error) -> Result<()> {
        self.handler.on_exception(error)
    }
}

impl<T, H> std::fmt::Debug for TickingTask<T, H>
where
    T: TickInterval,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickingTask")
            .field("schedule", &*self.schedule.lock())
            .field("tick_enabled", &self.tick_enabled.load(Ordering::Relaxed))
            .field("terminated", &self.flag.is_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    /// Counts ticks and waits without sleeping.
    #[derive(Default)]
    struct FakeClock {
        ticks: AtomicU64,
        waits: AtomicU64,
    }

    impl FakeClock {
        fn ticks(&self) -> u64 {
            self.ticks.load(Ordering::SeqCst)
        }

        fn waits(&self) -> u64 {
            self.waits.load(Ordering::SeqCst)
        }
    }

    impl TickHandler<i64> for FakeClock {
        fn tick(&self) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn sleep_for(&self, _interval: i64) {
            self.waits.fetch_add(1, Ordering::SeqCst);
        }
    }

    // runs the task on a helper thread until it has ticked `ticks` times
    fn run_until(task: TickingTask<i64, FakeClock>, ticks: u64) -> Arc<TickingTask<i64, FakeClock>> {
        let task = Arc::new(task);
        let runner = {
            let task = task.clone();
            thread::spawn(move || task.run())
        };

        while task.handler().ticks() < ticks {
            thread::yield_now();
        }
        task.terminate();
        runner.join().unwrap().unwrap();
        task
    }

    #[test]
    fn test_unthrottled_never_waits() {
        let task = TickingTask::<i64, _>::new(FakeClock::default());
        assert!(!task.is_tick_interval_enabled());

        let task = run_until(task, 5);

        assert!(task.handler().ticks() >= 5);
        assert_eq!(task.handler().waits(), 0);
    }

    #[test]
    fn test_interval_waits_more_than_it_ticks() {
        let task = TickingTask::<i64, _>::with_interval(FakeClock::default(), 1, 10);
        assert!(task.is_tick_interval_enabled());

        let task = run_until(task, 3);

        assert!(task.handler().ticks() >= 3);
        assert!(task.handler().waits() >= 10 * task.handler().ticks());
    }

    #[test]
    fn test_disable_after_set_interval() {
        let task = TickingTask::<i64, _>::new(FakeClock::default());
        task.set_interval(10, 100);
        assert_eq!(task.interval(), (10, 100));

        task.disable_tick_interval();
        let task = run_until(task, 4);

        assert_eq!(task.handler().waits(), 0);
    }

    #[test]
    fn test_disable_while_running_stops_waiting() {
        let task = Arc::new(TickingTask::<i64, _>::with_interval(FakeClock::default(), 1, 1000));
        let runner = {
            let task = task.clone();
            thread::spawn(move || task.run())
        };

        while task.handler().waits() == 0 {
            thread::yield_now();
        }

        task.disable_tick_interval();
        let waits = task.handler().waits();
        let ticks = task.handler().ticks();

        while task.handler().ticks() < ticks + 10 {
            thread::yield_now();
        }
        task.terminate();
        runner.join().unwrap().unwrap();

        // an iteration already past the mode check may still wait once
        assert!(task.handler().waits() <= waits + 1);
        assert!(!task.is_tick_interval_enabled());
    }

    #[test]
    fn test_elapsed_accumulates_between_ticks() {
        let task = TickingTask::<i64, _>::with_interval(FakeClock::default(), 2, 7);

        for _ in 0..3 {
            task.wait_and_maybe_tick().unwrap();
        }
        assert_eq!(task.elapsed(), 6);
        assert_eq!(task.handler().ticks(), 0);

        // 8 >= 7 fires and resets
        task.wait_and_maybe_tick().unwrap();
        assert_eq!(task.elapsed(), 0);
        assert_eq!(task.handler().ticks(), 1);
    }

    #[test]
    fn test_run_exits_when_terminated_before_start() {
        let task = TickingTask::<i64, _>::from_fn(|| panic!("must not tick"));
        task.terminate();
        assert!(task.run().is_ok());
    }

    #[test]
    fn test_tick_error_escapes_run() {
        #[derive(Debug, thiserror::Error)]
        #[error("tick failed")]
        struct TickFailed;

        let task = TickingTask::<f64, _>::from_fn(|| Err(Error::task(TickFailed)));
        let err = task.run().unwrap_err();
        assert!(err.downcast_ref::<TickFailed>().is_some());
    }

    #[test]
    fn test_interval_conversions() {
        assert_eq!(250u64.to_duration(), Duration::from_millis(250));
        assert_eq!((-5i64).to_duration(), Duration::ZERO);
        assert_eq!(0.5f64.to_duration(), Duration::from_millis(500));
        assert_eq!((-1.0f32).to_duration(), Duration::ZERO);
        assert_eq!(i64::MAX.accumulate(1), i64::MAX);
        assert_eq!(
            Duration::from_millis(1).accumulate(Duration::from_millis(2)),
            Duration::from_millis(3)
        );
    }
}
