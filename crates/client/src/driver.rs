use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use progress_core::Clock;
use progress_core::model::{CourseId, ProgressRecord, SectionId};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::reporter::{Flush, ProgressReporter, ReporterConfig, SectionTarget};
use crate::transport::{FlushTransport, TransportError};

/// Wall-clock time derived from tokio's monotonic clock, so paused-time tests
/// drive the reporter deterministically.
#[derive(Debug, Clone, Copy)]
struct DriverClock {
    wall: DateTime<Utc>,
    origin: Instant,
}

impl DriverClock {
    fn new(clock: Clock) -> Self {
        Self {
            wall: clock.now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

type SharedReporter = Arc<Mutex<ProgressReporter>>;

fn lock(reporter: &Mutex<ProgressReporter>) -> MutexGuard<'_, ProgressReporter> {
    reporter.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send a flush in the background. Failures are logged and the time is not resent.
fn dispatch(transport: Arc<dyn FlushTransport>, reporter: SharedReporter, flush: Flush) {
    tokio::spawn(async move {
        match transport.flush(&flush).await {
            Ok(record) => {
                tracing::debug!(
                    section_id = %flush.section_id,
                    time_spent = flush.time_spent,
                    "progress flush delivered"
                );
                lock(&reporter).acknowledge(&record);
            }
            Err(e) => {
                tracing::warn!(
                    section_id = %flush.section_id,
                    time_spent = flush.time_spent,
                    error = %e,
                    "progress flush failed"
                );
            }
        }
    });
}

/// Runs a `ProgressReporter` on a tokio interval.
///
/// Player events come in through the methods below; periodic and transition
/// flushes are sent fire-and-forget so a slow server never stalls the timer.
pub struct ReporterDriver {
    reporter: SharedReporter,
    transport: Arc<dyn FlushTransport>,
    clock: DriverClock,
    ticker: JoinHandle<()>,
}

impl ReporterDriver {
    /// Spawn the tick loop. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(config: ReporterConfig, clock: Clock, transport: Arc<dyn FlushTransport>) -> Self {
        let reporter: SharedReporter = Arc::new(Mutex::new(ProgressReporter::new(config)));
        let clock = DriverClock::new(clock);

        let tick_reporter = Arc::clone(&reporter);
        let tick_transport = Arc::clone(&transport);
        let ticker = tokio::spawn(async move {
            let mut interval = time::interval(config.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let flush = lock(&tick_reporter).tick(clock.now());
                if let Some(flush) = flush {
                    dispatch(Arc::clone(&tick_transport), Arc::clone(&tick_reporter), flush);
                }
            }
        });

        Self {
            reporter,
            transport,
            clock,
            ticker,
        }
    }

    fn send(&self, flush: Option<Flush>) {
        if let Some(flush) = flush {
            dispatch(Arc::clone(&self.transport), Arc::clone(&self.reporter), flush);
        }
    }

    /// Start (or switch to) a section.
    pub fn start(&self, target: SectionTarget) {
        let flush = lock(&self.reporter).start(target, self.clock.now());
        tracing::debug!(section_id = %target.section_id, "tracking section");
        self.send(flush);
    }

    pub fn set_position(&self, position: f64) {
        lock(&self.reporter).set_position(position);
    }

    /// Playback reached the end of the content.
    pub fn ended(&self) {
        let flush = lock(&self.reporter).ended(self.clock.now());
        self.send(flush);
    }

    /// The learner navigated away from the section.
    pub fn stop(&self) {
        let flush = lock(&self.reporter).stop(self.clock.now());
        self.send(flush);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressReporter {
        lock(&self.reporter).clone()
    }

    /// Explicitly complete a section, waiting for the server.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the server could not be reached or rejected
    /// the request; unlike background flushes this is surfaced to the caller.
    pub async fn complete_section(
        &self,
        course_id: CourseId,
        section_id: SectionId,
    ) -> Result<ProgressRecord, TransportError> {
        let record = self.transport.complete(course_id, section_id).await?;
        lock(&self.reporter).acknowledge(&record);
        Ok(record)
    }

    /// Stop the current section, wait for its final flush, and end the tick loop.
    pub async fn close(self) {
        let flush = lock(&self.reporter).stop(self.clock.now());
        if let Some(flush) = flush {
            if let Err(e) = self.transport.flush(&flush).await {
                tracing::warn!(section_id = %flush.section_id, error = %e, "final flush failed");
            }
        }
    }
}

impl Drop for ReporterDriver {
    /// Dropping the driver is a `Stopped` transition: pending time goes out in a
    /// background flush that is not awaited.
    fn drop(&mut self) {
        self.ticker.abort();
        let flush = lock(&self.reporter).stop(self.clock.now());
        let Some(flush) = flush else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            dispatch(Arc::clone(&self.transport), Arc::clone(&self.reporter), flush);
        } else {
            tracing::warn!(
                section_id = %flush.section_id,
                time_spent = flush.time_spent,
                "no runtime to send the final flush"
            );
        }
    }
}
