use crate::application::refresh::RefreshRunner;
use crate::application::single_flight::RefreshCoordinator;
use crate::domain::models::MIN_HOURS;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, interval, interval_at};

const HOUR: Duration = Duration::from_secs(60 * 60);
const INTERVAL_POLL: Duration = Duration::from_secs(60);

/// Reads the configured refresh interval in hours. Called after every tick and
/// on every poll.
pub type IntervalSource = Arc<dyn Fn() -> u32 + Send + Sync>;

pub struct RefreshScheduler<R>
where
    R: RefreshRunner,
{
    coordinator: Arc<RefreshCoordinator<R>>,
    interval_source: IntervalSource,
    hour: Duration,
    poll_period: Duration,
}

impl<R> RefreshScheduler<R>
where
    R: RefreshRunner,
{
    pub fn new(coordinator: Arc<RefreshCoordinator<R>>, interval_source: IntervalSource) -> Self {
        Self {
            coordinator,
            interval_source,
            hour: HOUR,
            poll_period: INTERVAL_POLL,
        }
    }

    pub fn with_hour_unit(mut self, hour: Duration) -> Self {
        self.hour = hour;
        self
    }

    /// How often the interval source is checked between ticks.
    pub fn with_poll_period(mut self, poll_period: Duration) -> Self {
        self.poll_period = poll_period;
        self
    }

    fn ticker(&self, hours: u32, first_tick: Option<Instant>) -> Interval {
        let period = self.hour * hours;
        let mut ticker = match first_tick {
            Some(start) => interval_at(start, period),
            None => interval(period),
        };
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Refreshes immediately, then once per interval until `shutdown` flips to
    /// true or its sender is dropped. A changed interval replaces the pending
    /// tick with one a full new period from the moment the change is seen.
    /// Returns the number of refreshes run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut hours = (self.interval_source)().max(MIN_HOURS);
        let mut ticker = self.ticker(hours, None);
        let mut poll = interval_at(Instant::now() + self.poll_period, self.poll_period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = 0;
        tracing::info!(interval_hours = hours, "refresh scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    runs += 1;
                    match self.coordinator.refresh().await {
                        Ok(outcome) => tracing::info!(?outcome, "scheduled refresh finished"),
                        Err(error) => tracing::warn!(%error, "scheduled refresh failed"),
                    }
                }
                _ = poll.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            let configured = (self.interval_source)().max(MIN_HOURS);
            if configured != hours {
                hours = configured;
                let period = self.hour * hours;
                ticker = self.ticker(hours, Some(Instant::now() + period));
                tracing::info!(interval_hours = hours, "refresh rescheduled");
            }
        }

        tracing::info!(runs, "refresh scheduler stopped");
        runs
    }
}
