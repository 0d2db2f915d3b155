//! Periodic metal rate refresh
//!
//! Refreshes once at startup, then on every tick of the configured interval
//! while the shop is open (business hours in IST). Failures are logged and
//! the next tick tries again.

use crate::services::GoldRateService;
use crate::state::AppState;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Kolkata;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Whether `now` falls in `[start, end)` Asia/Kolkata local time
pub fn is_business_hours(now: DateTime<Utc>, start: NaiveTime, end: NaiveTime) -> bool {
    let local = now.with_timezone(&Kolkata).time();
    local >= start && local < end
}

/// Time until the next business-hours opening, zero while open
pub fn duration_until_open(now: DateTime<Utc>, start: NaiveTime, end: NaiveTime) -> Duration {
    if is_business_hours(now, start, end) {
        return Duration::ZERO;
    }

    let now_time = now.with_timezone(&Kolkata).time();
    let now_secs = u64::from(now_time.num_seconds_from_midnight());
    let start_secs = u64::from(start.num_seconds_from_midnight());

    let secs = if now_secs < start_secs {
        // Opens later today
        start_secs - now_secs
    } else {
        // Opens tomorrow
        (24 * 3600 - now_secs) + start_secs
    };

    Duration::from_secs(secs)
}

/// Background rate refresh task
pub struct RateRefreshScheduler {
    state: Arc<AppState>,
}

impl RateRefreshScheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the refresh loop. It stops when `shutdown` flips to true or its
    /// sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let refresh = &self.state.config.refresh;
            info!(
                "Rate refresh scheduler started: every {}s, {}-{} IST",
                refresh.interval.as_secs(),
                refresh.business_start.format("%H:%M"),
                refresh.business_end.format("%H:%M")
            );

            // Startup refresh runs regardless of business hours
            if self.refresh_until_shutdown("startup", &mut shutdown).await {
                info!("Rate refresh scheduler stopped");
                return;
            }

            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + refresh.interval,
                refresh.interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        if is_business_hours(now, refresh.business_start, refresh.business_end) {
                            if self.refresh_until_shutdown("scheduled", &mut shutdown).await {
                                info!("Rate refresh scheduler stopped");
                                break;
                            }
                        } else {
                            let wait = duration_until_open(now, refresh.business_start, refresh.business_end);
                            debug!(
                                "Outside business hours, skipping refresh (opens in {}h {}m)",
                                wait.as_secs() / 3600,
                                (wait.as_secs() % 3600) / 60
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Rate refresh scheduler stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Run one refresh, abandoning it if shutdown is requested meanwhile.
    /// Returns true when the scheduler should stop.
    async fn refresh_until_shutdown(
        &self,
        trigger: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let refresh = self.refresh(trigger);
        tokio::pin!(refresh);

        loop {
            tokio::select! {
                _ = &mut refresh => return false,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        warn!("{} rate refresh abandoned for shutdown", trigger);
                        return true;
                    }
                }
            }
        }
    }

    async fn refresh(&self, trigger: &str) {
        match GoldRateService::update_rates(&self.state).await {
            Ok(result) => info!(
                "{} rate refresh: {} rates from {}",
                trigger,
                result.rates.len(),
                result.source
            ),
            Err(e) => error!("{} rate refresh failed: {}", trigger, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gold_rate_service::tests::{test_state, FakeSource};
    use crate::sources::types::FetchError;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn hours() -> (NaiveTime, NaiveTime) {
        (
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_business_hours_in_ist() {
        let (start, end) = hours();

        // 04:00 UTC = 09:30 IST
        let open = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        assert!(is_business_hours(open, start, end));

        // 03:00 UTC = 08:30 IST
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        assert!(!is_business_hours(early, start, end));

        // 15:30 UTC = 21:00 IST, closing time is exclusive
        let closing = Utc.with_ymd_and_hms(2024, 3, 1, 15, 30, 0).unwrap();
        assert!(!is_business_hours(closing, start, end));
    }

    #[test]
    fn test_duration_until_open() {
        let (start, end) = hours();

        let open = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap();
        assert_eq!(duration_until_open(open, start, end), Duration::ZERO);

        // 08:30 IST -> 30 minutes
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 3, 0, 0).unwrap();
        assert_eq!(duration_until_open(early, start, end), Duration::from_secs(1800));

        // 22:00 IST -> 11 hours
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 16, 30, 0).unwrap();
        assert_eq!(duration_until_open(late, start, end), Duration::from_secs(11 * 3600));
    }

    #[tokio::test]
    async fn test_startup_refresh_and_shutdown() {
        let source = FakeSource::new("primary", Ok(dec!(6800)));
        let state = Arc::new(test_state(vec![source.clone()]));
        let (tx, rx) = watch::channel(false);

        let handle = RateRefreshScheduler::new(state.clone()).start(rx);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(state.sqlite.count_rates().unwrap(), 3);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_ticks_refresh_during_business_hours() {
        let source = FakeSource::new("primary", Ok(dec!(6800)));
        let mut state = test_state(vec![source.clone()]);
        state.config.refresh.interval = Duration::from_millis(50);
        state.config.refresh.business_start = NaiveTime::MIN;
        state.config.refresh.business_end = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = RateRefreshScheduler::new(Arc::new(state)).start(rx);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(source.calls() > 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_ticks_skipped_outside_business_hours() {
        let source = FakeSource::new("primary", Ok(dec!(6800)));
        let mut state = test_state(vec![source.clone()]);
        let local_now = Utc::now().with_timezone(&Kolkata).time();
        state.config.refresh.interval = Duration::from_millis(50);
        state.config.refresh.business_start = local_now + chrono::Duration::hours(1);
        state.config.refresh.business_end = local_now + chrono::Duration::hours(2);
        let (tx, rx) = watch::channel(false);

        let handle = RateRefreshScheduler::new(Arc::new(state)).start(rx);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Startup refresh only
        assert_eq!(source.calls(), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_hung_refresh() {
        let source = FakeSource::slow("hung", Duration::from_secs(60));
        let mut state = test_state(vec![source.clone()]);
        state.config.refresh.attempt_timeout = Duration::from_secs(30);
        let (tx, rx) = watch::channel(false);

        let handle = RateRefreshScheduler::new(Arc::new(state)).start(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop while a refresh is in flight")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_refresh_is_swallowed() {
        let source = FakeSource::new("primary", Err(FetchError::Unconfigured("no key".into())));
        let state = Arc::new(test_state(vec![source.clone()]));
        let (tx, rx) = watch::channel(false);

        let handle = RateRefreshScheduler::new(state.clone()).start(rx);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!handle.is_finished());
        assert_eq!(state.sqlite.count_rates().unwrap(), 0);

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
