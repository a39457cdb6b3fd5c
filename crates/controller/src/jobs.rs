//! Background jobs of the controller
//!
//! Currently only the daily cleanup of registrations whose event already
//! took place.
use crate::services::RegistrationService;
use crate::settings::RegistrationCleanup;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Spawns the daily registration cleanup task
///
/// The task sleeps until the next configured local run time, runs the
/// cleanup and repeats. It exits when the shutdown signal fires. A missed
/// run (e.g. the controller was down) is not backfilled.
pub fn start_cleanup_job(
    service: Arc<RegistrationService>,
    settings: RegistrationCleanup,
    mut shutdown: broadcast::Receiver<()>,
) {
    actix_rt::spawn(async move {
        loop {
            let now = Utc::now();
            let next_run = next_run_at(now, settings.run_at, settings.timezone);

            log::debug!("Next registration cleanup run at {}", next_run);

            let wait = (next_run - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = sleep(wait) => {
                    log::info!("Removing registrations of past events");

                    let service = service.clone();

                    if crate::block(move || service.cleanup_old_registrations())
                        .await
                        .is_err()
                    {
                        log::error!("Registration cleanup task panicked");
                    }
                }
                _ = shutdown.recv() => {
                    log::debug!("Registration cleanup job got shutdown signal, exiting");
                    return;
                }
            }
        }
    });
}

/// Computes the next instant after `now` at which the job runs
///
/// `run_at` is a wall clock time in the timezone `tz`. A day on which that
/// wall clock time does not exist (DST gap) is skipped.
fn next_run_at(now: DateTime<Utc>, run_at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    use chrono::TimeZone;

    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();

    if local_now.time() >= run_at {
        date = date.succ_opt().unwrap_or(date);
    }

    loop {
        match tz.from_local_datetime(&date.and_time(run_at)).earliest() {
            Some(next) => return next.with_timezone(&Utc),
            None => match date.succ_opt() {
                Some(next_date) => date = next_date,
                None => return now,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use pretty_assertions::assert_eq;

    fn eight() -> NaiveTime {
        NaiveTime::from_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn runs_today_when_the_time_is_still_ahead() {
        let now = Berlin
            .with_ymd_and_hms(2023, 5, 8, 6, 30, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = next_run_at(now, eight(), Berlin);

        assert_eq!(
            next,
            Berlin
                .with_ymd_and_hms(2023, 5, 8, 8, 0, 0)
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn runs_tomorrow_when_the_time_already_passed() {
        let now = Berlin
            .with_ymd_and_hms(2023, 5, 8, 9, 15, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = next_run_at(now, eight(), Berlin);

        assert_eq!(
            next,
            Berlin
                .with_ymd_and_hms(2023, 5, 9, 8, 0, 0)
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn runs_tomorrow_when_now_is_exactly_the_run_time() {
        let now = Berlin
            .with_ymd_and_hms(2023, 5, 8, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = next_run_at(now, eight(), Berlin);

        assert_eq!(
            next,
            Berlin
                .with_ymd_and_hms(2023, 5, 9, 8, 0, 0)
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn skips_days_where_the_run_time_does_not_exist() {
        // Europe/Berlin skips 02:00-03:00 on 2023-03-26
        let run_at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = Berlin
            .with_ymd_and_hms(2023, 3, 25, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = next_run_at(now, run_at, Berlin);

        assert_eq!(
            next,
            Berlin
                .with_ymd_and_hms(2023, 3, 27, 2, 30, 0)
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[test]
    fn takes_the_earlier_instant_on_ambiguous_times() {
        // Europe/Berlin repeats 02:00-03:00 on 2023-10-29
        let run_at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = Berlin
            .with_ymd_and_hms(2023, 10, 28, 12, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let next = next_run_at(now, run_at, Berlin);

        // 02:30 CEST, the first of the two occurrences
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2023, 10, 29, 0, 30, 0).unwrap()
        );
    }
}
