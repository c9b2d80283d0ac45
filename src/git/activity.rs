// ABOUTME: Buckets `git log --format=%at` timestamps into a 30-day commit histogram

use chrono::{DateTime, TimeZone};

use super::error::ParseError;
use crate::models::{CommitActivity, ACTIVITY_DAYS};

const CONTEXT: &str = "commit log";

/// `git log` arguments whose output [`aggregate`] understands.
/// One day of slack covers commits made earlier on the oldest local day.
pub const LOG_ARGS: [&str; 3] = ["log", "--since=31.days.ago", "--format=%at"];

/// Count commits per local day, relative to `now`.
///
/// Day boundaries follow `now`'s time zone. Commits dated in the future or
/// `ACTIVITY_DAYS` or more days back are dropped.
pub fn aggregate<Tz: TimeZone>(output: &str, now: &DateTime<Tz>) -> Result<CommitActivity, ParseError> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut activity = CommitActivity::empty();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let secs: i64 = line
            .parse()
            .map_err(|_| ParseError::new(CONTEXT, format!("not a unix timestamp: {line:?}"), output))?;
        let Some(committed) = DateTime::from_timestamp(secs, 0) else {
            return Err(ParseError::new(CONTEXT, format!("timestamp out of range: {secs}"), output));
        };

        let days_ago = (today - committed.with_timezone(&tz).date_naive()).num_days();
        if (0..ACTIVITY_DAYS as i64).contains(&days_ago) {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            activity.record(days_ago as usize);
        }
    }

    Ok(activity)
}
