use chrono::{DateTime, Duration, DurationRound, TimeDelta, Utc};
use log::{debug, warn};
use reqwest::header::HeaderMap;

use crate::models::ApiLimits;

pub const HTTP_STATUS_CODE_API_LIMIT_REACHED: u16 = 429;

/// Strava calls held in reserve so a handler that is already running can finish.
const API_BUFFER: u32 = 10;

const STRAVA_LIMIT_HEADER: &str = "x-ratelimit-limit";
const STRAVA_USAGE_HEADER: &str = "x-ratelimit-usage";
const DARKSKY_USAGE_HEADER: &str = "x-forecast-api-calls";

/// Quota values reported on a single API response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateHeaders {
    pub strava_short_limit: Option<u32>,
    pub strava_daily_limit: Option<u32>,
    pub strava_short_usage: Option<u32>,
    pub strava_daily_usage: Option<u32>,
    pub darksky_usage: Option<u32>,
}

impl RateHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let (strava_short_limit, strava_daily_limit) = pair_header(headers, STRAVA_LIMIT_HEADER);
        let (strava_short_usage, strava_daily_usage) = pair_header(headers, STRAVA_USAGE_HEADER);
        let darksky_usage = header_str(headers, DARKSKY_USAGE_HEADER).and_then(parse_count);

        Self {
            strava_short_limit,
            strava_daily_limit,
            strava_short_usage,
            strava_daily_usage,
            darksky_usage,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn parse_count(value: &str) -> Option<u32> {
    match value.trim().parse() {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Ignoring unparseable rate limit value {value:?}: {e}");
            None
        }
    }
}

/// Strava reports `short,daily` in one header.
fn pair_header(headers: &HeaderMap, name: &str) -> (Option<u32>, Option<u32>) {
    let Some(raw) = header_str(headers, name) else {
        return (None, None);
    };
    let mut parts = raw.split(',');
    let short = parts.next().and_then(parse_count);
    let daily = parts.next().and_then(parse_count);
    (short, daily)
}

fn next_quarter_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let quarter = TimeDelta::minutes(15);
    now.duration_trunc(quarter).unwrap_or(now) + quarter
}

fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    (now.date_naive() + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Folds the quota headers from a response into `current`. Reset times are always restamped: the
/// Strava short window ends on the next quarter hour and every daily window at the next UTC
/// midnight.
pub fn new_api_limits(current: &ApiLimits, headers: &RateHeaders, now: DateTime<Utc>) -> ApiLimits {
    let midnight = next_midnight(now);

    let limits = ApiLimits {
        strava_short_limit: headers.strava_short_limit.or(current.strava_short_limit),
        strava_daily_limit: headers.strava_daily_limit.or(current.strava_daily_limit),
        strava_short_usage: headers.strava_short_usage.or(current.strava_short_usage),
        strava_daily_usage: headers.strava_daily_usage.or(current.strava_daily_usage),
        darksky_usage: headers.darksky_usage.or(current.darksky_usage),
        strava_short_reset: Some(next_quarter_hour(now)),
        strava_daily_reset: Some(midnight),
        dark_sky_reset: Some(midnight),
    };
    debug!("Updated API limits: {limits:?}");
    limits
}

pub struct ApiStatus<'a> {
    limits: &'a ApiLimits,
    darksky_limit: Option<u32>,
    now: DateTime<Utc>,
}

impl<'a> ApiStatus<'a> {
    pub fn new(limits: &'a ApiLimits, darksky_limit: Option<u32>, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            darksky_limit,
            now,
        }
    }

    fn window_open(&self, reset: Option<DateTime<Utc>>) -> bool {
        reset.is_some_and(|reset| self.now < reset)
    }

    pub fn strava_daily_limit_reached(&self) -> bool {
        self.window_open(self.limits.strava_daily_reset)
            && matches!(
                (self.limits.strava_daily_usage, self.limits.strava_daily_limit),
                (Some(usage), Some(limit)) if usage + API_BUFFER >= limit
            )
    }

    pub fn strava_short_limit_reached(&self) -> bool {
        self.window_open(self.limits.strava_short_reset)
            && matches!(
                (self.limits.strava_short_usage, self.limits.strava_short_limit),
                (Some(usage), Some(limit)) if usage + API_BUFFER >= limit
            )
    }

    pub fn strava_limit_reached(&self) -> bool {
        self.strava_daily_limit_reached() || self.strava_short_limit_reached()
    }

    pub fn darksky_limit_reached(&self) -> bool {
        self.window_open(self.limits.dark_sky_reset)
            && matches!(
                (self.limits.darksky_usage, self.darksky_limit),
                (Some(usage), Some(limit)) if usage >= limit
            )
    }

    pub fn limit_reached(&self) -> bool {
        self.strava_limit_reached() || self.darksky_limit_reached()
    }

    /// Seconds until every exhausted API has reset. Strava's daily window wins over its short one.
    pub fn seconds_until_apis_available(&self) -> u32 {
        let mut last_reset = self.now;

        if self.darksky_limit_reached() {
            last_reset = later(last_reset, self.limits.dark_sky_reset);
        }

        if self.strava_daily_limit_reached()
            && self.limits.strava_daily_reset.is_some_and(|r| r > last_reset)
        {
            last_reset = later(last_reset, self.limits.strava_daily_reset);
        } else if self.strava_short_limit_reached() {
            last_reset = later(last_reset, self.limits.strava_short_reset);
        }

        let millis = (last_reset - self.now).num_milliseconds().max(0) as u64;
        u32::try_from(millis.div_ceil(1000)).unwrap_or(u32::MAX)
    }
}

fn later(current: DateTime<Utc>, candidate: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match candidate {
        Some(candidate) if candidate > current => candidate,
        _ => current,
    }
}
