use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use thiserror::Error;
use tracing::debug;

/// 默认的退避上限（分钟）
pub const DEFAULT_MAX_BACKOFF_MINUTES: i64 = 24 * 60;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulePolicyError {
    #[error("调度间隔必须大于0: {0}")]
    InvalidInterval(i64),

    #[error("无法解析执行时刻: {0}")]
    InvalidTime(String),

    #[error("无法识别的星期: {0}")]
    InvalidDayOfWeek(String),
}

/// 一条调度的取值
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSpec<'a> {
    pub interval_seconds: i64,
    pub time: Option<&'a str>,
    pub day_of_week: Option<&'a str>,
    pub failures: i32,
}

/// 解析 "HH:MM"
pub fn parse_time_of_day(time: &str) -> Result<(u32, u32), SchedulePolicyError> {
    let invalid = || SchedulePolicyError::InvalidTime(time.to_string());
    let (hour, minute) = time.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}

/// 星期名称的序号，周一为0
pub fn weekday_index(day_of_week: &str) -> Result<i64, SchedulePolicyError> {
    let wanted = day_of_week.trim().to_ascii_lowercase();
    WEEKDAYS
        .iter()
        .position(|day| *day == wanted)
        .map(|i| i as i64)
        .ok_or_else(|| SchedulePolicyError::InvalidDayOfWeek(day_of_week.to_string()))
}

fn at_time_of_day(moment: DateTime<Utc>, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    moment.with_hour(hour)?.with_minute(minute)
}

/// 不含退避的下次执行时间
///
/// 未设置执行时刻时为 `previous + interval`。设置了执行时刻时，先把上次执行时间
/// 归一到当天的该时刻，若归一后晚于上次执行则退回一天，再加上整天数的间隔，
/// 以及从这一天到目标星期的天数差。
pub fn next_iteration(
    previous: DateTime<Utc>,
    spec: &ScheduleSpec<'_>,
) -> Result<Option<DateTime<Utc>>, SchedulePolicyError> {
    if spec.interval_seconds <= 0 {
        return Err(SchedulePolicyError::InvalidInterval(spec.interval_seconds));
    }

    let Some(time) = spec.time else {
        return Ok(previous.checked_add_signed(Duration::seconds(spec.interval_seconds)));
    };

    let (hour, minute) = parse_time_of_day(time)?;
    let Some(normalized) = at_time_of_day(previous, hour, minute) else {
        return Err(SchedulePolicyError::InvalidTime(time.to_string()));
    };

    let mut base = previous;
    if normalized > previous {
        base = normalized - Duration::days(1);
    }

    let days_delay = spec.interval_seconds / SECONDS_PER_DAY;
    let days_to_add = match spec.day_of_week {
        Some(day) => weekday_index(day)? - i64::from(base.weekday().num_days_from_monday()),
        None => 0,
    };

    let next = base
        .checked_add_signed(Duration::days(days_delay + days_to_add))
        .and_then(|next| at_time_of_day(next, hour, minute));
    Ok(next)
}

/// 连续失败的退避分钟数 `2^failures`，不超过 `max_backoff_minutes`
pub fn backoff_minutes(failures: i32, max_backoff_minutes: i64) -> i64 {
    if failures <= 0 {
        return 0;
    }
    u32::try_from(failures)
        .ok()
        .and_then(|exp| 2i64.checked_pow(exp))
        .map_or(max_backoff_minutes, |minutes| minutes.min(max_backoff_minutes))
}

/// 查询是否到期
///
/// 到期条件为 `now` 严格晚于下次执行时间加上退避。时间计算溢出时视为未到期。
pub fn should_schedule_next(
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
    spec: &ScheduleSpec<'_>,
    max_backoff_minutes: i64,
) -> Result<bool, SchedulePolicyError> {
    let Some(mut next) = next_iteration(previous, spec)? else {
        debug!("下次执行时间溢出，视为未到期");
        return Ok(false);
    };

    let backoff = backoff_minutes(spec.failures, max_backoff_minutes);
    if backoff > 0 {
        match next.checked_add_signed(Duration::minutes(backoff)) {
            Some(delayed) => next = delayed,
            None => return Ok(false),
        }
    }

    Ok(now > next)
}
