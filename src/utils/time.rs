use chrono::Duration;

/// This is the standard way of showing a duration in tngimport, the same `H:MM:SS` layout the
/// tracker timers use.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.unsigned_abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Parses `H:MM:SS`, `M:SS` or a plain amount of seconds. Negative durations aren't accepted.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let parts = value
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;

    let seconds = match parts.as_slice() {
        [seconds] => i64::from(*seconds),
        [minutes, seconds] if *seconds < 60 => i64::from(*minutes) * 60 + i64::from(*seconds),
        [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => {
            i64::from(*hours) * 3600 + i64::from(*minutes) * 60 + i64::from(*seconds)
        }
        _ => return None,
    };
    Some(Duration::seconds(seconds))
}
