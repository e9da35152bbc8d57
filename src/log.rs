//! Minimal stderr logger.
//!
//! The original server writes `pid date time [level]: message` lines
//! straight to `STDERR_FILENO` with no buffering and no dependency beyond
//! libc's `localtime`. Workers never share a log sink (each process owns its
//! own stderr fd inherited from the master), so there is no cross-process
//! coordination to do here.

use std::fmt;

/// Severity threshold, lowest to highest. Configured once via
/// [`crate::config::ServerSettings`] and compared against on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
#[value(rename_all = "lower")]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

/// Current wall-clock time, broken into UTC fields via `gmtime_r`.
///
/// Kept private to this module; [`crate::date`] has its own copy of the same
/// primitive because the two formats (log line vs. HTTP `Date` header)
/// diverge in field order and padding.
struct BrokenDownTime {
    year: i32,
    month: i32,
    day: i32,
    hour: i32,
    minute: i32,
    second: i32,
}

fn now_utc() -> BrokenDownTime {
    unsafe {
        let t = libc::time(std::ptr::null_mut());
        let mut tm: libc::tm = std::mem::zeroed();
        libc::gmtime_r(&t, &mut tm);
        BrokenDownTime {
            year: tm.tm_year + 1900,
            month: tm.tm_mon + 1,
            day: tm.tm_mday,
            hour: tm.tm_hour,
            minute: tm.tm_min,
            second: tm.tm_sec,
        }
    }
}

fn emit(level: LogLevel, msg: fmt::Arguments<'_>) {
    let pid = std::process::id();
    let t = now_utc();
    eprintln!(
        "{pid} {}.{}.{} {:02}:{:02}:{:02} [{}]: {}",
        t.day,
        t.month,
        t.year,
        t.hour,
        t.minute,
        t.second,
        level.as_str(),
        msg
    );
}

/// Logs `msg` if `level` meets or exceeds `threshold`.
pub fn log_msg(threshold: LogLevel, level: LogLevel, msg: fmt::Arguments<'_>) {
    if level < threshold {
        return;
    }
    emit(level, msg);
}

/// Logs `msg` followed by the current `errno`'s description, mirroring the
/// source's `log_perror`. Call immediately after the failing syscall so
/// `errno` has not been clobbered.
pub fn log_perror(threshold: LogLevel, level: LogLevel, msg: fmt::Arguments<'_>) {
    if level < threshold {
        return;
    }
    let err = std::io::Error::last_os_error();
    emit(level, format_args!("{msg}: {err}"));
}

#[macro_export]
macro_rules! log_trace {
    ($threshold:expr, $($arg:tt)*) => {
        $crate::log::log_msg($threshold, $crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($threshold:expr, $($arg:tt)*) => {
        $crate::log::log_msg($threshold, $crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($threshold:expr, $($arg:tt)*) => {
        $crate::log::log_msg($threshold, $crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($threshold:expr, $($arg:tt)*) => {
        $crate::log::log_msg($threshold, $crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_perror {
    ($threshold:expr, $level:expr, $($arg:tt)*) => {
        $crate::log::log_perror($threshold, $level, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_filters_below_threshold() {
        assert!(LogLevel::Trace < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
    }
}
