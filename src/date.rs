//! HTTP `Date` header formatting.
//!
//! Deliberately reproduces the source's deviation from RFC 7231's
//! IMF-fixdate: day-of-month is not zero-padded (`Tue, 7 Jan 2025 ...`
//! rather than `Tue, 07 Jan 2025 ...`). Recorded as an open question in
//! DESIGN.md rather than silently "fixed", since nothing in the spec
//! depends on byte-exact RFC compliance and changing it would be an
//! unrequested behavioural change.

const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formats the current time as `<Day>, <D> <Mon> <YYYY> <HH>:<MM>:<SS> GMT`.
pub fn http_date_now() -> String {
    let tm = unsafe {
        let t = libc::time(std::ptr::null_mut());
        let mut tm: libc::tm = std::mem::zeroed();
        libc::gmtime_r(&t, &mut tm);
        tm
    };
    format_tm(&tm)
}

/// Formats an already-broken-down UTC time, factored out of
/// [`http_date_now`] so the exact non-zero-padded-day shape can be tested
/// against a known fixed timestamp instead of the wall clock.
fn format_tm(tm: &libc::tm) -> String {
    format!(
        "{}, {} {} {} {:02}:{:02}:{:02} GMT",
        DAYS[tm.tm_wday as usize],
        tm.tm_mday,
        MONTHS[tm.tm_mon as usize],
        tm.tm_year + 1900,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec,
    )
}
