/// Parses a human-readable quota duration (e.g. `"1w 2d 3:30"`) into a
/// number of seconds.
///
/// Grammar, applied left to right against whatever remains of the string:
/// an optional `<int>w` (weeks), then an optional `<int>d` (days), then an
/// optional `<int>:` (hours, via the `:` separator before minutes), and
/// finally a bare trailing integer interpreted as minutes. Any combination
/// may be present; a string with none of them is an error. Per spec §9
/// Open Questions, a trailing empty remainder after the `w`/`d`/`:`
/// prefixes are consumed is treated as zero minutes rather than an error.
///
/// `seconds = (7*24*w + 24*d + h + m/60) * 3600`
///
/// # Errors
///
/// Returns an error if none of the four components could be parsed at all.
pub fn quota_size(value: &str) -> Result<u64, String> {
    let mut rest = value.trim();

    let mut weeks = 0i64;
    let mut days = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0f64;
    let mut found = false;

    if let Some((w, remainder)) = rest.split_once('w') {
        if let Ok(w) = w.trim().parse::<i64>() {
            weeks = w;
            found = true;
            rest = remainder.trim();
        }
    }

    if let Some((d, remainder)) = rest.split_once('d') {
        if let Ok(d) = d.trim().parse::<i64>() {
            days = d;
            found = true;
            rest = remainder.trim();
        }
    }

    if let Some((h, remainder)) = rest.split_once(':') {
        if let Ok(h) = h.trim().parse::<i64>() {
            hours = h;
            found = true;
            rest = remainder.trim();
        }
    }

    if !rest.is_empty() {
        if let Ok(m) = rest.parse::<f64>() {
            minutes = m;
            found = true;
        }
    }

    if !found {
        return Err(format!("cannot interpret '{value}' as a quota size"));
    }

    let total_hours = (7 * 24 * weeks + 24 * days + hours) as f64 + minutes / 60.0;
    Ok((total_hours * 3600.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_week_two_days_three_thirty() {
        // 7*24*1 + 24*2 + 3 + 30/60 = 168 + 48 + 3.5 = 219.5 hours = 790200 s
        assert_eq!(quota_size("1w 2d 3:30").unwrap(), 790_200);
    }

    #[test]
    fn bare_integer_is_minutes() {
        assert_eq!(quota_size("90").unwrap(), 90 * 60);
    }

    #[test]
    fn hours_and_minutes_only() {
        assert_eq!(quota_size("3:30").unwrap(), (3.5 * 3600.0) as u64);
    }

    #[test]
    fn weeks_only() {
        assert_eq!(quota_size("2w").unwrap(), 2 * 7 * 24 * 3600);
    }

    #[test]
    fn trailing_empty_remainder_is_zero_not_an_error() {
        assert_eq!(quota_size("1w 2d 3:").unwrap(), quota_size("1w 2d 3:0").unwrap());
    }

    #[test]
    fn whitespace_only_is_an_error() {
        assert!(quota_size("   ").is_err());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(quota_size("banana").is_err());
    }
}
