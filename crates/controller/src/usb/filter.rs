//! VID:PID device filters
//!
//! Filter format: `"0xVID:0xPID"`, with `*` allowed on either side.

/// Default filter matching the instrument's USB interface board
pub const DEFAULT_INSTRUMENT_FILTER: &str = "0x0547:0x1015";

/// Check if a VID/PID pair is allowed by the filters
///
/// An empty filter list matches every device.
pub fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }

    filters.iter().any(|filter| {
        let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
            return false;
        };
        id_matches(filter_vid, vid) && id_matches(filter_pid, pid)
    })
}

fn id_matches(pattern: &str, id: u16) -> bool {
    if pattern == "*" {
        return true;
    }
    u16::from_str_radix(pattern.trim_start_matches("0x"), 16)
        .map(|v| v == id)
        .unwrap_or(false)
}
