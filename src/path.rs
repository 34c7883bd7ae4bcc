/* Object path construction for the broker tree.
 *
 * Mirrors `sd_bus_path_encode_many`: a device's sysname is an arbitrary
 * udev-assigned string and must be escaped before it can appear as a path
 * segment, while profile/resolution/button/led indices are embedded as
 * literal `pN`/`rN`/`bN`/`lN` tokens since they are always plain integers.
 */
const ROOT: &str = "/org/freedesktop/ratbag1";

/* Escape a sysname for use as a single DBus object path segment.
 *
 * DBus object paths may only contain `[A-Za-z0-9_]`; every other byte is
 * percent-escaped as `_xx` (lowercase hex), matching sd-bus's own escaping
 * scheme closely enough to round-trip losslessly through `unescape_segment`. */
pub fn escape_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => out.push(b as char),
            _ => out.push_str(&format!("_{:02x}", b)),
        }
    }
    out
}

/* Reverse of [`escape_segment`]. */
pub fn unescape_segment(escaped: &str) -> String {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' && i + 2 < bytes.len() {
            if let Ok(v) = u8::from_str_radix(&escaped[i + 1..i + 3], 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// `/org/freedesktop/ratbag1/device/<escaped sysname>`
pub fn device_path(sysname: &str) -> String {
    format!("{ROOT}/device/{}", escape_segment(sysname))
}

/// `<device path>/pN`
pub fn profile_path(device_path: &str, profile_idx: u32) -> String {
    format!("{device_path}/p{profile_idx}")
}

/// `<profile path>/rN`
pub fn resolution_path(profile_path: &str, res_idx: u32) -> String {
    format!("{profile_path}/r{res_idx}")
}

/// `<profile path>/bN`
pub fn button_path(profile_path: &str, btn_idx: u32) -> String {
    format!("{profile_path}/b{btn_idx}")
}

/// `<profile path>/lN`
pub fn led_path(profile_path: &str, led_idx: u32) -> String {
    format!("{profile_path}/l{led_idx}")
}

/// Extract the sysname that `device_path` was built from.
pub fn sysname_from_device_path(path: &str) -> Option<String> {
    let prefix = format!("{ROOT}/device/");
    path.strip_prefix(&prefix).map(unescape_segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_sysname() {
        let s = "hidraw0";
        assert_eq!(unescape_segment(&escape_segment(s)), s);
    }

    #[test]
    fn round_trips_sysname_with_special_chars() {
        for s in ["hid:046d:C539.0001", "a/b", "weird name", "_leading"] {
            assert_eq!(unescape_segment(&escape_segment(s)), s, "failed for {s}");
        }
    }

    #[test]
    fn device_path_round_trips_sysname() {
        let path = device_path("hid:046d:C539.0001");
        assert_eq!(
            sysname_from_device_path(&path).as_deref(),
            Some("hid:046d:C539.0001")
        );
    }

    #[test]
    fn child_paths_use_literal_index_tokens() {
        let dp = device_path("hidraw0");
        let pp = profile_path(&dp, 2);
        assert_eq!(pp, format!("{dp}/p2"));
        assert_eq!(resolution_path(&pp, 1), format!("{pp}/r1"));
        assert_eq!(button_path(&pp, 5), format!("{pp}/b5"));
        assert_eq!(led_path(&pp, 0), format!("{pp}/l0"));
    }
}
