/* Button macro reducibility: a macro event sequence `(event_type, value)` pairs as
 * stored on `ButtonInfo::macro_entries` (0=press, 1=release, 2=wait-ms) can sometimes
 * be expressed as a single `(key, modifier_mask)` pair, which is how most HID report
 * formats actually encode a "key + modifiers" shortcut. This module detects that shape
 * and converts both ways, matching the conventions the vendor drivers already use when
 * they read a macro back off hardware (see `driver::roccat::read_macro`). */

/// Linux evdev keycodes for the eight standard modifier keys.
const KEY_LEFTCTRL: u32 = 29;
const KEY_LEFTSHIFT: u32 = 42;
const KEY_LEFTALT: u32 = 56;
const KEY_LEFTMETA: u32 = 125;
const KEY_RIGHTCTRL: u32 = 97;
const KEY_RIGHTSHIFT: u32 = 54;
const KEY_RIGHTALT: u32 = 100;
const KEY_RIGHTMETA: u32 = 126;

/// HID modifier byte bit positions, in the order a standard boot-protocol
/// keyboard report packs them.
pub const MODIFIER_LEFTCTRL: u32 = 1 << 0;
pub const MODIFIER_LEFTSHIFT: u32 = 1 << 1;
pub const MODIFIER_LEFTALT: u32 = 1 << 2;
pub const MODIFIER_LEFTMETA: u32 = 1 << 3;
pub const MODIFIER_RIGHTCTRL: u32 = 1 << 4;
pub const MODIFIER_RIGHTSHIFT: u32 = 1 << 5;
pub const MODIFIER_RIGHTALT: u32 = 1 << 6;
pub const MODIFIER_RIGHTMETA: u32 = 1 << 7;

const EVENT_PRESS: u32 = 0;
const EVENT_RELEASE: u32 = 1;
const EVENT_WAIT: u32 = 2;

/// Return the modifier bit for `key`, or `None` if it isn't a modifier key.
fn modifier_bit(key: u32) -> Option<u32> {
    Some(match key {
        KEY_LEFTCTRL => MODIFIER_LEFTCTRL,
        KEY_LEFTSHIFT => MODIFIER_LEFTSHIFT,
        KEY_LEFTALT => MODIFIER_LEFTALT,
        KEY_LEFTMETA => MODIFIER_LEFTMETA,
        KEY_RIGHTCTRL => MODIFIER_RIGHTCTRL,
        KEY_RIGHTSHIFT => MODIFIER_RIGHTSHIFT,
        KEY_RIGHTALT => MODIFIER_RIGHTALT,
        KEY_RIGHTMETA => MODIFIER_RIGHTMETA,
        _ => return None,
    })
}

fn key_for_modifier_bit(bit: u32) -> Option<u32> {
    Some(match bit {
        MODIFIER_LEFTCTRL => KEY_LEFTCTRL,
        MODIFIER_LEFTSHIFT => KEY_LEFTSHIFT,
        MODIFIER_LEFTALT => KEY_LEFTALT,
        MODIFIER_LEFTMETA => KEY_LEFTMETA,
        MODIFIER_RIGHTCTRL => KEY_RIGHTCTRL,
        MODIFIER_RIGHTSHIFT => KEY_RIGHTSHIFT,
        MODIFIER_RIGHTALT => KEY_RIGHTALT,
        MODIFIER_RIGHTMETA => KEY_RIGHTMETA,
        _ => return None,
    })
}

/// Try to reduce a macro event sequence to `(key, modifier_mask)`.
///
/// The sequence must consist of one or more modifier press events, exactly
/// one non-modifier press, exactly one non-modifier release, and the same
/// set of modifier releases (order within each group doesn't matter; the
/// C driver's macros aren't guaranteed to release modifiers in the order
/// they were pressed). Wait events disqualify the reduction: a hand-timed
/// macro isn't "just a shortcut". The first `(EVENT_WAIT, _)`-free prefix
/// ending at the first terminating `None` marker (absent here, since
/// `macro_entries` has no explicit terminator) is scanned in full.
pub fn reduce_to_key_modifier(entries: &[(u32, u32)]) -> Option<(u32, u32)> {
    if entries.iter().any(|&(ev, _)| ev == EVENT_WAIT) {
        return None;
    }

    let mut modifier_mask = 0u32;
    let mut key = None;
    let mut released_key = false;
    let mut released_mask = 0u32;

    for &(ev, val) in entries {
        match ev {
            EVENT_PRESS => {
                if let Some(bit) = modifier_bit(val) {
                    if key.is_some() {
                        // A modifier pressed after the main key: not our shape.
                        return None;
                    }
                    modifier_mask |= bit;
                } else if key.is_none() {
                    key = Some(val);
                } else {
                    // A second non-modifier press.
                    return None;
                }
            }
            EVENT_RELEASE => {
                if let Some(bit) = modifier_bit(val) {
                    if bit & modifier_mask == 0 {
                        return None;
                    }
                    released_mask |= bit;
                } else if Some(val) == key {
                    released_key = true;
                } else {
                    return None;
                }
            }
            _ => return None,
        }
    }

    if released_key && released_mask == modifier_mask {
        key.map(|k| (k, modifier_mask))
    } else {
        None
    }
}

/// Expand `(key, modifier_mask)` back into a macro event sequence: every
/// modifier pressed low-bit-first, the key, the key release, then every
/// modifier released in the same order they were pressed.
///
/// This is not guaranteed to produce byte-identical `macro_entries` to
/// whatever was reduced (press/release ordering of distinct modifiers is
/// not preserved across a round trip), only an equivalent macro per the
/// reducibility invariant.
pub fn expand_from_key_modifier(key: u32, modifier_mask: u32) -> Vec<(u32, u32)> {
    let bits = [
        MODIFIER_LEFTCTRL,
        MODIFIER_LEFTSHIFT,
        MODIFIER_LEFTALT,
        MODIFIER_LEFTMETA,
        MODIFIER_RIGHTCTRL,
        MODIFIER_RIGHTSHIFT,
        MODIFIER_RIGHTALT,
        MODIFIER_RIGHTMETA,
    ];
    let mods: Vec<u32> = bits
        .iter()
        .copied()
        .filter(|b| modifier_mask & b != 0)
        .filter_map(key_for_modifier_bit)
        .collect();

    let mut out = Vec::with_capacity(mods.len() * 2 + 2);
    for &m in &mods {
        out.push((EVENT_PRESS, m));
    }
    out.push((EVENT_PRESS, key));
    out.push((EVENT_RELEASE, key));
    for &m in &mods {
        out.push((EVENT_RELEASE, m));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_K: u32 = 37;

    #[test]
    fn reduces_ctrl_k_shortcut() {
        // press Ctrl, press K, release K, release Ctrl
        let entries = vec![
            (EVENT_PRESS, KEY_LEFTCTRL),
            (EVENT_PRESS, KEY_K),
            (EVENT_RELEASE, KEY_K),
            (EVENT_RELEASE, KEY_LEFTCTRL),
        ];
        assert_eq!(
            reduce_to_key_modifier(&entries),
            Some((KEY_K, MODIFIER_LEFTCTRL))
        );
    }

    #[test]
    fn reduction_is_insensitive_to_release_order() {
        let entries = vec![
            (EVENT_PRESS, KEY_LEFTCTRL),
            (EVENT_PRESS, KEY_LEFTSHIFT),
            (EVENT_PRESS, KEY_K),
            (EVENT_RELEASE, KEY_K),
            (EVENT_RELEASE, KEY_LEFTSHIFT),
            (EVENT_RELEASE, KEY_LEFTCTRL),
        ];
        assert_eq!(
            reduce_to_key_modifier(&entries),
            Some((KEY_K, MODIFIER_LEFTCTRL | MODIFIER_LEFTSHIFT))
        );
    }

    #[test]
    fn wait_event_disqualifies_reduction() {
        let entries = vec![
            (EVENT_PRESS, KEY_LEFTCTRL),
            (EVENT_PRESS, KEY_K),
            (EVENT_WAIT, 50),
            (EVENT_RELEASE, KEY_K),
            (EVENT_RELEASE, KEY_LEFTCTRL),
        ];
        assert_eq!(reduce_to_key_modifier(&entries), None);
    }

    #[test]
    fn two_non_modifier_presses_do_not_reduce() {
        let entries = vec![
            (EVENT_PRESS, KEY_K),
            (EVENT_PRESS, KEY_K + 1),
            (EVENT_RELEASE, KEY_K),
            (EVENT_RELEASE, KEY_K + 1),
        ];
        assert_eq!(reduce_to_key_modifier(&entries), None);
    }

    #[test]
    fn round_trip_modulo_modifier_ordering() {
        let (key, mask) = (KEY_K, MODIFIER_LEFTCTRL | MODIFIER_LEFTALT);
        let expanded = expand_from_key_modifier(key, mask);
        assert_eq!(reduce_to_key_modifier(&expanded), Some((key, mask)));
    }
}
