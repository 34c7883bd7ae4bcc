/* Button action types exposed over DBus. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ActionType {
    None = 0,
    Button = 1,
    Special = 2,
    Key = 3,
    Macro = 4,
    Unknown = 1000,
}

/* Compact RGB color used for LED effect payloads. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/* Color as an RGB triplet exposed over DBus (u32 fields for compatibility). */
#[derive(Debug, Clone, Copy, Default)]
pub struct Color {
    pub red: u32,
    pub green: u32,
    pub blue: u32,
}

impl Color {
    /* Convert a DBus Color into a compact RgbColor, clamping to u8 range. */
    pub fn to_rgb(self) -> RgbColor {
        RgbColor {
            r: self.red.min(255) as u8,
            g: self.green.min(255) as u8,
            b: self.blue.min(255) as u8,
        }
    }

    /* Build a DBus Color from a compact RgbColor. */
    pub fn from_rgb(rgb: RgbColor) -> Self {
        Self {
            red: u32::from(rgb.r),
            green: u32::from(rgb.g),
            blue: u32::from(rgb.b),
        }
    }
}

/* LED effect modes matching the HID++ 2.0 protocol values. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LedMode {
    Off = 0,
    Solid = 1,
    Cycle = 3,
    ColorWave = 4,
    Starlight = 5,
    Breathing = 10,
    TriColor = 32,
}

impl ActionType {
    /* Convert a raw DBus u32 discriminant into an ActionType, mapping anything
     * unrecognised to `Unknown` rather than rejecting the write outright. */
    pub fn from_u32(val: u32) -> ActionType {
        match val {
            0 => ActionType::None,
            1 => ActionType::Button,
            2 => ActionType::Special,
            3 => ActionType::Key,
            4 => ActionType::Macro,
            _ => ActionType::Unknown,
        }
    }
}

impl LedMode {
    /* Convert a raw DBus u32 value into a LedMode. */
    pub fn from_u32(val: u32) -> Option<LedMode> {
        match val {
            0 => Some(LedMode::Off),
            1 => Some(LedMode::Solid),
            3 => Some(LedMode::Cycle),
            4 => Some(LedMode::ColorWave),
            5 => Some(LedMode::Starlight),
            10 => Some(LedMode::Breathing),
            32 => Some(LedMode::TriColor),
            _ => None,
        }
    }
}

/* Resolution value, either unified or per-axis. */
#[derive(Debug, Clone, Copy)]
pub enum Dpi {
    Unified(u32),
    Separate { x: u32, y: u32 },
    /* Placeholder used while a driver is still populating a resolution
     * slot during probe; never observed after a successful probe. */
    Unknown,
}

/* Device state synced from hardware. */
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub sysname: String,
    pub name: String,
    pub model: String,
    pub firmware_version: String,
    pub profiles: Vec<ProfileInfo>,
}

/* Maximum number of entries a generated DPI list may hold, matching the cap on
 * the `au` property's practical size over the bus. */
const MAX_DPI_ENTRIES: usize = 300;

/* Step size to use below each threshold: finer increments at low DPI, where
 * small changes matter more to aim, coarsening as DPI climbs. */
fn dpi_step_at(value: u32) -> u32 {
    if value < 1000 {
        50
    } else if value < 2600 {
        100
    } else if value < 5000 {
        200
    } else {
        500
    }
}

/* Generate a DPI list from `min` to `max` using the piecewise step table,
 * truncated to `MAX_DPI_ENTRIES` if the range would otherwise overflow it. */
fn piecewise_dpi_list(min: u32, max: u32) -> Vec<u32> {
    let mut list = Vec::new();
    let mut value = min;
    while value <= max && list.len() < MAX_DPI_ENTRIES {
        list.push(value);
        value += dpi_step_at(value);
    }
    list
}

impl DeviceInfo {
    /* Translate a numeric bustype from HID_ID into the string used in `.device` files. */
    fn bustype_to_string(bustype: u16) -> String {
        match bustype {
            0x03 => "usb".to_string(),
            0x05 => "bluetooth".to_string(),
            _ => format!("{:04x}", bustype),
        }
    }

    /* Build a `DeviceInfo` struct from a matched `DeviceEntry` and detected hardware props. */
    pub fn from_entry(
        sysname: &str,
        name: &str,
        bustype: u16,
        vid: u16,
        pid: u16,
        entry: &crate::device_database::DeviceEntry,
    ) -> Self {
        let bus_str = Self::bustype_to_string(bustype);
        let model = format!("{}:{:04x}:{:04x}:0", bus_str, vid, pid);

        /* Use the driver config to determine the number of profiles, buttons, etc. */
        let num_profiles = entry
            .driver_config
            .as_ref()
            .and_then(|c| c.profiles)
            .unwrap_or(1) as usize;
        let num_buttons = entry
            .driver_config
            .as_ref()
            .and_then(|c| c.buttons)
            .unwrap_or(0) as usize;
        let num_leds = entry
            .driver_config
            .as_ref()
            .and_then(|c| c.leds)
            .unwrap_or(0) as usize;
        let num_dpis = entry
            .driver_config
            .as_ref()
            .and_then(|c| c.dpis)
            .unwrap_or(1) as usize;

        /* Build DPI list from the range specification if available. Devices that
         * report a step of 0 (i.e. "pick reasonable values for me") get the
         * piecewise table real mice use: finer resolution at the low end, coarser
         * steps once values get silly, capped so the list stays bus-message-sized. */
        let dpi_list: Vec<u32> = entry
            .driver_config
            .as_ref()
            .and_then(|c| c.dpi_range.as_ref())
            .map(|r| {
                if r.step == 0 {
                    piecewise_dpi_list(r.min, r.max)
                } else {
                    (r.min..=r.max).step_by(r.step as usize).collect()
                }
            })
            .unwrap_or_else(|| vec![800, 1600]);

        let profiles: Vec<ProfileInfo> = (0..num_profiles as u32)
            .map(|idx| ProfileInfo {
                index: idx,
                name: String::new(),
                is_active: idx == 0,
                is_enabled: true,
                is_dirty: false,
                capabilities: vec![PROFILE_CAP_SET_DEFAULT, PROFILE_CAP_DISABLE],
                report_rate: 1000,
                report_rates: vec![125, 250, 500, 1000],
                angle_snapping: -1,
                debounce: -1,
                debounces: Vec::new(),
                resolutions: (0..num_dpis as u32)
                    .map(|ri| ResolutionInfo {
                        index: ri,
                        dpi: Dpi::Unified(800),
                        dpi_list: dpi_list.clone(),
                        capabilities: Vec::new(),
                        is_active: ri == 0,
                        is_default: ri == 0,
                        is_disabled: false,
                    })
                    .collect(),
                buttons: (0..num_buttons as u32)
                    .map(|bi| ButtonInfo {
                        index: bi,
                        action_type: ActionType::Button,
                        action_types: vec![0, 1, 2, 3, 4],
                        mapping_value: bi,
                        macro_entries: Vec::new(),
                    })
                    .collect(),
                leds: (0..num_leds as u32)
                    .map(|li| LedInfo {
                        index: li,
                        mode: LedMode::Off,
                        modes: vec![
                            LedMode::Off,
                            LedMode::Solid,
                            LedMode::Cycle,
                            LedMode::ColorWave,
                            LedMode::Starlight,
                            LedMode::Breathing,
                            LedMode::TriColor,
                        ],
                        color: Color::default(),
                        secondary_color: Color::default(),
                        tertiary_color: Color::default(),
                        color_depth: 1,
                        effect_duration: 0,
                        brightness: 255,
                    })
                    .collect(),
            })
            .collect();

        Self {
            sysname: sysname.to_string(),
            name: name.to_string(),
            model,
            firmware_version: String::new(),
            profiles,
        }
    }
}

/* Profile state. */
#[derive(Debug, Clone)]
pub struct ProfileInfo {
    pub index: u32,
    pub name: String,
    pub is_active: bool,
    pub is_enabled: bool,
    pub is_dirty: bool,
    pub capabilities: Vec<u32>,
    pub report_rate: u32,
    pub report_rates: Vec<u32>,
    pub angle_snapping: i32,
    pub debounce: i32,
    pub debounces: Vec<u32>,
    pub resolutions: Vec<ResolutionInfo>,
    pub buttons: Vec<ButtonInfo>,
    pub leds: Vec<LedInfo>,
}

/* Resolution capability bits, matching the bus-exposed capability enum. Controls
 * whether `set_dpi` may pass asymmetric x/y and whether `set_disabled` is permitted
 * at all, per the resolution invariants in the broker's error handling design. */
pub const RESOLUTION_CAP_DISABLE: u32 = 1;
pub const RESOLUTION_CAP_SEPARATE_XY: u32 = 2;

/* Profile capability bits. `PROFILE_CAP_DISABLE` gates `Profile.Disabled`;
 * `PROFILE_CAP_SET_DEFAULT` and `PROFILE_CAP_WRITE_ONLY` are surfaced to
 * clients but not otherwise enforced by the broker. */
pub const PROFILE_CAP_SET_DEFAULT: u32 = 1;
pub const PROFILE_CAP_DISABLE: u32 = 2;
pub const PROFILE_CAP_WRITE_ONLY: u32 = 4;

/* Resolution state. */
#[derive(Debug, Clone)]
pub struct ResolutionInfo {
    pub index: u32,
    pub dpi: Dpi,
    pub dpi_list: Vec<u32>,
    pub capabilities: Vec<u32>,
    pub is_active: bool,
    pub is_default: bool,
    pub is_disabled: bool,
}

impl ResolutionInfo {
    pub fn has_capability(&self, cap: u32) -> bool {
        self.capabilities.contains(&cap)
    }
}

/* Button mapping state. */
#[derive(Debug, Clone)]
pub struct ButtonInfo {
    pub index: u32,
    pub action_type: ActionType,
    pub action_types: Vec<u32>,
    pub mapping_value: u32,
    pub macro_entries: Vec<(u32, u32)>,
}

/* LED state. */
#[derive(Debug, Clone)]
pub struct LedInfo {
    pub index: u32,
    pub mode: LedMode,
    pub modes: Vec<LedMode>,
    pub color: Color,
    pub secondary_color: Color,
    pub tertiary_color: Color,
    pub color_depth: u32,
    pub effect_duration: u32,
    pub brightness: u32,
}

impl DeviceInfo {
    /* Look up a profile by its stored `.index`, not its position in the
     * vector: indices are driver-assigned and may be sparse. */
    pub fn find_profile(&self, index: u32) -> Option<&ProfileInfo> {
        self.profiles.iter().find(|p| p.index == index)
    }

    pub fn find_profile_mut(&mut self, index: u32) -> Option<&mut ProfileInfo> {
        self.profiles.iter_mut().find(|p| p.index == index)
    }

    /* True once every entity under this device has its dirty flag clear;
     * used after a commit completes to confirm the sanity-check invariant. */
    pub fn is_clean(&self) -> bool {
        self.profiles.iter().all(|p| !p.is_dirty)
    }

    /// Run once, immediately after `probe`/`load_profiles`: verifies the
    /// driver populated a model honoring the quiescent-point invariants a
    /// linked device must hold. Failure means the driver broke its contract;
    /// the caller logs it as a bug and drops the candidate rather than
    /// linking it onto the bus.
    pub fn sanity_check(&self) -> Result<(), crate::error::RatbagError> {
        use crate::error::RatbagError;

        if self.profiles.is_empty() || self.profiles.len() > 16 {
            return Err(RatbagError::Implementation(format!(
                "{}: num_profiles {} out of range [1,16]",
                self.sysname,
                self.profiles.len()
            )));
        }

        let active_count = self.profiles.iter().filter(|p| p.is_active).count();
        if active_count != 1 {
            return Err(RatbagError::Implementation(format!(
                "{}: expected exactly one active profile, found {}",
                self.sysname, active_count
            )));
        }

        for profile in &self.profiles {
            if profile.resolutions.len() > 16 {
                return Err(RatbagError::Implementation(format!(
                    "{}: profile {} has {} resolutions, exceeds 16",
                    self.sysname,
                    profile.index,
                    profile.resolutions.len()
                )));
            }
            for res in &profile.resolutions {
                if res.dpi_list.is_empty() {
                    return Err(RatbagError::Implementation(format!(
                        "{}: profile {} resolution {} has an empty DPI list",
                        self.sysname, profile.index, res.index
                    )));
                }
            }
            if profile.report_rates.is_empty() {
                return Err(RatbagError::Implementation(format!(
                    "{}: profile {} has an empty report-rate list",
                    self.sysname, profile.index
                )));
            }
            if profile.is_dirty {
                return Err(RatbagError::Implementation(format!(
                    "{}: profile {} is already dirty right after probe",
                    self.sysname, profile.index
                )));
            }
        }

        Ok(())
    }
}

impl ProfileInfo {
    pub fn has_capability(&self, cap: u32) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn find_resolution(&self, index: u32) -> Option<&ResolutionInfo> {
        self.resolutions.iter().find(|r| r.index == index)
    }

    pub fn find_resolution_mut(&mut self, index: u32) -> Option<&mut ResolutionInfo> {
        self.resolutions.iter_mut().find(|r| r.index == index)
    }

    pub fn find_button(&self, index: u32) -> Option<&ButtonInfo> {
        self.buttons.iter().find(|b| b.index == index)
    }

    pub fn find_button_mut(&mut self, index: u32) -> Option<&mut ButtonInfo> {
        self.buttons.iter_mut().find(|b| b.index == index)
    }

    pub fn find_led(&self, index: u32) -> Option<&LedInfo> {
        self.leds.iter().find(|l| l.index == index)
    }

    pub fn find_led_mut(&mut self, index: u32) -> Option<&mut LedInfo> {
        self.leds.iter_mut().find(|l| l.index == index)
    }
}

impl ButtonInfo {
    /// If this button's macro is just a modifier shortcut (e.g. Ctrl+K),
    /// return it as `(key, modifier_mask)` instead of the raw event sequence.
    pub fn shortcut(&self) -> Option<(u32, u32)> {
        if self.action_type != ActionType::Macro {
            return None;
        }
        crate::macro_model::reduce_to_key_modifier(&self.macro_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile(index: u32) -> ProfileInfo {
        ProfileInfo {
            index,
            name: String::new(),
            is_active: index == 0,
            is_enabled: true,
            is_dirty: false,
            capabilities: vec![PROFILE_CAP_SET_DEFAULT, PROFILE_CAP_DISABLE],
            report_rate: 1000,
            report_rates: vec![125, 250, 500, 1000],
            angle_snapping: -1,
            debounce: -1,
            debounces: Vec::new(),
            resolutions: vec![ResolutionInfo {
                index: 0,
                dpi: Dpi::Unified(800),
                dpi_list: vec![400, 800, 1600],
                capabilities: Vec::new(),
                is_active: true,
                is_default: true,
                is_disabled: false,
            }],
            buttons: vec![ButtonInfo {
                index: 0,
                action_type: ActionType::Button,
                action_types: vec![0, 1, 2, 3, 4],
                mapping_value: 1,
                macro_entries: Vec::new(),
            }],
            leds: Vec::new(),
        }
    }

    #[test]
    fn find_profile_looks_up_by_index_not_position() {
        let info = DeviceInfo {
            sysname: "test".into(),
            name: "Test".into(),
            model: "usb:0000:0000:0".into(),
            firmware_version: String::new(),
            profiles: vec![sample_profile(3), sample_profile(0)],
        };
        assert!(info.find_profile(3).is_some());
        assert!(info.find_profile(1).is_none());
    }

    #[test]
    fn find_resolution_and_button_round_trip() {
        let profile = sample_profile(0);
        assert!(profile.find_resolution(0).is_some());
        assert!(profile.find_button(0).is_some());
        assert!(profile.find_led(0).is_none());
    }

    #[test]
    fn action_type_from_u32_unknown_fallback() {
        assert_eq!(ActionType::from_u32(4), ActionType::Macro);
        assert_eq!(ActionType::from_u32(999), ActionType::Unknown);
    }

    #[test]
    fn is_clean_reflects_dirty_profiles() {
        let mut info = DeviceInfo {
            sysname: "test".into(),
            name: "Test".into(),
            model: "usb:0000:0000:0".into(),
            firmware_version: String::new(),
            profiles: vec![sample_profile(0)],
        };
        assert!(info.is_clean());
        info.profiles[0].is_dirty = true;
        assert!(!info.is_clean());
    }

    #[test]
    fn button_shortcut_reduces_ctrl_k_macro() {
        const KEY_LEFTCTRL: u32 = 29;
        const KEY_K: u32 = 37;
        let mut button = sample_profile(0).buttons.remove(0);
        button.action_type = ActionType::Macro;
        button.macro_entries = vec![
            (0, KEY_LEFTCTRL), // press
            (0, KEY_K),        // press
            (1, KEY_K),        // release
            (1, KEY_LEFTCTRL), // release
        ];
        assert_eq!(
            button.shortcut(),
            Some((KEY_K, crate::macro_model::MODIFIER_LEFTCTRL))
        );
    }

    #[test]
    fn button_shortcut_none_for_non_macro_action() {
        let button = sample_profile(0).buttons.remove(0);
        assert_eq!(button.shortcut(), None);
    }

    #[test]
    fn piecewise_dpi_list_uses_finer_steps_at_low_end() {
        let list = piecewise_dpi_list(800, 1200);
        assert_eq!(list, vec![800, 850, 900, 950, 1000, 1100, 1200]);
    }

    #[test]
    fn piecewise_dpi_list_caps_at_max_entries() {
        let list = piecewise_dpi_list(50, 1_000_000);
        assert!(list.len() <= MAX_DPI_ENTRIES);
    }

    fn sample_device(profiles: Vec<ProfileInfo>) -> DeviceInfo {
        DeviceInfo {
            sysname: "test".into(),
            name: "Test".into(),
            model: "usb:0000:0000:0".into(),
            firmware_version: String::new(),
            profiles,
        }
    }

    #[test]
    fn sanity_check_passes_for_well_formed_device() {
        let info = sample_device(vec![sample_profile(0)]);
        assert!(info.sanity_check().is_ok());
    }

    #[test]
    fn sanity_check_rejects_zero_profiles() {
        let info = sample_device(Vec::new());
        assert!(info.sanity_check().is_err());
    }

    #[test]
    fn sanity_check_rejects_no_active_profile() {
        let mut profile = sample_profile(0);
        profile.is_active = false;
        let info = sample_device(vec![profile]);
        assert!(info.sanity_check().is_err());
    }

    #[test]
    fn sanity_check_rejects_two_active_profiles() {
        let mut a = sample_profile(0);
        let mut b = sample_profile(1);
        a.is_active = true;
        b.is_active = true;
        let info = sample_device(vec![a, b]);
        assert!(info.sanity_check().is_err());
    }

    #[test]
    fn sanity_check_rejects_empty_dpi_list() {
        let mut profile = sample_profile(0);
        profile.resolutions[0].dpi_list.clear();
        let info = sample_device(vec![profile]);
        assert!(info.sanity_check().is_err());
    }

    #[test]
    fn sanity_check_rejects_empty_report_rates() {
        let mut profile = sample_profile(0);
        profile.report_rates.clear();
        let info = sample_device(vec![profile]);
        assert!(info.sanity_check().is_err());
    }

    #[test]
    fn sanity_check_rejects_already_dirty_profile() {
        let mut profile = sample_profile(0);
        profile.is_dirty = true;
        let info = sample_device(vec![profile]);
        assert!(info.sanity_check().is_err());
    }
}
