/* Synthetic test device support for the `dev-hooks` feature: parses the JSON fixture format
 * accepted by `LoadTestDevice` and turns it into an in-memory `DeviceInfo`, bypassing hardware
 * entirely. Only compiled when `--features dev-hooks` is set. */

pub mod spec {
    use serde::Deserialize;

    use crate::device::{
        ActionType, ButtonInfo, Color, DeviceInfo, Dpi, LedInfo, LedMode, ProfileInfo,
        ResolutionInfo,
    };

    /// One `buttons[]` entry in a profile fixture.
    ///
    /// At most one of `button`, `special`, `key`, or `macro_keys` should be set;
    /// which one is consulted depends on `action_type`. Unset fields default to 0 / empty.
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct ButtonFixture {
        pub action_type: u32,
        pub button: u32,
        pub special: u32,
        pub key: u32,
        #[serde(rename = "macro")]
        pub macro_keys: Vec<u32>,
    }

    /// One `resolutions[]` entry in a profile fixture.
    #[derive(Debug, Deserialize)]
    #[serde(default)]
    pub struct ResolutionFixture {
        pub xres: u32,
        pub yres: u32,
        pub dpi_min: u32,
        pub dpi_max: u32,
        pub is_active: bool,
        pub is_default: bool,
        pub is_disabled: bool,
    }

    impl Default for ResolutionFixture {
        fn default() -> Self {
            Self {
                xres: 1000,
                yres: 1000,
                dpi_min: 1000,
                dpi_max: 1000,
                is_active: false,
                is_default: false,
                is_disabled: false,
            }
        }
    }

    /// One `leds[]` entry in a profile fixture.
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct LedFixture {
        pub mode: u32,
        pub red: u32,
        pub green: u32,
        pub blue: u32,
        pub brightness: u32,
    }

    /// One `profiles[]` entry in a device fixture.
    #[derive(Debug, Deserialize)]
    #[serde(default)]
    pub struct ProfileFixture {
        pub name: String,
        pub buttons: Vec<ButtonFixture>,
        pub resolutions: Vec<ResolutionFixture>,
        pub leds: Vec<LedFixture>,
        pub disabled: bool,
        pub active: bool,
        pub default: bool,
        pub hz: u32,
        pub report_rates: Vec<u32>,
    }

    impl Default for ProfileFixture {
        fn default() -> Self {
            Self {
                name: String::new(),
                buttons: vec![ButtonFixture {
                    action_type: 1,
                    button: 0,
                    special: 0,
                    key: 0,
                    macro_keys: Vec::new(),
                }],
                resolutions: vec![ResolutionFixture::default()],
                leds: Vec::new(),
                disabled: false,
                active: true,
                default: true,
                hz: 1000,
                report_rates: vec![1000],
            }
        }
    }

    /// Top-level fixture accepted by `LoadTestDevice`.
    ///
    /// `num_profiles`/`num_resolutions`/`num_buttons`/`num_leds` mirror the C schema's
    /// advisory counts but are not load-bearing here: the `profiles` array (or its
    /// per-profile `resolutions`/`buttons`/`leds` arrays, when present) is authoritative.
    /// Unknown keys are ignored by `serde`'s default behaviour.
    #[derive(Debug, Deserialize)]
    #[serde(default)]
    pub struct Fixture {
        pub num_profiles: u32,
        pub num_resolutions: u32,
        pub num_buttons: u32,
        pub num_leds: u32,
        pub profiles: Vec<ProfileFixture>,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                num_profiles: 1,
                num_resolutions: 1,
                num_buttons: 1,
                num_leds: 0,
                profiles: vec![ProfileFixture::default()],
            }
        }
    }

    /// Parse a `LoadTestDevice` JSON payload into a [`Fixture`].
    ///
    /// The empty string is treated as `"{}"`, producing the minimum sane
    /// one-profile device per the Manager interface's documented default.
    pub fn parse_json(json: &str) -> Result<Fixture, serde_json::Error> {
        let json = if json.trim().is_empty() { "{}" } else { json };
        serde_json::from_str(json)
    }

    fn build_button(fixture: &ButtonFixture, index: u32) -> ButtonInfo {
        let action_type = ActionType::from_u32(fixture.action_type);
        let mapping_value = match action_type {
            ActionType::Button => fixture.button,
            ActionType::Special => fixture.special,
            ActionType::Key => fixture.key,
            ActionType::Macro => fixture.macro_keys.first().copied().unwrap_or(0),
            _ => 0,
        };
        ButtonInfo {
            index,
            action_type,
            action_types: vec![0, 1, 2, 3, 4],
            mapping_value,
            macro_entries: fixture
                .macro_keys
                .iter()
                .map(|&code| (0u32, code))
                .collect(),
        }
    }

    fn build_resolution(fixture: &ResolutionFixture, index: u32) -> ResolutionInfo {
        let dpi = if fixture.xres == fixture.yres {
            Dpi::Unified(fixture.xres)
        } else {
            Dpi::Separate {
                x: fixture.xres,
                y: fixture.yres,
            }
        };
        let dpi_list = if fixture.dpi_min == fixture.dpi_max {
            vec![fixture.dpi_min]
        } else {
            (fixture.dpi_min..=fixture.dpi_max)
                .step_by(50)
                .collect()
        };
        ResolutionInfo {
            index,
            dpi,
            dpi_list,
            capabilities: Vec::new(),
            is_active: fixture.is_active,
            is_default: fixture.is_default,
            is_disabled: fixture.is_disabled,
        }
    }

    fn build_led(fixture: &LedFixture, index: u32) -> LedInfo {
        LedInfo {
            index,
            mode: LedMode::from_u32(fixture.mode).unwrap_or(LedMode::Off),
            modes: vec![
                LedMode::Off,
                LedMode::Solid,
                LedMode::Cycle,
                LedMode::ColorWave,
                LedMode::Starlight,
                LedMode::Breathing,
                LedMode::TriColor,
            ],
            color: Color {
                red: fixture.red,
                green: fixture.green,
                blue: fixture.blue,
            },
            secondary_color: Color::default(),
            tertiary_color: Color::default(),
            color_depth: 1,
            effect_duration: 0,
            brightness: fixture.brightness,
        }
    }

    fn build_profile(fixture: &ProfileFixture, index: u32) -> ProfileInfo {
        ProfileInfo {
            index,
            name: fixture.name.clone(),
            is_active: fixture.active,
            is_enabled: !fixture.disabled,
            is_dirty: false,
            capabilities: vec![
                crate::device::PROFILE_CAP_SET_DEFAULT,
                crate::device::PROFILE_CAP_DISABLE,
            ],
            report_rate: fixture.hz,
            report_rates: if fixture.report_rates.is_empty() {
                vec![fixture.hz]
            } else {
                fixture.report_rates.clone()
            },
            angle_snapping: -1,
            debounce: -1,
            debounces: Vec::new(),
            resolutions: fixture
                .resolutions
                .iter()
                .enumerate()
                .map(|(i, r)| build_resolution(r, i as u32))
                .collect(),
            buttons: fixture
                .buttons
                .iter()
                .enumerate()
                .map(|(i, b)| build_button(b, i as u32))
                .collect(),
            leds: fixture
                .leds
                .iter()
                .enumerate()
                .map(|(i, l)| build_led(l, i as u32))
                .collect(),
        }
    }

    /// Turn a parsed [`Fixture`] into a `DeviceInfo` for the given sysname.
    ///
    /// Every `profiles[]` entry becomes a `ProfileInfo`; the top-level `num_*`
    /// counts are advisory only and do not truncate or pad the array.
    pub fn build_device_info(sysname: &str, spec: Fixture) -> DeviceInfo {
        let profiles = spec
            .profiles
            .iter()
            .enumerate()
            .map(|(i, p)| build_profile(p, i as u32))
            .collect();

        DeviceInfo {
            sysname: sysname.to_string(),
            name: "Test device".to_string(),
            model: "test:0000:0000:0".to_string(),
            firmware_version: String::new(),
            profiles,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn empty_string_produces_minimum_device() {
            let spec = parse_json("").expect("empty string parses");
            let device = build_device_info("testdevice0", spec);
            assert_eq!(device.profiles.len(), 1);
            assert_eq!(device.profiles[0].buttons.len(), 1);
            assert_eq!(device.profiles[0].resolutions.len(), 1);
        }

        #[test]
        fn unknown_keys_are_ignored() {
            let json = r#"{"bogus_field": 42, "profiles": []}"#;
            let spec = parse_json(json).expect("unknown keys don't fail parsing");
            assert!(spec.profiles.is_empty());
        }

        #[test]
        fn custom_fixture_builds_matching_device() {
            let json = r#"{
                "profiles": [
                    {
                        "name": "Custom",
                        "active": true,
                        "hz": 500,
                        "report_rates": [125, 500],
                        "buttons": [
                            {"action_type": 2, "special": 3}
                        ],
                        "resolutions": [
                            {"xres": 1600, "yres": 1600, "dpi_min": 400, "dpi_max": 3200, "is_active": true}
                        ],
                        "leds": [
                            {"mode": 1, "red": 255, "green": 0, "blue": 0, "brightness": 128}
                        ]
                    }
                ]
            }"#;
            let spec = parse_json(json).expect("valid json parses");
            let device = build_device_info("testdevice1", spec);

            assert_eq!(device.profiles.len(), 1);
            let profile = &device.profiles[0];
            assert_eq!(profile.name, "Custom");
            assert_eq!(profile.report_rate, 500);
            assert_eq!(profile.report_rates, vec![125, 500]);

            let button = &profile.buttons[0];
            assert_eq!(button.action_type, ActionType::Special);
            assert_eq!(button.mapping_value, 3);

            let resolution = &profile.resolutions[0];
            match resolution.dpi {
                Dpi::Unified(v) => assert_eq!(v, 1600),
                _ => panic!("expected unified dpi"),
            }
            assert!(resolution.is_active);

            let led = &profile.leds[0];
            assert_eq!(led.mode, LedMode::Solid);
            assert_eq!(led.color.red, 255);
        }

        #[test]
        fn invalid_json_is_rejected() {
            assert!(parse_json("{not json").is_err());
        }
    }
}
