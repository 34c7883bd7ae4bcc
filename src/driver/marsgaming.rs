/* Mars Gaming MM4-family driver. */
/*                                                                  */
/* Ported from driver-marsgaming.c: a single profile report carries */
/* resolutions, a separate report carries buttons, and polling rate */
/* is stored as a millisecond interval rather than a Hz value.      */

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::device::{ActionType, Color, DeviceInfo, Dpi, LedMode, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const MARSGAMING_MM4_NUM_PROFILES: u32 = 1;
const MARSGAMING_MM4_NUM_RESOLUTIONS: u32 = 5;
const MARSGAMING_MM4_NUM_BUTTONS: u32 = 8;
const MARSGAMING_MM4_NUM_LEDS: u32 = 1;

const MARSGAMING_MM4_RES_MIN: u32 = 100;
const MARSGAMING_MM4_RES_MAX: u32 = 4800;
const MARSGAMING_MM4_RES_SCALING: u32 = 1;

const REPORT_ID_CURRENT_PROFILE: u8 = 0x02;
const REPORT_ID_RESOLUTIONS: u8 = 0x03;
const REPORT_ID_BUTTONS: u8 = 0x04;
const REPORT_ID_LED: u8 = 0x05;
const REPORT_ID_POLLING_INTERVAL: u8 = 0x06;

const REPORT_SIZE: usize = 16;

pub struct MarsGamingDriver {
    /* Cached so `commit` only rewrites resolutions/LED when the profile was
     * touched, mirroring the C driver's per-field dirty tracking. */
    last_report_rate: Option<u32>,
}

impl MarsGamingDriver {
    pub fn new() -> Self {
        Self {
            last_report_rate: None,
        }
    }

    async fn query_current_profile(&self, io: &mut DeviceIo) -> Result<u8> {
        let mut buf = [0u8; 3];
        buf[0] = REPORT_ID_CURRENT_PROFILE;
        let n = io.get_feature_report(&mut buf)?;
        if n < 2 {
            return Ok(0);
        }
        Ok(buf[1])
    }

    async fn query_resolutions(&self, io: &mut DeviceIo) -> Result<[u8; REPORT_SIZE]> {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0] = REPORT_ID_RESOLUTIONS;
        io.get_feature_report(&mut buf)?;
        Ok(buf)
    }

    async fn query_buttons(&self, io: &mut DeviceIo) -> Result<[u8; REPORT_SIZE]> {
        let mut buf = [0u8; REPORT_SIZE];
        buf[0] = REPORT_ID_BUTTONS;
        io.get_feature_report(&mut buf)?;
        Ok(buf)
    }

    async fn query_polling_interval(&self, io: &mut DeviceIo) -> Result<u8> {
        let mut buf = [0u8; 3];
        buf[0] = REPORT_ID_POLLING_INTERVAL;
        let n = io.get_feature_report(&mut buf)?;
        if n < 2 {
            return Ok(1);
        }
        Ok(buf[1].max(1))
    }

    fn set_active_profile_payload(profile_idx: u32) -> [u8; 3] {
        [REPORT_ID_CURRENT_PROFILE, profile_idx as u8, 0]
    }
}

#[async_trait]
impl DeviceDriver for MarsGamingDriver {
    fn name(&self) -> &str {
        "Mars Gaming"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        for &report_id in &[
            REPORT_ID_CURRENT_PROFILE,
            REPORT_ID_RESOLUTIONS,
            REPORT_ID_BUTTONS,
        ] {
            let mut buf = [0u8; 3];
            buf[0] = report_id;
            io.get_feature_report(&mut buf)?;
        }
        debug!("Mars Gaming device probed");
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        let current_profile = self.query_current_profile(io).await.unwrap_or(0);
        let interval = self.query_polling_interval(io).await.unwrap_or(1);
        let report_rate = 1000 / u32::from(interval).max(1);
        self.last_report_rate = Some(report_rate);

        for profile_idx in 0..MARSGAMING_MM4_NUM_PROFILES {
            let mut profile = ProfileInfo {
                index: profile_idx,
                name: String::new(),
                is_active: profile_idx as u8 == current_profile,
                is_enabled: true,
                is_dirty: false,
                capabilities: vec![crate::device::PROFILE_CAP_SET_DEFAULT, crate::device::PROFILE_CAP_DISABLE],
                report_rate,
                report_rates: vec![125, 250, 500, 1000],
                angle_snapping: -1,
                debounce: -1,
                debounces: Vec::new(),
                resolutions: Vec::new(),
                buttons: Vec::new(),
                leds: Vec::new(),
            };

            if let Ok(res_report) = self.query_resolutions(io).await {
                let current_res = res_report[1];
                for res_idx in 0..MARSGAMING_MM4_NUM_RESOLUTIONS {
                    let offset = 2 + (res_idx as usize) * 2;
                    let (xres, yres) = if offset + 1 < REPORT_SIZE {
                        (res_report[offset], res_report[offset + 1])
                    } else {
                        (0, 0)
                    };
                    profile.resolutions.push(crate::device::ResolutionInfo {
                        index: res_idx,
                        is_active: res_idx as u8 == current_res,
                        is_default: res_idx == 0,
                        is_disabled: false,
                        dpi: Dpi::Separate {
                            x: u32::from(xres) * MARSGAMING_MM4_RES_SCALING,
                            y: u32::from(yres) * MARSGAMING_MM4_RES_SCALING,
                        },
                        dpi_list: (MARSGAMING_MM4_RES_MIN..=MARSGAMING_MM4_RES_MAX)
                            .step_by(100)
                            .collect(),
                        capabilities: Vec::new(),
                    });
                }
            } else {
                warn!("Mars Gaming: failed to read resolutions report");
            }

            if let Ok(btn_report) = self.query_buttons(io).await {
                for btn_idx in 0..MARSGAMING_MM4_NUM_BUTTONS {
                    let offset = 1 + btn_idx as usize;
                    let raw = btn_report.get(offset).copied().unwrap_or(0);
                    profile.buttons.push(crate::device::ButtonInfo {
                        index: btn_idx,
                        action_type: if raw == 0 {
                            ActionType::None
                        } else {
                            ActionType::Button
                        },
                        action_types: vec![0, 1, 2, 4],
                        mapping_value: u32::from(raw),
                        macro_entries: Vec::new(),
                    });
                }
            } else {
                warn!("Mars Gaming: failed to read buttons report");
            }

            for led_idx in 0..MARSGAMING_MM4_NUM_LEDS {
                let mut buf = [0u8; 5];
                buf[0] = REPORT_ID_LED;
                let led = if io.get_feature_report(&mut buf).is_ok() {
                    let brightness = buf[1];
                    let breathing_speed = buf[2];
                    let mode = if brightness == 0 {
                        LedMode::Off
                    } else if breathing_speed == 0 || breathing_speed >= 10 {
                        LedMode::Solid
                    } else {
                        LedMode::Breathing
                    };
                    crate::device::LedInfo {
                        index: led_idx,
                        mode,
                        modes: vec![LedMode::Off, LedMode::Solid, LedMode::Breathing],
                        color: Color {
                            red: u32::from(buf[3]),
                            green: u32::from(buf[4]),
                            blue: 0,
                        },
                        secondary_color: Color::default(),
                        tertiary_color: Color::default(),
                        color_depth: 3,
                        effect_duration: u32::from(breathing_speed) * 2000,
                        brightness: u32::from(brightness) * (255 / 3),
                    }
                } else {
                    crate::device::LedInfo {
                        index: led_idx,
                        mode: LedMode::Off,
                        modes: vec![LedMode::Off, LedMode::Solid, LedMode::Breathing],
                        color: Color::default(),
                        secondary_color: Color::default(),
                        tertiary_color: Color::default(),
                        color_depth: 3,
                        effect_duration: 0,
                        brightness: 0,
                    }
                };
                profile.leds.push(led);
            }

            info.profiles.push(profile);
        }

        Ok(())
    }

    async fn commit(&mut self, io: &mut DeviceIo, info: &DeviceInfo) -> Result<()> {
        /* The active profile may have changed between probe and commit; the
         * current implementation only supports one onboard profile but the
         * active flag still needs to be synced so LED changes take effect. */
        let current = self.query_current_profile(io).await.unwrap_or(0);

        for profile in &info.profiles {
            if !profile.is_dirty {
                continue;
            }

            if Some(profile.report_rate) != self.last_report_rate {
                let interval = (1000 / profile.report_rate.max(1)).clamp(1, 255) as u8;
                io.set_feature_report(&[REPORT_ID_POLLING_INTERVAL, interval, 0])?;
                self.last_report_rate = Some(profile.report_rate);
            }

            if profile.resolutions.iter().any(|_| true) {
                let mut buf = [0u8; REPORT_SIZE];
                buf[0] = REPORT_ID_RESOLUTIONS;
                buf[1] = profile
                    .resolutions
                    .iter()
                    .find(|r| r.is_active)
                    .map(|r| r.index as u8)
                    .unwrap_or(0);
                for res in &profile.resolutions {
                    let offset = 2 + (res.index as usize) * 2;
                    if offset + 1 >= REPORT_SIZE {
                        continue;
                    }
                    match res.dpi {
                        Dpi::Separate { x, y } => {
                            buf[offset] = x.min(255) as u8;
                            buf[offset + 1] = y.min(255) as u8;
                        }
                        Dpi::Unified(v) => {
                            buf[offset] = v.min(255) as u8;
                            buf[offset + 1] = v.min(255) as u8;
                        }
                        Dpi::Unknown => {}
                    }
                }
                io.set_feature_report(&buf)?;
            }

            if !profile.buttons.is_empty() {
                let mut buf = [0u8; REPORT_SIZE];
                buf[0] = REPORT_ID_BUTTONS;
                for btn in &profile.buttons {
                    let offset = 1 + btn.index as usize;
                    if offset < REPORT_SIZE {
                        buf[offset] = btn.mapping_value.min(255) as u8;
                    }
                }
                io.set_feature_report(&buf)?;
            }

            if let Some(led) = profile.leds.first() {
                let rgb = led.color.to_rgb();
                let brightness = (led.brightness * 3 / 255).min(3) as u8;
                let breathing_speed = if led.mode == LedMode::Breathing {
                    (led.effect_duration / 2000).clamp(1, 9) as u8
                } else {
                    0
                };
                io.set_feature_report(&[
                    REPORT_ID_LED,
                    brightness,
                    breathing_speed,
                    rgb.r,
                    rgb.g,
                ])?;
            }

            if profile.index as u8 != current {
                io.set_feature_report(&Self::set_active_profile_payload(profile.index))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_active_profile_payload_targets_report_id() {
        let payload = MarsGamingDriver::set_active_profile_payload(2);
        assert_eq!(payload[0], REPORT_ID_CURRENT_PROFILE);
        assert_eq!(payload[1], 2);
    }
}
