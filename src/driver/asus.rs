/* Asus ROG mouse driver (Gladius/Pugio-family feature-report protocol). */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::device::{ActionType, Color, DeviceInfo, Dpi, LedMode, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const ASUS_NUM_PROFILES: u32 = 3;
const ASUS_NUM_BUTTONS: u32 = 8;
const ASUS_NUM_DPI: u32 = 2;

const ASUS_REPORT_ID_SETTINGS: u8 = 0x50;
const ASUS_REPORT_ID_DPI: u8 = 0x51;
const ASUS_REPORT_ID_BUTTONS: u8 = 0x52;
const ASUS_REPORT_ID_LED: u8 = 0x53;
const ASUS_REPORT_ID_PROFILE: u8 = 0x54;

const ASUS_REPORT_SIZE: usize = 64;

pub struct AsusDriver {
    active_profile: u8,
}

impl AsusDriver {
    pub fn new() -> Self {
        Self { active_profile: 0 }
    }

    async fn read_active_profile(&self, io: &mut DeviceIo) -> Result<u8> {
        let mut buf = [0u8; ASUS_REPORT_SIZE];
        buf[0] = ASUS_REPORT_ID_PROFILE;
        io.get_feature_report(&mut buf)
            .context("failed to read active profile report")?;
        Ok(buf[1])
    }

    async fn read_dpi(&self, io: &mut DeviceIo, profile_idx: u8) -> Result<[u8; ASUS_REPORT_SIZE]> {
        let mut buf = [0u8; ASUS_REPORT_SIZE];
        buf[0] = ASUS_REPORT_ID_DPI;
        buf[1] = profile_idx;
        io.get_feature_report(&mut buf)
            .context("failed to read DPI report")?;
        Ok(buf)
    }

    async fn read_buttons(
        &self,
        io: &mut DeviceIo,
        profile_idx: u8,
    ) -> Result<[u8; ASUS_REPORT_SIZE]> {
        let mut buf = [0u8; ASUS_REPORT_SIZE];
        buf[0] = ASUS_REPORT_ID_BUTTONS;
        buf[1] = profile_idx;
        io.get_feature_report(&mut buf)
            .context("failed to read button report")?;
        Ok(buf)
    }

    async fn read_led(&self, io: &mut DeviceIo, profile_idx: u8) -> Result<[u8; ASUS_REPORT_SIZE]> {
        let mut buf = [0u8; ASUS_REPORT_SIZE];
        buf[0] = ASUS_REPORT_ID_LED;
        buf[1] = profile_idx;
        io.get_feature_report(&mut buf)
            .context("failed to read LED report")?;
        Ok(buf)
    }
}

#[async_trait]
impl DeviceDriver for AsusDriver {
    fn name(&self) -> &str {
        "Asus ROG"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; ASUS_REPORT_SIZE];
        buf[0] = ASUS_REPORT_ID_SETTINGS;
        io.get_feature_report(&mut buf)
            .context("Asus settings probe failed")?;
        debug!("Asus ROG device probed");
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        self.active_profile = self.read_active_profile(io).await.unwrap_or(0);

        for profile_idx in 0..ASUS_NUM_PROFILES as u8 {
            let mut profile = ProfileInfo {
                index: u32::from(profile_idx),
                name: format!("Profile {}", profile_idx + 1),
                is_active: profile_idx == self.active_profile,
                is_enabled: true,
                is_dirty: false,
                capabilities: vec![crate::device::PROFILE_CAP_SET_DEFAULT, crate::device::PROFILE_CAP_DISABLE],
                report_rate: 1000,
                report_rates: vec![125, 250, 500, 1000],
                angle_snapping: -1,
                debounce: -1,
                debounces: Vec::new(),
                resolutions: Vec::new(),
                buttons: Vec::new(),
                leds: Vec::new(),
            };

            if let Ok(dpi_report) = self.read_dpi(io, profile_idx).await {
                let current_dpi_idx = dpi_report[2];
                for dpi_idx in 0..ASUS_NUM_DPI {
                    let offset = 3 + (dpi_idx as usize) * 2;
                    let raw = u16::from_le_bytes([dpi_report[offset], dpi_report[offset + 1]]);
                    profile.resolutions.push(crate::device::ResolutionInfo {
                        index: dpi_idx,
                        dpi: Dpi::Unified(u32::from(raw) * 50),
                        dpi_list: (50..=16000u32).step_by(50).collect(),
                        capabilities: Vec::new(),
                        is_active: dpi_idx as u8 == current_dpi_idx,
                        is_default: dpi_idx == 0,
                        is_disabled: false,
                    });
                }
            } else {
                warn!("Asus: failed to read DPI for profile {profile_idx}");
            }

            if let Ok(btn_report) = self.read_buttons(io, profile_idx).await {
                for btn_idx in 0..ASUS_NUM_BUTTONS {
                    let raw = btn_report.get(2 + btn_idx as usize).copied().unwrap_or(0);
                    let (action_type, mapping_value) = match raw {
                        0 => (ActionType::None, 0),
                        1..=5 => (ActionType::Button, u32::from(raw)),
                        _ => (ActionType::Special, u32::from(raw)),
                    };
                    profile.buttons.push(crate::device::ButtonInfo {
                        index: btn_idx,
                        action_type,
                        action_types: vec![0, 1, 2, 3, 4],
                        mapping_value,
                        macro_entries: Vec::new(),
                    });
                }
            } else {
                warn!("Asus: failed to read buttons for profile {profile_idx}");
            }

            if let Ok(led_report) = self.read_led(io, profile_idx).await {
                profile.leds.push(crate::device::LedInfo {
                    index: 0,
                    mode: LedMode::from_u32(u32::from(led_report[2])).unwrap_or(LedMode::Solid),
                    modes: vec![LedMode::Off, LedMode::Solid, LedMode::Breathing, LedMode::Cycle],
                    color: Color {
                        red: u32::from(led_report[3]),
                        green: u32::from(led_report[4]),
                        blue: u32::from(led_report[5]),
                    },
                    secondary_color: Color::default(),
                    tertiary_color: Color::default(),
                    color_depth: 3,
                    effect_duration: 0,
                    brightness: u32::from(led_report[6]),
                });
            }

            info.profiles.push(profile);
        }

        Ok(())
    }

    async fn commit(&mut self, io: &mut DeviceIo, info: &DeviceInfo) -> Result<()> {
        for profile in &info.profiles {
            if !profile.is_dirty {
                continue;
            }
            let profile_idx = profile.index as u8;

            let mut dpi_buf = [0u8; ASUS_REPORT_SIZE];
            dpi_buf[0] = ASUS_REPORT_ID_DPI;
            dpi_buf[1] = profile_idx;
            dpi_buf[2] = profile
                .resolutions
                .iter()
                .find(|r| r.is_active)
                .map(|r| r.index as u8)
                .unwrap_or(0);
            for res in &profile.resolutions {
                let offset = 3 + (res.index as usize) * 2;
                if offset + 1 >= ASUS_REPORT_SIZE {
                    continue;
                }
                let raw = match res.dpi {
                    Dpi::Unified(v) => (v / 50) as u16,
                    Dpi::Separate { x, .. } => (x / 50) as u16,
                    Dpi::Unknown => 0,
                };
                dpi_buf[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
            }
            io.set_feature_report(&dpi_buf)
                .context("failed to commit DPI report")?;

            let mut btn_buf = [0u8; ASUS_REPORT_SIZE];
            btn_buf[0] = ASUS_REPORT_ID_BUTTONS;
            btn_buf[1] = profile_idx;
            for button in &profile.buttons {
                let offset = 2 + button.index as usize;
                if offset < ASUS_REPORT_SIZE {
                    btn_buf[offset] = button.mapping_value.min(255) as u8;
                }
            }
            io.set_feature_report(&btn_buf)
                .context("failed to commit button report")?;

            if let Some(led) = profile.leds.first() {
                let rgb = led.color.to_rgb();
                let led_buf = [
                    ASUS_REPORT_ID_LED,
                    profile_idx,
                    led.mode as u8,
                    rgb.r,
                    rgb.g,
                    rgb.b,
                    led.brightness.min(255) as u8,
                ];
                io.set_feature_report(&led_buf)
                    .context("failed to commit LED report")?;
            }
        }

        if let Some(active) = info.profiles.iter().find(|p| p.is_active) {
            let buf = [ASUS_REPORT_ID_PROFILE, active.index as u8];
            io.set_feature_report(&buf)
                .context("failed to commit active profile")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_starts_on_profile_zero() {
        let driver = AsusDriver::new();
        assert_eq!(driver.active_profile, 0);
    }
}
