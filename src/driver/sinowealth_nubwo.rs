/* Sinowealth Nubwo-variant driver. */
/*                                                                      */
/* Nubwo-branded boards use the same SH68F90 silicon as `sinowealth.rs` */
/* but ship firmware that exposes four onboard profiles instead of one, */
/* selected through a dedicated profile-select report. */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::device::{ActionType, DeviceInfo, Dpi, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const NUBWO_NUM_PROFILES: u32 = 4;
const NUBWO_NUM_DPI: u32 = 6;
const NUBWO_NUM_BUTTONS: u32 = 6;

const NUBWO_REPORT_ID_PROFILE_SELECT: u8 = 0x03;
const NUBWO_REPORT_ID_DPI: u8 = 0x05;
const NUBWO_REPORT_ID_BUTTONS: u8 = 0x06;

const NUBWO_REPORT_SIZE: usize = 520;

pub struct SinowealhNubwoDriver {
    active_profile: u8,
}

impl SinowealhNubwoDriver {
    pub fn new() -> Self {
        Self { active_profile: 0 }
    }
}

#[async_trait]
impl DeviceDriver for SinowealhNubwoDriver {
    fn name(&self) -> &str {
        "Sinowealth Nubwo"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; 3];
        buf[0] = NUBWO_REPORT_ID_PROFILE_SELECT;
        io.get_feature_report(&mut buf)
            .context("Nubwo profile-select probe failed")?;
        self.active_profile = buf[1] % NUBWO_NUM_PROFILES as u8;
        debug!("Sinowealth Nubwo device probed, active profile {}", self.active_profile);
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        for profile_idx in 0..NUBWO_NUM_PROFILES as u8 {
            io.set_feature_report(&[NUBWO_REPORT_ID_PROFILE_SELECT, profile_idx])
                .context("failed to select Nubwo profile before reading it")?;

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

            let mut dpi_buf = vec![0u8; NUBWO_REPORT_SIZE];
            dpi_buf[0] = NUBWO_REPORT_ID_DPI;
            if io.get_feature_report(&mut dpi_buf).is_ok() {
                let current_dpi = dpi_buf[1];
                for dpi_idx in 0..NUBWO_NUM_DPI {
                    let offset = 2 + (dpi_idx as usize) * 2;
                    if offset + 1 >= NUBWO_REPORT_SIZE {
                        continue;
                    }
                    let raw = u16::from_le_bytes([dpi_buf[offset], dpi_buf[offset + 1]]);
                    profile.resolutions.push(crate::device::ResolutionInfo {
                        index: dpi_idx,
                        dpi: Dpi::Unified(u32::from(raw) * 50),
                        dpi_list: (50..=12000u32).step_by(50).collect(),
                        capabilities: Vec::new(),
                        is_active: dpi_idx as u8 == current_dpi,
                        is_default: dpi_idx == 0,
                        is_disabled: false,
                    });
                }
            } else {
                warn!("Nubwo: failed to read DPI for profile {profile_idx}");
            }

            let mut btn_buf = vec![0u8; NUBWO_REPORT_SIZE];
            btn_buf[0] = NUBWO_REPORT_ID_BUTTONS;
            if io.get_feature_report(&mut btn_buf).is_ok() {
                for btn_idx in 0..NUBWO_NUM_BUTTONS {
                    let offset = 2 + (btn_idx as usize) * 2;
                    let raw = btn_buf.get(offset).copied().unwrap_or(0);
                    profile.buttons.push(crate::device::ButtonInfo {
                        index: btn_idx,
                        action_type: if raw == 0 {
                            ActionType::None
                        } else {
                            ActionType::Button
                        },
                        action_types: vec![0, 1],
                        mapping_value: u32::from(raw),
                        macro_entries: Vec::new(),
                    });
                }
            } else {
                warn!("Nubwo: failed to read buttons for profile {profile_idx}");
            }

            info.profiles.push(profile);
        }

        /* Restore the profile that was active before probing began. */
        io.set_feature_report(&[NUBWO_REPORT_ID_PROFILE_SELECT, self.active_profile])
            .context("failed to restore active Nubwo profile after probing")?;

        Ok(())
    }

    async fn commit(&mut self, io: &mut DeviceIo, info: &DeviceInfo) -> Result<()> {
        for profile in &info.profiles {
            if !profile.is_dirty {
                continue;
            }
            let profile_idx = profile.index as u8;
            if profile_idx >= NUBWO_NUM_PROFILES as u8 {
                continue;
            }

            io.set_feature_report(&[NUBWO_REPORT_ID_PROFILE_SELECT, profile_idx])
                .context("failed to select Nubwo profile before committing it")?;

            let mut dpi_buf = vec![0u8; NUBWO_REPORT_SIZE];
            dpi_buf[0] = NUBWO_REPORT_ID_DPI;
            dpi_buf[1] = profile
                .resolutions
                .iter()
                .find(|r| r.is_active)
                .map(|r| r.index as u8)
                .unwrap_or(0);
            for res in &profile.resolutions {
                let offset = 2 + (res.index as usize) * 2;
                if offset + 1 >= NUBWO_REPORT_SIZE {
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
                .context("failed to commit Nubwo DPI report")?;

            let mut btn_buf = vec![0u8; NUBWO_REPORT_SIZE];
            btn_buf[0] = NUBWO_REPORT_ID_BUTTONS;
            for button in &profile.buttons {
                let offset = 2 + (button.index as usize) * 2;
                if offset < NUBWO_REPORT_SIZE {
                    btn_buf[offset] = button.mapping_value.min(255) as u8;
                }
            }
            io.set_feature_report(&btn_buf)
                .context("failed to commit Nubwo button report")?;
        }

        if let Some(active) = info.profiles.iter().find(|p| p.is_active) {
            io.set_feature_report(&[NUBWO_REPORT_ID_PROFILE_SELECT, active.index as u8])
                .context("failed to commit Nubwo active profile")?;
            self.active_profile = active.index as u8;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_defaults_to_profile_zero() {
        assert_eq!(SinowealhNubwoDriver::new().active_profile, 0);
    }
}
