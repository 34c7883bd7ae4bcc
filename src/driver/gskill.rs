/* G.Skill Ripjaws-series driver. Protocol is HID++-adjacent but uses its own */
/* vendor report IDs rather than the Logitech feature-page scheme.           */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::device::{ActionType, DeviceInfo, Dpi, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const GSKILL_NUM_PROFILES: u32 = 4;
const GSKILL_NUM_DPI: u32 = 5;
const GSKILL_NUM_BUTTONS: u32 = 8;

const GSKILL_REPORT_ID_PROFILE: u8 = 0x20;
const GSKILL_REPORT_ID_DPI: u8 = 0x21;
const GSKILL_REPORT_ID_BUTTONS: u8 = 0x22;

const GSKILL_REPORT_SIZE: usize = 32;

pub struct GskillDriver {
    active_profile: u8,
}

impl GskillDriver {
    pub fn new() -> Self {
        Self { active_profile: 0 }
    }
}

#[async_trait]
impl DeviceDriver for GskillDriver {
    fn name(&self) -> &str {
        "G.Skill"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; GSKILL_REPORT_SIZE];
        buf[0] = GSKILL_REPORT_ID_PROFILE;
        io.get_feature_report(&mut buf)
            .context("G.Skill profile probe failed")?;
        debug!("G.Skill device probed");
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        let mut profile_buf = [0u8; GSKILL_REPORT_SIZE];
        profile_buf[0] = GSKILL_REPORT_ID_PROFILE;
        io.get_feature_report(&mut profile_buf)
            .context("failed to read active profile")?;
        self.active_profile = profile_buf[1];

        for profile_idx in 0..GSKILL_NUM_PROFILES as u8 {
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

            let mut dpi_buf = [0u8; GSKILL_REPORT_SIZE];
            dpi_buf[0] = GSKILL_REPORT_ID_DPI;
            dpi_buf[1] = profile_idx;
            if io.get_feature_report(&mut dpi_buf).is_ok() {
                let current_dpi = dpi_buf[2];
                for dpi_idx in 0..GSKILL_NUM_DPI {
                    let offset = 3 + (dpi_idx as usize) * 2;
                    if offset + 1 >= GSKILL_REPORT_SIZE {
                        continue;
                    }
                    let raw = u16::from_le_bytes([dpi_buf[offset], dpi_buf[offset + 1]]);
                    profile.resolutions.push(crate::device::ResolutionInfo {
                        index: dpi_idx,
                        dpi: Dpi::Unified(u32::from(raw)),
                        dpi_list: (100..=8000u32).step_by(100).collect(),
                        capabilities: Vec::new(),
                        is_active: dpi_idx as u8 == current_dpi,
                        is_default: dpi_idx == 0,
                        is_disabled: false,
                    });
                }
            } else {
                warn!("G.Skill: failed to read DPI for profile {profile_idx}");
            }

            let mut btn_buf = [0u8; GSKILL_REPORT_SIZE];
            btn_buf[0] = GSKILL_REPORT_ID_BUTTONS;
            btn_buf[1] = profile_idx;
            if io.get_feature_report(&mut btn_buf).is_ok() {
                for btn_idx in 0..GSKILL_NUM_BUTTONS {
                    let raw = btn_buf.get(2 + btn_idx as usize).copied().unwrap_or(0);
                    profile.buttons.push(crate::device::ButtonInfo {
                        index: btn_idx,
                        action_type: if raw == 0 {
                            ActionType::None
                        } else {
                            ActionType::Button
                        },
                        action_types: vec![0, 1, 2],
                        mapping_value: u32::from(raw),
                        macro_entries: Vec::new(),
                    });
                }
            } else {
                warn!("G.Skill: failed to read buttons for profile {profile_idx}");
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

            let mut dpi_buf = [0u8; GSKILL_REPORT_SIZE];
            dpi_buf[0] = GSKILL_REPORT_ID_DPI;
            dpi_buf[1] = profile_idx;
            dpi_buf[2] = profile
                .resolutions
                .iter()
                .find(|r| r.is_active)
                .map(|r| r.index as u8)
                .unwrap_or(0);
            for res in &profile.resolutions {
                let offset = 3 + (res.index as usize) * 2;
                if offset + 1 >= GSKILL_REPORT_SIZE {
                    continue;
                }
                let raw = match res.dpi {
                    Dpi::Unified(v) => v as u16,
                    Dpi::Separate { x, .. } => x as u16,
                    Dpi::Unknown => 0,
                };
                dpi_buf[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
            }
            io.set_feature_report(&dpi_buf)
                .context("failed to commit DPI report")?;

            let mut btn_buf = [0u8; GSKILL_REPORT_SIZE];
            btn_buf[0] = GSKILL_REPORT_ID_BUTTONS;
            btn_buf[1] = profile_idx;
            for button in &profile.buttons {
                let offset = 2 + button.index as usize;
                if offset < GSKILL_REPORT_SIZE {
                    btn_buf[offset] = button.mapping_value.min(255) as u8;
                }
            }
            io.set_feature_report(&btn_buf)
                .context("failed to commit button report")?;
        }

        if let Some(active) = info.profiles.iter().find(|p| p.is_active) {
            io.set_feature_report(&[GSKILL_REPORT_ID_PROFILE, active.index as u8])
                .context("failed to commit active profile")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_defaults_to_profile_zero() {
        assert_eq!(GskillDriver::new().active_profile, 0);
    }
}
