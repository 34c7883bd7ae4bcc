/* Logitech G600 MMO gaming mouse driver. */
/*                                                                  */
/* Like the G300 (see `logitech_g300.rs`), the G600 predates HID++ */
/* and is configured through vendor-specific feature reports rather */
/* than the HID++ 1.0/2.0 register/feature protocol.                */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::device::{ActionType, DeviceInfo, Dpi, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const LG600_NUM_PROFILES: u32 = 3;
const LG600_NUM_DPI: u32 = 4;
const LG600_NUM_BUTTONS: u32 = 20;

const LG600_REPORT_ID_ACTIVE: u8 = 0xF0;
const LG600_REPORT_ID_PROFILE_BASE: u8 = 0xF3;

const LG600_REPORT_SIZE_ACTIVE: usize = 4;
const LG600_REPORT_SIZE_PROFILE: usize = 154;

pub struct LG600Driver {
    last_active_profile: Option<u8>,
}

impl LG600Driver {
    pub fn new() -> Self {
        Self {
            last_active_profile: None,
        }
    }

    async fn read_active_profile(io: &mut DeviceIo) -> Option<u8> {
        let req = [LG600_REPORT_ID_ACTIVE, 0, 0, 0];
        io.write_report(&req).await.ok()?;
        let mut buf = [0u8; LG600_REPORT_SIZE_ACTIVE];
        let n = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            io.read_report(&mut buf),
        )
        .await
        .ok()?
        .ok()?;
        if n != LG600_REPORT_SIZE_ACTIVE {
            return None;
        }
        Some(buf[3] & 0x03)
    }
}

#[async_trait]
impl DeviceDriver for LG600Driver {
    fn name(&self) -> &str {
        "Logitech G600"
    }

    async fn probe(&mut self, _io: &mut DeviceIo) -> Result<()> {
        debug!("Probe called for Logitech G600");
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        let active = Self::read_active_profile(io).await.unwrap_or(0);
        self.last_active_profile = Some(active);

        for profile_idx in 0..LG600_NUM_PROFILES as u8 {
            let report_id = LG600_REPORT_ID_PROFILE_BASE + profile_idx;
            let mut buf = vec![0u8; LG600_REPORT_SIZE_PROFILE];
            buf[0] = report_id;
            io.get_feature_report(&mut buf)
                .context("failed to read G600 profile report")?;

            let mut profile = ProfileInfo {
                index: u32::from(profile_idx),
                name: format!("Profile {}", profile_idx + 1),
                is_active: profile_idx == active,
                is_enabled: true,
                is_dirty: false,
                capabilities: vec![crate::device::PROFILE_CAP_SET_DEFAULT, crate::device::PROFILE_CAP_DISABLE],
                report_rate: match buf[2] {
                    1 => 125,
                    2 => 250,
                    3 => 500,
                    _ => 1000,
                },
                report_rates: vec![125, 250, 500, 1000],
                angle_snapping: -1,
                debounce: -1,
                debounces: Vec::new(),
                resolutions: Vec::new(),
                buttons: Vec::new(),
                leds: Vec::new(),
            };

            for dpi_idx in 0..LG600_NUM_DPI {
                let offset = 3 + dpi_idx as usize;
                let raw = buf.get(offset).copied().unwrap_or(0);
                profile.resolutions.push(crate::device::ResolutionInfo {
                    index: dpi_idx,
                    dpi: Dpi::Unified(u32::from(raw) * 50),
                    dpi_list: (50..=8200u32).step_by(50).collect(),
                    capabilities: Vec::new(),
                    is_active: dpi_idx == 0,
                    is_default: dpi_idx == 0,
                    is_disabled: false,
                });
            }

            for btn_idx in 0..LG600_NUM_BUTTONS {
                let offset = 7 + (btn_idx as usize) * 3;
                let code = buf.get(offset).copied().unwrap_or(0);
                profile.buttons.push(crate::device::ButtonInfo {
                    index: btn_idx,
                    action_type: if code == 0 {
                        ActionType::None
                    } else {
                        ActionType::Button
                    },
                    action_types: vec![0, 1, 3, 4],
                    mapping_value: u32::from(code),
                    macro_entries: Vec::new(),
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
            if profile_idx >= LG600_NUM_PROFILES as u8 {
                continue;
            }
            let report_id = LG600_REPORT_ID_PROFILE_BASE + profile_idx;

            let mut buf = vec![0u8; LG600_REPORT_SIZE_PROFILE];
            buf[0] = report_id;
            buf[2] = match profile.report_rate {
                125 => 1,
                250 => 2,
                500 => 3,
                _ => 0,
            };

            for res in &profile.resolutions {
                let offset = 3 + res.index as usize;
                if offset >= LG600_REPORT_SIZE_PROFILE {
                    continue;
                }
                buf[offset] = match res.dpi {
                    Dpi::Unified(v) => (v / 50) as u8,
                    Dpi::Separate { x, .. } => (x / 50) as u8,
                    Dpi::Unknown => 0,
                };
            }

            for button in &profile.buttons {
                let offset = 7 + (button.index as usize) * 3;
                if offset < LG600_REPORT_SIZE_PROFILE {
                    buf[offset] = button.mapping_value.min(255) as u8;
                }
            }

            io.write_report(&buf)
                .await
                .context("failed to commit G600 profile report")?;
        }
        Ok(())
    }

    async fn refresh_active_resolution(
        &mut self,
        io: &mut DeviceIo,
        info: &mut DeviceInfo,
    ) -> Result<bool> {
        let Some(active) = Self::read_active_profile(io).await else {
            return Ok(false);
        };
        let changed = self.last_active_profile != Some(active);
        self.last_active_profile = Some(active);

        if changed {
            for profile in &mut info.profiles {
                profile.is_active = profile.index == u32::from(active);
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_has_no_cached_active_profile() {
        assert_eq!(LG600Driver::new().last_active_profile, None);
    }
}
