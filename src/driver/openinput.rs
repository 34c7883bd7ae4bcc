/* OpenInput reference-firmware driver. */
/*                                                                    */
/* OpenInput devices run an open, community-maintained firmware with  */
/* a simple request/response protocol over feature reports, making    */
/* this one of the more reliable drivers to probe without vendor      */
/* documentation. */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::device::{ActionType, DeviceInfo, Dpi, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const OPENINPUT_CMD_GET_INFO: u8 = 0x01;
const OPENINPUT_CMD_GET_PROFILE: u8 = 0x02;
const OPENINPUT_CMD_SET_PROFILE: u8 = 0x03;

const OPENINPUT_REPORT_SIZE: usize = 64;
const OPENINPUT_NUM_DPI: u32 = 4;
const OPENINPUT_NUM_BUTTONS: u32 = 10;

pub struct OpenInputDriver {
    firmware_version: String,
}

impl OpenInputDriver {
    pub fn new() -> Self {
        Self {
            firmware_version: String::new(),
        }
    }
}

#[async_trait]
impl DeviceDriver for OpenInputDriver {
    fn name(&self) -> &str {
        "OpenInput"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; OPENINPUT_REPORT_SIZE];
        buf[0] = OPENINPUT_CMD_GET_INFO;
        io.get_feature_report(&mut buf)
            .context("OpenInput GET_INFO probe failed")?;

        self.firmware_version = format!("{}.{}.{}", buf[1], buf[2], buf[3]);
        debug!(
            "OpenInput device probed, firmware {}",
            self.firmware_version
        );
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();
        info.firmware_version = self.firmware_version.clone();

        let mut buf = [0u8; OPENINPUT_REPORT_SIZE];
        buf[0] = OPENINPUT_CMD_GET_PROFILE;
        io.get_feature_report(&mut buf)
            .context("failed to read OpenInput profile report")?;

        let mut profile = ProfileInfo {
            index: 0,
            name: String::new(),
            is_active: true,
            is_enabled: true,
            is_dirty: false,
                capabilities: vec![crate::device::PROFILE_CAP_SET_DEFAULT, crate::device::PROFILE_CAP_DISABLE],
            report_rate: match buf[1] {
                0 => 125,
                1 => 250,
                2 => 500,
                _ => 1000,
            },
            report_rates: vec![125, 250, 500, 1000],
            angle_snapping: -1,
            debounce: i32::from(buf[2]),
            debounces: (1..=10u32).collect(),
            resolutions: Vec::new(),
            buttons: Vec::new(),
            leds: Vec::new(),
        };

        let current_dpi = buf[3];
        for dpi_idx in 0..OPENINPUT_NUM_DPI {
            let offset = 4 + (dpi_idx as usize) * 2;
            let raw = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            profile.resolutions.push(crate::device::ResolutionInfo {
                index: dpi_idx,
                dpi: Dpi::Unified(u32::from(raw)),
                dpi_list: (50..=12000u32).step_by(50).collect(),
                capabilities: Vec::new(),
                is_active: dpi_idx as u8 == current_dpi,
                is_default: dpi_idx == 0,
                is_disabled: false,
            });
        }

        for btn_idx in 0..OPENINPUT_NUM_BUTTONS {
            let offset = 12 + btn_idx as usize;
            let raw = buf.get(offset).copied().unwrap_or(0);
            profile.buttons.push(crate::device::ButtonInfo {
                index: btn_idx,
                action_type: ActionType::from_u32(u32::from(raw & 0x07)),
                action_types: vec![0, 1, 2, 3, 4],
                mapping_value: u32::from(raw >> 3),
                macro_entries: Vec::new(),
            });
        }

        info.profiles.push(profile);
        Ok(())
    }

    async fn commit(&mut self, io: &mut DeviceIo, info: &DeviceInfo) -> Result<()> {
        let Some(profile) = info.profiles.first() else {
            return Ok(());
        };
        if !profile.is_dirty {
            return Ok(());
        }

        let mut buf = [0u8; OPENINPUT_REPORT_SIZE];
        buf[0] = OPENINPUT_CMD_SET_PROFILE;
        buf[1] = match profile.report_rate {
            125 => 0,
            250 => 1,
            500 => 2,
            _ => 3,
        };
        buf[2] = profile.debounce.clamp(0, 255) as u8;
        buf[3] = profile
            .resolutions
            .iter()
            .find(|r| r.is_active)
            .map(|r| r.index as u8)
            .unwrap_or(0);

        for res in &profile.resolutions {
            let offset = 4 + (res.index as usize) * 2;
            if offset + 1 >= OPENINPUT_REPORT_SIZE {
                continue;
            }
            let raw = match res.dpi {
                Dpi::Unified(v) => v as u16,
                Dpi::Separate { x, .. } => x as u16,
                Dpi::Unknown => 0,
            };
            buf[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
        }

        for button in &profile.buttons {
            let offset = 12 + button.index as usize;
            if offset >= OPENINPUT_REPORT_SIZE {
                continue;
            }
            let action_bits = button.action_type as u32 & 0x07;
            let value_bits = (button.mapping_value << 3) & 0xF8;
            buf[offset] = (action_bits | value_bits) as u8;
        }

        io.set_feature_report(&buf)
            .context("failed to commit OpenInput profile report")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_has_no_firmware_version_yet() {
        assert!(OpenInputDriver::new().firmware_version.is_empty());
    }
}
