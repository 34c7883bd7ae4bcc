/* Etekcity Scroll-series driver. */
/*                                                                   */
/* Etekcity's cheaper mice expose a single onboard profile with no   */
/* per-profile storage; "profiles" in `DeviceInfo` is therefore just */
/* the one live configuration mirrored from/to the device.           */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::device::{ActionType, DeviceInfo, Dpi, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const ETEKCITY_NUM_DPI: u32 = 4;
const ETEKCITY_NUM_BUTTONS: u32 = 6;

const ETEKCITY_REPORT_ID_DPI: u8 = 0x04;
const ETEKCITY_REPORT_ID_BUTTONS: u8 = 0x05;
const ETEKCITY_REPORT_ID_RATE: u8 = 0x06;

const ETEKCITY_REPORT_SIZE: usize = 17;

pub struct EtekcityDriver;

impl EtekcityDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceDriver for EtekcityDriver {
    fn name(&self) -> &str {
        "Etekcity"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; ETEKCITY_REPORT_SIZE];
        buf[0] = ETEKCITY_REPORT_ID_DPI;
        io.get_feature_report(&mut buf)
            .context("Etekcity DPI probe failed")?;
        debug!("Etekcity device probed");
        Ok(())
    }

    async fn load_profiles(&mut self, io: &mut DeviceIo, info: &mut DeviceInfo) -> Result<()> {
        info.profiles.clear();

        let mut profile = ProfileInfo {
            index: 0,
            name: String::new(),
            is_active: true,
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

        let mut dpi_buf = [0u8; ETEKCITY_REPORT_SIZE];
        dpi_buf[0] = ETEKCITY_REPORT_ID_DPI;
        io.get_feature_report(&mut dpi_buf)
            .context("failed to read DPI report")?;
        let current_dpi = dpi_buf[1];
        for dpi_idx in 0..ETEKCITY_NUM_DPI {
            let offset = 2 + dpi_idx as usize;
            let raw = dpi_buf.get(offset).copied().unwrap_or(0);
            profile.resolutions.push(crate::device::ResolutionInfo {
                index: dpi_idx,
                dpi: Dpi::Unified(u32::from(raw) * 100),
                dpi_list: (100..=6400u32).step_by(100).collect(),
                capabilities: Vec::new(),
                is_active: dpi_idx as u8 == current_dpi,
                is_default: dpi_idx == 0,
                is_disabled: false,
            });
        }

        let mut btn_buf = [0u8; ETEKCITY_REPORT_SIZE];
        btn_buf[0] = ETEKCITY_REPORT_ID_BUTTONS;
        io.get_feature_report(&mut btn_buf)
            .context("failed to read button report")?;
        for btn_idx in 0..ETEKCITY_NUM_BUTTONS {
            let raw = btn_buf.get(1 + btn_idx as usize).copied().unwrap_or(0);
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

        let mut rate_buf = [0u8; 3];
        rate_buf[0] = ETEKCITY_REPORT_ID_RATE;
        if io.get_feature_report(&mut rate_buf).is_ok() && rate_buf[1] > 0 {
            profile.report_rate = 1000 / u32::from(rate_buf[1]);
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

        let mut dpi_buf = [0u8; ETEKCITY_REPORT_SIZE];
        dpi_buf[0] = ETEKCITY_REPORT_ID_DPI;
        dpi_buf[1] = profile
            .resolutions
            .iter()
            .find(|r| r.is_active)
            .map(|r| r.index as u8)
            .unwrap_or(0);
        for res in &profile.resolutions {
            let offset = 2 + res.index as usize;
            if offset >= ETEKCITY_REPORT_SIZE {
                continue;
            }
            dpi_buf[offset] = match res.dpi {
                Dpi::Unified(v) => (v / 100) as u8,
                Dpi::Separate { x, .. } => (x / 100) as u8,
                Dpi::Unknown => 0,
            };
        }
        io.set_feature_report(&dpi_buf)
            .context("failed to commit DPI report")?;

        let mut btn_buf = [0u8; ETEKCITY_REPORT_SIZE];
        btn_buf[0] = ETEKCITY_REPORT_ID_BUTTONS;
        for button in &profile.buttons {
            let offset = 1 + button.index as usize;
            if offset < ETEKCITY_REPORT_SIZE {
                btn_buf[offset] = button.mapping_value.min(255) as u8;
            }
        }
        io.set_feature_report(&btn_buf)
            .context("failed to commit button report")?;

        if profile.report_rate > 0 {
            let interval = (1000 / profile.report_rate).clamp(1, 255) as u8;
            io.set_feature_report(&[ETEKCITY_REPORT_ID_RATE, interval, 0])
                .context("failed to commit report rate")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_name_matches_vendor() {
        let driver = EtekcityDriver::new();
        assert_eq!(driver.name(), "Etekcity");
    }
}
