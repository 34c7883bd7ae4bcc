/* Sinowealth SH68F90-family driver, used by a wide range of rebranded */
/* budget mice (Glorious, Fantech, and others share this silicon).    */

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::device::{ActionType, Color, DeviceInfo, Dpi, LedMode, ProfileInfo};
use crate::driver::{DeviceDriver, DeviceIo};

const SINOWEALTH_NUM_DPI: u32 = 6;
const SINOWEALTH_NUM_BUTTONS: u32 = 6;

const SINOWEALTH_REPORT_ID_CONFIG: u8 = 0x04;
const SINOWEALTH_REPORT_ID_DPI: u8 = 0x05;
const SINOWEALTH_REPORT_ID_BUTTONS: u8 = 0x06;

const SINOWEALTH_REPORT_SIZE: usize = 520;
const SINOWEALTH_CONFIG_REPORT_SIZE: usize = 6;

pub struct SinowealhDriver {
    current_dpi_stage: u8,
}

impl SinowealhDriver {
    pub fn new() -> Self {
        Self {
            current_dpi_stage: 0,
        }
    }
}

#[async_trait]
impl DeviceDriver for SinowealhDriver {
    fn name(&self) -> &str {
        "Sinowealth"
    }

    async fn probe(&mut self, io: &mut DeviceIo) -> Result<()> {
        let mut buf = [0u8; SINOWEALTH_CONFIG_REPORT_SIZE];
        buf[0] = SINOWEALTH_REPORT_ID_CONFIG;
        io.get_feature_report(&mut buf)
            .context("Sinowealth config probe failed")?;
        self.current_dpi_stage = buf[1] & 0x07;
        debug!("Sinowealth device probed, DPI stage {}", self.current_dpi_stage);
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

        let mut dpi_buf = vec![0u8; SINOWEALTH_REPORT_SIZE];
        dpi_buf[0] = SINOWEALTH_REPORT_ID_DPI;
        if io.get_feature_report(&mut dpi_buf).is_ok() {
            for dpi_idx in 0..SINOWEALTH_NUM_DPI {
                let offset = 2 + (dpi_idx as usize) * 3;
                if offset + 2 >= SINOWEALTH_REPORT_SIZE {
                    continue;
                }
                /* Byte layout per stage: [enabled, dpi_x_raw, dpi_y_raw]; raw DPI
                 * is stored in 50-unit steps, matching the HID++ convention. */
                let enabled = dpi_buf[offset] != 0;
                let dpi_x = u32::from(dpi_buf[offset + 1]) * 50;
                let dpi_y = u32::from(dpi_buf[offset + 2]) * 50;
                profile.resolutions.push(crate::device::ResolutionInfo {
                    index: dpi_idx,
                    dpi: Dpi::Separate { x: dpi_x, y: dpi_y },
                    dpi_list: (50..=12000u32).step_by(50).collect(),
                    capabilities: Vec::new(),
                    is_active: dpi_idx as u8 == self.current_dpi_stage,
                    is_default: dpi_idx == 0,
                    is_disabled: !enabled,
                });
            }
        } else {
            warn!("Sinowealth: failed to read DPI report");
        }

        let mut btn_buf = vec![0u8; SINOWEALTH_REPORT_SIZE];
        btn_buf[0] = SINOWEALTH_REPORT_ID_BUTTONS;
        if io.get_feature_report(&mut btn_buf).is_ok() {
            for btn_idx in 0..SINOWEALTH_NUM_BUTTONS {
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
            warn!("Sinowealth: failed to read button report");
        }

        profile.leds.push(crate::device::LedInfo {
            index: 0,
            mode: LedMode::Solid,
            modes: vec![LedMode::Off, LedMode::Solid, LedMode::Cycle, LedMode::Breathing],
            color: Color::default(),
            secondary_color: Color::default(),
            tertiary_color: Color::default(),
            color_depth: 3,
            effect_duration: 0,
            brightness: 255,
        });

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

        let mut dpi_buf = vec![0u8; SINOWEALTH_REPORT_SIZE];
        dpi_buf[0] = SINOWEALTH_REPORT_ID_DPI;
        for res in &profile.resolutions {
            let offset = 2 + (res.index as usize) * 3;
            if offset + 2 >= SINOWEALTH_REPORT_SIZE {
                continue;
            }
            dpi_buf[offset] = u8::from(!res.is_disabled);
            let (x, y) = match res.dpi {
                Dpi::Separate { x, y } => (x, y),
                Dpi::Unified(v) => (v, v),
                Dpi::Unknown => (0, 0),
            };
            dpi_buf[offset + 1] = (x / 50) as u8;
            dpi_buf[offset + 2] = (y / 50) as u8;
        }
        io.set_feature_report(&dpi_buf)
            .context("failed to commit Sinowealth DPI report")?;

        if let Some(active) = profile.resolutions.iter().find(|r| r.is_active) {
            let buf = [SINOWEALTH_REPORT_ID_CONFIG, active.index as u8];
            io.set_feature_report(&buf)
                .context("failed to commit Sinowealth active DPI stage")?;
            self.current_dpi_stage = active.index as u8;
        }

        let mut btn_buf = vec![0u8; SINOWEALTH_REPORT_SIZE];
        btn_buf[0] = SINOWEALTH_REPORT_ID_BUTTONS;
        for button in &profile.buttons {
            let offset = 2 + (button.index as usize) * 2;
            if offset < SINOWEALTH_REPORT_SIZE {
                btn_buf[offset] = button.mapping_value.min(255) as u8;
            }
        }
        io.set_feature_report(&btn_buf)
            .context("failed to commit Sinowealth button report")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_driver_starts_on_dpi_stage_zero() {
        assert_eq!(SinowealhDriver::new().current_dpi_stage, 0);
    }
}
