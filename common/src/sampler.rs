use crate::{config::CalibrationConfig, store::SharedStore};

/// Linear ADC-code to degrees Celsius conversion.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureSampler {
    calibration: CalibrationConfig,
}

impl TemperatureSampler {
    pub fn new(calibration: CalibrationConfig) -> Self {
        Self { calibration }
    }

    pub fn convert(&self, raw: u16) -> f32 {
        let cal = &self.calibration;
        let full_scale = 2_f32.powi(i32::from(cal.resolution_bits));
        let voltage = f32::from(raw) * (cal.vref_volts / full_scale);
        cal.reference_temp_c - (voltage - cal.offset_volts) / cal.slope_volts_per_c
    }

    pub fn sample(&self, raw: u16, store: &SharedStore) -> f32 {
        let temperature_c = self.convert(raw);
        store.set_temperature(temperature_c);
        temperature_c
    }
}
