use serde::Deserialize;

/// Physical constants and installation-specific tuning values. Everything that
/// was measured or fitted for one concrete house lives here instead of in the
/// formulas, with defaults matching the reference installation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// kg/m³
    pub air_density: f64,
    /// kJ/(kg·K)
    pub air_heat_capacity: f64,

    /// Blower-door air-change rate at 50 Pa, 1/h.
    pub leaking_n50: f64,
    pub leaking_e: f64,
    pub leaking_f: f64,

    /// Energy to warm up 1 m³ of heating water by 1 K, Wh.
    /// 1000 l × 4.182 kJ / 3.6 kJ ≈ 1162.
    pub heating_reference_energy: f64,

    /// Two calibration points of the ventilation level → flow curve.
    pub ventilation_low_level: f64,
    pub ventilation_low_volume: f64,
    pub ventilation_high_level: f64,
    pub ventilation_high_volume: f64,

    /// Heating curve of the circulation: pipe-out temperature at +20 °C and
    /// −20 °C outdoor, linear in between, times an efficiency factor.
    pub pipe_out_warm: f64,
    pub pipe_out_cold: f64,
    pub pipe_efficiency: f64,
    /// Pipe-in sits this many K above the mean room temperature.
    pub pipe_in_offset: f64,
    /// Assumed pump speed for "what-if" heating availability, percent.
    pub possible_pump_speed: f64,

    /// Fraction of facade radiation that ends up in the room through glass.
    pub window_transmittance: f64,
    /// Fraction of facade radiation that an opaque wall passes on.
    pub wall_absorption: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            air_density: 1.2041,
            air_heat_capacity: 1.005,
            leaking_n50: 1.0,
            leaking_e: 0.07,
            leaking_f: 15.0,
            heating_reference_energy: 1162.0,
            ventilation_low_level: 15.0,
            ventilation_low_volume: 40.0,
            ventilation_high_level: 100.0,
            ventilation_high_volume: 350.0,
            pipe_out_warm: 36.0,
            pipe_out_cold: 47.0,
            pipe_efficiency: 0.95,
            pipe_in_offset: 7.0,
            possible_pump_speed: 85.0,
            window_transmittance: 0.6,
            wall_absorption: 0.06,
        }
    }
}

impl Calibration {
    /// Ventilation level (percent) to flow volume (m³/h), interpolating
    /// linearly between the two calibration points.
    pub fn ventilation_volume(&self, level: f64) -> f64 {
        let slope = (self.ventilation_high_volume - self.ventilation_low_volume)
            / (self.ventilation_high_level - self.ventilation_low_level);
        (level - self.ventilation_low_level) * slope + self.ventilation_low_volume
    }

    /// Expected pipe-out temperature for an outdoor temperature.
    pub fn pipe_out_temperature(&self, outdoor: f64) -> f64 {
        let raw = if outdoor > 20.0 {
            self.pipe_out_warm
        } else if outdoor < -20.0 {
            self.pipe_out_cold
        } else {
            (20.0 - outdoor) * (self.pipe_out_cold - self.pipe_out_warm) / 40.0 + self.pipe_out_warm
        };
        raw * self.pipe_efficiency
    }
}
