use crate::config::EnergyConfig;

/// Gravity drainage rate of liquid water out of temperate ice
///
/// Piecewise linear in the water fraction: zero up to 1%, rising to `DR2`
/// at 2% and to `DR3` at 3%, constant above.
#[derive(Debug, Clone, Copy)]
pub struct DrainageCalculator {
    /// Rate at 2% water fraction (1/s)
    rate_2pct: f64,
    /// Rate at and above 3% water fraction (1/s)
    rate_3pct: f64,
}

impl DrainageCalculator {
    pub fn new(config: &EnergyConfig) -> Self {
        Self {
            rate_2pct: config.drainage_rate_2pct(),
            rate_3pct: config.drainage_rate_3pct(),
        }
    }

    /// Drainage rate (1/s) at water fraction `omega`
    pub fn rate(&self, omega: f64) -> f64 {
        if omega <= 0.01 {
            0.0
        } else if omega <= 0.02 {
            self.rate_2pct * (omega - 0.01) / 0.01
        } else if omega <= 0.03 {
            self.rate_2pct + (self.rate_3pct - self.rate_2pct) * (omega - 0.02) / 0.01
        } else {
            self.rate_3pct
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::units::SECONDS_PER_YEAR;
    use approx::assert_relative_eq;

    #[test]
    fn test_piecewise_rate() {
        let dc = DrainageCalculator::new(&EnergyConfig::default());
        let dr2 = 0.5 / SECONDS_PER_YEAR;
        let dr3 = 4.5 / SECONDS_PER_YEAR;

        assert_eq!(dc.rate(0.0), 0.0);
        assert_eq!(dc.rate(0.01), 0.0);
        assert_relative_eq!(dc.rate(0.015), 0.5 * dr2, max_relative = 1e-12);
        assert_relative_eq!(dc.rate(0.02), dr2, max_relative = 1e-12);
        assert_relative_eq!(dc.rate(0.025), 0.5 * (dr2 + dr3), max_relative = 1e-12);
        assert_relative_eq!(dc.rate(0.1), dr3, max_relative = 1e-12);
    }

    #[test]
    fn test_rate_is_monotone() {
        let dc = DrainageCalculator::new(&EnergyConfig::default());
        let mut last = 0.0;
        for i in 0..100 {
            let r = dc.rate(i as f64 * 0.0005);
            assert!(r >= last);
            last = r;
        }
    }
}
