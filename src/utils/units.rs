//! Unit conversion utilities for glaciological quantities
//!
//! The solvers work in SI units throughout; these helpers convert the
//! year-based units glaciologists quote (m/year, 1/year, mm/year of melt).

// ============================================================================
// Time Conversions
// ============================================================================

/// Seconds per year (365.25 days)
pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Convert years to seconds
///
/// # Examples
/// ```
/// use glacier_sim::utils::units::years_to_seconds;
/// let dt = years_to_seconds(10.0); // a 10-year energy step
/// ```
#[inline]
pub fn years_to_seconds(years: f64) -> f64 {
    years * SECONDS_PER_YEAR
}

/// Convert seconds to years
#[inline]
pub fn seconds_to_years(seconds: f64) -> f64 {
    seconds / SECONDS_PER_YEAR
}

// ============================================================================
// Velocity / Rate Conversions
// ============================================================================

/// Convert meters per year to meters per second
///
/// # Examples
/// ```
/// use glacier_sim::utils::units::m_per_year_to_m_per_s;
/// let u = m_per_year_to_m_per_s(100.0); // fast-flowing outlet
/// ```
#[inline]
pub fn m_per_year_to_m_per_s(m_per_year: f64) -> f64 {
    m_per_year / SECONDS_PER_YEAR
}

/// Convert meters per second to meters per year
#[inline]
pub fn m_per_s_to_m_per_year(m_per_s: f64) -> f64 {
    m_per_s * SECONDS_PER_YEAR
}

/// Convert a basal melt rate in m/s (ice equivalent) to mm/year
#[inline]
pub fn melt_rate_to_mm_per_year(m_per_s: f64) -> f64 {
    m_per_s * SECONDS_PER_YEAR * 1e3
}

/// Convert a per-year rate (e.g. a drainage rate) to per-second
#[inline]
pub fn per_year_to_per_second(rate: f64) -> f64 {
    rate / SECONDS_PER_YEAR
}

// ============================================================================
// Temperature Conversions
// ============================================================================

/// Kelvin offset of the Celsius scale
pub const CELSIUS_OFFSET: f64 = 273.15;

/// Convert degrees Celsius to Kelvin
#[inline]
pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + CELSIUS_OFFSET
}

/// Convert Kelvin to degrees Celsius
#[inline]
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - CELSIUS_OFFSET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_conversions() {
        let years = 1000.0;
        let seconds = years_to_seconds(years);
        assert!((seconds_to_years(seconds) - years).abs() < 1e-10);

        assert!((SECONDS_PER_YEAR - 31_557_600.0).abs() < 1.0);
    }

    #[test]
    fn test_velocity_conversions() {
        let m_per_yr = 31.5576;
        let m_per_s = m_per_year_to_m_per_s(m_per_yr);
        assert!((m_per_s - 1e-6).abs() < 1e-15);
        assert!((m_per_s_to_m_per_year(m_per_s) - m_per_yr).abs() < 1e-10);

        // 1 mm/year of melt
        let melt = 1e-3 / SECONDS_PER_YEAR;
        assert!((melt_rate_to_mm_per_year(melt) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_conversions() {
        assert_eq!(celsius_to_kelvin(0.0), 273.15);
        assert!((kelvin_to_celsius(celsius_to_kelvin(-30.0)) + 30.0).abs() < 1e-12);
    }
}
