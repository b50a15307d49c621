//! Utility modules
//!
//! Helpers shared by the stress balance and energy solvers.

pub mod units;

pub use units::{
    years_to_seconds, seconds_to_years,
    m_per_year_to_m_per_s, m_per_s_to_m_per_year,
    melt_rate_to_mm_per_year, per_year_to_per_second,
    celsius_to_kelvin, kelvin_to_celsius,
};
