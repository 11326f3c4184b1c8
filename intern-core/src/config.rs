//! Attendance policy configuration

/// Default geofence radius in meters
pub const DEFAULT_SITE_RADIUS_M: f64 = 200.0;

/// Default cap on sites referenced by one contract
pub const DEFAULT_MAX_SITES_PER_CONTRACT: usize = 16;

/// Default tolerance between a client-reported punch time and the server clock
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Tunables for site registration and contract creation
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Radius applied when a site is registered without one
    pub default_radius_m: f64,
    /// Upper bound on a site radius
    pub max_radius_m: f64,
    /// Upper bound on sites per contract
    pub max_sites_per_contract: usize,
    /// A reported punch time must lie within this many seconds of the server clock
    pub max_clock_skew_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_radius_m: DEFAULT_SITE_RADIUS_M,
            max_radius_m: 5_000.0,
            max_sites_per_contract: DEFAULT_MAX_SITES_PER_CONTRACT,
            max_clock_skew_secs: DEFAULT_MAX_CLOCK_SKEW_SECS,
        }
    }
}

impl PolicyConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_radius_m: std::env::var("INTERN_DEFAULT_RADIUS_M")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|r: &f64| r.is_finite() && *r > 0.0)
                .unwrap_or(defaults.default_radius_m),
            max_radius_m: std::env::var("INTERN_MAX_RADIUS_M")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|r: &f64| r.is_finite() && *r > 0.0)
                .unwrap_or(defaults.max_radius_m),
            max_sites_per_contract: std::env::var("INTERN_MAX_SITES_PER_CONTRACT")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_sites_per_contract),
            max_clock_skew_secs: std::env::var("INTERN_MAX_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_clock_skew_secs),
        }
    }

    /// `max_clock_skew_secs` as a duration
    pub fn max_clock_skew(&self) -> chrono::Duration {
        let secs = i64::try_from(self.max_clock_skew_secs).unwrap_or(i64::MAX / 1_000);
        chrono::Duration::seconds(secs.min(i64::MAX / 1_000))
    }
}
