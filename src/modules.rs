//! Module and beacon configuration

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ModuleKind {
    #[serde(rename = "speed")]
    Speed,
    #[serde(rename = "prod")]
    Productivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ModuleConfig {
    pub module: ModuleKind,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub from_beacon: bool,
}

impl ModuleConfig {
    /// Speed multiplier for this module loadout.
    ///
    /// Values are the Seablock / Bob's + Angel's numbers, keyed by module
    /// count. Count 0 is the first tier of the table, not "no modules";
    /// leave the loadout out entirely for an unmodified machine. Counts
    /// outside the table leave speed unchanged.
    pub fn speed_multiplier(&self) -> f64 {
        let table: &[f64] = match self.module {
            ModuleKind::Speed => &[1.2, 1.3, 1.5, 1.7],
            ModuleKind::Productivity => &[0.9, 0.88, 0.86, 0.85],
        };
        table.get(self.count as usize).copied().unwrap_or(1.0)
    }
}

impl std::fmt::Display for ModuleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.module {
            ModuleKind::Speed => "speed",
            ModuleKind::Productivity => "prod",
        };
        write!(f, "{}x {}-{}", self.count, kind, self.level)?;
        if self.from_beacon {
            write!(f, " (beacon)")?;
        }
        Ok(())
    }
}

/// Combined multiplier of machine modules and beacon modules.
pub fn combined_speed(modules: Option<&ModuleConfig>, beacon: Option<&ModuleConfig>) -> f64 {
    modules.map_or(1.0, ModuleConfig::speed_multiplier)
        * beacon.map_or(1.0, ModuleConfig::speed_multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_loadout() {
        let m = ModuleConfig {
            module: ModuleKind::Productivity,
            level: 2,
            count: 3,
            from_beacon: true,
        };
        assert_eq!(m.to_string(), "3x prod-2 (beacon)");
    }

    #[test]
    fn productivity_modules_slow_down() {
        let m = ModuleConfig {
            module: ModuleKind::Productivity,
            level: 3,
            count: 2,
            from_beacon: false,
        };
        assert_eq!(m.speed_multiplier(), 0.86);
    }

    #[test]
    fn count_zero_is_first_tier() {
        let m = ModuleConfig {
            module: ModuleKind::Speed,
            level: 1,
            count: 0,
            from_beacon: false,
        };
        assert_eq!(m.speed_multiplier(), 1.2);
    }

    #[test]
    fn unknown_count_is_neutral() {
        let m = ModuleConfig {
            module: ModuleKind::Speed,
            level: 1,
            count: 12,
            from_beacon: true,
        };
        assert_eq!(m.speed_multiplier(), 1.0);
    }

    #[test]
    fn combined_multiplies_both_sources() {
        let speed = ModuleConfig {
            module: ModuleKind::Speed,
            level: 1,
            count: 1,
            from_beacon: false,
        };
        let beacon = ModuleConfig {
            from_beacon: true,
            count: 3,
            ..speed
        };
        assert!((combined_speed(Some(&speed), Some(&beacon)) - 1.3 * 1.7).abs() < 1e-12);
        assert_eq!(combined_speed(None, None), 1.0);
    }

    #[test]
    fn parses_short_kind_names() {
        let m: ModuleConfig =
            serde_json::from_str(r#"{"module": "prod", "level": 2, "count": 1}"#).unwrap();
        assert_eq!(m.module, ModuleKind::Productivity);
        assert!(!m.from_beacon);
    }
}
