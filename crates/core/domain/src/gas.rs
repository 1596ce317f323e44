use std::fmt;
use std::str::FromStr;

/// 探测器气体类型（决定满量程）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GasType {
    #[default]
    Org,
    ArfT,
    Hmds,
    Hc100,
}

impl GasType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Org => "ORG",
            Self::ArfT => "ARF-T",
            Self::Hmds => "HMDS",
            Self::Hc100 => "HC-100",
        }
    }

    pub fn full_scale(&self) -> u16 {
        match self {
            Self::Org => 9999,
            Self::ArfT => 5000,
            Self::Hmds => 3000,
            Self::Hc100 => 5000,
        }
    }

    /// 读数占满量程的比例，限制在 0..=1。
    pub fn fraction_of_full_scale(&self, reading: u16) -> f64 {
        let ratio = f64::from(reading) / f64::from(self.full_scale());
        ratio.clamp(0.0, 1.0)
    }
}

impl fmt::Display for GasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GasType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ORG" => Ok(Self::Org),
            "ARF-T" | "ARFT" => Ok(Self::ArfT),
            "HMDS" => Ok(Self::Hmds),
            "HC-100" | "HC100" => Ok(Self::Hc100),
            other => Err(format!("unknown gas type: {}", other)),
        }
    }
}
