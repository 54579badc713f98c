//! Target shader-model profiles and the capabilities each one supports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GlintError;

/// A supported GLSL / GLSL ES profile subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetProfile {
    Glsl110,
    Glsl120,
    Glsl130,
    Glsl140,
    Glsl150,
    #[default]
    Glsl330,
    Glsl400,
    Glsl410,
    Glsl420,
    Glsl430,
    Glsl450,
    Glsl460,
    Essl100,
    Essl300,
    Essl310,
    Essl320,
}

/// An optional language feature that declarations may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    UniformBuffer,
    Fp64,
    StorageBuffer,
    ImageLoadStore,
    Compute,
    ExplicitBinding,
    Tessellation,
    Geometry,
    Subroutine,
    AtomicCounter,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::UniformBuffer,
        Capability::Fp64,
        Capability::StorageBuffer,
        Capability::ImageLoadStore,
        Capability::Compute,
        Capability::ExplicitBinding,
        Capability::Tessellation,
        Capability::Geometry,
        Capability::Subroutine,
        Capability::AtomicCounter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::UniformBuffer => "uniform_buffer",
            Capability::Fp64 => "fp64",
            Capability::StorageBuffer => "storage_buffer",
            Capability::ImageLoadStore => "image_load_store",
            Capability::Compute => "compute",
            Capability::ExplicitBinding => "explicit_binding",
            Capability::Tessellation => "tessellation",
            Capability::Geometry => "geometry",
            Capability::Subroutine => "subroutine",
            Capability::AtomicCounter => "atomic_counter",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = GlintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|cap| cap.name() == s)
            .ok_or_else(|| GlintError::Config(format!("unknown capability '{s}'")))
    }
}

impl TargetProfile {
    pub const ALL: [TargetProfile; 16] = [
        TargetProfile::Glsl110,
        TargetProfile::Glsl120,
        TargetProfile::Glsl130,
        TargetProfile::Glsl140,
        TargetProfile::Glsl150,
        TargetProfile::Glsl330,
        TargetProfile::Glsl400,
        TargetProfile::Glsl410,
        TargetProfile::Glsl420,
        TargetProfile::Glsl430,
        TargetProfile::Glsl450,
        TargetProfile::Glsl460,
        TargetProfile::Essl100,
        TargetProfile::Essl300,
        TargetProfile::Essl310,
        TargetProfile::Essl320,
    ];

    /// The `#version` number of this profile.
    pub fn version(self) -> u32 {
        match self {
            TargetProfile::Glsl110 => 110,
            TargetProfile::Glsl120 => 120,
            TargetProfile::Glsl130 => 130,
            TargetProfile::Glsl140 => 140,
            TargetProfile::Glsl150 => 150,
            TargetProfile::Glsl330 => 330,
            TargetProfile::Glsl400 => 400,
            TargetProfile::Glsl410 => 410,
            TargetProfile::Glsl420 => 420,
            TargetProfile::Glsl430 => 430,
            TargetProfile::Glsl450 => 450,
            TargetProfile::Glsl460 => 460,
            TargetProfile::Essl100 => 100,
            TargetProfile::Essl300 => 300,
            TargetProfile::Essl310 => 310,
            TargetProfile::Essl320 => 320,
        }
    }

    pub fn is_es(self) -> bool {
        matches!(
            self,
            TargetProfile::Essl100
                | TargetProfile::Essl300
                | TargetProfile::Essl310
                | TargetProfile::Essl320
        )
    }

    pub fn name(self) -> String {
        if self.is_es() {
            format!("essl{}", self.version())
        } else {
            format!("glsl{}", self.version())
        }
    }

    /// Whether declarations needing `capability` compile on this profile.
    pub fn supports(self, capability: Capability) -> bool {
        let v = self.version();
        if self.is_es() {
            match capability {
                Capability::UniformBuffer => v >= 300,
                Capability::StorageBuffer
                | Capability::ImageLoadStore
                | Capability::Compute
                | Capability::ExplicitBinding
                | Capability::AtomicCounter => v >= 310,
                Capability::Tessellation | Capability::Geometry => v >= 320,
                Capability::Fp64 | Capability::Subroutine => false,
            }
        } else {
            match capability {
                Capability::UniformBuffer => v >= 140,
                Capability::Geometry => v >= 150,
                Capability::Fp64 | Capability::Tessellation | Capability::Subroutine => v >= 400,
                Capability::ImageLoadStore
                | Capability::ExplicitBinding
                | Capability::AtomicCounter => v >= 420,
                Capability::StorageBuffer | Capability::Compute => v >= 430,
            }
        }
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TargetProfile {
    type Err = GlintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        TargetProfile::ALL
            .into_iter()
            .find(|profile| profile.name() == lowered)
            .ok_or_else(|| GlintError::Config(format!("unknown target profile '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_capabilities() {
        assert!(TargetProfile::Glsl430.supports(Capability::StorageBuffer));
        assert!(!TargetProfile::Glsl330.supports(Capability::StorageBuffer));
        assert!(TargetProfile::Glsl150.supports(Capability::UniformBuffer));
        assert!(!TargetProfile::Glsl330.supports(Capability::Fp64));
    }

    #[test]
    fn test_es_capabilities() {
        assert!(TargetProfile::Essl310.supports(Capability::Compute));
        assert!(!TargetProfile::Essl300.supports(Capability::Compute));
        assert!(!TargetProfile::Essl320.supports(Capability::Fp64));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("glsl330".parse::<TargetProfile>().unwrap(), TargetProfile::Glsl330);
        assert_eq!("ESSL300".parse::<TargetProfile>().unwrap(), TargetProfile::Essl300);
        assert!("glsl999".parse::<TargetProfile>().is_err());
        assert_eq!("fp64".parse::<Capability>().unwrap(), Capability::Fp64);
    }
}
