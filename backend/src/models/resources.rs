//! Resource vector
//!
//! A `Resources` value is a componentwise (ram, cpu, gpu) quantity used for
//! both cluster capacity and deployment footprints.
//!
//! CRITICAL: all quantities are f64 (GB / cores / device count)

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};
use thiserror::Error;

/// Errors raised when validating a resource vector
#[derive(Debug, Error, PartialEq)]
pub enum ResourcesError {
    #[error("ram must be strictly positive, got {0}")]
    NonPositiveRam(f64),

    #[error("cpu must be strictly positive, got {0}")]
    NonPositiveCpu(f64),

    #[error("gpu must be non-negative, got {0}")]
    NegativeGpu(f64),
}

/// Componentwise resource quantity (ram in GB, cpu in cores, gpu in count)
///
/// # Example
/// ```
/// use deployment_hypervisor_core::models::Resources;
///
/// let capacity = Resources::new(8.0, 4.0, 1.0);
/// let footprint = Resources::new(1.0, 1.0, 0.0);
/// assert!(capacity.covers(&footprint));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    /// RAM in GB
    pub ram: f64,

    /// CPU in cores
    pub cpu: f64,

    /// GPU device count
    pub gpu: f64,
}

impl Resources {
    /// Create a resource vector
    pub fn new(ram: f64, cpu: f64, gpu: f64) -> Self {
        Self { ram, cpu, gpu }
    }

    /// The zero vector
    pub fn zero() -> Self {
        Self::default()
    }

    /// True iff every component of `required` fits within `self`
    pub fn covers(&self, required: &Resources) -> bool {
        self.ram >= required.ram && self.cpu >= required.cpu && self.gpu >= required.gpu
    }

    /// Componentwise `max(0, self − available)`
    ///
    /// The amount by which `self` exceeds `available` on each axis. Used by
    /// the preemption pass to size its victim selection.
    pub fn shortfall(&self, available: &Resources) -> Resources {
        Resources {
            ram: (self.ram - available.ram).max(0.0),
            cpu: (self.cpu - available.cpu).max(0.0),
            gpu: (self.gpu - available.gpu).max(0.0),
        }
    }

    /// Componentwise clamp of `self` to at most `ceiling`
    pub fn clamped_to(&self, ceiling: &Resources) -> Resources {
        Resources {
            ram: self.ram.min(ceiling.ram),
            cpu: self.cpu.min(ceiling.cpu),
            gpu: self.gpu.min(ceiling.gpu),
        }
    }

    /// True iff every component is zero
    pub fn is_zero(&self) -> bool {
        self.ram == 0.0 && self.cpu == 0.0 && self.gpu == 0.0
    }

    /// Validate a deployment footprint: ram and cpu strictly positive, gpu
    /// non-negative
    pub fn validate_requirements(&self) -> Result<(), ResourcesError> {
        if self.ram <= 0.0 {
            return Err(ResourcesError::NonPositiveRam(self.ram));
        }
        if self.cpu <= 0.0 {
            return Err(ResourcesError::NonPositiveCpu(self.cpu));
        }
        if self.gpu < 0.0 {
            return Err(ResourcesError::NegativeGpu(self.gpu));
        }
        Ok(())
    }

    /// Validate a cluster capacity: same rule as footprints (GPU-less
    /// clusters are legal, RAM-less or CPU-less ones are not)
    pub fn validate_capacity(&self) -> Result<(), ResourcesError> {
        self.validate_requirements()
    }
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            ram: self.ram + rhs.ram,
            cpu: self.cpu + rhs.cpu,
            gpu: self.gpu + rhs.gpu,
        }
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        self.ram += rhs.ram;
        self.cpu += rhs.cpu;
        self.gpu += rhs.gpu;
    }
}

impl Sub for Resources {
    type Output = Resources;

    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            ram: self.ram - rhs.ram,
            cpu: self.cpu - rhs.cpu,
            gpu: self.gpu - rhs.gpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_is_componentwise() {
        let avail = Resources::new(4.0, 2.0, 1.0);

        assert!(avail.covers(&Resources::new(4.0, 2.0, 1.0)));
        assert!(avail.covers(&Resources::new(0.5, 0.5, 0.0)));
        assert!(!avail.covers(&Resources::new(4.5, 0.5, 0.0)));
        assert!(!avail.covers(&Resources::new(0.5, 2.5, 0.0)));
        assert!(!avail.covers(&Resources::new(0.5, 0.5, 2.0)));
    }

    #[test]
    fn test_shortfall_floors_at_zero() {
        let required = Resources::new(4.0, 1.0, 0.0);
        let available = Resources::new(1.0, 2.0, 1.0);

        let s = required.shortfall(&available);
        assert_eq!(s, Resources::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_validate_requirements() {
        assert!(Resources::new(1.0, 1.0, 0.0).validate_requirements().is_ok());
        assert_eq!(
            Resources::new(0.0, 1.0, 0.0).validate_requirements(),
            Err(ResourcesError::NonPositiveRam(0.0))
        );
        assert_eq!(
            Resources::new(1.0, -1.0, 0.0).validate_requirements(),
            Err(ResourcesError::NonPositiveCpu(-1.0))
        );
        assert_eq!(
            Resources::new(1.0, 1.0, -0.5).validate_requirements(),
            Err(ResourcesError::NegativeGpu(-0.5))
        );
    }

    #[test]
    fn test_zero_gpu_capacity_is_valid() {
        assert!(Resources::new(8.0, 4.0, 0.0).validate_capacity().is_ok());
    }
}
