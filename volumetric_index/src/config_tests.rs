use super::*;
use crate::error::Error;

#[test]
fn test_default_config_is_valid() {
    let config = VolumetricConfig::default();
    assert_eq!(config.partition_density, 1.0);
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_density_rejected() {
    let config = VolumetricConfig { partition_density: 0.0, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_nan_density_rejected() {
    let config = VolumetricConfig { partition_density: f64::NAN, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_negative_epsilon_rejected() {
    let config = VolumetricConfig { ray_epsilon: -1.0, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_border_limits_are_powers_of_two() {
    assert!(MIN_BORDER.is_power_of_two());
    assert!(MAX_BORDER.is_power_of_two());
    assert!(MIN_BORDER < MAX_BORDER);
}
