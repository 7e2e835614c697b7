use std::ops::RangeInclusive;

use four_cc::FourCC;

use super::{Parameter, ParameterType};
use crate::Error;

// -------------------------------------------------------------------------------------------------

/// A discrete (integer) parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<i32>,
    default: i32,
    unit: &'static str,
}

impl IntegerParameter {
    pub fn new(id: FourCC, name: &'static str, range: RangeInclusive<i32>, default: i32) -> Self {
        assert!(range.contains(&default), "Invalid parameter default value");
        Self {
            id,
            name,
            range,
            default,
            unit: "",
        }
    }

    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    pub fn range(&self) -> &RangeInclusive<i32> {
        &self.range
    }

    pub fn default_value(&self) -> i32 {
        self.default
    }

    pub fn validate(&self, value: i32) -> Result<i32, Error> {
        if self.range.contains(&value) {
            Ok(value)
        } else {
            Err(Error::ParameterError(format!(
                "{} must be between {} and {}, got {}",
                self.name,
                self.range.start(),
                self.range.end(),
                value
            )))
        }
    }

    pub fn value_to_string(&self, value: i32, include_unit: bool) -> String {
        if include_unit && !self.unit.is_empty() {
            format!("{} {}", value, self.unit)
        } else {
            value.to_string()
        }
    }

    pub fn string_to_value(&self, string: &str) -> Result<i32, Error> {
        let mut trimmed = string.trim();
        if !self.unit.is_empty() {
            trimmed = trimmed.trim_end_matches(self.unit).trim_end();
        }
        let value = trimmed.parse::<i32>().map_err(|_| {
            Error::ParameterError(format!("{}: '{}' is not an integer", self.name, trimmed))
        })?;
        self.validate(value)
    }
}

impl Parameter for IntegerParameter {
    fn id(&self) -> FourCC {
        self.id
    }
    fn name(&self) -> &'static str {
        self.name
    }
    fn unit(&self) -> &'static str {
        self.unit
    }
    fn parameter_type(&self) -> ParameterType {
        ParameterType::Integer {
            range: self.range.clone(),
            default: self.default,
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        let length =
            IntegerParameter::new(FourCC(*b"glen"), "Grain Length", 256..=8192, 2048)
                .with_unit("frames");
        assert_eq!(length.validate(256).unwrap(), 256);
        assert!(length.validate(255).is_err());
        assert!(length.validate(8193).is_err());
        assert_eq!(length.string_to_value("4096 frames").unwrap(), 4096);
        assert!(length.string_to_value("40.5").is_err());
        assert_eq!(length.value_to_string(512, true), "512 frames");
    }
}
