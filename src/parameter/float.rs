use std::{fmt::Debug, ops::RangeInclusive, sync::Arc};

use four_cc::FourCC;

use super::{Parameter, ParameterType};
use crate::Error;

// -------------------------------------------------------------------------------------------------

/// A continuous (float) parameter descriptor.
#[derive(Clone)]
pub struct FloatParameter {
    id: FourCC,
    name: &'static str,
    range: RangeInclusive<f32>,
    default: f32,
    unit: &'static str,
    #[allow(clippy::type_complexity)]
    value_to_string: Option<Arc<dyn Fn(f32) -> String + Send + Sync>>,
}

impl Debug for FloatParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloatParameter")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("range", &self.range)
            .field("default", &self.default)
            .field("unit", &self.unit)
            .field("value_to_string", &self.value_to_string.is_some())
            .finish()
    }
}

impl FloatParameter {
    /// Create a new float parameter descriptor.
    pub fn new(id: FourCC, name: &'static str, range: RangeInclusive<f32>, default: f32) -> Self {
        assert!(range.contains(&default), "Invalid parameter default value");
        Self {
            id,
            name,
            range,
            default,
            unit: "",
            value_to_string: None,
        }
    }

    /// Optional unit for string displays.
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Optional custom conversion function to convert a plain value to a string.
    ///
    /// Returned strings should not contain a unit, if a unit already was set for this parameter.
    pub fn with_display<ValueToString: Fn(f32) -> String + Send + Sync + 'static>(
        mut self,
        value_to_string: ValueToString,
    ) -> Self {
        self.value_to_string = Some(Arc::new(value_to_string));
        self
    }

    /// The parameter's value range.
    pub fn range(&self) -> &RangeInclusive<f32> {
        &self.range
    }

    /// The parameter's default value.
    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Check that the given plain value lies within the parameter's range.
    ///
    /// Out of range and non finite values are rejected, never clamped.
    pub fn validate(&self, value: f32) -> Result<f32, Error> {
        if value.is_finite() && self.range.contains(&value) {
            Ok(value)
        } else {
            Err(Error::ParameterError(format!(
                "{} must be between {} and {}, got {}",
                self.name,
                self.value_to_string(*self.range.start(), true),
                self.value_to_string(*self.range.end(), true),
                value
            )))
        }
    }

    /// Convert the given plain value to a string, using a custom conversion function if provided.
    pub fn value_to_string(&self, value: f32, include_unit: bool) -> String {
        match (&self.value_to_string, include_unit && !self.unit.is_empty()) {
            (Some(f), true) => format!("{} {}", f(value), self.unit),
            (Some(f), false) => f(value),
            (None, true) => format!("{:.2} {}", value, self.unit),
            (None, false) => format!("{:.2}", value),
        }
    }

    /// Parse and validate a plain value from a string. A trailing unit is ignored.
    pub fn string_to_value(&self, string: &str) -> Result<f32, Error> {
        let mut trimmed = string.trim();
        if !self.unit.is_empty() {
            trimmed = trimmed.trim_end_matches(self.unit).trim_end();
        }
        let value = trimmed.parse::<f32>().map_err(|_| {
            Error::ParameterError(format!("{}: '{}' is not a number", self.name, trimmed))
        })?;
        self.validate(value)
    }
}

impl Parameter for FloatParameter {
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
        ParameterType::Float {
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
    fn validation_rejects_out_of_range() {
        let density = FloatParameter::new(FourCC(*b"dens"), "Density", 0.1..=2.0, 0.5);
        assert_eq!(density.validate(0.1).unwrap(), 0.1);
        assert_eq!(density.validate(2.0).unwrap(), 2.0);
        assert!(density.validate(0.05).is_err());
        assert!(density.validate(2.5).is_err());
        assert!(density.validate(f32::NAN).is_err());
    }

    #[test]
    fn string_conversion() {
        let spread = FloatParameter::new(FourCC(*b"trvl"), "Travel Spread", 0.0..=50.0, 10.0)
            .with_unit("%")
            .with_display(|v| format!("{:.0}", v));
        assert_eq!(spread.value_to_string(12.4, true), "12 %");
        assert_eq!(spread.value_to_string(12.4, false), "12");
        assert_eq!(spread.string_to_value(" 25 %").unwrap(), 25.0);
        assert!(spread.string_to_value("60").is_err());
        assert!(spread.string_to_value("abc").is_err());
    }
}
