//! Bounded engine parameter descriptors.

use std::fmt::Debug;

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Describes the type and bounds of a [`Parameter`], e.g. to print help texts in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// A continuous floating-point value.
    Float {
        range: std::ops::RangeInclusive<f32>,
        default: f32,
    },
    /// A discrete integer value.
    Integer {
        range: std::ops::RangeInclusive<i32>,
        default: i32,
    },
}

// -------------------------------------------------------------------------------------------------

/// Describes a single live-tunable engine parameter.
pub trait Parameter: Debug {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// Optional display unit. Empty when the parameter has no unit.
    fn unit(&self) -> &'static str;

    /// The parameter type and its bounds.
    fn parameter_type(&self) -> ParameterType;
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::FloatParameter;

mod integer;
pub use integer::IntegerParameter;

mod engine;
pub use engine::EngineParameterId;
