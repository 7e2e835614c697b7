use std::sync::LazyLock;

use four_cc::FourCC;

use super::{FloatParameter, IntegerParameter, Parameter};

// -------------------------------------------------------------------------------------------------

/// Live-tunable engine parameters, addressable by their snake case name.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EngineParameterId {
    /// Nominal grain length in frames.
    GrainLength,
    /// Maximum random start offset in frames, applied in both directions.
    Jitter,
    /// Trigger interval as multiple of the grain length.
    Density,
    /// Travel factor spread in percent around 1.0.
    TravelSpread,
    /// Level of the un-granulated source layer.
    DryLevel,
}

static GRAIN_LENGTH: LazyLock<IntegerParameter> = LazyLock::new(|| {
    IntegerParameter::new(FourCC(*b"glen"), "Grain Length", 256..=8192, 2048).with_unit("frames")
});
static JITTER: LazyLock<IntegerParameter> = LazyLock::new(|| {
    IntegerParameter::new(FourCC(*b"jitr"), "Jitter", 0..=2000, 1000).with_unit("frames")
});
static DENSITY: LazyLock<FloatParameter> = LazyLock::new(|| {
    FloatParameter::new(FourCC(*b"dens"), "Density", 0.1..=2.0, 0.5).with_unit("x")
});
static TRAVEL_SPREAD: LazyLock<FloatParameter> = LazyLock::new(|| {
    FloatParameter::new(FourCC(*b"trvl"), "Travel Spread", 0.0..=50.0, 10.0)
        .with_unit("%")
        .with_display(|value| format!("{:.0}", value))
});
static DRY_LEVEL: LazyLock<FloatParameter> =
    LazyLock::new(|| FloatParameter::new(FourCC(*b"dryl"), "Dry Level", 0.0..=1.0, 0.0));

impl EngineParameterId {
    /// Integer parameter descriptor, if this is an integer parameter.
    pub fn integer_parameter(&self) -> Option<&'static IntegerParameter> {
        match self {
            Self::GrainLength => Some(&GRAIN_LENGTH),
            Self::Jitter => Some(&JITTER),
            _ => None,
        }
    }

    /// Float parameter descriptor, if this is a float parameter.
    pub fn float_parameter(&self) -> Option<&'static FloatParameter> {
        match self {
            Self::Density => Some(&DENSITY),
            Self::TravelSpread => Some(&TRAVEL_SPREAD),
            Self::DryLevel => Some(&DRY_LEVEL),
            _ => None,
        }
    }

    /// Type erased descriptor of this parameter.
    pub fn parameter(&self) -> &'static dyn Parameter {
        match self {
            Self::GrainLength => &*GRAIN_LENGTH,
            Self::Jitter => &*JITTER,
            Self::Density => &*DENSITY,
            Self::TravelSpread => &*TRAVEL_SPREAD,
            Self::DryLevel => &*DRY_LEVEL,
        }
    }
}

// -------------------------------------------------------------------------------------------------
