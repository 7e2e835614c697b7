//! Grain hopping sequences and their compact pattern notation.
//!
//! A pattern is a whitespace separated list of tokens:
//! - `N`: a single grain routed to logical object `N`.
//! - `x`: a single silent grain.
//! - `N*COUNT` or `x*COUNT`: the same target repeated `COUNT` times.
//!
//! For example `"1 2 3*5 x 2*7 x*3"` expands to 18 grain targets.

use std::fmt;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Integer step value used for silent grains in expanded sequences.
pub const SILENT_STEP: i32 = -1;
/// Integer step value used for grains which play on all output channels.
pub const BROADCAST_STEP: i32 = -2;
/// Maximum number of expanded steps a pattern may produce.
pub const MAX_SEQUENCE_STEPS: usize = 65536;

// -------------------------------------------------------------------------------------------------

/// Spatial destination of a single grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The grain plays, but contributes nothing to the output.
    Silent,
    /// The grain plays identically on every output channel.
    Broadcast,
    /// The grain plays on the channel assigned to the given logical object id.
    Object(i32),
}

impl Target {
    /// Convert an expanded sequence step value into a target.
    pub fn from_step(step: i32) -> Self {
        match step {
            SILENT_STEP => Self::Silent,
            BROADCAST_STEP => Self::Broadcast,
            id => Self::Object(id),
        }
    }

    /// Convert the target back into its integer step representation.
    pub fn to_step(self) -> i32 {
        match self {
            Self::Silent => SILENT_STEP,
            Self::Broadcast => BROADCAST_STEP,
            Self::Object(id) => id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "x"),
            Self::Broadcast => write!(f, "*"),
            Self::Object(id) => write!(f, "{id}"),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// An immutable, expanded grain hopping sequence together with the text it was parsed from.
///
/// Sequences are never modified in place once published to the render thread: replacing a
/// sequence means swapping in a new instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    text: String,
    steps: Vec<i32>,
}

impl Sequence {
    /// An empty sequence. Grains broadcast to all channels when the sequence is empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a pattern string into an expanded sequence.
    ///
    /// Fails with [`Error::SequenceParseError`] when the expanded pattern would exceed
    /// [`MAX_SEQUENCE_STEPS`] or when a token is not a valid integer on either
    /// side of `*`. Target ranges are not checked here: unassignable targets are dropped by
    /// the router at mix time.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut steps = Vec::new();
        for token in text.split_whitespace() {
            match token.split_once('*') {
                Some((target, count)) => {
                    let step = Self::parse_target(target, token)?;
                    let count = count
                        .parse::<u32>()
                        .map_err(|_| Self::invalid_token(token))?
                        as usize;
                    Self::check_length(steps.len(), count, token)?;
                    steps.extend(std::iter::repeat(step).take(count));
                }
                None => {
                    let step = Self::parse_target(token, token)?;
                    Self::check_length(steps.len(), 1, token)?;
                    steps.push(step);
                }
            }
        }
        Ok(Self {
            text: text.trim().to_string(),
            steps,
        })
    }

    fn check_length(current: usize, added: usize, token: &str) -> Result<(), Error> {
        if current.saturating_add(added) > MAX_SEQUENCE_STEPS {
            Err(Error::SequenceParseError(format!(
                "'{token}' expands the pattern beyond {MAX_SEQUENCE_STEPS} steps"
            )))
        } else {
            Ok(())
        }
    }

    fn invalid_token(token: &str) -> Error {
        Error::SequenceParseError(format!(
            "'{token}' is not a number, 'x' or 'N*COUNT'"
        ))
    }

    fn parse_target(target: &str, token: &str) -> Result<i32, Error> {
        if target == "x" {
            Ok(SILENT_STEP)
        } else {
            target
                .parse::<i32>()
                .map_err(|_| Self::invalid_token(token))
        }
    }

    /// The (trimmed) pattern text this sequence was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expanded integer steps: positive values are object ids, `-1` is silence.
    pub fn steps(&self) -> &[i32] {
        &self.steps
    }

    /// Number of expanded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Target at the given step index, wrapping around the sequence length.
    /// Returns [`Target::Broadcast`] for empty sequences.
    #[inline]
    pub fn target(&self, index: usize) -> Target {
        if self.steps.is_empty() {
            Target::Broadcast
        } else {
            Target::from_step(self.steps[index % self.steps.len()])
        }
    }

    /// Render the expanded steps as space separated tokens, using `x` for silence.
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|step| Target::from_step(*step).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// -------------------------------------------------------------------------------------------------
