//! Maps logical grain targets to physical output channels.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{sequence::Target, Error};

mod translate;
pub use translate::{permutations, translate, PERMUTATION_COUNT};

// -------------------------------------------------------------------------------------------------

/// Number of logical objects which can be assigned to output channels.
pub const OBJECT_COUNT: usize = 3;

// -------------------------------------------------------------------------------------------------

/// Copy of the router's channel assignments, taken once per render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentSnapshot {
    /// Current 0-based output channel of each logical object.
    pub current: [usize; OBJECT_COUNT],
    /// 0-based output channel of each logical object at the time the sequence was authored.
    pub original: [usize; OBJECT_COUNT],
    /// Offset added to every resolved channel.
    pub channel_offset: usize,
}

impl Default for AssignmentSnapshot {
    fn default() -> Self {
        Self {
            current: [0, 1, 2],
            original: [0, 1, 2],
            channel_offset: 0,
        }
    }
}

/// A resolved single-channel grain destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChannel {
    /// Channel before applying the channel offset. Selects the source channel to read from.
    pub channel: usize,
    /// Physical output channel the grain is mixed into.
    pub output_channel: usize,
}

/// Resolve a grain target to a single physical output channel.
///
/// Returns `None` for silent targets and for targets which resolve outside of the available
/// output channels. [`Target::Broadcast`] also returns `None` here: broadcasting is handled by
/// the mixer, which writes to all channels.
///
/// Object ids first match the ids the sequence was authored against (the original assignment,
/// 1-based), then the legacy fixed aliases `1`, `2` and `3`. Any other id maps directly to
/// channel `id - 1`.
pub fn resolve_channel(
    target: Target,
    assignment: &AssignmentSnapshot,
    output_channel_count: usize,
) -> Option<ResolvedChannel> {
    let id = match target {
        Target::Silent | Target::Broadcast => return None,
        Target::Object(id) => id,
    };
    let channel = if let Some(object) = assignment
        .original
        .iter()
        .position(|channel| *channel as i64 + 1 == id as i64)
    {
        assignment.current[object]
    } else if (1..=OBJECT_COUNT as i32).contains(&id) {
        assignment.current[id as usize - 1]
    } else if id >= 1 {
        id as usize - 1
    } else {
        return None;
    };
    let output_channel = channel + assignment.channel_offset;
    if output_channel < output_channel_count {
        Some(ResolvedChannel {
            channel,
            output_channel,
        })
    } else {
        None
    }
}

// -------------------------------------------------------------------------------------------------

/// Live logical object to output channel assignment, shared between control and render thread.
///
/// Every entry is an independent atomic, so the render thread always reads a valid value
/// for each field, even while the control thread reassigns objects.
#[derive(Debug)]
pub struct ChannelRouter {
    output_channel_count: AtomicUsize,
    channel_offset: AtomicUsize,
    current: [AtomicUsize; OBJECT_COUNT],
    original: [AtomicUsize; OBJECT_COUNT],
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    /// Create a new router with objects 1, 2, 3 on channels 1, 2, 3 and no output channels.
    pub fn new() -> Self {
        Self {
            output_channel_count: AtomicUsize::new(0),
            channel_offset: AtomicUsize::new(0),
            current: [0, 1, 2].map(AtomicUsize::new),
            original: [0, 1, 2].map(AtomicUsize::new),
        }
    }

    /// Number of available output channels.
    pub fn output_channel_count(&self) -> usize {
        self.output_channel_count.load(Ordering::Acquire)
    }

    /// Set the number of available output channels. Fails when `count` is zero.
    pub fn configure_channels(&self, count: usize) -> Result<(), Error> {
        if count == 0 {
            return Err(Error::NoOutputChannels);
        }
        self.output_channel_count.store(count, Ordering::Release);
        Ok(())
    }

    /// Offset added to all resolved object channels.
    pub fn channel_offset(&self) -> usize {
        self.channel_offset.load(Ordering::Acquire)
    }

    pub fn set_channel_offset(&self, offset: usize) -> Result<(), Error> {
        let output_channel_count = self.output_channel_count();
        if output_channel_count > 0 && offset >= output_channel_count {
            return Err(Error::ParameterError(format!(
                "Channel offset must be less than the output channel count ({output_channel_count})"
            )));
        }
        self.channel_offset.store(offset, Ordering::Release);
        Ok(())
    }

    /// Current 0-based output channels of all logical objects.
    pub fn current(&self) -> [usize; OBJECT_COUNT] {
        std::array::from_fn(|i| self.current[i].load(Ordering::Acquire))
    }

    /// 0-based output channels at the time the active sequence was authored.
    pub fn original(&self) -> [usize; OBJECT_COUNT] {
        std::array::from_fn(|i| self.original[i].load(Ordering::Acquire))
    }

    /// Read all assignment fields. Each field is read atomically on its own.
    #[inline]
    pub fn snapshot(&self) -> AssignmentSnapshot {
        AssignmentSnapshot {
            current: self.current(),
            original: self.original(),
            channel_offset: self.channel_offset(),
        }
    }

    /// Assign the 1-based logical object `object_id` to the 0-based output `channel`.
    ///
    /// When `preserve_sequence_mapping` is true, the original assignment is left untouched, so
    /// existing sequences keep addressing the same logical objects while their physical output
    /// moves. When false, the original assignment follows the new channel, so subsequently
    /// authored sequences refer to the new mapping.
    ///
    /// Channels outside of the available output channels fall back to channel 0.
    pub fn reassign(
        &self,
        object_id: usize,
        channel: usize,
        preserve_sequence_mapping: bool,
    ) -> Result<(), Error> {
        if !(1..=OBJECT_COUNT).contains(&object_id) {
            return Err(Error::ParameterError(format!(
                "Object id must be between 1 and {OBJECT_COUNT}, got {object_id}"
            )));
        }
        let output_channel_count = self.output_channel_count();
        let channel = if output_channel_count > 0 && channel >= output_channel_count {
            log::warn!(
                "channel {} doesn't exist, assigning object {} to channel 1",
                channel + 1,
                object_id
            );
            0
        } else {
            channel
        };
        let index = object_id - 1;
        self.current[index].store(channel, Ordering::Release);
        if !preserve_sequence_mapping {
            self.original[index].store(channel, Ordering::Release);
        }
        log::debug!(
            "object {} assigned to channel {} ({})",
            object_id,
            channel + 1,
            if preserve_sequence_mapping {
                "sequence mapping preserved"
            } else {
                "sequence mapping updated"
            }
        );
        Ok(())
    }

    /// Reassign all objects at once. See [`Self::reassign`].
    pub fn reassign_all(
        &self,
        channels: [usize; OBJECT_COUNT],
        preserve_sequence_mapping: bool,
    ) -> Result<(), Error> {
        for (index, channel) in channels.into_iter().enumerate() {
            self.reassign(index + 1, channel, preserve_sequence_mapping)?;
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
