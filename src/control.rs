//! Interactive live control of a running engine.

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::{
    mixer::ChannelTestSettings,
    parameter::{EngineParameterId, Parameter, ParameterType},
    routing::{self, OBJECT_COUNT},
    state::EngineState,
    utils::frames_to_ms,
    Error,
};

// -------------------------------------------------------------------------------------------------

mod command;
pub use command::ControlCommand;

// -------------------------------------------------------------------------------------------------

/// Default interval at which the control loop polls for new input lines.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// -------------------------------------------------------------------------------------------------

/// States of the live control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Listening,
    HandlingCommand(ControlCommand),
}

// -------------------------------------------------------------------------------------------------

/// Line based live control of an engine, running on a non-realtime thread.
///
/// Input lines arrive through a channel, usually from [`spawn_stdin_reader`]. Prompts and
/// messages for the user are written to `output`. Rejected input never changes the engine
/// state: the previous value is kept and a message is printed.
pub struct LiveController<W: Write> {
    state: Arc<EngineState>,
    input: Receiver<String>,
    output: W,
    sample_rate: u32,
    poll_interval: Duration,
    channel_test_settings: ChannelTestSettings,
    channel_test_timeout: Option<Duration>,
    control_state: ControlState,
}

impl<W: Write> LiveController<W> {
    /// Create a new controller for an engine which renders at the given output sample rate.
    pub fn new(
        state: Arc<EngineState>,
        input: Receiver<String>,
        output: W,
        sample_rate: u32,
    ) -> Self {
        Self {
            state,
            input,
            output,
            sample_rate,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_test_settings: ChannelTestSettings::default(),
            channel_test_timeout: None,
            control_state: ControlState::Idle,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_channel_test_settings(mut self, settings: ChannelTestSettings) -> Self {
        self.channel_test_settings = settings;
        self
    }

    /// Maximum time to wait for a channel test to finish. By default, the test's own
    /// duration plus two seconds.
    pub fn with_channel_test_timeout(mut self, timeout: Duration) -> Self {
        self.channel_test_timeout = Some(timeout);
        self
    }

    pub fn control_state(&self) -> ControlState {
        self.control_state
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Print the list of available commands.
    pub fn print_controls(&mut self) -> Result<(), Error> {
        writeln!(self.output, "\nLive Controls:")?;
        for line in ControlCommand::help_lines() {
            writeln!(self.output, "{line}")?;
        }
        self.output.flush()?;
        Ok(())
    }

    /// Run the control loop until the input channel disconnects or a quit command arrives.
    pub fn run(&mut self) -> Result<(), Error> {
        self.print_controls()?;
        loop {
            self.set_control_state(ControlState::Listening);
            let line = match self.input.recv_timeout(self.poll_interval) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let Some(command) = ControlCommand::from_input(&line) else {
                if !line.trim().is_empty() {
                    log::warn!("unknown control command '{}'", line.trim());
                    writeln!(self.output, "Unknown command '{}'.", line.trim())?;
                    self.print_controls()?;
                }
                continue;
            };
            if command == ControlCommand::Quit {
                break;
            }
            self.set_control_state(ControlState::HandlingCommand(command));
            match self.handle_command(command) {
                Ok(()) => {}
                Err(err @ (Error::ChannelTestTimeout | Error::SendError(_))) => {
                    log::warn!("{:?} failed: {}", command, err);
                    writeln!(self.output, "{err}")?;
                }
                Err(err) => return Err(err),
            }
            self.output.flush()?;
        }
        self.set_control_state(ControlState::Idle);
        Ok(())
    }

    /// Handle a single command, reading follow-up input lines as needed.
    pub fn handle_command(&mut self, command: ControlCommand) -> Result<(), Error> {
        match command {
            ControlCommand::ChannelTest => {
                self.run_channel_test()?;
                writeln!(self.output, "Channel test complete!")?;
            }
            ControlCommand::Reassign => self.reassign_objects()?,
            ControlCommand::Sequence => self.change_sequence()?,
            ControlCommand::GrainLength => self.change_parameter(EngineParameterId::GrainLength)?,
            ControlCommand::Jitter => self.change_parameter(EngineParameterId::Jitter)?,
            ControlCommand::Density => self.change_parameter(EngineParameterId::Density)?,
            ControlCommand::TravelSpread => {
                self.change_parameter(EngineParameterId::TravelSpread)?
            }
            ControlCommand::DryLevel => self.change_parameter(EngineParameterId::DryLevel)?,
            ControlCommand::ChannelOffset => self.change_channel_offset()?,
            ControlCommand::Status => self.print_status()?,
            ControlCommand::Quit => {}
        }
        Ok(())
    }

    /// Pause grain routing, play the channel identification test and wait until it finished.
    /// Routing is resumed in any case.
    pub fn run_channel_test(&mut self) -> Result<(), Error> {
        writeln!(
            self.output,
            "Playing test tones on {} channels...",
            self.state.output_channel_count()
        )?;
        self.output.flush()?;
        self.state.set_routing_paused(true);
        let result = self
            .state
            .start_channel_test(self.channel_test_settings)
            .and_then(|_| self.wait_for_channel_test());
        self.state.set_routing_paused(false);
        result
    }

    fn wait_for_channel_test(&self) -> Result<(), Error> {
        let timeout = self.channel_test_timeout.unwrap_or_else(|| {
            let frames = self
                .channel_test_settings
                .duration_frames(self.state.output_channel_count());
            Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
                + Duration::from_secs(2)
        });
        let deadline = Instant::now() + timeout;
        while self.state.channel_test_running() {
            if Instant::now() >= deadline {
                self.state.cancel_channel_test();
                return Err(Error::ChannelTestTimeout);
            }
            thread::sleep(
                self.poll_interval
                    .min(deadline.saturating_duration_since(Instant::now())),
            );
        }
        log::debug!("channel test finished");
        Ok(())
    }

    fn reassign_objects(&mut self) -> Result<(), Error> {
        let output_channel_count = self.state.output_channel_count();
        writeln!(
            self.output,
            "Select {} output channels (1-{}):",
            OBJECT_COUNT, output_channel_count
        )?;
        let router = self.state.router();
        for object_index in 0..OBJECT_COUNT {
            let current = router.current()[object_index];
            write!(
                self.output,
                "Object {} (channel {}): ",
                object_index + 1,
                current + 1
            )?;
            self.output.flush()?;
            let Some(line) = self.read_line() else {
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.trim().parse::<usize>() {
                Ok(channel) if channel >= 1 => {
                    if channel > output_channel_count {
                        writeln!(
                            self.output,
                            "Warning: Channel {channel} doesn't exist. Using channel 1."
                        )?;
                    }
                    router.reassign(object_index + 1, channel - 1, true)?;
                    writeln!(
                        self.output,
                        "Object {} switching now to channel {}!",
                        object_index + 1,
                        router.current()[object_index] + 1
                    )?;
                }
                _ => {
                    log::warn!("rejected channel input '{}'", line.trim());
                    writeln!(
                        self.output,
                        "Invalid channel '{}'. Keeping channel {}.",
                        line.trim(),
                        current + 1
                    )?;
                }
            }
        }
        let current = router.current();
        writeln!(
            self.output,
            "Selected channels: {}, {}, {}",
            current[0] + 1,
            current[1] + 1,
            current[2] + 1
        )?;
        writeln!(
            self.output,
            "Live channel assignment updated (sequence mapping preserved)"
        )?;
        self.print_translations()
    }

    fn print_translations(&mut self) -> Result<(), Error> {
        let sequence = self.state.sequence();
        if !self.state.hopping_enabled() || sequence.is_empty() {
            return Ok(());
        }
        let router = self.state.router();
        let to_ids = |channels: [usize; OBJECT_COUNT]| channels.map(|c| c as i32 + 1);
        let (old, new) = (to_ids(router.original()), to_ids(router.current()));
        writeln!(
            self.output,
            "Objects: {}, {}, {}",
            new[0], new[1], new[2]
        )?;
        writeln!(self.output, "Current sequence: {}", sequence.text())?;
        writeln!(self.output, "Translation options (copy/paste-able):")?;
        let translations = routing::translate(sequence.text(), old, new);
        for (index, (text, mapping)) in translations
            .iter()
            .zip(routing::permutations(new))
            .enumerate()
        {
            writeln!(
                self.output,
                "Option {}: {}  ({}→{}, {}→{}, {}→{})",
                index + 1,
                text,
                old[0],
                mapping[0],
                old[1],
                mapping[1],
                old[2],
                mapping[2]
            )?;
        }
        Ok(())
    }

    fn change_sequence(&mut self) -> Result<(), Error> {
        self.print_translations()?;
        write!(
            self.output,
            "Enter a hopping sequence (e.g. '1 2 3*2 x'), empty keeps the current one: "
        )?;
        self.output.flush()?;
        let Some(line) = self.read_line() else {
            return Ok(());
        };
        if line.trim().is_empty() {
            writeln!(self.output, "Keeping current sequence.")?;
            return Ok(());
        }
        match self.state.load_sequence(line.trim()) {
            Ok(()) => {
                let sequence = self.state.sequence();
                writeln!(
                    self.output,
                    "Sequence loaded: {} steps ({})",
                    sequence.len(),
                    sequence.describe()
                )?;
            }
            Err(err @ Error::SequenceParseError(_)) => {
                log::warn!("rejected sequence '{}': {}", line.trim(), err);
                writeln!(self.output, "{err}. Keeping current sequence.")?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn change_parameter(&mut self, id: EngineParameterId) -> Result<(), Error> {
        let current = self.parameter_value_string(id);
        let range = match id.parameter().parameter_type() {
            ParameterType::Integer { range, .. } => format!("{}-{}", range.start(), range.end()),
            ParameterType::Float { range, .. } => format!("{}-{}", range.start(), range.end()),
        };
        write!(
            self.output,
            "{} ({}) [current: {}]: ",
            id.parameter().name(),
            range,
            current
        )?;
        self.output.flush()?;
        let Some(line) = self.read_line() else {
            return Ok(());
        };
        if line.trim().is_empty() {
            return Ok(());
        }
        let parsed = match (id.integer_parameter(), id.float_parameter()) {
            (Some(parameter), _) => parameter.string_to_value(&line).map(f64::from),
            (_, Some(parameter)) => parameter.string_to_value(&line).map(f64::from),
            _ => Err(Error::ParameterError(format!("{id} has no descriptor"))),
        };
        match parsed.and_then(|value| self.state.set_engine_parameter(&id.to_string(), value)) {
            Ok(()) => {
                let value = self.parameter_value_string(id);
                log::info!("{} set to {}", id, value);
                writeln!(self.output, "{} set to {}", id.parameter().name(), value)?;
            }
            Err(err @ Error::ParameterError(_)) => {
                log::warn!("rejected {} input '{}': {}", id, line.trim(), err);
                writeln!(self.output, "{err}. Keeping {current}.")?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn change_channel_offset(&mut self) -> Result<(), Error> {
        let router = self.state.router();
        let current = router.channel_offset();
        write!(
            self.output,
            "Channel offset (0-{}) [current: {}]: ",
            self.state.output_channel_count().saturating_sub(1),
            current
        )?;
        self.output.flush()?;
        let Some(line) = self.read_line() else {
            return Ok(());
        };
        if line.trim().is_empty() {
            return Ok(());
        }
        let result = line
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::ParameterError(format!("'{}' is not a channel offset", line.trim())))
            .and_then(|offset| router.set_channel_offset(offset));
        match result {
            Ok(()) => writeln!(
                self.output,
                "Channel offset set to {}",
                router.channel_offset()
            )?,
            Err(err @ Error::ParameterError(_)) => {
                log::warn!("rejected channel offset '{}': {}", line.trim(), err);
                writeln!(self.output, "{err}. Keeping offset {current}.")?;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Print channel assignment, sequence, parameters and playback status.
    pub fn print_status(&mut self) -> Result<(), Error> {
        let router = self.state.router();
        let current = router.current();
        writeln!(
            self.output,
            "Output channels: {} (offset {})",
            self.state.output_channel_count(),
            router.channel_offset()
        )?;
        writeln!(
            self.output,
            "Objects: {}, {}, {}",
            current[0] + 1,
            current[1] + 1,
            current[2] + 1
        )?;
        let sequence = self.state.sequence();
        if self.state.hopping_enabled() && !sequence.is_empty() {
            writeln!(
                self.output,
                "Sequence: {} ({} steps)",
                sequence.text(),
                sequence.len()
            )?;
        } else {
            writeln!(self.output, "Sequence: none (grains play on all channels)")?;
        }
        for id in [
            EngineParameterId::GrainLength,
            EngineParameterId::Jitter,
            EngineParameterId::Density,
            EngineParameterId::TravelSpread,
            EngineParameterId::DryLevel,
        ] {
            let value = self.parameter_value_string(id);
            writeln!(self.output, "{}: {}", id.parameter().name(), value)?;
        }
        writeln!(
            self.output,
            "Active grains: {}, position: {:.1} / {:.1} s",
            self.state.active_grain_count(),
            frames_to_ms(self.state.playback_position(), self.sample_rate) / 1000.0,
            frames_to_ms(self.state.playback_length(), self.sample_rate) / 1000.0
        )?;
        Ok(())
    }

    fn parameter_value_string(&self, id: EngineParameterId) -> String {
        let frames_with_ms = |frames: usize| {
            format!(
                "{} frames = {:.1} ms",
                frames,
                frames_to_ms(frames, self.sample_rate)
            )
        };
        let float_string = |value: f32| {
            id.float_parameter()
                .map_or_else(|| value.to_string(), |p| p.value_to_string(value, true))
        };
        match id {
            EngineParameterId::GrainLength => frames_with_ms(self.state.grain_length()),
            EngineParameterId::Jitter => frames_with_ms(self.state.jitter()),
            EngineParameterId::Density => float_string(self.state.density()),
            EngineParameterId::TravelSpread => float_string(self.state.travel_spread()),
            EngineParameterId::DryLevel => float_string(self.state.dry_level()),
        }
    }

    /// Blocking read of a follow-up input line. None when the input disconnected.
    fn read_line(&self) -> Option<String> {
        self.input.recv().ok()
    }

    fn set_control_state(&mut self, state: ControlState) {
        if self.control_state != state {
            log::debug!("control state: {:?} -> {:?}", self.control_state, state);
            self.control_state = state;
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Read lines from stdin on a dedicated thread and deliver them through a channel.
///
/// The thread ends when stdin closes or the receiver got dropped.
pub fn spawn_stdin_reader() -> Result<Receiver<String>, Error> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("grainhop_stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            // receiver got dropped
                            break;
                        }
                    }
                    Err(err) => {
                        log::warn!("failed to read from stdin: {}", err);
                        break;
                    }
                }
            }
        })?;
    Ok(receiver)
}

// -------------------------------------------------------------------------------------------------
