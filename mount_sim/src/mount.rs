/*!
Simulated mount mechanics.

Positions are fractions of a full rotation. Azimuth wraps into `[0, 1)`,
altitude is clamped to the travel limits of the fork. Command handlers and the
tick driver are the only writers; everything else reads a [`MountSnapshot`].
*/

use crate::command_log::CommandLog;
use aux_protocol::Target;
use serde::Serialize;
use std::fmt;

/// Travel limits of the live altitude axis
pub const ALTITUDE_LIMITS: (f64, f64) = (-0.03, 0.23);

/// Travel limits accepted for an altitude goto target
pub const TARGET_ALTITUDE_LIMITS: (f64, f64) = (-0.01, 0.24);

/// Fastest closed-loop drive speed, 5 deg/s in rotations per second
pub const MAX_GOTO_RATE: f64 = 5.0 / 360.0;

/// Arrival tolerance for positions and rates
pub const EPSILON: f64 = 1e-4;

/// Tolerance while a fast goto is in flight
pub const FAST_GOTO_EPSILON: f64 = EPSILON / 100.0;

const ARCSEC: f64 = 1.0 / (360.0 * 3600.0);
const DEGREE: f64 = 1.0 / 360.0;

/// Manual jog speeds indexed by the rate byte of MOVE_POS/MOVE_NEG
pub const RATE_TABLE: [f64; 10] = [
    0.0,
    2.0 * ARCSEC,
    4.0 * ARCSEC,
    8.0 * ARCSEC,
    16.0 * ARCSEC,
    32.0 * ARCSEC,
    0.5 * DEGREE,
    2.0 * DEGREE,
    5.0 * DEGREE,
    10.0 * DEGREE,
];

/// Motor axis addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Axis {
    Altitude,
    Azimuth,
}

impl Axis {
    /// Map a bus address to the axis it drives
    pub fn from_target(id: u8) -> Option<Self> {
        match Target::from_u8(id)? {
            Target::Altitude => Some(Self::Altitude),
            Target::Azimuth => Some(Self::Azimuth),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Altitude => "ALT",
            Self::Azimuth => "AZM",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Altitude => 0,
            Self::Azimuth => 1,
        }
    }

    fn other(self) -> Self {
        match self {
            Self::Altitude => Self::Azimuth,
            Self::Azimuth => Self::Altitude,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a jog or guide correction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Which goto command started the current closed-loop drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoSpeed {
    Fast,
    Slow,
}

/// Reduce a position into `[0, 1)`
pub fn wrap_rotation(value: f64) -> f64 {
    let wrapped = value.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed azimuth error from `from` to `to` along the shorter way round
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let delta = wrap_rotation(to - from);
    if delta > 0.5 {
        delta - 1.0
    } else {
        delta
    }
}

fn clamp_to(value: f64, (low, high): (f64, f64)) -> f64 {
    value.clamp(low, high)
}

/// Closed-loop speed toward a remaining error.
///
/// Full speed far from the goal; within two ticks of arrival the speed is
/// halved and never covers more than half the remaining error per tick.
fn approach_rate(error: f64, interval: f64) -> f64 {
    let distance = error.abs();
    let speed = if distance < 2.0 * MAX_GOTO_RATE * interval {
        (MAX_GOTO_RATE / 2.0).min(distance / (2.0 * interval))
    } else {
        MAX_GOTO_RATE
    };
    speed.copysign(error)
}

/// The simulated physical state of one mount
#[derive(Debug, Clone)]
pub struct MountState {
    altitude: f64,
    azimuth: f64,
    target_altitude: f64,
    target_azimuth: f64,
    rate: [f64; 2],
    guide_rate: [f64; 2],
    approach: [u8; 2],
    backlash_positive: [u8; 2],
    backlash_negative: [u8; 2],
    cordwrap_position: u32,
    cordwrap_enabled: bool,
    autoguide_rate: u8,
    slewing: bool,
    guiding: bool,
    goto: bool,
    goto_speed: GotoSpeed,
    /// Axes driven by the current goto; the others hold still
    goto_axes: [bool; 2],
    last_command: String,
    command_log: CommandLog,
}

impl MountState {
    /// Create a parked mount pointing at altitude 0, azimuth 0
    pub fn new() -> Self {
        Self {
            altitude: 0.0,
            azimuth: 0.0,
            target_altitude: 0.0,
            target_azimuth: 0.0,
            rate: [0.0; 2],
            guide_rate: [0.0; 2],
            approach: [0; 2],
            backlash_positive: [0; 2],
            backlash_negative: [0; 2],
            cordwrap_position: 0,
            cordwrap_enabled: false,
            autoguide_rate: 0xF0,
            slewing: false,
            guiding: false,
            goto: false,
            goto_speed: GotoSpeed::Slow,
            goto_axes: [false; 2],
            last_command: String::new(),
            command_log: CommandLog::default(),
        }
    }

    // --- positions -------------------------------------------------------

    /// Clamped to [`ALTITUDE_LIMITS`]
    pub fn set_altitude(&mut self, value: f64) {
        if value.is_finite() {
            self.altitude = clamp_to(value, ALTITUDE_LIMITS);
        }
    }

    /// Reduced modulo one rotation
    pub fn set_azimuth(&mut self, value: f64) {
        if value.is_finite() {
            self.azimuth = wrap_rotation(value);
        }
    }

    /// Clamped to [`TARGET_ALTITUDE_LIMITS`]
    pub fn set_target_altitude(&mut self, value: f64) {
        if value.is_finite() {
            self.target_altitude = clamp_to(value, TARGET_ALTITUDE_LIMITS);
        }
    }

    /// Reduced modulo one rotation
    pub fn set_target_azimuth(&mut self, value: f64) {
        if value.is_finite() {
            self.target_azimuth = wrap_rotation(value);
        }
    }

    pub fn position(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Altitude => self.altitude,
            Axis::Azimuth => self.azimuth,
        }
    }

    fn set_position(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Altitude => self.set_altitude(value),
            Axis::Azimuth => self.set_azimuth(value),
        }
    }

    fn set_target(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Altitude => self.set_target_altitude(value),
            Axis::Azimuth => self.set_target_azimuth(value),
        }
    }

    /// Remaining goto error, azimuth taking the shorter way round.
    ///
    /// Altitude targets past the live travel limits settle at the limit.
    fn goal_error(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Altitude => clamp_to(self.target_altitude, ALTITUDE_LIMITS) - self.altitude,
            Axis::Azimuth => shortest_delta(self.azimuth, self.target_azimuth),
        }
    }

    // --- rates -----------------------------------------------------------

    pub fn rate(&self, axis: Axis) -> f64 {
        self.rate[axis.index()]
    }

    pub fn guide_rate(&self, axis: Axis) -> f64 {
        self.guide_rate[axis.index()]
    }

    /// True once the axis has stopped moving under its own drive
    pub fn slew_done(&self, axis: Axis) -> bool {
        self.rate(axis) == 0.0
    }

    // --- passthrough settings --------------------------------------------

    pub fn approach(&self, axis: Axis) -> u8 {
        self.approach[axis.index()]
    }

    pub fn set_approach(&mut self, axis: Axis, value: u8) {
        self.approach[axis.index()] = value;
    }

    pub fn backlash(&self, axis: Axis, direction: Direction) -> u8 {
        match direction {
            Direction::Positive => self.backlash_positive[axis.index()],
            Direction::Negative => self.backlash_negative[axis.index()],
        }
    }

    pub fn set_backlash(&mut self, axis: Axis, direction: Direction, value: u8) {
        match direction {
            Direction::Positive => self.backlash_positive[axis.index()] = value,
            Direction::Negative => self.backlash_negative[axis.index()] = value,
        }
    }

    pub fn cordwrap_position(&self) -> u32 {
        self.cordwrap_position
    }

    /// Stored as the raw 24-bit value
    pub fn set_cordwrap_position(&mut self, raw: u32) {
        self.cordwrap_position = raw & 0xFF_FFFF;
    }

    pub fn cordwrap_enabled(&self) -> bool {
        self.cordwrap_enabled
    }

    pub fn set_cordwrap_enabled(&mut self, enabled: bool) {
        self.cordwrap_enabled = enabled;
    }

    pub fn autoguide_rate(&self) -> u8 {
        self.autoguide_rate
    }

    pub fn set_autoguide_rate(&mut self, value: u8) {
        self.autoguide_rate = value;
    }

    // --- history ---------------------------------------------------------

    /// Remember the most recent command name
    pub fn note_command(&mut self, name: &str) {
        if self.last_command != name {
            self.last_command = name.to_string();
        }
    }

    /// Remember the command and add a description to the history
    pub fn record(&mut self, name: &str, description: String) {
        self.note_command(name);
        self.command_log.push(description);
    }

    // --- driving verbs ---------------------------------------------------

    /// Open-loop jog at one of the [`RATE_TABLE`] speeds.
    ///
    /// Indices past the end of the table use the fastest speed. A jog cancels
    /// any closed-loop drive, which also stops the other axis.
    pub fn jog(&mut self, axis: Axis, direction: Direction, rate_index: u8) {
        let index = (rate_index as usize).min(RATE_TABLE.len() - 1);
        if self.goto {
            self.goto = false;
            self.rate[axis.other().index()] = 0.0;
        }
        self.slewing = true;
        self.rate[axis.index()] = direction.sign() * RATE_TABLE[index];
    }

    /// Start a closed-loop drive of one axis toward `position`.
    ///
    /// Active guide corrections are cancelled. If no goto was running, the
    /// other axis stops and stays where it is until a goto addresses it.
    pub fn goto(&mut self, axis: Axis, position: f64, speed: GotoSpeed) {
        if !self.goto {
            self.goto_axes = [false; 2];
            self.rate[axis.other().index()] = 0.0;
        }
        self.goto_axes[axis.index()] = true;

        self.slewing = true;
        self.goto = true;
        self.goto_speed = speed;
        self.guide_rate = [0.0; 2];
        self.guiding = false;

        self.set_target(axis, position);
        let error = self.goal_error(axis);
        self.rate[axis.index()] = MAX_GOTO_RATE.copysign(error);

        if speed == GotoSpeed::Fast {
            self.note_command("GOTO_FAST");
        } else {
            self.note_command("GOTO_SLOW");
        }
    }

    /// Set a guide correction (rotations per second, always additive)
    pub fn set_guide_rate(&mut self, axis: Axis, direction: Direction, rate: f64) {
        self.guide_rate[axis.index()] = direction.sign() * rate.abs();
        self.guiding = self.guide_rate.iter().any(|r| *r != 0.0);
    }

    fn epsilon(&self) -> f64 {
        if self.goto_speed == GotoSpeed::Fast {
            FAST_GOTO_EPSILON
        } else {
            EPSILON
        }
    }

    /// Advance the model by `interval` seconds
    pub fn tick(&mut self, interval: f64) {
        for axis in [Axis::Altitude, Axis::Azimuth] {
            let i = axis.index();
            let next = self.position(axis) + (self.rate[i] + self.guide_rate[i]) * interval;
            self.set_position(axis, next);
        }

        if self.goto {
            let errors = [Axis::Altitude, Axis::Azimuth].map(|axis| {
                if self.goto_axes[axis.index()] {
                    self.goal_error(axis)
                } else {
                    0.0
                }
            });
            for axis in [Axis::Altitude, Axis::Azimuth] {
                self.rate[axis.index()] = approach_rate(errors[axis.index()], interval);
            }

            let eps = self.epsilon();
            let settled = self.rate.iter().all(|r| r.abs() < eps) && errors.iter().all(|e| e.abs() < eps);
            if settled {
                self.rate = [0.0; 2];
                self.slewing = false;
                self.goto = false;
            }
        } else if self.slewing && self.rate.iter().all(|r| *r == 0.0) {
            self.slewing = false;
        }
    }

    /// Read-only copy for observers
    pub fn snapshot(&self) -> MountSnapshot {
        MountSnapshot {
            mode: self.mode(),
            altitude: self.altitude,
            azimuth: self.azimuth,
            target_altitude: self.target_altitude,
            target_azimuth: self.target_azimuth,
            altitude_rate: self.rate(Axis::Altitude),
            azimuth_rate: self.rate(Axis::Azimuth),
            altitude_guide_rate: self.guide_rate(Axis::Altitude),
            azimuth_guide_rate: self.guide_rate(Axis::Azimuth),
            slewing: self.slewing,
            guiding: self.guiding,
            goto: self.goto,
            last_command: self.last_command.clone(),
            command_log: self.command_log.tail(crate::status::STATUS_LOG_LINES),
        }
    }

    fn mode(&self) -> &'static str {
        match (self.goto, self.slewing, self.guiding) {
            (true, _, _) => "GOTO",
            (false, true, _) => "SLEW",
            (false, false, true) => "GUIDE",
            _ => "IDLE",
        }
    }
}

impl Default for MountState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MountState {
    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    pub fn target_altitude(&self) -> f64 {
        self.target_altitude
    }

    pub fn target_azimuth(&self) -> f64 {
        self.target_azimuth
    }

    pub fn is_slewing(&self) -> bool {
        self.slewing
    }

    pub fn is_guiding(&self) -> bool {
        self.guiding
    }

    pub fn is_goto(&self) -> bool {
        self.goto
    }

    pub fn last_command(&self) -> &str {
        &self.last_command
    }

    pub fn command_log(&self) -> &CommandLog {
        &self.command_log
    }
}

/// Point-in-time view of a mount, handed to the status renderer
#[derive(Debug, Clone, Serialize)]
pub struct MountSnapshot {
    pub mode: &'static str,
    pub altitude: f64,
    pub azimuth: f64,
    pub target_altitude: f64,
    pub target_azimuth: f64,
    pub altitude_rate: f64,
    pub azimuth_rate: f64,
    pub altitude_guide_rate: f64,
    pub azimuth_guide_rate: f64,
    pub slewing: bool,
    pub guiding: bool,
    pub goto: bool,
    pub last_command: String,
    pub command_log: Vec<String>,
}
