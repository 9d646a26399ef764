/*!
Command registry for the simulated subsystems.

Two disjoint tables exist: one for the altitude/azimuth motor controllers and
one for every other target (battery, charger, light sensor, GPS, hand
controller). A lookup picks the table from the addressed target, then the
command from its id. Handlers are plain functions over [`MountState`] that
return the reply payload.
*/

use crate::mount::{Axis, Direction, GotoSpeed, MountState};
use aux_protocol::command::{motor, other};
use aux_protocol::units::{
    decode_position, decode_signed_position, decode_u24, encode_position, encode_u24, guide_rate_to_rotations,
};
use aux_protocol::target::{self, Target};

/// Version tuple reported by the motor controllers
pub const MOTOR_FIRMWARE_VERSION: [u8; 4] = [7, 11, 19, 6];

/// Version tuple reported by the hand controller and accessories
pub const HC_FIRMWARE_VERSION: [u8; 4] = [5, 35, 3, 1];

/// Battery telemetry: charging flag, level code, voltage in microvolts
pub const BATTERY_STATUS: [u8; 6] = [0x00, 0x02, 0x00, 0xBC, 0x5E, 0x28];

/// Charger telemetry: powered
pub const CHARGER_STATUS: [u8; 1] = [0x01];

/// Light sensor level
pub const LIGHT_STATUS: [u8; 2] = [0x00, 0x80];

const INDEX_FOUND: u8 = 0xFF;
const SLEW_IDLE: u8 = 0xFF;
const SLEW_BUSY: u8 = 0x00;

/// Addressing and payload of one inbound command
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub payload: &'a [u8],
    pub source: u8,
    pub destination: u8,
}

/// History entry naming the sender, e.g. `MOVE_POS AZM 9 [APP]`
fn attributed(request: &Request<'_>, entry: String) -> String {
    format!("{} [{}]", entry, target::describe(request.source))
}

/// Commands understood by the motor controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorCommand {
    GetPosition,
    GotoFast,
    SetPosition,
    SetPosGuideRate,
    SetNegGuideRate,
    SetPosBacklash,
    SetNegBacklash,
    SlewDone,
    GotoSlow,
    AtIndex,
    SeekIndex,
    MovePos,
    MoveNeg,
    EnableCordwrap,
    DisableCordwrap,
    SetCordwrapPos,
    PollCordwrap,
    GetCordwrapPos,
    GetPosBacklash,
    GetNegBacklash,
    SetAutoguideRate,
    GetAutoguideRate,
    GetApproach,
    SetApproach,
    GetVersion,
}

impl MotorCommand {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            motor::GET_POSITION => Some(Self::GetPosition),
            motor::GOTO_FAST => Some(Self::GotoFast),
            motor::SET_POSITION => Some(Self::SetPosition),
            motor::SET_POS_GUIDERATE => Some(Self::SetPosGuideRate),
            motor::SET_NEG_GUIDERATE => Some(Self::SetNegGuideRate),
            motor::SET_POS_BACKLASH => Some(Self::SetPosBacklash),
            motor::SET_NEG_BACKLASH => Some(Self::SetNegBacklash),
            motor::SLEW_DONE => Some(Self::SlewDone),
            motor::GOTO_SLOW => Some(Self::GotoSlow),
            motor::AT_INDEX => Some(Self::AtIndex),
            motor::SEEK_INDEX => Some(Self::SeekIndex),
            motor::MOVE_POS => Some(Self::MovePos),
            motor::MOVE_NEG => Some(Self::MoveNeg),
            motor::ENABLE_CORDWRAP => Some(Self::EnableCordwrap),
            motor::DISABLE_CORDWRAP => Some(Self::DisableCordwrap),
            motor::SET_CORDWRAP_POS => Some(Self::SetCordwrapPos),
            motor::POLL_CORDWRAP => Some(Self::PollCordwrap),
            motor::GET_CORDWRAP_POS => Some(Self::GetCordwrapPos),
            motor::GET_POS_BACKLASH => Some(Self::GetPosBacklash),
            motor::GET_NEG_BACKLASH => Some(Self::GetNegBacklash),
            motor::SET_AUTOGUIDE_RATE => Some(Self::SetAutoguideRate),
            motor::GET_AUTOGUIDE_RATE => Some(Self::GetAutoguideRate),
            motor::GET_APPROACH => Some(Self::GetApproach),
            motor::SET_APPROACH => Some(Self::SetApproach),
            motor::GET_VERSION => Some(Self::GetVersion),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetPosition => "GET_POSITION",
            Self::GotoFast => "GOTO_FAST",
            Self::SetPosition => "SET_POSITION",
            Self::SetPosGuideRate => "SET_POS_GUIDERATE",
            Self::SetNegGuideRate => "SET_NEG_GUIDERATE",
            Self::SetPosBacklash => "SET_POS_BACKLASH",
            Self::SetNegBacklash => "SET_NEG_BACKLASH",
            Self::SlewDone => "SLEW_DONE",
            Self::GotoSlow => "GOTO_SLOW",
            Self::AtIndex => "AT_INDEX",
            Self::SeekIndex => "SEEK_INDEX",
            Self::MovePos => "MOVE_POS",
            Self::MoveNeg => "MOVE_NEG",
            Self::EnableCordwrap => "ENABLE_CORDWRAP",
            Self::DisableCordwrap => "DISABLE_CORDWRAP",
            Self::SetCordwrapPos => "SET_CORDWRAP_POS",
            Self::PollCordwrap => "POLL_CORDWRAP",
            Self::GetCordwrapPos => "GET_CORDWRAP_POS",
            Self::GetPosBacklash => "GET_POS_BACKLASH",
            Self::GetNegBacklash => "GET_NEG_BACKLASH",
            Self::SetAutoguideRate => "SET_AUTOGUIDE_RATE",
            Self::GetAutoguideRate => "GET_AUTOGUIDE_RATE",
            Self::GetApproach => "GET_APPROACH",
            Self::SetApproach => "SET_APPROACH",
            Self::GetVersion => "GET_VER",
        }
    }

    fn execute(self, mount: &mut MountState, request: &Request<'_>) -> Vec<u8> {
        let Some(axis) = Axis::from_target(request.destination) else {
            return Vec::new();
        };
        let name = self.name();
        let payload = request.payload;
        let first = payload.first().copied();

        match self {
            Self::GetPosition => {
                mount.note_command(name);
                encode_position(mount.position(axis)).to_vec()
            }
            Self::GotoFast | Self::GotoSlow => {
                let target = match axis {
                    Axis::Altitude => decode_signed_position(payload),
                    Axis::Azimuth => decode_position(payload),
                };
                if let Some(target) = target {
                    let speed = if self == Self::GotoFast { GotoSpeed::Fast } else { GotoSpeed::Slow };
                    mount.goto(axis, target, speed);
                    mount.record(name, attributed(request, format!("{} {} {:.4}°", name, axis, target * 360.0)));
                }
                Vec::new()
            }
            Self::SetPosition => {
                mount.record(name, attributed(request, format!("{} {}", name, axis)));
                Vec::new()
            }
            Self::SetPosGuideRate | Self::SetNegGuideRate => {
                let direction = if self == Self::SetPosGuideRate { Direction::Positive } else { Direction::Negative };
                if let Some(raw) = decode_u24(payload) {
                    mount.set_guide_rate(axis, direction, guide_rate_to_rotations(raw));
                    mount.record(name, attributed(request, format!("{} {} {:.2}\"/s", name, axis, raw as f64 / 1024.0)));
                }
                Vec::new()
            }
            Self::MovePos | Self::MoveNeg => {
                let direction = if self == Self::MovePos { Direction::Positive } else { Direction::Negative };
                let index = first.unwrap_or(0);
                mount.jog(axis, direction, index);
                mount.record(name, attributed(request, format!("{} {} {}", name, axis, index)));
                Vec::new()
            }
            Self::SlewDone => {
                mount.note_command(name);
                vec![if mount.slew_done(axis) { SLEW_IDLE } else { SLEW_BUSY }]
            }
            Self::SeekIndex => {
                mount.record(name, attributed(request, format!("{} {}", name, axis)));
                Vec::new()
            }
            Self::AtIndex => {
                mount.note_command(name);
                vec![INDEX_FOUND]
            }
            Self::SetPosBacklash | Self::SetNegBacklash => {
                let direction = if self == Self::SetPosBacklash { Direction::Positive } else { Direction::Negative };
                if let Some(value) = first {
                    mount.set_backlash(axis, direction, value);
                    mount.record(name, attributed(request, format!("{} {} {}", name, axis, value)));
                }
                Vec::new()
            }
            Self::GetPosBacklash => {
                mount.note_command(name);
                vec![mount.backlash(axis, Direction::Positive)]
            }
            Self::GetNegBacklash => {
                mount.note_command(name);
                vec![mount.backlash(axis, Direction::Negative)]
            }
            Self::GetApproach => {
                mount.note_command(name);
                vec![mount.approach(axis)]
            }
            Self::SetApproach => {
                if let Some(value) = first {
                    mount.set_approach(axis, value);
                    mount.record(name, attributed(request, format!("{} {} {}", name, axis, value)));
                }
                Vec::new()
            }
            Self::SetAutoguideRate => {
                if let Some(value) = first {
                    mount.set_autoguide_rate(value);
                    mount.record(name, attributed(request, format!("{} {} {}", name, axis, value)));
                }
                Vec::new()
            }
            Self::GetAutoguideRate => {
                mount.note_command(name);
                vec![mount.autoguide_rate()]
            }
            Self::EnableCordwrap | Self::DisableCordwrap => {
                mount.set_cordwrap_enabled(self == Self::EnableCordwrap);
                mount.record(name, attributed(request, format!("{} {}", name, axis)));
                Vec::new()
            }
            Self::PollCordwrap => {
                mount.note_command(name);
                vec![if mount.cordwrap_enabled() { 0xFF } else { 0x00 }]
            }
            Self::SetCordwrapPos => {
                if let Some(raw) = decode_u24(payload) {
                    mount.set_cordwrap_position(raw);
                    mount.record(name, attributed(request, format!("{} {} {:06x}", name, axis, raw)));
                }
                Vec::new()
            }
            Self::GetCordwrapPos => {
                mount.note_command(name);
                encode_u24(mount.cordwrap_position()).to_vec()
            }
            Self::GetVersion => {
                mount.note_command(name);
                firmware_version(request.destination).to_vec()
            }
        }
    }
}

/// Commands understood by the non-motor targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherCommand {
    GetStatus,
    GenericAck,
    GpsLinked,
    GetVersion,
}

impl OtherCommand {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            other::GET_STATUS => Some(Self::GetStatus),
            other::GENERIC_ACK => Some(Self::GenericAck),
            other::GPS_LINKED => Some(Self::GpsLinked),
            other::GET_VERSION => Some(Self::GetVersion),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetStatus => "GET_STATUS",
            Self::GenericAck => "ACK",
            Self::GpsLinked => "GPS_LINKED",
            Self::GetVersion => "GET_VER",
        }
    }

    fn execute(self, mount: &mut MountState, request: &Request<'_>) -> Vec<u8> {
        mount.note_command(self.name());
        let target = Target::from_u8(request.destination);

        match self {
            Self::GetStatus => match target {
                Some(Target::Battery) => BATTERY_STATUS.to_vec(),
                Some(Target::Charger) => CHARGER_STATUS.to_vec(),
                Some(Target::Light) => LIGHT_STATUS.to_vec(),
                _ => Vec::new(),
            },
            Self::GpsLinked => match target {
                Some(Target::Gps) => vec![0x00],
                _ => Vec::new(),
            },
            Self::GenericAck => Vec::new(),
            Self::GetVersion => firmware_version(request.destination).to_vec(),
        }
    }
}

/// A resolved handler: registry family plus command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Motor(MotorCommand),
    Other(OtherCommand),
}

impl Command {
    /// Resolve a handler by receiver class, then by command id
    pub fn lookup(destination: u8, id: u8) -> Option<Self> {
        if Target::id_is_motor(destination) {
            MotorCommand::from_id(id).map(Self::Motor)
        } else {
            OtherCommand::from_id(id).map(Self::Other)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Motor(command) => command.name(),
            Self::Other(command) => command.name(),
        }
    }

    /// Run the handler and return the reply payload
    pub fn execute(self, mount: &mut MountState, request: &Request<'_>) -> Vec<u8> {
        match self {
            Self::Motor(command) => command.execute(mount, request),
            Self::Other(command) => command.execute(mount, request),
        }
    }
}

/// Motor controllers and everything else report different versions
pub fn firmware_version(target: u8) -> [u8; 4] {
    if Target::id_is_motor(target) {
        MOTOR_FIRMWARE_VERSION
    } else {
        HC_FIRMWARE_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::RATE_TABLE;

    const APP: u8 = 0x20;
    const ALT: u8 = 0x11;
    const AZM: u8 = 0x10;

    fn run(mount: &mut MountState, destination: u8, id: u8, payload: &[u8]) -> Vec<u8> {
        let command = Command::lookup(destination, id).expect("command not registered");
        command.execute(mount, &Request { payload, source: APP, destination })
    }

    #[test]
    fn test_lookup_by_target_class() {
        assert_eq!(Command::lookup(ALT, 0x10), Some(Command::Motor(MotorCommand::SetPosBacklash)));
        assert_eq!(Command::lookup(0xB6, 0x10), Some(Command::Other(OtherCommand::GetStatus)));
        assert_eq!(Command::lookup(AZM, 0x37), None);
        assert_eq!(Command::lookup(0xB0, 0x02), None);
        assert_eq!(Command::lookup(ALT, 0x99), None);
    }

    #[test]
    fn test_get_position() {
        let mut mount = MountState::new();
        mount.set_azimuth(0.25);
        assert_eq!(run(&mut mount, AZM, motor::GET_POSITION, &[]), vec![0x40, 0x00, 0x00]);

        mount.set_altitude(-0.01);
        let reply = run(&mut mount, ALT, motor::GET_POSITION, &[]);
        assert_eq!(reply[0], 0xFD);
        assert_eq!(mount.last_command(), "GET_POSITION");
    }

    #[test]
    fn test_goto_fast_sets_target() {
        let mut mount = MountState::new();
        let reply = run(&mut mount, AZM, motor::GOTO_FAST, &[0xE6, 0x66, 0x66]);
        assert!(reply.is_empty());
        assert!(mount.is_goto());
        assert!(mount.is_slewing());
        assert!((mount.target_azimuth() - 0.9).abs() < 1e-6);
        assert!(mount.rate(Axis::Azimuth) < 0.0);
        assert_eq!(mount.last_command(), "GOTO_FAST");
        assert!(mount.command_log().last().unwrap().starts_with("GOTO_FAST AZM"));
    }

    #[test]
    fn test_history_names_sender() {
        let mut mount = MountState::new();
        let request = Request {
            payload: &[4],
            source: 0x04,
            destination: ALT,
        };
        Command::lookup(ALT, motor::MOVE_NEG).unwrap().execute(&mut mount, &request);
        assert_eq!(mount.command_log().last(), Some("MOVE_NEG ALT 4 [HC]"));
    }

    #[test]
    fn test_goto_slow_negative_altitude() {
        let mut mount = MountState::new();
        run(&mut mount, ALT, motor::GOTO_SLOW, &encode_position(-0.005));
        assert!((mount.target_altitude() + 0.005).abs() < 1e-6);
        assert!(mount.rate(Axis::Altitude) < 0.0);
    }

    #[test]
    fn test_goto_short_payload_ignored() {
        let mut mount = MountState::new();
        run(&mut mount, AZM, motor::GOTO_FAST, &[0x12]);
        assert!(!mount.is_goto());
        assert!(mount.command_log().is_empty());
    }

    #[test]
    fn test_move_and_slew_done() {
        let mut mount = MountState::new();
        assert_eq!(run(&mut mount, ALT, motor::SLEW_DONE, &[]), vec![0xFF]);

        run(&mut mount, ALT, motor::MOVE_POS, &[7]);
        assert_eq!(mount.rate(Axis::Altitude), RATE_TABLE[7]);
        assert_eq!(run(&mut mount, ALT, motor::SLEW_DONE, &[]), vec![0x00]);
        assert_eq!(run(&mut mount, AZM, motor::SLEW_DONE, &[]), vec![0xFF]);

        run(&mut mount, ALT, motor::MOVE_NEG, &[2]);
        assert_eq!(mount.rate(Axis::Altitude), -RATE_TABLE[2]);
        run(&mut mount, ALT, motor::MOVE_NEG, &[0]);
        assert_eq!(run(&mut mount, ALT, motor::SLEW_DONE, &[]), vec![0xFF]);
    }

    #[test]
    fn test_guide_rates() {
        let mut mount = MountState::new();
        run(&mut mount, AZM, motor::SET_NEG_GUIDERATE, &encode_u24(15 * 1024));
        assert!(mount.is_guiding());
        assert!(mount.guide_rate(Axis::Azimuth) < 0.0);

        run(&mut mount, AZM, motor::SET_NEG_GUIDERATE, &[0, 0, 0]);
        assert!(!mount.is_guiding());
        assert_eq!(mount.guide_rate(Axis::Azimuth), 0.0);
    }

    #[test]
    fn test_backlash_and_approach_passthrough() {
        let mut mount = MountState::new();
        run(&mut mount, ALT, motor::SET_POS_BACKLASH, &[12]);
        run(&mut mount, ALT, motor::SET_NEG_BACKLASH, &[34]);
        run(&mut mount, AZM, motor::SET_APPROACH, &[1]);

        assert_eq!(run(&mut mount, ALT, motor::GET_POS_BACKLASH, &[]), vec![12]);
        assert_eq!(run(&mut mount, ALT, motor::GET_NEG_BACKLASH, &[]), vec![34]);
        assert_eq!(run(&mut mount, AZM, motor::GET_POS_BACKLASH, &[]), vec![0]);
        assert_eq!(run(&mut mount, AZM, motor::GET_APPROACH, &[]), vec![1]);
        assert_eq!(run(&mut mount, ALT, motor::GET_APPROACH, &[]), vec![0]);
    }

    #[test]
    fn test_cordwrap() {
        let mut mount = MountState::new();
        run(&mut mount, AZM, motor::SET_CORDWRAP_POS, &[0x12, 0x34, 0x56]);
        assert_eq!(mount.cordwrap_position(), 0x123456);
        assert_eq!(run(&mut mount, AZM, motor::GET_CORDWRAP_POS, &[]), vec![0x12, 0x34, 0x56]);

        assert_eq!(run(&mut mount, AZM, motor::POLL_CORDWRAP, &[]), vec![0x00]);
        run(&mut mount, AZM, motor::ENABLE_CORDWRAP, &[]);
        assert_eq!(run(&mut mount, AZM, motor::POLL_CORDWRAP, &[]), vec![0xFF]);
        run(&mut mount, AZM, motor::DISABLE_CORDWRAP, &[]);
        assert!(!mount.cordwrap_enabled());
    }

    #[test]
    fn test_stubs() {
        let mut mount = MountState::new();
        assert_eq!(run(&mut mount, ALT, motor::GET_AUTOGUIDE_RATE, &[]), vec![0xF0]);
        assert!(run(&mut mount, ALT, motor::SEEK_INDEX, &[]).is_empty());
        assert_eq!(run(&mut mount, ALT, motor::AT_INDEX, &[]), vec![0xFF]);
        assert!(run(&mut mount, ALT, motor::SET_POSITION, &[0, 0, 0]).is_empty());
    }

    #[test]
    fn test_firmware_versions() {
        let mut mount = MountState::new();
        assert_eq!(run(&mut mount, AZM, motor::GET_VERSION, &[]), MOTOR_FIRMWARE_VERSION.to_vec());
        assert_eq!(run(&mut mount, 0x04, other::GET_VERSION, &[]), HC_FIRMWARE_VERSION.to_vec());
    }

    #[test]
    fn test_other_target_telemetry() {
        let mut mount = MountState::new();
        assert_eq!(run(&mut mount, 0xB6, other::GET_STATUS, &[]), BATTERY_STATUS.to_vec());
        assert_eq!(run(&mut mount, 0xB7, other::GET_STATUS, &[]), CHARGER_STATUS.to_vec());
        assert_eq!(run(&mut mount, 0xBF, other::GET_STATUS, &[]), LIGHT_STATUS.to_vec());
        assert!(run(&mut mount, 0x04, other::GET_STATUS, &[]).is_empty());
        assert_eq!(run(&mut mount, 0xB0, other::GPS_LINKED, &[]), vec![0x00]);
        assert!(run(&mut mount, 0xB6, other::GENERIC_ACK, &[]).is_empty());
    }
}
