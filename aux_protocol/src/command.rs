/*!
Command ids understood by the simulated subsystems.

Ids are only meaningful together with the addressed target: `0x10` is
"set positive backlash" for a motor controller but "report status" for the
battery, charger and light sensor.
*/

/// Motor controller (altitude/azimuth) commands
pub mod motor {
    pub const GET_POSITION: u8 = 0x01;
    pub const GOTO_FAST: u8 = 0x02;
    pub const SET_POSITION: u8 = 0x04;
    pub const SET_POS_GUIDERATE: u8 = 0x06;
    pub const SET_NEG_GUIDERATE: u8 = 0x07;
    pub const SET_POS_BACKLASH: u8 = 0x10;
    pub const SET_NEG_BACKLASH: u8 = 0x11;
    pub const SLEW_DONE: u8 = 0x13;
    pub const GOTO_SLOW: u8 = 0x17;
    pub const AT_INDEX: u8 = 0x18;
    pub const SEEK_INDEX: u8 = 0x19;
    pub const MOVE_POS: u8 = 0x24;
    pub const MOVE_NEG: u8 = 0x25;
    pub const ENABLE_CORDWRAP: u8 = 0x38;
    pub const DISABLE_CORDWRAP: u8 = 0x39;
    pub const SET_CORDWRAP_POS: u8 = 0x3A;
    pub const POLL_CORDWRAP: u8 = 0x3B;
    pub const GET_CORDWRAP_POS: u8 = 0x3C;
    pub const GET_POS_BACKLASH: u8 = 0x40;
    pub const GET_NEG_BACKLASH: u8 = 0x41;
    pub const SET_AUTOGUIDE_RATE: u8 = 0x46;
    pub const GET_AUTOGUIDE_RATE: u8 = 0x47;
    pub const GET_APPROACH: u8 = 0xFC;
    pub const SET_APPROACH: u8 = 0xFD;
    pub const GET_VERSION: u8 = 0xFE;
}

/// Commands for the remaining targets (battery, charger, light, GPS, HC)
pub mod other {
    pub const GET_STATUS: u8 = 0x10;
    pub const GENERIC_ACK: u8 = 0x18;
    pub const GPS_LINKED: u8 = 0x37;
    pub const GET_VERSION: u8 = 0xFE;
}

/// Commands answered with an explicit empty acknowledgment after the reply
pub const ACKED_COMMANDS: [u8; 4] = [
    motor::GOTO_FAST,
    motor::SET_POSITION,
    motor::SET_POS_GUIDERATE,
    motor::MOVE_POS,
];

/// Check whether a command id needs the extra acknowledgment frame
pub fn requires_ack(command: u8) -> bool {
    ACKED_COMMANDS.contains(&command)
}
