// Command bytes carried in the first octet of login-phase and encrypted frames.

use crate::error::{AptrustError, Result};

/// Closed set of command bytes understood by the transport.
///
/// Bytes outside this set are rejected at decode time; every dispatch site
/// matches on the enum rather than on raw integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    SecretBlock = 0x02,
    Ping = 0x04,
    StreamChunk = 0x08,
    StreamChunkRes = 0x09,
    ChannelError = 0x0a,
    ChannelAbort = 0x0b,
    RequestKey = 0x0c,
    AesKey = 0x0d,
    AesKeyError = 0x0e,
    Image = 0x19,
    CountryCode = 0x1b,
    Pong = 0x49,
    PongAck = 0x4a,
    Pause = 0x4b,
    ProductInfo = 0x50,
    LegacyWelcome = 0x69,
    PreferredLocale = 0x74,
    LicenseVersion = 0x76,
    TrackEndedTime = 0x82,
    /// Login request (client -> access point).
    Login = 0xab,
    /// Login accepted; body is the welcome payload.
    AuthSuccessful = 0xac,
    /// Login refused; body is the reason code.
    AuthDeclined = 0xad,
    MercuryReq = 0xb2,
    MercurySub = 0xb3,
    MercuryUnsub = 0xb4,
    MercuryEvent = 0xb5,
}

impl Command {
    /// Wire value of this command.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this command is reserved for the login exchange.
    pub fn is_login_phase(self) -> bool {
        matches!(
            self,
            Command::Login | Command::AuthSuccessful | Command::AuthDeclined
        )
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        command as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = AptrustError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x02 => Ok(Command::SecretBlock),
            0x04 => Ok(Command::Ping),
            0x08 => Ok(Command::StreamChunk),
            0x09 => Ok(Command::StreamChunkRes),
            0x0a => Ok(Command::ChannelError),
            0x0b => Ok(Command::ChannelAbort),
            0x0c => Ok(Command::RequestKey),
            0x0d => Ok(Command::AesKey),
            0x0e => Ok(Command::AesKeyError),
            0x19 => Ok(Command::Image),
            0x1b => Ok(Command::CountryCode),
            0x49 => Ok(Command::Pong),
            0x4a => Ok(Command::PongAck),
            0x4b => Ok(Command::Pause),
            0x50 => Ok(Command::ProductInfo),
            0x69 => Ok(Command::LegacyWelcome),
            0x74 => Ok(Command::PreferredLocale),
            0x76 => Ok(Command::LicenseVersion),
            0x82 => Ok(Command::TrackEndedTime),
            0xab => Ok(Command::Login),
            0xac => Ok(Command::AuthSuccessful),
            0xad => Ok(Command::AuthDeclined),
            0xb2 => Ok(Command::MercuryReq),
            0xb3 => Ok(Command::MercurySub),
            0xb4 => Ok(Command::MercuryUnsub),
            0xb5 => Ok(Command::MercuryEvent),
            other => Err(AptrustError::UnexpectedCommand(other)),
        }
    }
}
