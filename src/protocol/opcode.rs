//! Art-Net operation codes.

use std::fmt;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)*) => {
        /// The 16-bit operation code carried little-endian at offset 8 of every packet.
        ///
        /// Codes this crate does not know survive as [`OpCode::Unknown`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum OpCode {
            $($(#[$doc])* $name,)*
            /// A code outside the Art-Net 4 table.
            Unknown(u16),
        }

        impl OpCode {
            /// Wire value of this opcode.
            pub fn code(self) -> u16 {
                match self {
                    $(OpCode::$name => $code,)*
                    OpCode::Unknown(code) => code,
                }
            }

            /// Maps a wire value to an opcode.
            pub fn from_code(code: u16) -> Self {
                match code {
                    $($code => OpCode::$name,)*
                    other => OpCode::Unknown(other),
                }
            }
        }
    };
}

opcodes! {
    /// Controller discovery request.
    Poll = 0x2000,
    /// Node status reply to [`OpCode::Poll`].
    PollReply = 0x2100,
    /// Diagnostic text.
    DiagData = 0x2300,
    Command = 0x2400,
    DataRequest = 0x2700,
    DataReply = 0x2800,
    /// DMX512 frame.
    Dmx = 0x5000,
    Nzs = 0x5100,
    /// Frame synchronisation.
    Sync = 0x5200,
    /// Remote node programming.
    Address = 0x6000,
    Input = 0x7000,
    /// Table-of-devices request.
    TodRequest = 0x8000,
    /// Table-of-devices response.
    TodData = 0x8100,
    /// Table-of-devices control (flush and friends).
    TodControl = 0x8200,
    /// RDM message envelope.
    Rdm = 0x8300,
    RdmSub = 0x8400,
    Media = 0x9000,
    MediaPatch = 0x9100,
    MediaControl = 0x9200,
    MediaControlReply = 0x9300,
    TimeCode = 0x9700,
    TimeSync = 0x9800,
    Trigger = 0x9900,
    Directory = 0x9a00,
    DirectoryReply = 0x9b00,
    VideoSetup = 0xa010,
    VideoPalette = 0xa020,
    VideoData = 0xa040,
    MacMaster = 0xf000,
    MacSlave = 0xf100,
    FirmwareMaster = 0xf200,
    FirmwareReply = 0xf300,
    FileTnMaster = 0xf400,
    FileFnMaster = 0xf500,
    FileFnReply = 0xf600,
    IpProg = 0xf800,
    IpProgReply = 0xf900,
}

impl OpCode {
    /// Whether a version field follows the opcode. ArtPollReply is the only
    /// Art-Net 4 packet without one.
    pub fn has_version(self) -> bool {
        !matches!(self, OpCode::PollReply)
    }
}

impl From<u16> for OpCode {
    fn from(code: u16) -> Self {
        OpCode::from_code(code)
    }
}

impl From<OpCode> for u16 {
    fn from(op: OpCode) -> Self {
        op.code()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Unknown(code) => write!(f, "OpUnknown({:#06x})", code),
            other => write!(f, "Op{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_both_ways() {
        assert_eq!(OpCode::from_code(0x2000), OpCode::Poll);
        assert_eq!(OpCode::from_code(0x8300), OpCode::Rdm);
        assert_eq!(OpCode::TodControl.code(), 0x8200);
        assert_eq!(OpCode::IpProgReply.code(), 0xf900);
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let op = OpCode::from_code(0x1234);
        assert_eq!(op, OpCode::Unknown(0x1234));
        assert_eq!(op.code(), 0x1234);
        assert_eq!(op.to_string(), "OpUnknown(0x1234)");
    }

    #[test]
    fn test_only_poll_reply_lacks_version() {
        assert!(!OpCode::PollReply.has_version());
        assert!(OpCode::Poll.has_version());
        assert!(OpCode::Rdm.has_version());
    }
}
