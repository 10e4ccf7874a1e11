//! Art-Net and RDM constants.

pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";
pub const ARTNET_PORT: u16 = 6454;
pub const PROTOCOL_VERSION: u16 = 14;

// Opcodes
pub const OP_POLL: u16 = 0x2000;
pub const OP_POLL_REPLY: u16 = 0x2100;
pub const OP_TOD_REQUEST: u16 = 0x8000;
pub const OP_TOD_DATA: u16 = 0x8100;
pub const OP_TOD_CONTROL: u16 = 0x8200;
pub const OP_RDM: u16 = 0x8300;

pub const POLL_REPLY_SIZE: usize = 239;

// ArtTodControl commands
pub const TOD_FLUSH: u8 = 0x01;

// ArtTodData command response
pub const TOD_FULL: u8 = 0x00;
pub const TOD_NAK: u8 = 0xff;

// Poll reply flags
pub const PORT_TYPE_OUTPUT: u8 = 0x80;
pub const STATUS1_RDM_CAPABLE: u8 = 0x02;
pub const GOOD_OUTPUT_DATA: u8 = 0x80;

// RDM framing
pub const RDM_START_CODE: u8 = 0xcc;
pub const RDM_SUB_START_CODE: u8 = 0x01;
pub const RDM_HEADER_SIZE: usize = 23;

// RDM command classes
pub const RDM_GET: u8 = 0x20;
pub const RDM_GET_RESPONSE: u8 = 0x21;
pub const RDM_SET: u8 = 0x30;
pub const RDM_SET_RESPONSE: u8 = 0x31;

// RDM response types
pub const RDM_ACK: u8 = 0x00;
pub const RDM_NACK_REASON: u8 = 0x02;

// NACK reasons
pub const NR_UNKNOWN_PID: u16 = 0x0000;
pub const NR_FORMAT_ERROR: u16 = 0x0001;
pub const NR_DATA_OUT_OF_RANGE: u16 = 0x0006;

// Parameter IDs
pub const PID_SUPPORTED_PARAMETERS: u16 = 0x0050;
pub const PID_DEVICE_INFO: u16 = 0x0060;
pub const PID_DEVICE_MODEL_DESCRIPTION: u16 = 0x0080;
pub const PID_MANUFACTURER_LABEL: u16 = 0x0081;
pub const PID_DEVICE_LABEL: u16 = 0x0082;
pub const PID_SOFTWARE_VERSION_LABEL: u16 = 0x00c0;
pub const PID_DMX_PERSONALITY: u16 = 0x00e0;
pub const PID_DMX_PERSONALITY_DESCRIPTION: u16 = 0x00e1;
pub const PID_DMX_START_ADDRESS: u16 = 0x00f0;
pub const PID_SENSOR_DEFINITION: u16 = 0x0200;
pub const PID_SENSOR_VALUE: u16 = 0x0201;
pub const PID_IDENTIFY_DEVICE: u16 = 0x1000;
