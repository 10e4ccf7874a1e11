//! Remote Device Management (ANSI E1.20) carried over Art-Net.
//!
//! [`RdmPacket`] is the wire format inside ArtRdm. [`RdmRequester`] sends a
//! request and waits for its response on a shared transport, and
//! [`RdmDevice`] caches what a responder reports about itself.

mod device;
mod packet;
mod params;
mod pid;
mod request;

pub use device::RdmDevice;
pub use packet::{
    checksum, CommandClass, NackReason, RdmPacket, ResponseType, CHECKSUM_SIZE, MAX_PARAM_DATA,
    RDM_HEADER_SIZE, START_CODE, SUB_START_CODE,
};
pub use params::{
    encode_label, parse_label, parse_supported_parameters, DeviceInfo, Personality,
    SensorDefinition, SensorValue, MAX_LABEL_LEN,
};
pub use pid::ParameterId;
pub use request::{is_reply_to, RdmRequester, RdmTarget};
