//! E1.20 parameter IDs.

use std::fmt;

macro_rules! parameter_ids {
    ($($name:ident = $code:literal => $label:literal,)*) => {
        /// Standard RDM parameter ID. Manufacturer-specific and unlisted codes
        /// survive as [`ParameterId::Other`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ParameterId {
            $($name,)*
            Other(u16),
        }

        impl ParameterId {
            pub fn code(self) -> u16 {
                match self {
                    $(ParameterId::$name => $code,)*
                    ParameterId::Other(code) => code,
                }
            }

            pub fn from_code(code: u16) -> Self {
                match code {
                    $($code => ParameterId::$name,)*
                    other => ParameterId::Other(other),
                }
            }

            /// E1.20 name, e.g. `DEVICE_INFO`.
            pub fn name(self) -> Option<&'static str> {
                match self {
                    $(ParameterId::$name => Some($label),)*
                    ParameterId::Other(_) => None,
                }
            }
        }
    };
}

parameter_ids! {
    DiscUniqueBranch = 0x0001 => "DISC_UNIQUE_BRANCH",
    DiscMute = 0x0002 => "DISC_MUTE",
    DiscUnMute = 0x0003 => "DISC_UN_MUTE",
    ProxiedDevices = 0x0010 => "PROXIED_DEVICES",
    ProxiedDeviceCount = 0x0011 => "PROXIED_DEVICE_COUNT",
    CommsStatus = 0x0015 => "COMMS_STATUS",
    QueuedMessage = 0x0020 => "QUEUED_MESSAGE",
    StatusMessages = 0x0030 => "STATUS_MESSAGES",
    StatusIdDescription = 0x0031 => "STATUS_ID_DESCRIPTION",
    ClearStatusId = 0x0032 => "CLEAR_STATUS_ID",
    SubDeviceStatusReportThreshold = 0x0033 => "SUB_DEVICE_STATUS_REPORT_THRESHOLD",
    SupportedParameters = 0x0050 => "SUPPORTED_PARAMETERS",
    ParameterDescription = 0x0051 => "PARAMETER_DESCRIPTION",
    DeviceInfo = 0x0060 => "DEVICE_INFO",
    ProductDetailIdList = 0x0070 => "PRODUCT_DETAIL_ID_LIST",
    DeviceModelDescription = 0x0080 => "DEVICE_MODEL_DESCRIPTION",
    ManufacturerLabel = 0x0081 => "MANUFACTURER_LABEL",
    DeviceLabel = 0x0082 => "DEVICE_LABEL",
    FactoryDefaults = 0x0090 => "FACTORY_DEFAULTS",
    LanguageCapabilities = 0x00a0 => "LANGUAGE_CAPABILITIES",
    Language = 0x00b0 => "LANGUAGE",
    SoftwareVersionLabel = 0x00c0 => "SOFTWARE_VERSION_LABEL",
    BootSoftwareVersionId = 0x00c1 => "BOOT_SOFTWARE_VERSION_ID",
    BootSoftwareVersionLabel = 0x00c2 => "BOOT_SOFTWARE_VERSION_LABEL",
    DmxPersonality = 0x00e0 => "DMX_PERSONALITY",
    DmxPersonalityDescription = 0x00e1 => "DMX_PERSONALITY_DESCRIPTION",
    DmxStartAddress = 0x00f0 => "DMX_START_ADDRESS",
    SlotInfo = 0x0120 => "SLOT_INFO",
    SlotDescription = 0x0121 => "SLOT_DESCRIPTION",
    DefaultSlotValue = 0x0122 => "DEFAULT_SLOT_VALUE",
    SensorDefinition = 0x0200 => "SENSOR_DEFINITION",
    SensorValue = 0x0201 => "SENSOR_VALUE",
    RecordSensors = 0x0202 => "RECORD_SENSORS",
    DeviceHours = 0x0400 => "DEVICE_HOURS",
    LampHours = 0x0401 => "LAMP_HOURS",
    LampStrikes = 0x0402 => "LAMP_STRIKES",
    LampState = 0x0403 => "LAMP_STATE",
    LampOnMode = 0x0404 => "LAMP_ON_MODE",
    DevicePowerCycles = 0x0405 => "DEVICE_POWER_CYCLES",
    DisplayInvert = 0x0500 => "DISPLAY_INVERT",
    DisplayLevel = 0x0501 => "DISPLAY_LEVEL",
    PanInvert = 0x0600 => "PAN_INVERT",
    TiltInvert = 0x0601 => "TILT_INVERT",
    PanTiltSwap = 0x0602 => "PAN_TILT_SWAP",
    RealTimeClock = 0x0603 => "REAL_TIME_CLOCK",
    IdentifyDevice = 0x1000 => "IDENTIFY_DEVICE",
    ResetDevice = 0x1001 => "RESET_DEVICE",
    PowerState = 0x1010 => "POWER_STATE",
    PerformSelftest = 0x1020 => "PERFORM_SELFTEST",
    SelfTestDescription = 0x1021 => "SELF_TEST_DESCRIPTION",
    CapturePreset = 0x1030 => "CAPTURE_PRESET",
    PresetPlayback = 0x1031 => "PRESET_PLAYBACK",
}

impl ParameterId {
    /// PIDs every E1.20 responder must implement. These may be used even when
    /// SUPPORTED_PARAMETERS does not list them.
    pub fn is_mandatory(self) -> bool {
        matches!(
            self,
            ParameterId::DiscUniqueBranch
                | ParameterId::DiscMute
                | ParameterId::DiscUnMute
                | ParameterId::SupportedParameters
                | ParameterId::DeviceInfo
                | ParameterId::SoftwareVersionLabel
                | ParameterId::DmxStartAddress
                | ParameterId::IdentifyDevice
        )
    }

    /// Codes from 0x8000 to 0xffdf belong to manufacturers.
    pub fn is_manufacturer_specific(self) -> bool {
        (0x8000..=0xffdf).contains(&self.code())
    }
}

impl From<u16> for ParameterId {
    fn from(code: u16) -> Self {
        ParameterId::from_code(code)
    }
}

impl From<ParameterId> for u16 {
    fn from(pid: ParameterId) -> Self {
        pid.code()
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "PID {:#06x}", self.code()),
        }
    }
}
