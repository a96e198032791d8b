//! Standard data types most nodes implement, from the `uavcan.protocol` namespace. It's
//! described in the [DSDL repo, protocols page](https://github.com/dronecan/DSDL/tree/master/uavcan/protocol)
//!
//! Each type has a schema constructor, and a struct that converts to and from its records.

use num_enum::TryFromPrimitive;

use crate::{
    dsdl::{
        CastMode, CompositeType, Constant, ConstantValue, DsdlType, Field, PrimitiveType,
        ServiceType,
    },
    error::{CodecError, SchemaError},
    protocol::MsgPriority,
    registry::{DataTypeKind, TypeRegistry},
    value::{DsdlObject, Record, Value},
};

pub const NODE_STATUS: &str = "uavcan.protocol.NodeStatus";
pub const PANIC: &str = "uavcan.protocol.Panic";
pub const GLOBAL_TIME_SYNC: &str = "uavcan.protocol.GlobalTimeSync";
pub const SOFTWARE_VERSION: &str = "uavcan.protocol.SoftwareVersion";
pub const HARDWARE_VERSION: &str = "uavcan.protocol.HardwareVersion";
pub const GET_NODE_INFO: &str = "uavcan.protocol.GetNodeInfo";
pub const RESTART_NODE: &str = "uavcan.protocol.RestartNode";
pub const PARAM_EMPTY: &str = "uavcan.protocol.param.Empty";
pub const PARAM_VALUE: &str = "uavcan.protocol.param.Value";
pub const PARAM_NUMERIC_VALUE: &str = "uavcan.protocol.param.NumericValue";
pub const PARAM_GET_SET: &str = "uavcan.protocol.param.GetSet";

/// `RestartNode` requests are ignored unless they carry this.
pub const RESTART_MAGIC_NUMBER: u64 = 0xAC_CE55_1B1E;

pub const PARAM_NAME_NODE_ID: &str = "uavcan.node_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgType {
    NodeStatus,
    Panic,
    GlobalTimeSync,
    GetNodeInfo,
    RestartNode,
    GetSet,
}

impl MsgType {
    pub const ALL: [Self; 6] = [
        Self::NodeStatus,
        Self::Panic,
        Self::GlobalTimeSync,
        Self::GetNodeInfo,
        Self::RestartNode,
        Self::GetSet,
    ];

    /// Get the data type id.
    pub const fn id(&self) -> u16 {
        match self {
            Self::GetNodeInfo => 1,
            Self::GlobalTimeSync => 4,
            Self::Panic => 5,
            Self::RestartNode => 5,
            Self::GetSet => 11,
            Self::NodeStatus => 341,
        }
    }

    pub fn kind(&self) -> DataTypeKind {
        match self {
            Self::NodeStatus | Self::Panic | Self::GlobalTimeSync => DataTypeKind::Message,
            _ => DataTypeKind::Service,
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Self::NodeStatus => NODE_STATUS,
            Self::Panic => PANIC,
            Self::GlobalTimeSync => GLOBAL_TIME_SYNC,
            Self::GetNodeInfo => GET_NODE_INFO,
            Self::RestartNode => RESTART_NODE,
            Self::GetSet => PARAM_GET_SET,
        }
    }

    pub fn from_full_name(full_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.full_name() == full_name)
    }

    /// Priority these types are sent at when published or called as typed objects.
    pub fn priority(&self) -> MsgPriority {
        match self {
            Self::Panic => MsgPriority::Highest,
            Self::GlobalTimeSync => MsgPriority::High,
            Self::NodeStatus => MsgPriority::Low,
            _ => MsgPriority::Medium,
        }
    }

    /// The transfer CRC after feeding it the data type signature. `.base_crc` in Pydronecan.
    pub fn base_crc(&self) -> u16 {
        match self {
            Self::GetNodeInfo => 55_719,
            Self::GlobalTimeSync => 30_984,
            Self::Panic => 64_606,
            Self::RestartNode => 8_063,
            Self::GetSet => 64_272,
            Self::NodeStatus => 48_735,
        }
    }
}

/// A registry holding every type in this module, under its standard id.
pub fn standard_registry() -> Result<TypeRegistry, SchemaError> {
    let mut registry = TypeRegistry::new();

    registry.register_message(MsgType::NodeStatus.id(), node_status_type()?)?;
    registry.register_message(MsgType::Panic.id(), panic_type()?)?;
    registry.register_message(MsgType::GlobalTimeSync.id(), global_time_sync_type()?)?;
    registry.register_service(MsgType::GetNodeInfo.id(), get_node_info_type()?)?;
    registry.register_service(MsgType::RestartNode.id(), restart_node_type()?)?;
    registry.register_service(MsgType::GetSet.id(), get_set_type()?)?;

    Ok(registry)
}

fn uint(bit_len: u8) -> Result<DsdlType, SchemaError> {
    DsdlType::uint(bit_len, CastMode::Saturated)
}

fn bytes(max_len: usize) -> Result<DsdlType, SchemaError> {
    DsdlType::dynamic_array(uint(8)?, max_len)
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/341.NodeStatus.uavcan
pub fn node_status_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(
        NODE_STATUS,
        vec![
            Field::new("uptime_sec", uint(32)?),
            Field::new("health", uint(2)?),
            Field::new("mode", uint(3)?),
            Field::new("sub_mode", uint(3)?),
            Field::new("vendor_specific_status_code", uint(16)?),
        ],
    )
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/5.Panic.uavcan
pub fn panic_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(PANIC, vec![Field::new("reason_text", bytes(7)?)])?.with_constants(
        vec![
            Constant::new(
                "MIN_MESSAGES",
                PrimitiveType::uint(8, CastMode::Saturated)?,
                ConstantValue::UInt(3),
            )?,
            Constant::new(
                "MAX_INTERVAL_MS",
                PrimitiveType::uint(16, CastMode::Saturated)?,
                ConstantValue::UInt(500),
            )?,
        ],
    )
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/4.GlobalTimeSync.uavcan
pub fn global_time_sync_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(
        GLOBAL_TIME_SYNC,
        vec![Field::new(
            "previous_transmission_timestamp_usec",
            DsdlType::uint(56, CastMode::Truncated)?,
        )],
    )
}

pub fn software_version_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(
        SOFTWARE_VERSION,
        vec![
            Field::new("major", uint(8)?),
            Field::new("minor", uint(8)?),
            Field::new("optional_field_flags", uint(8)?),
            Field::new("vcs_commit", uint(32)?),
            Field::new("image_crc", uint(64)?),
        ],
    )
}

pub fn hardware_version_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(
        HARDWARE_VERSION,
        vec![
            Field::new("major", uint(8)?),
            Field::new("minor", uint(8)?),
            Field::new("unique_id", DsdlType::static_array(uint(8)?, 16)?),
            Field::new("certificate_of_authenticity", bytes(255)?),
        ],
    )
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/1.GetNodeInfo.uavcan
pub fn get_node_info_type() -> Result<ServiceType, SchemaError> {
    let response = CompositeType::structure(
        "",
        vec![
            Field::new("status", node_status_type()?.into()),
            Field::new("software_version", software_version_type()?.into()),
            Field::new("hardware_version", hardware_version_type()?.into()),
            Field::new("name", bytes(80)?),
        ],
    )?;

    Ok(ServiceType::new(
        GET_NODE_INFO,
        CompositeType::structure("", Vec::new())?,
        response,
    ))
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/5.RestartNode.uavcan
pub fn restart_node_type() -> Result<ServiceType, SchemaError> {
    let request = CompositeType::structure("", vec![Field::new("magic_number", uint(40)?)])?
        .with_constants(vec![Constant::new(
            "MAGIC_NUMBER",
            PrimitiveType::uint(40, CastMode::Saturated)?,
            ConstantValue::UInt(RESTART_MAGIC_NUMBER),
        )?])?;
    let response = CompositeType::structure("", vec![Field::new("ok", DsdlType::boolean())])?;

    Ok(ServiceType::new(RESTART_NODE, request, response))
}

pub fn param_empty_type() -> Result<CompositeType, SchemaError> {
    CompositeType::structure(PARAM_EMPTY, Vec::new())
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/param/Value.uavcan
pub fn param_value_type() -> Result<CompositeType, SchemaError> {
    CompositeType::union(
        PARAM_VALUE,
        vec![
            Field::new("empty", param_empty_type()?.into()),
            Field::new("integer_value", DsdlType::int(64, CastMode::Saturated)?),
            Field::new("real_value", DsdlType::float(32, CastMode::Saturated)?),
            Field::new("boolean_value", uint(8)?),
            Field::new("string_value", bytes(128)?),
        ],
    )
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/param/NumericValue.uavcan
pub fn param_numeric_value_type() -> Result<CompositeType, SchemaError> {
    CompositeType::union(
        PARAM_NUMERIC_VALUE,
        vec![
            Field::new("empty", param_empty_type()?.into()),
            Field::new("integer_value", DsdlType::int(64, CastMode::Saturated)?),
            Field::new("real_value", DsdlType::float(32, CastMode::Saturated)?),
        ],
    )
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/param/11.GetSet.uavcan
///
/// The void fields pad the unions' tags out to byte alignment.
pub fn get_set_type() -> Result<ServiceType, SchemaError> {
    let value: DsdlType = param_value_type()?.into();
    let numeric: DsdlType = param_numeric_value_type()?.into();

    let request = CompositeType::structure(
        "",
        vec![
            Field::new("index", uint(13)?),
            Field::new("value", value.clone()),
            Field::new("name", bytes(92)?),
        ],
    )?;

    let response = CompositeType::structure(
        "",
        vec![
            Field::void(5)?,
            Field::new("value", value.clone()),
            Field::void(5)?,
            Field::new("default_value", value),
            Field::void(6)?,
            Field::new("max_value", numeric.clone()),
            Field::void(6)?,
            Field::new("min_value", numeric),
            Field::new("name", bytes(92)?),
        ],
    )?;

    Ok(ServiceType::new(PARAM_GET_SET, request, response))
}

fn mismatch(name: &str) -> CodecError {
    CodecError::TypeMismatch(name.to_owned())
}

fn uint_field<T: TryFrom<u64>>(record: &Record, name: &str) -> Result<T, CodecError> {
    T::try_from(record.u64(name)?).map_err(|_| mismatch(name))
}

fn enum_field<T: TryFromPrimitive<Primitive = u8>>(record: &Record, name: &str) -> Result<T, CodecError> {
    T::try_from_primitive(uint_field(record, name)?).map_err(|_| mismatch(name))
}

fn text_field(record: &Record, name: &str) -> Result<String, CodecError> {
    String::from_utf8(record.bytes(name)?).map_err(|_| mismatch(name))
}

/// Reference: https://github.com/dronecan/DSDL/blob/master/uavcan/protocol/341.NodeStatus.uavcan
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NodeHealth {
    Ok = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum NodeMode {
    Operational = 0,
    Initialization = 1,
    Maintenance = 2,
    SoftwareUpdate = 3,
    Offline = 7,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self::Ok
    }
}

impl Default for NodeMode {
    fn default() -> Self {
        Self::Operational
    }
}

/// Broadcast periodically, and sent as part of the `GetNodeInfo` response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeStatus {
    pub uptime_sec: u32,
    pub health: NodeHealth,
    pub mode: NodeMode,
    /// Reserved; leave at 0.
    pub sub_mode: u8,
    pub vendor_specific_status_code: u16,
}

impl DsdlObject for NodeStatus {
    const FULL_NAME: &'static str = NODE_STATUS;

    fn to_record(&self) -> Record {
        Record::new()
            .with("uptime_sec", self.uptime_sec)
            .with("health", self.health as u8)
            .with("mode", self.mode as u8)
            .with("sub_mode", self.sub_mode)
            .with("vendor_specific_status_code", self.vendor_specific_status_code)
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            uptime_sec: uint_field(record, "uptime_sec")?,
            health: enum_field(record, "health")?,
            mode: enum_field(record, "mode")?,
            sub_mode: uint_field(record, "sub_mode")?,
            vendor_specific_status_code: uint_field(record, "vendor_specific_status_code")?,
        })
    }
}

/// Broadcast by a node that's going down. The reason is at most 7 bytes, so it fits a single
/// frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Panic {
    pub reason_text: String,
}

impl DsdlObject for Panic {
    const FULL_NAME: &'static str = PANIC;

    fn to_record(&self) -> Record {
        Record::new().with("reason_text", Value::string(&self.reason_text))
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            reason_text: text_field(record, "reason_text")?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalTimeSync {
    /// 0 in the first message of a sync sequence.
    pub previous_transmission_timestamp_usec: u64,
}

impl DsdlObject for GlobalTimeSync {
    const FULL_NAME: &'static str = GLOBAL_TIME_SYNC;

    fn to_record(&self) -> Record {
        Record::new().with(
            "previous_transmission_timestamp_usec",
            self.previous_transmission_timestamp_usec,
        )
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            previous_transmission_timestamp_usec: record
                .u64("previous_transmission_timestamp_usec")?,
        })
    }
}

/// Generic software version information.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftwareVersion {
    pub major: u8,
    pub minor: u8,
    /// This mask indicates which optional fields (see below) are set.
    pub optional_field_flags: u8,
    /// VCS commit hash or revision number, e.g. git short commit hash. Optional.
    pub vcs_commit: u32,
    /// The value of an arbitrary hash function applied to the firmware image.
    pub image_crc: u64,
}

impl SoftwareVersion {
    pub const OPTIONAL_FIELD_FLAG_VCS_COMMIT: u8 = 1;
    pub const OPTIONAL_FIELD_FLAG_IMAGE_CRC: u8 = 2;
}

impl DsdlObject for SoftwareVersion {
    const FULL_NAME: &'static str = SOFTWARE_VERSION;

    fn to_record(&self) -> Record {
        Record::new()
            .with("major", self.major)
            .with("minor", self.minor)
            .with("optional_field_flags", self.optional_field_flags)
            .with("vcs_commit", self.vcs_commit)
            .with("image_crc", self.image_crc)
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            major: uint_field(record, "major")?,
            minor: uint_field(record, "minor")?,
            optional_field_flags: uint_field(record, "optional_field_flags")?,
            vcs_commit: uint_field(record, "vcs_commit")?,
            image_crc: record.u64("image_crc")?,
        })
    }
}

/// Generic hardware version information.
/// These values should remain unchanged for the device's lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HardwareVersion {
    pub major: u8,
    pub minor: u8,
    /// Unique ID is a 128 bit long sequence that is globally unique for each node.
    /// All zeros is not a valid UID; if filled with zeros, assume that the value is undefined.
    pub unique_id: [u8; 16],
    /// Certificate of authenticity (COA) of the hardware, 255 bytes max.
    pub certificate_of_authenticity: Vec<u8>,
}

impl DsdlObject for HardwareVersion {
    const FULL_NAME: &'static str = HARDWARE_VERSION;

    fn to_record(&self) -> Record {
        Record::new()
            .with("major", self.major)
            .with("minor", self.minor)
            .with("unique_id", Value::bytes(&self.unique_id))
            .with(
                "certificate_of_authenticity",
                Value::bytes(&self.certificate_of_authenticity),
            )
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        let unique_id = record.bytes("unique_id")?;
        let actual = unique_id.len();

        Ok(Self {
            major: uint_field(record, "major")?,
            minor: uint_field(record, "minor")?,
            unique_id: unique_id
                .try_into()
                .map_err(|_| CodecError::ArrayLength {
                    field: "unique_id".to_owned(),
                    expected: 16,
                    actual,
                })?,
            certificate_of_authenticity: record.bytes("certificate_of_authenticity")?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetNodeInfoRequest;

impl DsdlObject for GetNodeInfoRequest {
    const FULL_NAME: &'static str = GET_NODE_INFO;

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_record: &Record) -> Result<Self, CodecError> {
        Ok(Self)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetNodeInfoResponse {
    pub status: NodeStatus,
    pub software_version: SoftwareVersion,
    pub hardware_version: HardwareVersion,
    /// Reverse domain name, eg `com.example.gps`. At most 80 bytes.
    pub name: String,
}

impl DsdlObject for GetNodeInfoResponse {
    const FULL_NAME: &'static str = GET_NODE_INFO;

    fn to_record(&self) -> Record {
        Record::new()
            .with("status", self.status.to_record())
            .with("software_version", self.software_version.to_record())
            .with("hardware_version", self.hardware_version.to_record())
            .with("name", Value::string(&self.name))
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            status: NodeStatus::from_record(record.record("status")?)?,
            software_version: SoftwareVersion::from_record(record.record("software_version")?)?,
            hardware_version: HardwareVersion::from_record(record.record("hardware_version")?)?,
            name: text_field(record, "name")?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartNodeRequest {
    pub magic_number: u64,
}

impl Default for RestartNodeRequest {
    fn default() -> Self {
        Self {
            magic_number: RESTART_MAGIC_NUMBER,
        }
    }
}

impl RestartNodeRequest {
    pub fn is_valid(&self) -> bool {
        self.magic_number == RESTART_MAGIC_NUMBER
    }
}

impl DsdlObject for RestartNodeRequest {
    const FULL_NAME: &'static str = RESTART_NODE;

    fn to_record(&self) -> Record {
        Record::new().with("magic_number", self.magic_number)
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            magic_number: record.u64("magic_number")?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestartNodeResponse {
    pub ok: bool,
}

impl DsdlObject for RestartNodeResponse {
    const FULL_NAME: &'static str = RESTART_NODE;

    fn to_record(&self) -> Record {
        Record::new().with("ok", self.ok)
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            ok: record.bool("ok")?,
        })
    }
}

/// `uavcan.protocol.param.Value`. 3-bit tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ParamValue {
    #[default]
    Empty,
    Integer(i64),
    Real(f32),
    /// `uint8` on the wire.
    Boolean(bool),
    /// Max length of 128 bytes.
    String(String),
}

impl DsdlObject for ParamValue {
    const FULL_NAME: &'static str = PARAM_VALUE;

    fn to_record(&self) -> Record {
        match self {
            Self::Empty => Record::new().with("empty", Record::new()),
            Self::Integer(v) => Record::new().with("integer_value", *v),
            Self::Real(v) => Record::new().with("real_value", *v),
            Self::Boolean(v) => Record::new().with("boolean_value", *v as u8),
            Self::String(v) => Record::new().with("string_value", Value::string(v)),
        }
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        let Some((name, value)) = record.active() else {
            return Err(CodecError::InvalidUnion(PARAM_VALUE.to_owned()));
        };

        Ok(match name {
            "empty" => Self::Empty,
            "integer_value" => Self::Integer(value.as_i64().ok_or_else(|| mismatch(name))?),
            "real_value" => Self::Real(value.as_f64().ok_or_else(|| mismatch(name))? as f32),
            "boolean_value" => Self::Boolean(value.as_bool().ok_or_else(|| mismatch(name))?),
            "string_value" => Self::String(text_field(record, name)?),
            _ => return Err(CodecError::InvalidUnion(PARAM_VALUE.to_owned())),
        })
    }
}

/// `uavcan.protocol.param.NumericValue`. 2-bit tag.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum NumericValue {
    #[default]
    Empty,
    Integer(i64),
    Real(f32),
}

impl DsdlObject for NumericValue {
    const FULL_NAME: &'static str = PARAM_NUMERIC_VALUE;

    fn to_record(&self) -> Record {
        match self {
            Self::Empty => Record::new().with("empty", Record::new()),
            Self::Integer(v) => Record::new().with("integer_value", *v),
            Self::Real(v) => Record::new().with("real_value", *v),
        }
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        match record.active() {
            Some(("empty", _)) => Ok(Self::Empty),
            Some((name @ "integer_value", v)) => {
                Ok(Self::Integer(v.as_i64().ok_or_else(|| mismatch(name))?))
            }
            Some((name @ "real_value", v)) => {
                Ok(Self::Real(v.as_f64().ok_or_else(|| mismatch(name))? as f32))
            }
            _ => Err(CodecError::InvalidUnion(PARAM_NUMERIC_VALUE.to_owned())),
        }
    }
}

/// Read a parameter by index (empty `name`) or name, writing it first if `value` isn't empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSetRequest {
    pub index: u16,
    pub value: ParamValue,
    pub name: String,
}

impl DsdlObject for GetSetRequest {
    const FULL_NAME: &'static str = PARAM_GET_SET;

    fn to_record(&self) -> Record {
        Record::new()
            .with("index", self.index)
            .with("value", self.value.to_record())
            .with("name", Value::string(&self.name))
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            index: uint_field(record, "index")?,
            value: ParamValue::from_record(record.record("value")?)?,
            name: text_field(record, "name")?,
        })
    }
}

/// An empty `name` means the parameter doesn't exist.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSetResponse {
    pub value: ParamValue,
    pub default_value: ParamValue,
    pub max_value: NumericValue,
    pub min_value: NumericValue,
    pub name: String,
}

impl DsdlObject for GetSetResponse {
    const FULL_NAME: &'static str = PARAM_GET_SET;

    fn to_record(&self) -> Record {
        Record::new()
            .with("value", self.value.to_record())
            .with("default_value", self.default_value.to_record())
            .with("max_value", self.max_value.to_record())
            .with("min_value", self.min_value.to_record())
            .with("name", Value::string(&self.name))
    }

    fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            value: ParamValue::from_record(record.record("value")?)?,
            default_value: ParamValue::from_record(record.record("default_value")?)?,
            max_value: NumericValue::from_record(record.record("max_value")?)?,
            min_value: NumericValue::from_record(record.record("min_value")?)?,
            name: text_field(record, "name")?,
        })
    }
}
