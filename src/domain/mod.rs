use time::OffsetDateTime;

/// A simulated field-device gateway, identified toward the cloud by MAC address.
/// `password` is the per-MAC secret key issued by the cloud; `token` is the
/// bearer credential obtained by logging in with `(mac_address, password)`.
#[derive(Debug, Clone)]
pub struct Controller {
    pub id: i16,
    pub org_id: i32,
    pub controller_name: String,
    pub mac_address: String,
    pub password: String,
    pub token: String,
    /// Advanced only on successful heartbeats. `None` means never sent.
    pub last_heart_beat: Option<OffsetDateTime>,
}

/// A single telemetry channel attached to a controller. `report_value` holds
/// the last reported value; the report driver mutates it in place and persists
/// it each cycle.
#[derive(Debug, Clone)]
pub struct DeviceObject {
    pub id: u32,
    pub org_id: i8,
    pub device_id: u32,
    pub device_name: String,
    pub object_id: u32,
    pub object_name: String,
    pub controller_id: i16,
    pub iqnext_object_type: i16,
    pub report_data_type: i8,
    pub report_sent_at: Option<OffsetDateTime>,
    pub report_type: i8,
    pub report_value: f32,
}

impl DeviceObject {
    pub fn data_type(&self) -> ReportDataType {
        ReportDataType::from_raw(self.report_data_type)
    }
}

/// Wire datatype of an object's report value. `None` (raw 0) means the report
/// carries no value tag at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDataType {
    None,
    Byte,
    Integer,
    Float,
    Text,
}

impl ReportDataType {
    pub fn from_raw(raw: i8) -> Self {
        match raw {
            1 => ReportDataType::Byte,
            2 => ReportDataType::Integer,
            3 => ReportDataType::Float,
            4 => ReportDataType::Text,
            _ => ReportDataType::None,
        }
    }
}

/// Per-parameter policy for synthesizing the next telemetry value, keyed by
/// `param_id` (= the object's `iqnext_object_type`).
#[derive(Debug, Clone)]
pub struct ObjectRule {
    pub param_id: i16,
    pub param_name: String,
    pub constant: f32,
    pub min_value: f32,
    pub max_value: f32,
    pub is_continuous: bool,
}

impl ObjectRule {
    /// Fallback for object types with no configured rule: a bounded rule over
    /// the empty range, which generates a constant zero value.
    pub fn zero(param_id: i16) -> Self {
        Self {
            param_id,
            param_name: String::new(),
            constant: 0.0,
            min_value: 0.0,
            max_value: 0.0,
            is_continuous: false,
        }
    }
}
