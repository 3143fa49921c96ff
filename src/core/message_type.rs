// src/core/message_type.rs

//! Classifies numeric message ids into named message types.
//!
//! The registry starts with the standard terminal-to-platform messages of
//! JT/T 808-2013/2019 and accepts extra types at runtime. Each id maps to at
//! most one type. An id that is not registered classifies to `None`, which is
//! a normal outcome and not an error.

use crate::core::Jt808Error;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// A named message type keyed by its numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageType {
    id: u16,
    name: Cow<'static, str>,
}

impl MessageType {
    pub const fn from_static(id: u16, name: &'static str) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(id: u16, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:04X})", self.name, self.id)
    }
}

pub const TERMINAL_GENERAL_RESPONSE: MessageType =
    MessageType::from_static(0x0001, "TerminalGeneralResponse");
pub const TERMINAL_HEARTBEAT: MessageType = MessageType::from_static(0x0002, "TerminalHeartbeat");
pub const TERMINAL_LOGOUT: MessageType = MessageType::from_static(0x0003, "TerminalLogout");
pub const QUERY_SERVER_TIME: MessageType = MessageType::from_static(0x0004, "QueryServerTime");
pub const TERMINAL_RESUBMIT_REQUEST: MessageType =
    MessageType::from_static(0x0005, "TerminalResubmitRequest");
pub const TERMINAL_REGISTER: MessageType = MessageType::from_static(0x0100, "TerminalRegister");
pub const TERMINAL_AUTHENTICATION: MessageType =
    MessageType::from_static(0x0102, "TerminalAuthentication");
pub const QUERY_PARAMS_RESPONSE: MessageType =
    MessageType::from_static(0x0104, "QueryTerminalParamsResponse");
pub const QUERY_PROPERTIES_RESPONSE: MessageType =
    MessageType::from_static(0x0107, "QueryTerminalPropertiesResponse");
pub const UPGRADE_RESULT: MessageType = MessageType::from_static(0x0108, "TerminalUpgradeResult");
pub const LOCATION_REPORT: MessageType = MessageType::from_static(0x0200, "LocationReport");
pub const LOCATION_QUERY_RESPONSE: MessageType =
    MessageType::from_static(0x0201, "LocationQueryResponse");
pub const EVENT_REPORT: MessageType = MessageType::from_static(0x0301, "EventReport");
pub const QUESTION_ANSWER: MessageType = MessageType::from_static(0x0302, "QuestionAnswer");
pub const INFO_DEMAND_CANCEL: MessageType = MessageType::from_static(0x0303, "InfoDemandCancel");
pub const VEHICLE_CONTROL_RESPONSE: MessageType =
    MessageType::from_static(0x0500, "VehicleControlResponse");
pub const DRIVING_RECORD_UPLOAD: MessageType =
    MessageType::from_static(0x0700, "DrivingRecordUpload");
pub const ELECTRONIC_WAYBILL_REPORT: MessageType =
    MessageType::from_static(0x0701, "ElectronicWaybillReport");
pub const DRIVER_IDENTITY_REPORT: MessageType =
    MessageType::from_static(0x0702, "DriverIdentityReport");
pub const BATCH_LOCATION_UPLOAD: MessageType =
    MessageType::from_static(0x0704, "BatchLocationUpload");
pub const CAN_BUS_DATA_UPLOAD: MessageType = MessageType::from_static(0x0705, "CanBusDataUpload");
pub const MULTIMEDIA_EVENT_UPLOAD: MessageType =
    MessageType::from_static(0x0800, "MultimediaEventUpload");
pub const MULTIMEDIA_DATA_UPLOAD: MessageType =
    MessageType::from_static(0x0801, "MultimediaDataUpload");
pub const STORED_MULTIMEDIA_QUERY_RESPONSE: MessageType =
    MessageType::from_static(0x0802, "StoredMultimediaQueryResponse");
pub const CAMERA_SHOOT_RESPONSE: MessageType =
    MessageType::from_static(0x0805, "CameraShootResponse");
pub const DATA_UPLINK_PASS_THROUGH: MessageType =
    MessageType::from_static(0x0900, "DataUplinkPassThrough");
pub const COMPRESSED_DATA_UPLOAD: MessageType =
    MessageType::from_static(0x0901, "CompressedDataUpload");
pub const TERMINAL_RSA_PUBLIC_KEY: MessageType =
    MessageType::from_static(0x0A00, "TerminalRsaPublicKey");

/// Every uplink message type known out of the box.
pub const STANDARD_TYPES: &[MessageType] = &[
    TERMINAL_GENERAL_RESPONSE,
    TERMINAL_HEARTBEAT,
    TERMINAL_LOGOUT,
    QUERY_SERVER_TIME,
    TERMINAL_RESUBMIT_REQUEST,
    TERMINAL_REGISTER,
    TERMINAL_AUTHENTICATION,
    QUERY_PARAMS_RESPONSE,
    QUERY_PROPERTIES_RESPONSE,
    UPGRADE_RESULT,
    LOCATION_REPORT,
    LOCATION_QUERY_RESPONSE,
    EVENT_REPORT,
    QUESTION_ANSWER,
    INFO_DEMAND_CANCEL,
    VEHICLE_CONTROL_RESPONSE,
    DRIVING_RECORD_UPLOAD,
    ELECTRONIC_WAYBILL_REPORT,
    DRIVER_IDENTITY_REPORT,
    BATCH_LOCATION_UPLOAD,
    CAN_BUS_DATA_UPLOAD,
    MULTIMEDIA_EVENT_UPLOAD,
    MULTIMEDIA_DATA_UPLOAD,
    STORED_MULTIMEDIA_QUERY_RESPONSE,
    CAMERA_SHOOT_RESPONSE,
    DATA_UPLINK_PASS_THROUGH,
    COMPRESSED_DATA_UPLOAD,
    TERMINAL_RSA_PUBLIC_KEY,
];

/// Maps message ids to message types.
#[derive(Debug, Default)]
pub struct MessageTypeRegistry {
    types: DashMap<u16, MessageType>,
}

impl MessageTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with [`STANDARD_TYPES`].
    pub fn with_standard_types() -> Self {
        let registry = Self::new();
        for message_type in STANDARD_TYPES {
            registry
                .types
                .insert(message_type.id(), message_type.clone());
        }
        registry
    }

    /// Returns the type registered for `message_id`, if any.
    pub fn classify(&self, message_id: u16) -> Option<MessageType> {
        self.types.get(&message_id).map(|entry| entry.value().clone())
    }

    /// Adds a type. Fails if its id is already taken.
    pub fn register(&self, message_type: MessageType) -> Result<(), Jt808Error> {
        match self.types.entry(message_type.id()) {
            Entry::Occupied(_) => Err(Jt808Error::DuplicateMessageType(message_type.id())),
            Entry::Vacant(slot) => {
                debug!("Registered message type {}", message_type);
                slot.insert(message_type);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// A snapshot of all registered types, ordered by id.
    pub fn types(&self) -> Vec<MessageType> {
        let mut types: Vec<MessageType> = self.types.iter().map(|e| e.value().clone()).collect();
        types.sort_by_key(MessageType::id);
        types
    }
}
