use serde::{Deserialize, Serialize};

/// Logical column type, rendered per dialect by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    /// Auto-incrementing integer when used as the primary key.
    Serial,
    /// Auto-incrementing 64-bit integer when used as the primary key.
    BigSerial,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Text,
    Char(usize),
    VarChar(usize),
    Boolean,
    Timestamp,
    TimestampTz,
    DateTime,
    Date,
    Time,
    Uuid,
    Json,
    JsonB,
    Binary,
    VarBinary(usize),
    Real,
    DoublePrecision,
    Decimal { precision: u8, scale: u8 },
}

impl FieldType {
    pub fn is_auto_increment(&self) -> bool {
        matches!(self, FieldType::Serial | FieldType::BigSerial)
    }
}
