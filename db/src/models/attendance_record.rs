use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One check-in event in the append-only ledger.
///
/// Records are never mutated after creation, except for the bulk
/// `session_ended` / `session_end_time` stamp applied when a session closes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    /// None for raw device taps that carry no owning teacher.
    pub teacher_id: Option<i64>,
    pub subject: String,
    pub semester: String,
    /// None for raw NFC taps recorded outside any session.
    pub session_id: Option<String>,
    pub status: Status,
    pub method: Method,
    pub card_id: Option<String>,
    pub device_id: Option<String>,
    pub location: Option<String>,
    pub scan_time: DateTime<Utc>,
    /// Local calendar day of the scan; backs the daily-uniqueness index.
    pub day: NaiveDate,
    pub session_ended: bool,
    pub session_end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_status_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Status {
    #[sea_orm(string_value = "present")]
    Present,

    #[sea_orm(string_value = "late")]
    Late,

    #[sea_orm(string_value = "absent")]
    Absent,
}

/// How the check-in was verified.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "verification_method_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Method {
    #[sea_orm(string_value = "nfc")]
    Nfc,

    #[sea_orm(string_value = "qrcode")]
    Qrcode,

    #[sea_orm(string_value = "manual")]
    Manual,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
