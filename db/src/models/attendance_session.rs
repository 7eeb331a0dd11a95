use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// One open attendance-taking window, owned by the creating teacher.
///
/// State machine is `Open -> Closed` only; a closed session is immutable
/// and rejects further check-ins.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    /// Random 32-hex identifier; not enumerable within a session's lifetime.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub teacher_id: i64,
    pub subject: String,
    pub subject_code: String,
    pub semester: String,
    pub closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::TeacherId",
        to = "super::user::Column::Id"
    )]
    Teacher,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Teacher.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 128 bits from the OS RNG, hex-encoded.
    pub fn generate_id() -> String {
        use rand::RngCore;
        let mut buf = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}
