use chrono::{DateTime, Utc};
use db::models::{
    attendance_session::{ActiveModel, Column, Entity},
    user::{Entity as UserEntity, Role},
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::attendance_record::AttendanceRecordService;
use crate::error::ServiceError;
use crate::events::{SessionEvent, SessionEventBus};

pub use db::models::attendance_session::Model as AttendanceSession;

#[derive(Debug, Clone)]
pub struct CreateAttendanceSession {
    pub teacher_id: i64,
    pub subject: String,
    pub subject_code: String,
    pub semester: String,
}

/// Serialized into the QR code shown to students; a scanning client calls
/// check-in with the `session_id` it reads here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub session_id: String,
    pub teacher_id: i64,
    pub teacher_name: String,
    pub department: Option<String>,
    pub subject: String,
    pub subject_code: String,
    pub semester: String,
    pub timestamp: DateTime<Utc>,
}

pub struct AttendanceSessionService;

impl AttendanceSessionService {
    /// Opens a session under a random, non-enumerable identifier. Only
    /// teachers may open sessions.
    pub async fn create(
        db: &DatabaseConnection,
        params: CreateAttendanceSession,
    ) -> Result<AttendanceSession, ServiceError> {
        let teacher = UserEntity::find_by_id(params.teacher_id)
            .one(db)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        match teacher.role {
            Role::Teacher => {}
            role => return Err(ServiceError::Role(role)),
        }

        let session = ActiveModel {
            id: Set(AttendanceSession::generate_id()),
            teacher_id: Set(params.teacher_id),
            subject: Set(params.subject),
            subject_code: Set(params.subject_code),
            semester: Set(params.semester),
            closed: Set(false),
            closed_at: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        log::info!(
            "attendance session {} opened by teacher {} for {} (sem {})",
            session.id,
            session.teacher_id,
            session.subject,
            session.semester
        );
        Ok(session)
    }

    pub async fn get(
        db: &DatabaseConnection,
        session_id: &str,
    ) -> Result<AttendanceSession, ServiceError> {
        Entity::find_by_id(session_id.to_owned())
            .one(db)
            .await?
            .ok_or(ServiceError::SessionNotFound)
    }

    /// Closes the session and stamps its ledger records.
    ///
    /// The `closed` flag is committed first so a check-in racing the close is
    /// rejected rather than slipping in while records are being stamped.
    /// A second close is an error, not a no-op; `closed_at` never moves.
    pub async fn close(
        db: &DatabaseConnection,
        bus: &SessionEventBus,
        session_id: &str,
        requesting_teacher_id: i64,
    ) -> Result<u64, ServiceError> {
        let session = Self::get(db, session_id).await?;
        if session.teacher_id != requesting_teacher_id {
            return Err(ServiceError::Forbidden);
        }
        if session.closed {
            return Err(ServiceError::AlreadyClosed);
        }

        // Conditional transition: only a still-open row is updated, so of
        // two racing closes exactly one wins and `closed_at` is written
        // exactly once.
        let closed_at = Utc::now();
        let res = Entity::update_many()
            .col_expr(Column::Closed, Expr::value(true))
            .col_expr(Column::ClosedAt, Expr::value(closed_at))
            .filter(Column::Id.eq(session_id))
            .filter(Column::Closed.eq(false))
            .exec(db)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::AlreadyClosed);
        }

        let stamped = AttendanceRecordService::close_session_records(db, session_id, closed_at).await?;

        bus.emit(
            session_id,
            SessionEvent::SessionClosed {
                session_id: session_id.to_owned(),
                total: stamped,
            },
        )
        .await;
        bus.remove_topic(session_id).await;

        log::info!(
            "attendance session {session_id} closed by teacher {requesting_teacher_id}; {stamped} records stamped"
        );
        Ok(stamped)
    }

    /// Sessions owned by a teacher, newest first.
    pub async fn list_for_teacher(
        db: &DatabaseConnection,
        teacher_id: i64,
    ) -> Result<Vec<AttendanceSession>, ServiceError> {
        Ok(Entity::find()
            .filter(Column::TeacherId.eq(teacher_id))
            .order_by_desc(Column::CreatedAt)
            .all(db)
            .await?)
    }

    pub async fn qr_payload(
        db: &DatabaseConnection,
        session: &AttendanceSession,
    ) -> Result<QrPayload, ServiceError> {
        let teacher = UserEntity::find_by_id(session.teacher_id)
            .one(db)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        Ok(QrPayload {
            session_id: session.id.clone(),
            teacher_id: teacher.id,
            teacher_name: teacher.name,
            department: teacher.department,
            subject: session.subject.clone(),
            subject_code: session.subject_code.clone(),
            semester: session.semester.clone(),
            timestamp: Utc::now(),
        })
    }
}
