use chrono::{DateTime, Local, Utc};
use db::models::{
    attendance_record::{ActiveModel, Column, Entity, Method, Status},
    attendance_session::{Column as SessionColumn, Entity as SessionEntity},
    user::Entity as UserEntity,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use crate::error::ServiceError;
use crate::events::{SessionEvent, SessionEventBus};
use crate::scan::{ScanEvent, ScanMailbox, ScanVerifier};

pub use db::models::attendance_record::Model as AttendanceRecord;

/// One check-in submission against the ledger.
#[derive(Debug, Clone)]
pub struct CheckIn {
    /// None for raw device taps outside a session.
    pub session_id: Option<String>,
    pub user_id: i64,
    pub teacher_id: Option<i64>,
    pub subject: String,
    pub semester: String,
    pub method: Method,
    pub card_id: Option<String>,
    pub device_id: Option<String>,
    pub location: Option<String>,
}

/// Per-status attendance totals for one user and semester.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct UserAttendanceStats {
    pub present: u64,
    pub late: u64,
    pub absent: u64,
}

pub struct AttendanceRecordService;

impl AttendanceRecordService {
    /// Appends a `present` record if every gate passes, in order: session
    /// open, student role, no record for this user+subject today (any
    /// method), no record for this user in this session.
    ///
    /// The pre-checks give precise rejections; the unique indexes on
    /// `(user_id, subject, day)` and `(session_id, user_id)` remain the
    /// backstop, so of two racing submissions exactly one lands and the
    /// other surfaces as `Duplicate`.
    ///
    /// Gate and insert run in one transaction that touches the session row
    /// with write intent, so a racing close either rejects this check-in or
    /// stamps the committed record along with the rest.
    pub async fn record_check_in(
        db: &DatabaseConnection,
        bus: &SessionEventBus,
        params: CheckIn,
    ) -> Result<AttendanceRecord, ServiceError> {
        let txn = db.begin().await?;

        if let Some(session_id) = &params.session_id {
            // No-op update of a still-open row: it takes the write lock, so
            // a concurrent close serializes against this transaction.
            let touched = SessionEntity::update_many()
                .col_expr(SessionColumn::Closed, Expr::value(false))
                .filter(SessionColumn::Id.eq(session_id.as_str()))
                .filter(SessionColumn::Closed.eq(false))
                .exec(&txn)
                .await?;
            if touched.rows_affected == 0 {
                let exists = SessionEntity::find_by_id(session_id.clone())
                    .one(&txn)
                    .await?
                    .is_some();
                return Err(if exists {
                    ServiceError::SessionClosed
                } else {
                    ServiceError::SessionNotFound
                });
            }
        }

        let user = UserEntity::find_by_id(params.user_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        if !user.is_student() {
            return Err(ServiceError::Role(user.role));
        }

        let now = Utc::now();
        let day = Local::now().date_naive();

        let attended_today = Entity::find()
            .filter(Column::UserId.eq(params.user_id))
            .filter(Column::Subject.eq(&params.subject))
            .filter(Column::Day.eq(day))
            .one(&txn)
            .await?
            .is_some();
        if attended_today {
            return Err(ServiceError::Duplicate);
        }

        if let Some(session_id) = &params.session_id {
            let in_session = Entity::find()
                .filter(Column::SessionId.eq(session_id.as_str()))
                .filter(Column::UserId.eq(params.user_id))
                .one(&txn)
                .await?
                .is_some();
            if in_session {
                return Err(ServiceError::Duplicate);
            }
        }

        let record = ActiveModel {
            user_id: Set(params.user_id),
            teacher_id: Set(params.teacher_id),
            subject: Set(params.subject),
            semester: Set(params.semester),
            session_id: Set(params.session_id),
            status: Set(Status::Present),
            method: Set(params.method),
            card_id: Set(params.card_id),
            device_id: Set(params.device_id),
            location: Set(params.location),
            scan_time: Set(now),
            day: Set(day),
            session_ended: Set(false),
            session_end_time: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::from_write)?;

        txn.commit().await?;

        log::info!(
            "attendance recorded for user {} in {} via {}",
            record.user_id,
            record.subject,
            record.method
        );

        if let Some(session_id) = &record.session_id {
            let count = Self::count_for_session(db, session_id).await?;
            bus.emit(
                session_id,
                SessionEvent::AttendanceMarked {
                    session_id: session_id.clone(),
                    user_id: record.user_id,
                    count,
                },
            )
            .await;
        }

        Ok(record)
    }

    /// The raw device path: verify the scan signal, resolve the card to a
    /// student, then submit a session-less NFC check-in. An unregistered
    /// card parks its id in the mailbox for the registration form to claim.
    pub async fn record_device_tap(
        db: &DatabaseConnection,
        bus: &SessionEventBus,
        verifier: &ScanVerifier,
        mailbox: &ScanMailbox,
        event: &ScanEvent,
    ) -> Result<AttendanceRecord, ServiceError> {
        verifier.verify(event)?;

        let user = crate::user::UserService::find_by_card(db, &event.card_id).await?;
        let Some(user) = user else {
            mailbox.publish(&event.card_id).await;
            log::info!("unregistered card {} parked for registration", event.card_id);
            return Err(ServiceError::NotFound("user"));
        };

        Self::record_check_in(
            db,
            bus,
            CheckIn {
                session_id: None,
                user_id: user.id,
                teacher_id: None,
                subject: event.subject.clone(),
                semester: event.semester.clone(),
                method: Method::Nfc,
                card_id: Some(event.card_id.clone()),
                device_id: event.device_id.clone(),
                location: None,
            },
        )
        .await
    }

    /// Live count for the teacher-facing counter; a plain aggregate, safe to
    /// poll every few seconds.
    pub async fn count_for_session(
        db: &DatabaseConnection,
        session_id: &str,
    ) -> Result<u64, ServiceError> {
        Ok(Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .count(db)
            .await?)
    }

    /// Bulk-stamps every record of a session at close. The caller has
    /// already flipped the session's `closed` flag, so no new record can
    /// join the set being stamped.
    pub async fn close_session_records(
        db: &DatabaseConnection,
        session_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let res = Entity::update_many()
            .col_expr(Column::SessionEnded, Expr::value(true))
            .col_expr(Column::SessionEndTime, Expr::value(ended_at))
            .filter(Column::SessionId.eq(session_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn list_for_session(
        db: &DatabaseConnection,
        session_id: &str,
    ) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_desc(Column::ScanTime)
            .all(db)
            .await?)
    }

    pub async fn list_for_teacher(
        db: &DatabaseConnection,
        teacher_id: i64,
    ) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(Entity::find()
            .filter(Column::TeacherId.eq(teacher_id))
            .order_by_desc(Column::ScanTime)
            .all(db)
            .await?)
    }

    /// Per-status totals for one user in one semester.
    pub async fn stats_for_user(
        db: &DatabaseConnection,
        user_id: i64,
        semester: &str,
    ) -> Result<UserAttendanceStats, ServiceError> {
        #[derive(FromQueryResult)]
        struct Row {
            status: Status,
            cnt: i64,
        }

        let rows: Vec<Row> = Entity::find()
            .select_only()
            .column(Column::Status)
            .column_as(Column::Id.count(), "cnt")
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Semester.eq(semester))
            .group_by(Column::Status)
            .into_model::<Row>()
            .all(db)
            .await?;

        let mut stats = UserAttendanceStats::default();
        for row in rows {
            let slot = match row.status {
                Status::Present => &mut stats.present,
                Status::Late => &mut stats.late,
                Status::Absent => &mut stats.absent,
            };
            *slot = row.cnt as u64;
        }
        Ok(stats)
    }
}
