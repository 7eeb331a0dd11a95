use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202602160001_create_attendance"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // attendance_sessions
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendance_sessions"))
                    .if_not_exists()
                    // Random 32-hex identifier generated by the registry,
                    // never auto-incremented (ids must be unguessable).
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("teacher_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("subject")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("subject_code"))
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("semester")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("closed"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alias::new("closed_at")).timestamp().null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_sess_teacher")
                            .from(Alias::new("attendance_sessions"), Alias::new("teacher_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // attendance_records
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendance_records"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("user_id"))
                            .big_integer()
                            .not_null(),
                    )
                    // Null for raw device taps recorded outside any teacher's
                    // session.
                    .col(ColumnDef::new(Alias::new("teacher_id")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("subject")).string().not_null())
                    .col(ColumnDef::new(Alias::new("semester")).string().not_null())
                    // Null for raw device taps that happen outside a session.
                    .col(
                        ColumnDef::new(Alias::new("session_id"))
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("present"),
                    )
                    .col(ColumnDef::new(Alias::new("method")).string().not_null())
                    .col(ColumnDef::new(Alias::new("card_id")).string().null())
                    .col(ColumnDef::new(Alias::new("device_id")).string().null())
                    .col(ColumnDef::new(Alias::new("location")).string().null())
                    .col(
                        ColumnDef::new(Alias::new("scan_time"))
                            .timestamp()
                            .not_null(),
                    )
                    // Local calendar day of the scan, materialized so the
                    // daily-uniqueness rule is a plain unique index.
                    .col(ColumnDef::new(Alias::new("day")).date().not_null())
                    .col(
                        ColumnDef::new(Alias::new("session_ended"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("session_end_time"))
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_rec_user")
                            .from(Alias::new("attendance_records"), Alias::new("user_id"))
                            .to(Alias::new("users"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_rec_session")
                            .from(Alias::new("attendance_records"), Alias::new("session_id"))
                            .to(Alias::new("attendance_sessions"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one record per user and subject per local calendar day,
        // regardless of method. Racing inserts lose here, not in app code.
        manager
            .create_index(
                Index::create()
                    .name("uq_att_rec_user_subject_day")
                    .table(Alias::new("attendance_records"))
                    .col(Alias::new("user_id"))
                    .col(Alias::new("subject"))
                    .col(Alias::new("day"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        // At most one record per (session, user). NULL session ids are
        // distinct under SQLite so session-less taps never collide.
        manager
            .create_index(
                Index::create()
                    .name("uq_att_rec_session_user")
                    .table(Alias::new("attendance_records"))
                    .col(Alias::new("session_id"))
                    .col(Alias::new("user_id"))
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("attendance_records"))
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("attendance_sessions"))
                    .to_owned(),
            )
            .await
    }
}
