use chrono::Utc;
use db::models::{
    subject::{ActiveModel as SubjectActiveModel, Column as SubjectColumn, Entity as SubjectEntity},
    user::{ActiveModel, Column, Entity, Role},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use validator::Validate;

use crate::error::ServiceError;

pub use db::models::subject::Model as Subject;
pub use db::models::user::Model as User;

/// Admin-side student registration; the card id usually comes from the scan
/// mailbox after an unregistered tap.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterStudent {
    #[validate(length(min = 2, message = "name must be at least 2 characters"))]
    pub name: String,
    #[validate(length(min = 2, message = "username must be at least 2 characters"))]
    pub username: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    pub department: String,
    pub semester: String,
    #[validate(length(equal = 10, message = "phone must be 10 digits"))]
    pub phone: Option<String>,
    pub card_id: Option<String>,
}

/// One taught subject in a teacher's profile.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectSpec {
    pub name: String,
    pub code: String,
    pub semester: String,
}

pub struct UserService;

impl UserService {
    pub async fn register_student(
        db: &DatabaseConnection,
        params: RegisterStudent,
    ) -> Result<User, ServiceError> {
        params
            .validate()
            .map_err(|e| ServiceError::Validation(common::format_validation_errors(&e)))?;

        let now = Utc::now();
        let user = ActiveModel {
            username: Set(params.username),
            email: Set(params.email),
            name: Set(params.name),
            role: Set(Role::Student),
            department: Set(Some(params.department)),
            semester: Set(Some(params.semester)),
            phone: Set(params.phone),
            card_id: Set(params.card_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::from_write)?;

        log::info!("student {} registered (user {})", user.username, user.id);
        Ok(user)
    }

    pub async fn find_by_id(
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Option<User>, ServiceError> {
        Ok(Entity::find_by_id(id).one(db).await?)
    }

    pub async fn find_by_card(
        db: &DatabaseConnection,
        card_id: &str,
    ) -> Result<Option<User>, ServiceError> {
        Ok(Entity::find()
            .filter(Column::CardId.eq(card_id))
            .one(db)
            .await?)
    }

    pub async fn card_registered(
        db: &DatabaseConnection,
        card_id: &str,
    ) -> Result<bool, ServiceError> {
        Ok(Self::find_by_card(db, card_id).await?.is_some())
    }

    /// Associates a card with a user. The sparse unique index on `card_id`
    /// guarantees at most one holder; a taken card surfaces as `Duplicate`.
    pub async fn update_card(
        db: &DatabaseConnection,
        user_id: i64,
        card_id: &str,
    ) -> Result<User, ServiceError> {
        let user = Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        let mut active: ActiveModel = user.into();
        active.card_id = Set(Some(card_id.to_owned()));
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(ServiceError::from_write)
    }

    /// Replaces a teacher's taught-subject list wholesale, the way the
    /// profile form submits it.
    pub async fn replace_subjects(
        db: &DatabaseConnection,
        teacher_id: i64,
        subjects: Vec<SubjectSpec>,
    ) -> Result<Vec<Subject>, ServiceError> {
        let teacher = Entity::find_by_id(teacher_id)
            .one(db)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        match teacher.role {
            Role::Teacher => {}
            role => return Err(ServiceError::Role(role)),
        }

        SubjectEntity::delete_many()
            .filter(SubjectColumn::TeacherId.eq(teacher_id))
            .exec(db)
            .await?;

        let now = Utc::now();
        let mut saved = Vec::with_capacity(subjects.len());
        for spec in subjects {
            let subject = SubjectActiveModel {
                teacher_id: Set(teacher_id),
                name: Set(spec.name),
                code: Set(spec.code),
                semester: Set(spec.semester),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await
            .map_err(ServiceError::from_write)?;
            saved.push(subject);
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seed_user;
    use db::test_utils::setup_test_db;

    fn registration(username: &str, card_id: Option<&str>) -> RegisterStudent {
        RegisterStudent {
            name: "Asha Varma".into(),
            username: username.into(),
            email: format!("{username}@college.edu"),
            department: "ECE".into(),
            semester: "6".into(),
            phone: Some("9876543210".into()),
            card_id: card_id.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn registers_students_and_resolves_cards() {
        let db = setup_test_db().await;

        let student = UserService::register_student(&db, registration("stud_a", Some("04A224E9")))
            .await
            .unwrap();
        assert_eq!(student.role, Role::Student);

        let found = UserService::find_by_card(&db, "04A224E9")
            .await
            .unwrap()
            .expect("card resolves");
        assert_eq!(found.id, student.id);
        assert!(UserService::card_registered(&db, "04A224E9").await.unwrap());
        assert!(!UserService::card_registered(&db, "DEADBEEF").await.unwrap());
    }

    #[tokio::test]
    async fn a_card_has_at_most_one_holder() {
        let db = setup_test_db().await;

        UserService::register_student(&db, registration("stud_a", Some("04A224E9")))
            .await
            .unwrap();
        let err = UserService::register_student(&db, registration("stud_b", Some("04A224E9")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate));

        // Re-associating the same card to another user fails the same way.
        let other = UserService::register_student(&db, registration("stud_c", None))
            .await
            .unwrap();
        let err = UserService::update_card(&db, other.id, "04A224E9")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Duplicate));

        let updated = UserService::update_card(&db, other.id, "11BB22CC")
            .await
            .unwrap();
        assert_eq!(updated.card_id.as_deref(), Some("11BB22CC"));
    }

    #[tokio::test]
    async fn rejects_invalid_registrations() {
        let db = setup_test_db().await;

        let mut bad_email = registration("stud_a", None);
        bad_email.email = "not-an-email".into();
        let err = UserService::register_student(&db, bad_email)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut bad_phone = registration("stud_b", None);
        bad_phone.phone = Some("12345".into());
        let err = UserService::register_student(&db, bad_phone)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn subject_list_is_replaced_wholesale() {
        let db = setup_test_db().await;
        let teacher = seed_user(&db, "lect1", Role::Teacher).await;

        UserService::replace_subjects(
            &db,
            teacher.id,
            vec![SubjectSpec {
                name: "Digital Signal Processing".into(),
                code: "EC602".into(),
                semester: "6".into(),
            }],
        )
        .await
        .unwrap();

        let saved = UserService::replace_subjects(
            &db,
            teacher.id,
            vec![
                SubjectSpec {
                    name: "VLSI Design".into(),
                    code: "EC604".into(),
                    semester: "6".into(),
                },
                SubjectSpec {
                    name: "Embedded Systems".into(),
                    code: "EC606".into(),
                    semester: "6".into(),
                },
            ],
        )
        .await
        .unwrap();

        let codes: Vec<_> = saved.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["EC604", "EC606"]);

        let student = seed_user(&db, "stud_a", Role::Student).await;
        let err = UserService::replace_subjects(&db, student.id, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Role(Role::Student)));
    }
}
