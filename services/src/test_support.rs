use chrono::Utc;
use db::models::user::{ActiveModel, Model, Role};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

pub async fn seed_user(db: &DatabaseConnection, username: &str, role: Role) -> Model {
    let now = Utc::now();
    ActiveModel {
        username: Set(username.to_owned()),
        email: Set(format!("{username}@college.edu")),
        name: Set(username.to_owned()),
        role: Set(role),
        department: Set(Some("ECE".into())),
        semester: Set(Some("6".into())),
        phone: Set(None),
        card_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed user")
}
