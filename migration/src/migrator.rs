use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202602090001_create_users::Migration),
            Box::new(migrations::m202602090002_create_subjects::Migration),
            Box::new(migrations::m202602160001_create_attendance::Migration),
        ]
    }
}
