pub mod m202602090001_create_users;
pub mod m202602090002_create_subjects;
pub mod m202602160001_create_attendance;
