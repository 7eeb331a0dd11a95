pub mod attendance_record;
pub mod attendance_session;
pub mod error;
pub mod events;
pub mod scan;
pub mod user;

#[cfg(test)]
mod test_support;
