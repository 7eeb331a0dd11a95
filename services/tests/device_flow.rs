//! End-to-end path for the trusted scanning device: integrity check, card
//! resolution, ledger append, and registration pickup for unknown cards.

use db::test_utils::setup_test_db;
use services::attendance_record::AttendanceRecordService;
use services::error::ServiceError;
use services::events::SessionEventBus;
use services::scan::{ScanEvent, ScanMailbox, ScanVerifier};
use services::user::{RegisterStudent, UserService};

const SECRET: &[u8] = b"esp32-shared-secret";

fn tap(verifier: &ScanVerifier, card_id: &str) -> ScanEvent {
    ScanEvent {
        card_id: card_id.into(),
        subject: "DSP".into(),
        semester: "6".into(),
        digest: verifier.digest_for(card_id, "DSP", "6").unwrap(),
        device_id: Some("esp32-01".into()),
    }
}

fn student(card_id: &str) -> RegisterStudent {
    RegisterStudent {
        name: "Asha Varma".into(),
        username: "stud_a".into(),
        email: "stud_a@college.edu".into(),
        department: "ECE".into(),
        semester: "6".into(),
        phone: Some("9876543210".into()),
        card_id: Some(card_id.into()),
    }
}

#[tokio::test]
async fn valid_tap_records_attendance_once_per_day() {
    let db = setup_test_db().await;
    let bus = SessionEventBus::new();
    let verifier = ScanVerifier::new(SECRET.to_vec());
    let mailbox = ScanMailbox::new(30);

    let registered = UserService::register_student(&db, student("04A224E9"))
        .await
        .unwrap();

    let record =
        AttendanceRecordService::record_device_tap(&db, &bus, &verifier, &mailbox, &tap(&verifier, "04A224E9"))
            .await
            .unwrap();
    assert_eq!(record.user_id, registered.id);
    assert_eq!(record.card_id.as_deref(), Some("04A224E9"));
    assert!(record.session_id.is_none());

    let err =
        AttendanceRecordService::record_device_tap(&db, &bus, &verifier, &mailbox, &tap(&verifier, "04A224E9"))
            .await
            .unwrap_err();
    assert!(matches!(err, ServiceError::Duplicate));
}

#[tokio::test]
async fn forged_tap_never_reaches_the_ledger() {
    let db = setup_test_db().await;
    let bus = SessionEventBus::new();
    let verifier = ScanVerifier::new(SECRET.to_vec());
    let forger = ScanVerifier::new(b"wrong-secret".to_vec());
    let mailbox = ScanMailbox::new(30);

    UserService::register_student(&db, student("04A224E9"))
        .await
        .unwrap();

    let err =
        AttendanceRecordService::record_device_tap(&db, &bus, &verifier, &mailbox, &tap(&forger, "04A224E9"))
            .await
            .unwrap_err();
    assert!(matches!(err, ServiceError::Integrity));

    // No record was created and nothing was parked for registration.
    let user = UserService::find_by_card(&db, "04A224E9").await.unwrap().unwrap();
    let stats = AttendanceRecordService::stats_for_user(&db, user.id, "6")
        .await
        .unwrap();
    assert_eq!(stats.present, 0);
    assert!(mailbox.peek().await.is_none());
}

#[tokio::test]
async fn unregistered_card_is_parked_for_registration() {
    let db = setup_test_db().await;
    let bus = SessionEventBus::new();
    let verifier = ScanVerifier::new(SECRET.to_vec());
    let mailbox = ScanMailbox::new(30);

    let err =
        AttendanceRecordService::record_device_tap(&db, &bus, &verifier, &mailbox, &tap(&verifier, "11BB22CC"))
            .await
            .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    // The registration form claims the pending card id, once.
    let pending = mailbox.claim().await.expect("card parked");
    assert_eq!(pending.card_id, "11BB22CC");
    assert!(mailbox.claim().await.is_none());

    let mut registration = student("11BB22CC");
    registration.card_id = Some(pending.card_id);
    let user = UserService::register_student(&db, registration)
        .await
        .unwrap();

    // The next tap of the now-registered card lands in the ledger.
    let record =
        AttendanceRecordService::record_device_tap(&db, &bus, &verifier, &mailbox, &tap(&verifier, "11BB22CC"))
            .await
            .unwrap();
    assert_eq!(record.user_id, user.id);
}
