//! Wiring smoke test: environment keys flow through `Config::init` into the
//! components built with the `from_config` constructors.

use common::config::Config;
use services::scan::{ScanEvent, ScanMailbox, ScanVerifier};

#[tokio::test]
async fn env_keys_reach_the_scan_components() {
    let log_file = std::env::temp_dir().join("attendance-core-config-test.log");
    std::env::set_var("DATABASE_PATH", "sqlite::memory:");
    std::env::set_var("LOG_FILE", log_file.to_string_lossy().as_ref());
    std::env::set_var("SCANNER_SECRET", "esp32-shared-secret");
    std::env::set_var("SCAN_TTL_SECONDS", "12");

    // No .env file on disk; everything comes from the process environment.
    let cfg = Config::init(".env.does-not-exist");
    assert_eq!(cfg.scanner_secret, "esp32-shared-secret");
    assert_eq!(cfg.scan_ttl_seconds, 12);
    assert_eq!(Config::get().database_path, "sqlite::memory:");

    common::logger::init_logger(&cfg.log_level, &cfg.log_file);
    log::info!("config smoke test logger up");

    let db = db::connect().await;
    db.ping().await.expect("database reachable");

    // The verifier picked up the shared secret: a digest it issues passes
    // its own verification.
    let verifier = ScanVerifier::from_config();
    let digest = verifier
        .digest_for("04A224E9", "DSP", "6")
        .expect("secret configured");
    let event = ScanEvent {
        card_id: "04A224E9".into(),
        subject: "DSP".into(),
        semester: "6".into(),
        digest,
        device_id: Some("esp32-01".into()),
    };
    assert!(verifier.verify(&event).is_ok());

    // The mailbox picked up the TTL; a fresh tap is visible within it.
    let mailbox = ScanMailbox::from_config();
    mailbox.publish("04A224E9").await;
    let pending = mailbox.peek().await.expect("tap pending");
    assert_eq!(pending.card_id, "04A224E9");
}
