mod common;

use common::*;
use prodent_client::remote::Table;
use prodent_client::{AuthStatus, Notice, SignUpStep};

#[tokio::test]
async fn creates_identity_company_and_attachment() {
    let remote = FakeRemote::new();
    let store = store(&remote);

    let outcome = store.sign_up("new@clinic.com", "secret1", "Sorriso Lab").await;

    assert!(outcome.is_complete(), "{:?}", outcome.error);
    let company = outcome.company.clone().unwrap();
    let user = outcome.user.clone().unwrap();
    assert_eq!(company.name, "Sorriso Lab");
    assert_eq!(user.company_id(), Some(company.id));

    let state = store.current_state();
    assert_eq!(state.status(), AuthStatus::Authenticated);
    assert_eq!(state.company_id(), Some(company.id));
    assert!(!state.is_loading);
}

#[tokio::test]
async fn company_failure_reports_step_and_skips_attachment() {
    let remote = FakeRemote::new();
    remote.fail_insert(Table::Companies);
    let store = store(&remote);

    let outcome = store.sign_up("new@clinic.com", "secret1", "Sorriso Lab").await;

    let user = outcome.user.as_ref().expect("identity was created");
    assert_eq!(user.email.as_deref(), Some("new@clinic.com"));
    assert!(outcome.company.is_none());
    assert_eq!(outcome.failed_step(), Some(SignUpStep::CreateCompany));
    assert_eq!(
        outcome.error.as_ref().map(|e| e.notice()),
        Some(Notice::SignUpIncomplete)
    );
    assert_eq!(remote.count(|c| matches!(c, Call::UpdateUser(_))), 0);
    assert!(!store.current_state().is_loading);
}

#[tokio::test]
async fn failed_attachment_can_be_resumed_without_registering_again() {
    let remote = FakeRemote::new();
    remote.fail_attach(true);
    let store = store(&remote);

    let outcome = store.sign_up("new@clinic.com", "secret1", "Sorriso Lab").await;
    assert_eq!(outcome.failed_step(), Some(SignUpStep::AttachCompany));
    let company = outcome.company.clone().unwrap();
    assert!(outcome.user.as_ref().unwrap().company_id().is_none());

    remote.fail_attach(false);
    let resumed = store.resume_sign_up(&outcome, "Sorriso Lab").await;

    assert!(resumed.is_complete(), "{:?}", resumed.error);
    assert_eq!(resumed.company.as_ref().map(|c| c.id), Some(company.id));
    assert_eq!(remote.count(|c| matches!(c, Call::SignUp(_))), 1);
    assert_eq!(remote.rows(Table::Companies).len(), 1);
    assert_eq!(store.current_state().company_id(), Some(company.id));
}

#[tokio::test]
async fn duplicate_email_fails_at_identity_step() {
    let remote = FakeRemote::new();
    remote.add_user("taken@clinic.com", "secret1", Some(CO_1));
    let store = store(&remote);

    let outcome = store.sign_up("taken@clinic.com", "secret1", "Other").await;

    assert!(outcome.user.is_none());
    assert_eq!(outcome.failed_step(), Some(SignUpStep::CreateIdentity));
    assert!(remote.data_calls(Table::Companies).is_empty());
}
