//! End-to-end sessions over the `SQLite` backend and the AES-GCM codec.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;

use mailkeep_core::{
    AesGcmCodec, Auth, ConnectionConfig, CredentialsUpdate, DeviceStorage, MasterKey, Protocol,
    SqliteDeviceStorage, TrustDecision, Verdict,
};
use proptest::prelude::*;

const PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBszCCAVmgAwIBAgIU\n-----END CERTIFICATE-----";
const ROTATED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBtDCCAVqgAwIBAgIV\n-----END CERTIFICATE-----";

fn update(password: &str) -> CredentialsUpdate {
    CredentialsUpdate {
        email_address: Some("bla@blubb.com".into()),
        username: Some("bla".into()),
        realname: Some("Bla Blubb".into()),
        provider: Some("custom".into()),
        password: Some(password.into()),
        imap: Some(ConnectionConfig::new("mail.blablubb.com", 993, true)),
        smtp: Some(ConnectionConfig::new("mail.blablubb.com", 465, true)),
    }
}

struct Device {
    storage: Arc<SqliteDeviceStorage>,
    codec: Arc<AesGcmCodec>,
}

impl Device {
    async fn new() -> Self {
        Self {
            storage: Arc::new(SqliteDeviceStorage::in_memory().await.unwrap()),
            codec: Arc::new(AesGcmCodec::new(&MasterKey::generate())),
        }
    }

    fn session(&self) -> Auth {
        Auth::new(self.storage.clone(), self.codec.clone())
    }
}

#[tokio::test]
async fn test_credentials_survive_a_restart() {
    let device = Device::new().await;
    let mut first = device.session();
    first.set_credentials(update("correct horse battery staple"));
    first.store_credentials().await.unwrap();

    let stored = device.storage.list_items("password", 0, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0], "correct horse battery staple");

    let mut second = device.session();
    let credentials = second.get_credentials().await.unwrap();
    assert_eq!(credentials.email_address.as_deref(), Some("bla@blubb.com"));
    assert_eq!(credentials.realname.as_deref(), Some("Bla Blubb"));
    assert_eq!(
        credentials.imap.auth.pass.as_deref(),
        Some("correct horse battery staple")
    );
    assert_eq!(credentials.smtp.port, 465);
}

#[tokio::test]
async fn test_other_master_key_cannot_read_password() {
    let device = Device::new().await;
    let mut writer = device.session();
    writer.set_credentials(update("secret"));
    writer.store_credentials().await.unwrap();

    let stranger = Arc::new(AesGcmCodec::new(&MasterKey::generate()));
    let mut reader = Auth::new(device.storage.clone(), stranger);
    assert!(reader.get_credentials().await.is_err());
}

#[tokio::test]
async fn test_trust_decisions_are_persisted() {
    let device = Device::new().await;
    let mut session = device.session();
    session.set_credentials(update("secret"));
    session.store_credentials().await.unwrap();

    let decision = session
        .handle_certificate_update(Protocol::Imap, PEM, || {})
        .await
        .unwrap();
    assert!(matches!(decision, TrustDecision::Trusted));

    let mut resumed = false;
    let decision = session
        .handle_certificate_update(Protocol::Imap, ROTATED_PEM, || resumed = true)
        .await
        .unwrap();
    let TrustDecision::Pending(pending) = decision else {
        panic!("expected a prompt for the rotated certificate");
    };
    assert_eq!(
        pending.resolve(&mut session, true).await.unwrap(),
        Verdict::Accepted
    );
    assert!(resumed);

    let mut restarted = device.session();
    let credentials = restarted.get_credentials().await.unwrap();
    assert_eq!(credentials.imap.ca.as_deref(), Some(ROTATED_PEM));
    assert!(credentials.smtp.ca.is_none());
    assert_eq!(credentials.imap.auth.pass.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_pin_survives_restart() {
    let device = Device::new().await;
    let mut session = device.session();
    session.set_credentials(CredentialsUpdate {
        smtp: Some(ConnectionConfig::new("mail.blablubb.com", 465, true).with_ca(PEM)),
        ..update("secret")
    });
    session.pin_certificate(Protocol::Smtp).await.unwrap();

    let mut restarted = device.session();
    restarted.get_credentials().await.unwrap();
    let result = restarted
        .handle_certificate_update(Protocol::Smtp, ROTATED_PEM, || {})
        .await;
    assert!(matches!(
        result,
        Err(mailkeep_core::Error::CertificatePinned { .. })
    ));
}

#[tokio::test]
async fn test_logout_forgets_account() {
    let device = Device::new().await;
    let mut session = device.session();
    session.set_credentials(update("secret"));
    session.store_credentials().await.unwrap();

    session.logout().await.unwrap();

    let mut restarted = device.session();
    assert!(matches!(
        restarted.get_credentials().await,
        Err(mailkeep_core::Error::IncompleteCredentials(Protocol::Imap))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_any_password_round_trips(password in "\\PC{1,64}", realname in "\\PC{0,32}") {
        let restored = tokio_test::block_on(async {
            let device = Device::new().await;
            let mut writer = device.session();
            writer.set_credentials(CredentialsUpdate {
                realname: Some(realname.clone()),
                ..update(&password)
            });
            writer.store_credentials().await.unwrap();

            let mut reader = device.session();
            reader.get_credentials().await.unwrap()
        });

        prop_assert_eq!(restored.imap.auth.pass.as_deref(), Some(password.as_str()));
        prop_assert_eq!(restored.realname.as_deref(), Some(realname.as_str()));
    }
}
