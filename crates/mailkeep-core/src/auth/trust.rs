//! Trust-on-first-use certificate gate.
//!
//! The transport reports every certificate a server presents through
//! [`Auth::handle_certificate_update`] together with a `resume` callback that
//! continues the connection. The callback runs at most once, and only after
//! any change to the trusted certificate has been persisted.

use std::fmt;

use tracing::{debug, info, warn};

use super::Auth;
use crate::account::Protocol;
use crate::error::{Error, Result};

/// Text shown to the user when a server's certificate changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPrompt {
    /// Short title.
    pub title: String,
    /// Explanation and question.
    pub message: String,
}

impl TrustPrompt {
    fn changed(protocol: Protocol, host: &str) -> Self {
        Self {
            title: "Warning".to_string(),
            message: format!(
                "The {protocol} server {host} presented a different certificate than \
                 the one trusted before. This may be a planned certificate change or \
                 someone intercepting the connection. Do you want to trust the new \
                 certificate and proceed?"
            ),
        }
    }
}

/// Outcome of a certificate check.
#[must_use]
pub enum TrustDecision<R> {
    /// The certificate is trusted and the connection was resumed.
    Trusted,
    /// The certificate changed and the user has to decide.
    Pending(PendingTrust<R>),
}

impl<R> fmt::Debug for TrustDecision<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trusted => f.write_str("Trusted"),
            Self::Pending(pending) => f.debug_tuple("Pending").field(pending).finish(),
        }
    }
}

/// The user's answer to a [`TrustPrompt`], as applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The new certificate was stored and the connection resumed.
    Accepted,
    /// Nothing was changed; the connection stays suspended.
    Declined,
}

/// A changed certificate awaiting the user's decision.
///
/// Resolving consumes the value, so a prompt is answered at most once.
/// Dropping it unresolved leaves the stored certificate untouched and never
/// resumes the connection.
#[must_use = "the connection stays suspended until the prompt is resolved"]
pub struct PendingTrust<R> {
    protocol: Protocol,
    host: String,
    certificate: String,
    prompt: TrustPrompt,
    resume: R,
}

impl<R> fmt::Debug for PendingTrust<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTrust")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

impl<R: FnOnce()> PendingTrust<R> {
    /// Protocol of the suspended connection.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Hostname of the server.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The newly presented certificate (PEM).
    #[must_use]
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// What to ask the user.
    #[must_use]
    pub const fn prompt(&self) -> &TrustPrompt {
        &self.prompt
    }

    /// Applies the user's answer.
    ///
    /// On acceptance the new certificate replaces the stored one, the account
    /// is persisted, and only then is the connection resumed. On refusal
    /// nothing changes.
    ///
    /// # Errors
    ///
    /// Returns the persistence error; the previous certificate is restored
    /// in memory and the connection is not resumed.
    pub async fn resolve(self, auth: &mut Auth, accepted: bool) -> Result<Verdict> {
        if !accepted {
            info!(
                "Kept trusted certificate for {} server {}",
                self.protocol, self.host
            );
            return Ok(Verdict::Declined);
        }

        auth.trust_certificate(self.protocol, self.certificate).await?;
        info!(
            "Trusted new certificate for {} server {}",
            self.protocol, self.host
        );
        (self.resume)();
        Ok(Verdict::Accepted)
    }
}

enum StoredCertificate {
    Unknown,
    Matches,
    Differs { pinned: bool },
}

impl Auth {
    /// Checks the certificate a server presented against the trusted one.
    ///
    /// - Nothing stored yet: the certificate is trusted on first use,
    ///   persisted, and the connection resumed.
    /// - Same certificate: the connection is resumed.
    /// - Different certificate, pinned: the connection is refused.
    /// - Different certificate otherwise: the user is asked via the returned
    ///   [`PendingTrust`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CertificatePinned`] for a pinned mismatch,
    /// [`Error::IncompleteCredentials`] if the protocol has no configuration,
    /// or the persistence error on first use. `resume` is not called in any
    /// of these cases.
    pub async fn handle_certificate_update<R: FnOnce()>(
        &mut self,
        protocol: Protocol,
        presented: &str,
        resume: R,
    ) -> Result<TrustDecision<R>> {
        let config = self
            .account
            .connection(protocol)
            .ok_or(Error::IncompleteCredentials(protocol))?;
        let host = config.host.clone();
        let stored = match config.ca.as_deref() {
            None => StoredCertificate::Unknown,
            Some(ca) if same_certificate(ca, presented) => StoredCertificate::Matches,
            Some(_) => StoredCertificate::Differs {
                pinned: config.pinned,
            },
        };

        match stored {
            StoredCertificate::Unknown => {
                self.trust_certificate(protocol, presented.to_string()).await?;
                info!("Trusting certificate of {protocol} server {host} on first use");
                resume();
                Ok(TrustDecision::Trusted)
            }
            StoredCertificate::Matches => {
                debug!("Certificate of {protocol} server {host} matches the trusted one");
                resume();
                Ok(TrustDecision::Trusted)
            }
            StoredCertificate::Differs { pinned: true } => {
                warn!("Pinned certificate of {protocol} server {host} changed, refusing");
                Err(Error::CertificatePinned { protocol, host })
            }
            StoredCertificate::Differs { pinned: false } => {
                warn!("Certificate of {protocol} server {host} changed, asking the user");
                Ok(TrustDecision::Pending(PendingTrust {
                    protocol,
                    prompt: TrustPrompt::changed(protocol, &host),
                    host,
                    certificate: presented.to_string(),
                    resume,
                }))
            }
        }
    }

    /// Pins the trusted certificate of `protocol` so it is never replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCertificate`] if nothing has been trusted yet,
    /// [`Error::IncompleteCredentials`] without a configuration, or the
    /// persistence error (the pin is undone in memory).
    pub async fn pin_certificate(&mut self, protocol: Protocol) -> Result<()> {
        let config = self
            .account
            .connection_mut(protocol)
            .ok_or(Error::IncompleteCredentials(protocol))?;
        if config.ca.is_none() {
            return Err(Error::NoCertificate(protocol));
        }
        if config.pinned {
            return Ok(());
        }

        config.pinned = true;
        self.account.credentials_dirty = true;
        if let Err(e) = self.store_credentials().await {
            if let Some(config) = self.account.connection_mut(protocol) {
                config.pinned = false;
            }
            return Err(e);
        }

        info!("Pinned certificate for {protocol}");
        Ok(())
    }

    /// Replaces the trusted certificate and persists the account.
    async fn trust_certificate(&mut self, protocol: Protocol, pem: String) -> Result<()> {
        let config = self
            .account
            .connection_mut(protocol)
            .ok_or(Error::IncompleteCredentials(protocol))?;
        let previous = config.ca.replace(pem);
        self.account.credentials_dirty = true;

        if let Err(e) = self.store_credentials().await {
            if let Some(config) = self.account.connection_mut(protocol) {
                config.ca = previous;
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Compares two PEM documents, ignoring line endings and wrapping.
fn same_certificate(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::account::ConnectionConfig;
    use crate::auth::CredentialsUpdate;
    use crate::testing::{
        CERTIFICATE, FakeCodec, FakeStorage, PASSWORD, imap_config, seeded_storage, smtp_config,
    };

    const OTHER_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\nOTHER\n-----END CERTIFICATE-----";

    async fn loaded(storage: &Arc<FakeStorage>) -> Auth {
        let mut auth = Auth::new(storage.clone(), Arc::new(FakeCodec::default()));
        auth.get_credentials().await.unwrap();
        auth
    }

    fn without_ca(storage: &FakeStorage) {
        let mut imap = imap_config();
        imap.ca = None;
        storage.seed("imap", vec![serde_json::to_value(imap).unwrap()]);
    }

    fn stored_imap(storage: &FakeStorage) -> ConnectionConfig {
        serde_json::from_value(storage.stored("imap").remove(0)).unwrap()
    }

    #[tokio::test]
    async fn test_first_use_stores_and_resumes() {
        let storage = Arc::new(seeded_storage());
        without_ca(&storage);
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(0);

        let decision = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || {
                resumed.set(resumed.get() + 1);
            })
            .await
            .unwrap();

        assert!(matches!(decision, TrustDecision::Trusted));
        assert_eq!(resumed.get(), 1);
        assert_eq!(
            auth.account().imap.as_ref().unwrap().ca.as_deref(),
            Some(OTHER_CERTIFICATE)
        );
        assert_eq!(stored_imap(&storage).ca.as_deref(), Some(OTHER_CERTIFICATE));
        assert_eq!(storage.stored("password"), vec![json!(crate::testing::ENCRYPTED_PASSWORD)]);
        assert!(!auth.account().credentials_dirty);
    }

    #[tokio::test]
    async fn test_first_use_store_failure_does_not_resume() {
        let storage = Arc::new(seeded_storage());
        without_ca(&storage);
        let mut auth = loaded(&storage).await;
        storage.fail_writes_on("emailaddress");
        let resumed = Cell::new(false);

        let result = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || resumed.set(true))
            .await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(!resumed.get());
        assert!(auth.account().imap.as_ref().unwrap().ca.is_none());
    }

    #[tokio::test]
    async fn test_matching_certificate_resumes_without_storing() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(false);

        let decision = auth
            .handle_certificate_update(Protocol::Imap, CERTIFICATE, || resumed.set(true))
            .await
            .unwrap();

        assert!(matches!(decision, TrustDecision::Trusted));
        assert!(resumed.get());
        assert_eq!(storage.store_calls(), 0);
    }

    #[tokio::test]
    async fn test_line_endings_do_not_matter() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(false);
        let crlf = CERTIFICATE.replace('\n', "\r\n");

        let decision = auth
            .handle_certificate_update(Protocol::Imap, &crlf, || resumed.set(true))
            .await
            .unwrap();

        assert!(matches!(decision, TrustDecision::Trusted));
        assert!(resumed.get());
    }

    #[tokio::test]
    async fn test_pinned_mismatch_is_refused() {
        let storage = Arc::new(seeded_storage());
        storage.seed(
            "imap",
            vec![serde_json::to_value(imap_config().pinned(true)).unwrap()],
        );
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(false);

        let err = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || resumed.set(true))
            .await
            .unwrap_err();

        match err {
            Error::CertificatePinned { protocol, host } => {
                assert_eq!(protocol, Protocol::Imap);
                assert_eq!(host, imap_config().host);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!resumed.get());
        assert_eq!(storage.store_calls(), 0);
        assert_eq!(
            auth.account().imap.as_ref().unwrap().ca.as_deref(),
            Some(CERTIFICATE)
        );
    }

    #[tokio::test]
    async fn test_changed_certificate_accepted() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(0);

        let decision = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || {
                resumed.set(resumed.get() + 1);
            })
            .await
            .unwrap();
        let TrustDecision::Pending(pending) = decision else {
            panic!("expected a prompt");
        };
        assert_eq!(resumed.get(), 0);
        assert_eq!(pending.prompt().title, "Warning");
        assert!(pending.prompt().message.contains(&imap_config().host));
        assert_eq!(pending.certificate(), OTHER_CERTIFICATE);

        let verdict = pending.resolve(&mut auth, true).await.unwrap();

        assert_eq!(verdict, Verdict::Accepted);
        assert_eq!(resumed.get(), 1);
        assert_eq!(stored_imap(&storage).ca.as_deref(), Some(OTHER_CERTIFICATE));
        assert!(!auth.account().credentials_dirty);
    }

    #[tokio::test]
    async fn test_changed_certificate_declined() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(false);

        let decision = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || resumed.set(true))
            .await
            .unwrap();
        let TrustDecision::Pending(pending) = decision else {
            panic!("expected a prompt");
        };

        let verdict = pending.resolve(&mut auth, false).await.unwrap();

        assert_eq!(verdict, Verdict::Declined);
        assert!(!resumed.get());
        assert_eq!(storage.store_calls(), 0);
        assert_eq!(
            auth.account().imap.as_ref().unwrap().ca.as_deref(),
            Some(CERTIFICATE)
        );
    }

    #[tokio::test]
    async fn test_accept_store_failure_keeps_old_certificate() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;
        let resumed = Cell::new(false);
        let decision = auth
            .handle_certificate_update(Protocol::Smtp, OTHER_CERTIFICATE, || resumed.set(true))
            .await
            .unwrap();
        let TrustDecision::Pending(pending) = decision else {
            panic!("expected a prompt");
        };
        storage.fail_writes_on("smtp");

        let result = pending.resolve(&mut auth, true).await;

        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(!resumed.get());
        assert_eq!(
            auth.account().smtp.as_ref().unwrap().ca.as_deref(),
            smtp_config().ca.as_deref()
        );
    }

    #[tokio::test]
    async fn test_unconfigured_protocol() {
        let mut auth = Auth::new(
            Arc::new(FakeStorage::default()),
            Arc::new(FakeCodec::default()),
        );
        let resumed = Cell::new(false);

        let result = auth
            .handle_certificate_update(Protocol::Smtp, CERTIFICATE, || resumed.set(true))
            .await;

        assert!(matches!(
            result,
            Err(Error::IncompleteCredentials(Protocol::Smtp))
        ));
        assert!(!resumed.get());
    }

    #[tokio::test]
    async fn test_pin_certificate() {
        let storage = Arc::new(seeded_storage());
        let mut auth = loaded(&storage).await;

        auth.pin_certificate(Protocol::Imap).await.unwrap();

        assert!(auth.account().imap.as_ref().unwrap().pinned);
        assert!(stored_imap(&storage).pinned);

        let resumed = Cell::new(false);
        let result = auth
            .handle_certificate_update(Protocol::Imap, OTHER_CERTIFICATE, || resumed.set(true))
            .await;
        assert!(matches!(result, Err(Error::CertificatePinned { .. })));
    }

    #[tokio::test]
    async fn test_pin_without_certificate() {
        let storage = Arc::new(FakeStorage::default());
        let mut auth = Auth::new(storage.clone(), Arc::new(FakeCodec::default()));
        auth.set_credentials(CredentialsUpdate {
            password: Some(PASSWORD.into()),
            imap: Some(ConnectionConfig::new("mail.blablubb.com", 993, true)),
            ..CredentialsUpdate::default()
        });

        assert!(matches!(
            auth.pin_certificate(Protocol::Imap).await,
            Err(Error::NoCertificate(Protocol::Imap))
        ));
        assert!(matches!(
            auth.pin_certificate(Protocol::Smtp).await,
            Err(Error::IncompleteCredentials(Protocol::Smtp))
        ));
        assert_eq!(storage.store_calls(), 0);
    }
}
