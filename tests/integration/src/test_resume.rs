//! Credential expiry, checkpoint resume, and pause tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use http::StatusCode;
    use rustack_upload_core::{
        ErrorKind, TransferState, UploadClient, UploadError, UploadOptions, UploadTask,
    };

    use crate::{Fault, MockProvider, credential, credential_with_secret, payload_bytes};

    const MIB: usize = 1024 * 1024;

    #[tokio::test]
    async fn test_should_fail_with_credential_expired_on_forbidden_part() {
        let provider = MockProvider::start().await;
        provider.inject(Fault::part(2, StatusCode::FORBIDDEN, "SecurityTokenExpired", 1));
        let client = UploadClient::new(provider.config()).expect("client");

        let handle = client
            .start_upload(
                Arc::new(payload_bytes(15 * MIB)),
                "expired.bin",
                credential(),
                UploadOptions::default(),
            )
            .expect("start upload");
        let err = handle.await_result().await.expect_err("credential expired");

        assert!(err.is_credential_expired());
        assert!(err.to_string().contains("SecurityTokenExpired"));
        assert_eq!(provider.part_uploads().iter().filter(|&&n| n == 2).count(), 1);
        assert!(!provider.requests().iter().any(|r| r.is_complete()));
    }

    #[tokio::test]
    async fn test_should_resume_checkpoint_with_fresh_credential() {
        let provider = MockProvider::start().await;
        provider.inject(Fault::part(3, StatusCode::FORBIDDEN, "SecurityTokenExpired", 1));
        let client = UploadClient::new(provider.config()).expect("client");
        let data = payload_bytes(15 * MIB);

        let handle = client
            .start_upload(
                Arc::new(data.clone()),
                "resume.bin",
                credential(),
                UploadOptions::default(),
            )
            .expect("start upload");
        // Poll until the transfer fails, then take its checkpoint.
        let mut checkpoint = handle.checkpoint();
        for _ in 0..1000 {
            checkpoint = handle.checkpoint();
            if checkpoint.state().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            checkpoint.state(),
            TransferState::Failed(ErrorKind::Upload(UploadError::CredentialExpired { .. }))
        ));
        assert!(handle.await_result().await.is_err());

        // The checkpoint survives a JSON round trip.
        let json = serde_json::to_string(&checkpoint).expect("serialize checkpoint");
        let checkpoint: UploadTask = serde_json::from_str(&json).expect("parse checkpoint");
        assert!(!checkpoint.completed().contains_key(&3));
        let missing: Vec<u32> = checkpoint
            .pending_parts()
            .iter()
            .map(|p| p.part_number)
            .collect();
        let uploaded_before = provider.part_uploads().len();

        let object = client
            .resume_upload(
                Arc::new(data.clone()),
                checkpoint,
                credential(),
                UploadOptions::default(),
            )
            .expect("resume upload")
            .await_result()
            .await
            .expect("resumed upload");

        assert_eq!(object.key, "resume.bin");
        assert_eq!(provider.object("resume.bin"), Some(data));
        let mut resent = provider.part_uploads()[uploaded_before..].to_vec();
        resent.sort_unstable();
        assert_eq!(resent, missing);
        assert_eq!(
            provider
                .requests()
                .iter()
                .filter(|r| r.query.contains_key("uploads"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_should_treat_signature_mismatch_as_credential_failure() {
        let provider = MockProvider::start().await;
        let client = UploadClient::new(provider.config()).expect("client");

        let err = client
            .start_upload(
                Arc::new(payload_bytes(8 * MIB)),
                "wrong-secret.bin",
                credential_with_secret("not-the-secret"),
                UploadOptions::default(),
            )
            .expect("start upload")
            .await_result()
            .await
            .expect_err("rejected");

        assert!(err.is_credential_expired());
        assert!(err.to_string().contains("SignatureDoesNotMatch"));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_should_finish_after_pause_and_resume() {
        let provider = MockProvider::start().await;
        let config = rustack_upload_core::UploadConfig::builder()
            .endpoint(provider.endpoint())
            .path_style(true)
            .concurrency(1)
            .build();
        let client = UploadClient::new(config).expect("client");
        let data = payload_bytes(20 * MIB);

        let handle = client
            .start_upload(
                Arc::new(data.clone()),
                "paused.bin",
                credential(),
                UploadOptions::default(),
            )
            .expect("start upload");

        for _ in 0..1000 {
            if handle.state() == TransferState::Uploading {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        handle.pause().expect("pause");
        assert_eq!(handle.state(), TransferState::Paused);

        // In-flight work drains, nothing new starts.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let sent_while_paused = provider.part_uploads().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.part_uploads().len(), sent_while_paused);
        assert!(sent_while_paused < 4);

        handle.resume().expect("resume");
        let object = handle.await_result().await.expect("upload");

        assert!(object.etag.as_deref().is_some_and(|e| e.ends_with("-4\"")));
        assert_eq!(provider.object("paused.bin"), Some(data));
        let mut parts = provider.part_uploads();
        parts.sort_unstable();
        assert_eq!(parts, vec![1, 2, 3, 4]);
    }
}
