//! Download, presigned URL, and abort tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rustack_upload_core::{DownloadError, ErrorKind, UploadClient};

    use crate::{MockProvider, credential};

    #[tokio::test]
    async fn test_should_download_whole_object_and_range() {
        let provider = MockProvider::start().await;
        provider.put_object("docs/readme.md", Bytes::from_static(b"0123456789"));
        let client = UploadClient::new(provider.config()).expect("client");

        let whole = client
            .download("docs/readme.md", None, credential())
            .await
            .expect("download");
        assert_eq!(whole, Bytes::from_static(b"0123456789"));

        let range = client
            .download("docs/readme.md", Some(2..=5), credential())
            .await
            .expect("ranged download");
        assert_eq!(range, Bytes::from_static(b"2345"));
    }

    #[tokio::test]
    async fn test_should_report_missing_object() {
        let provider = MockProvider::start().await;
        let client = UploadClient::new(provider.config()).expect("client");

        let err = client
            .download("nope.bin", None, credential())
            .await
            .expect_err("missing");

        match err {
            ErrorKind::Download(DownloadError::UnexpectedResponseCode { status, message }) => {
                assert_eq!(status, 404);
                assert!(message.starts_with("NoSuchKey"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_should_serve_presigned_url() {
        let provider = MockProvider::start().await;
        provider.put_object("shared/a b.txt", Bytes::from_static(b"shared content"));
        let client = UploadClient::new(provider.config()).expect("client");

        let url = client
            .presigned_url("shared/a b.txt", chrono::Duration::minutes(5), &credential())
            .expect("presign");
        let response = reqwest::get(&url).await.expect("get presigned");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.bytes().await.expect("body"), "shared content");

        let tampered = url.replace("Expires=", "Expires=1");
        let response = reqwest::get(&tampered).await.expect("get tampered");
        assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_should_report_abort_of_unknown_upload() {
        let provider = MockProvider::start().await;
        let client = UploadClient::new(provider.config()).expect("client");

        let err = client
            .abort("a.bin", "upload-9999", credential())
            .await
            .expect_err("unknown upload");

        assert!(matches!(
            err,
            ErrorKind::Http(rustack_upload_core::HttpError::RequestFailed {
                status: Some(404),
                ..
            })
        ));
    }
}
