//! Object storage upload helper.
//!
//! Uploads a blob to S3 under a collision-resistant key and returns the
//! public URL. Failures are logged and yield `None`; callers treat `None` as
//! "nothing stored" rather than an error.
//!
//! Neither bundled binary uploads anything (webhook attachments are
//! discarded); this is a library facility for embedding callers, configured
//! through [`Config`](crate::Config)'s `s3_bucket`/`s3_region`.

use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl ObjectStorage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }

    /// Build a client from ambient AWS configuration (env/profile/IMDS).
    pub async fn from_env(bucket: String, region: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, region)
    }

    /// Upload a blob and return its public URL, or `None` on any failure.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: Option<&str>,
    ) -> Option<String> {
        let key = object_key(filename);

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type.unwrap_or("application/octet-stream"))
            .send()
            .await;

        match result {
            Ok(_) => {
                let url = self.object_url(&key);
                info!(bucket = %self.bucket, key = %key, "object_uploaded");
                Some(url)
            }
            Err(e) => {
                warn!(bucket = %self.bucket, key = %key, error = %e, "object_upload_failed");
                None
            }
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

/// Collision-resistant key: a fresh UUID prefixed to the original filename.
fn object_key(filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_is_unique_per_call() {
        let a = object_key("report.pdf");
        let b = object_key("report.pdf");

        assert_ne!(a, b);
        assert!(a.ends_with("_report.pdf"));
        assert!(b.ends_with("_report.pdf"));
    }
}
