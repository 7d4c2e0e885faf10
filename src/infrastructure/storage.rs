use std::env;
use std::sync::Arc;

use aws_sdk_s3::config::Region;
use tracing::info;

use crate::services::object_store::S3ObjectStore;

/// Build the S3 client from the environment. `S3_ENDPOINT` plus static
/// credentials select a MinIO-style deployment; without them the default
/// AWS provider chain applies.
pub async fn setup_object_store() -> Arc<S3ObjectStore> {
    let bucket = env::var("S3_BUCKET_NAME").expect("S3_BUCKET_NAME must be set");
    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());

    let mut loader = aws_config::from_env().region(Region::new(region));

    if let Ok(endpoint) = env::var("S3_ENDPOINT") {
        info!("☁️  Object store endpoint override: {}", endpoint);
        loader = loader.endpoint_url(endpoint);
    }

    if let (Ok(access_key), Ok(secret_key)) = (env::var("S3_ACCESS_KEY"), env::var("S3_SECRET_KEY"))
    {
        loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    }

    let aws_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let client = aws_sdk_s3::Client::from_conf(s3_config);

    info!("☁️  Object store bucket: {}", bucket);
    Arc::new(S3ObjectStore::new(client, bucket))
}
