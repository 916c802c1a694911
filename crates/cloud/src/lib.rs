//! `gas-cloud`: AWS implementations of the object storage, request queue,
//! and notification capabilities.

pub mod s3;
pub mod sns;
pub mod sqs;

pub use s3::S3ObjectStore;
pub use sns::SnsNotifier;
pub use sqs::SqsRequestQueue;

use aws_config::BehaviorVersion;

/// Load shared SDK configuration from the environment.
///
/// `region` overrides the default region provider chain when set.
pub async fn load_sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_sdk_s3::config::Region::new(region.to_string()));
    }
    loader.load().await
}
