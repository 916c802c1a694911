//! `gas-submit` -- register an uploaded input file as a job.
//!
//! ```text
//! gas-submit <bucket> <key>                       create the PENDING job and notify
//! gas-submit --new-key <prefix> <user_id> <file>  print a fresh input key
//! ```
//!
//! | Variable                | Required | Default   |
//! |-------------------------|----------|-----------|
//! | `DATABASE_URL`          | yes      | --        |
//! | `JOB_REQUEST_TOPIC_ARN` | yes      | --        |
//! | `AWS_REGION_NAME`       | no       | SDK chain |

use std::sync::Arc;

use gas_cloud::SnsNotifier;
use gas_core::submit::{self, JobSubmitter};
use gas_db::PgJobStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: gas-submit <bucket> <key> | gas-submit --new-key <prefix> <user_id> <file_name>";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gas_core=info,gas_cloud=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag, prefix, user_id, file_name] if flag == "--new-key" => {
            let (job_id, key) = submit::new_input_key(prefix, user_id, file_name);
            println!("{job_id}\t{key}");
        }
        [bucket, key] => submit_job(bucket, key).await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn submit_job(bucket: &str, key: &str) {
    let database_url = required_env("DATABASE_URL");
    let topic_arn = required_env("JOB_REQUEST_TOPIC_ARN");
    let region = std::env::var("AWS_REGION_NAME").ok();

    let pool = gas_db::create_pool(&database_url).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to connect to database");
        std::process::exit(1);
    });
    if let Err(e) = gas_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }

    let sdk_config = gas_cloud::load_sdk_config(region.as_deref()).await;
    let submitter = JobSubmitter::new(
        Arc::new(PgJobStore::new(pool)),
        Arc::new(SnsNotifier::new(&sdk_config, topic_arn)),
    );

    match submitter.submit(bucket, key).await {
        Ok(request) => println!("{}", request.job_id),
        Err(e) => {
            tracing::error!(bucket, key, error = %e, "Job submission failed");
            std::process::exit(1);
        }
    }
}

fn required_env(name: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
            tracing::error!("{name} environment variable is required");
            std::process::exit(1);
        })
}
