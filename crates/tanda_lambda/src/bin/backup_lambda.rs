use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tanda_lambda::adapters::dynamodb::DynamoDbStore;
use tanda_lambda::adapters::messaging::TopicPublisher;
use tanda_lambda::adapters::s3::S3ObjectStore;
use tanda_lambda::adapters::sns::SnsTopicPublisher;
use tanda_lambda::config::BackupConfig;
use tanda_lambda::handlers::backup::{handle_backup_event, BackupResponse, BackupRun, BackupTargets};

struct RuntimeDependencies {
    config: BackupConfig,
    store: DynamoDbStore,
    objects: S3ObjectStore,
    publisher: Option<SnsTopicPublisher>,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<BackupResponse, Error> {
    let run = BackupRun {
        now: Utc::now(),
        request_id: event.context.request_id.clone(),
    };
    let targets = BackupTargets {
        store: &deps.store,
        objects: &deps.objects,
        publisher: deps
            .publisher
            .as_ref()
            .map(|publisher| publisher as &dyn TopicPublisher),
    };
    Ok(handle_backup_event(&event.payload, &deps.config, &run, &targets))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tanda_lambda::logging::init();
    let config = BackupConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let publisher = config
        .topic_arn
        .clone()
        .map(|arn| SnsTopicPublisher::new(arn, aws_sdk_sns::Client::new(&aws_config)));
    let deps = RuntimeDependencies {
        store: DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&aws_config)),
        objects: S3ObjectStore::new(config.bucket.clone(), aws_sdk_s3::Client::new(&aws_config)),
        publisher,
        config,
    };
    let deps = &deps;
    lambda_runtime::run(service_fn(move |event| handle_request(event, deps))).await
}
