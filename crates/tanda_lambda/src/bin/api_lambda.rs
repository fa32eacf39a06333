use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tanda_lambda::adapters::dynamodb::DynamoDbStore;
use tanda_lambda::adapters::ses::SesMailer;
use tanda_lambda::adapters::sns::SnsSms;
use tanda_lambda::auth::password::Sha256PasswordHasher;
use tanda_lambda::config::ApiConfig;
use tanda_lambda::context::ApiContext;
use tanda_lambda::handlers::router::handle_api_event;
use tanda_lambda::http::ApiGatewayResponse;

struct RuntimeDependencies {
    config: ApiConfig,
    store: DynamoDbStore,
    sms: SnsSms,
    mailer: SesMailer,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    deps: &RuntimeDependencies,
) -> Result<ApiGatewayResponse, Error> {
    let ctx = ApiContext {
        config: &deps.config,
        store: &deps.store,
        sms: &deps.sms,
        mailer: &deps.mailer,
        passwords: &Sha256PasswordHasher,
        now: Utc::now(),
    };
    Ok(handle_api_event(&event.payload, &ctx))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tanda_lambda::logging::init();
    let config = ApiConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = RuntimeDependencies {
        config,
        store: DynamoDbStore::new(aws_sdk_dynamodb::Client::new(&aws_config)),
        sms: SnsSms::new(aws_sdk_sns::Client::new(&aws_config)),
        mailer: SesMailer::new(aws_sdk_sesv2::Client::new(&aws_config)),
    };
    let deps = &deps;
    lambda_runtime::run(service_fn(move |event| handle_request(event, deps))).await
}
