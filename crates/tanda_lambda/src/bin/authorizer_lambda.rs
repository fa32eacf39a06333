use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tanda_lambda::config::AuthorizerConfig;
use tanda_lambda::handlers::authorizer::{handle_authorizer_event, AuthorizerResponse};

async fn handle_request(
    event: LambdaEvent<Value>,
    config: &AuthorizerConfig,
) -> Result<AuthorizerResponse, Error> {
    Ok(handle_authorizer_event(
        &event.payload,
        &config.jwt_secret,
        Utc::now(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tanda_lambda::logging::init();
    let config = AuthorizerConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let config = &config;
    lambda_runtime::run(service_fn(move |event| handle_request(event, config))).await
}
