use anyhow::Context;
use aws_config::BehaviorVersion;
use cloud_alloc::adapters::{DynamoSubmissionStore, HttpResourceManagerClient};
use cloud_alloc::app::handlers::GetAndSendHandler;
use cloud_alloc::config::lambda::LambdaConfig;
use cloud_alloc::domain::messages::{HandlerResponse, StepEvent};
use cloud_alloc::utils::logger;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

type Handler = GetAndSendHandler<DynamoSubmissionStore, HttpResourceManagerClient>;

async fn build_handler() -> anyhow::Result<Handler> {
    let config = LambdaConfig::from_env().context("invalid Lambda environment")?;

    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;
    let store = DynamoSubmissionStore::new(
        aws_sdk_dynamodb::Client::new(&shared),
        config.table_name.clone(),
    );

    let client = match config.resource_manager_url() {
        Some(url) => Some(
            HttpResourceManagerClient::new(url).context("failed to build resource manager client")?,
        ),
        None => {
            tracing::warn!("⚠️ RESOURCE_MANAGER_URL not configured");
            None
        }
    };

    Ok(GetAndSendHandler::new(store, client, config.user_ids))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    let handler = build_handler().await?;
    let handler = &handler;

    run(service_fn(move |event: LambdaEvent<StepEvent>| async move {
        let response: HandlerResponse = handler.handle(event.payload).await;
        Ok::<_, Error>(response)
    }))
    .await
}
