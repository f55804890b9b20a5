use anyhow::Context;
use aws_config::BehaviorVersion;
use cloud_alloc::adapters::{DynamoSubmissionStore, LambdaStepTrigger};
use cloud_alloc::app::handlers::SubmissionHandler;
use cloud_alloc::config::lambda::LambdaConfig;
use cloud_alloc::domain::messages::{HandlerResponse, SqsEvent};
use cloud_alloc::utils::logger;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};

type Handler = SubmissionHandler<DynamoSubmissionStore, LambdaStepTrigger>;

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
    let trigger = LambdaStepTrigger::new(
        aws_sdk_lambda::Client::new(&shared),
        config.get_and_send_function.clone(),
    );

    Ok(SubmissionHandler::new(store, trigger, config.user_ids))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    let handler = build_handler().await?;
    let handler = &handler;

    run(service_fn(move |event: LambdaEvent<SqsEvent>| async move {
        let response: HandlerResponse = handler.handle(event.payload).await;
        Ok::<_, Error>(response)
    }))
    .await
}
