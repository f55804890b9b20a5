use crate::domain::messages::StepEvent;
use crate::domain::model::{SubmissionMessage, SubmissionRecord, SubmissionStatus};
use crate::domain::ports::{StepTrigger, SubmissionSink, SubmissionStore};
use crate::utils::error::{AllocError, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_sqs::Client as SqsClient;
use std::collections::HashMap;

fn aws_error(context: &str, detail: impl std::fmt::Display) -> AllocError {
    AllocError::AwsError {
        message: format!("{}: {}", context, detail),
    }
}

/// Submissions table with partition key `user_id` and sort key `timestamp`.
#[derive(Debug, Clone)]
pub struct DynamoSubmissionStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoSubmissionStore {
    pub fn new(client: DynamoClient, table_name: String) -> Self {
        Self { client, table_name }
    }
}

pub fn record_to_item(record: &SubmissionRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("user_id".to_string(), AttributeValue::S(record.user_id.clone())),
        (
            "timestamp".to_string(),
            AttributeValue::S(record.timestamp.clone()),
        ),
        (
            "allocation_vector".to_string(),
            AttributeValue::L(
                record
                    .allocation_vector
                    .iter()
                    .map(|a| AttributeValue::N(a.to_string()))
                    .collect(),
            ),
        ),
        (
            "expected_utility".to_string(),
            AttributeValue::N(record.expected_utility.to_string()),
        ),
        ("step".to_string(), AttributeValue::N(record.step.to_string())),
        (
            "status".to_string(),
            AttributeValue::S(record.status.as_str().to_string()),
        ),
    ])
}

fn string_attr(item: &HashMap<String, AttributeValue>, name: &str) -> Result<String> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| aws_error("Malformed submission item", format!("missing '{}'", name)))
}

fn number_attr<T: std::str::FromStr>(item: &HashMap<String, AttributeValue>, name: &str) -> Result<T> {
    item.get(name)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| aws_error("Malformed submission item", format!("bad number '{}'", name)))
}

/// Integral and within `u8`; DynamoDB may hand back `1.0` for `1`.
fn parse_allocation_entry(n: &str) -> Option<u8> {
    if let Ok(value) = n.parse::<i64>() {
        return u8::try_from(value).ok();
    }
    let value = n.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    u8::try_from(value as i64).ok()
}

pub fn item_to_record(item: &HashMap<String, AttributeValue>) -> Result<SubmissionRecord> {
    let allocation_vector = item
        .get("allocation_vector")
        .and_then(|v| v.as_l().ok())
        .ok_or_else(|| aws_error("Malformed submission item", "missing 'allocation_vector'"))?
        .iter()
        .map(|v| {
            v.as_n()
                .ok()
                .and_then(|n| parse_allocation_entry(n))
                .ok_or_else(|| aws_error("Malformed submission item", "allocation entry"))
        })
        .collect::<Result<Vec<u8>>>()?;

    let status = match string_attr(item, "status")?.as_str() {
        "processed" => SubmissionStatus::Processed,
        _ => SubmissionStatus::Pending,
    };

    Ok(SubmissionRecord {
        user_id: string_attr(item, "user_id")?,
        timestamp: string_attr(item, "timestamp")?,
        allocation_vector,
        expected_utility: number_attr(item, "expected_utility")?,
        step: number_attr(item, "step")?,
        status,
    })
}

#[async_trait]
impl SubmissionStore for DynamoSubmissionStore {
    async fn put(&self, record: SubmissionRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record_to_item(&record)))
            .send()
            .await
            .map_err(|e| {
                aws_error(
                    "Failed to store submission",
                    aws_sdk_dynamodb::error::DisplayErrorContext(&e),
                )
            })?;
        tracing::info!(
            "Stored submission from {} at {}",
            record.user_id,
            record.timestamp
        );
        Ok(())
    }

    async fn latest_pending(&self, user_id: &str, step: u32) -> Result<Option<SubmissionRecord>> {
        // 不用 Limit：Limit 在 filter 之前套用，會漏掉較舊的 pending
        let mut start_key = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("user_id = :uid")
                .filter_expression("#step = :step AND #status = :pending")
                .expression_attribute_names("#step", "step")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":uid", AttributeValue::S(user_id.to_string()))
                .expression_attribute_values(":step", AttributeValue::N(step.to_string()))
                .expression_attribute_values(
                    ":pending",
                    AttributeValue::S(SubmissionStatus::Pending.as_str().to_string()),
                )
                .scan_index_forward(false)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| {
                    aws_error(
                        "Failed to query submissions",
                        aws_sdk_dynamodb::error::DisplayErrorContext(&e),
                    )
                })?;

            if let Some(item) = output.items().first() {
                return item_to_record(item).map(Some);
            }
            match output.last_evaluated_key() {
                Some(key) => start_key = Some(key.clone()),
                None => return Ok(None),
            }
        }
    }

    async fn set_status(
        &self,
        user_id: &str,
        timestamp: &str,
        status: SubmissionStatus,
    ) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("user_id", AttributeValue::S(user_id.to_string()))
            .key("timestamp", AttributeValue::S(timestamp.to_string()))
            .update_expression("SET #status = :status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", AttributeValue::S(status.as_str().to_string()))
            .send()
            .await
            .map_err(|e| {
                aws_error(
                    "Failed to update submission status",
                    aws_sdk_dynamodb::error::DisplayErrorContext(&e),
                )
            })?;
        tracing::debug!("Marked {} @ {} as {}", user_id, timestamp, status.as_str());
        Ok(())
    }
}

/// Invokes the get-and-send function asynchronously.
#[derive(Debug, Clone)]
pub struct LambdaStepTrigger {
    client: LambdaClient,
    function_name: String,
}

impl LambdaStepTrigger {
    pub fn new(client: LambdaClient, function_name: String) -> Self {
        Self {
            client,
            function_name,
        }
    }
}

#[async_trait]
impl StepTrigger for LambdaStepTrigger {
    async fn trigger(&self, step: u32) -> Result<()> {
        let payload = serde_json::to_vec(&StepEvent::from_submission_handler(step))?;
        self.client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| {
                aws_error(
                    "Failed to invoke get-and-send",
                    aws_sdk_lambda::error::DisplayErrorContext(&e),
                )
            })?;
        tracing::info!("🚀 Triggered {} for step {}", self.function_name, step);
        Ok(())
    }
}

/// Publishes user submissions to the SQS queue.
#[derive(Debug, Clone)]
pub struct SqsSubmissionSink {
    client: SqsClient,
    queue_url: String,
}

impl SqsSubmissionSink {
    pub fn new(client: SqsClient, queue_url: String) -> Self {
        Self { client, queue_url }
    }
}

#[async_trait]
impl SubmissionSink for SqsSubmissionSink {
    async fn submit(&self, message: &SubmissionMessage) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| {
                aws_error(
                    "Failed to send submission to SQS",
                    aws_sdk_sqs::error::DisplayErrorContext(&e),
                )
            })?;
        tracing::info!(
            "📨 Sent submission of {} to SQS: {}",
            message.user_id,
            output.message_id().unwrap_or("-")
        );
        Ok(())
    }
}
