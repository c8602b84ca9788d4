//! Long-polls an AWS SQS queue for CloudTrail-style secret-rotation
//! envelopes. Authentication is either a static key pair pulled from two
//! secret refs, or IRSA (a projected service-account token exchanged for
//! temporary credentials via STS `AssumeRoleWithWebIdentity`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::config::Region;
use reloader_api::{AwsAuth, AwsSqsSource, NotificationSource, RotationEvent};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::ListenerError;
use crate::listener::{
    await_shutdown, new_task_handle, Listener, ListenerContext, ListenerFactory, ListenerState, ListenerStateCell,
    TaskHandle,
};
use crate::util::{secret_ref, token_exchange};

const TRANSPORT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct AwsSqsListener {
    config: AwsSqsSource,
    context: ListenerContext,
    state: ListenerStateCell,
    cancel: CancellationToken,
    handle: TaskHandle,
}

impl AwsSqsListener {
    pub fn new(context: ListenerContext, config: AwsSqsSource) -> Self {
        Self {
            config,
            context,
            state: ListenerStateCell::new(),
            cancel: CancellationToken::new(),
            handle: new_task_handle(),
        }
    }

    async fn build_client(&self) -> Result<aws_sdk_sqs::Client, ListenerError> {
        let mut builder = aws_sdk_sqs::config::Builder::new()
            .region(Region::new(self.config.region.clone()))
            .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest());

        match &self.config.auth {
            Some(AwsAuth::StaticKeyPair {
                access_key_id_secret_ref,
                secret_access_key_secret_ref,
            }) => {
                let access_key_id = secret_ref::resolve_string(&self.context.client, access_key_id_secret_ref).await?;
                let secret_access_key =
                    secret_ref::resolve_string(&self.context.client, secret_access_key_secret_ref).await?;
                let creds = aws_credential_types::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    None,
                    None,
                    "reloader-static",
                );
                builder = builder.credentials_provider(creds);
            }
            Some(AwsAuth::Irsa { role_arn, service_account }) => {
                let creds = token_exchange::assume_role_with_web_identity(
                    &self.context.client,
                    role_arn,
                    service_account,
                    &self.config.region,
                )
                .await?;
                builder = builder.credentials_provider(creds);
            }
            None => {}
        }
        Ok(aws_sdk_sqs::Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl Listener for AwsSqsListener {
    async fn start(&self) -> Result<(), ListenerError> {
        if !self.state.try_start() {
            return Ok(());
        }
        let client = self.build_client().await?;
        let queue_url = self.config.queue_url.clone();
        let max_messages = self.config.max_messages;
        let wait_time_seconds = self.config.wait_time_seconds;
        let visibility_timeout = self.config.visibility_timeout;
        let sender = self.context.sender.clone();
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                let received = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = client
                        .receive_message()
                        .queue_url(&queue_url)
                        .max_number_of_messages(max_messages)
                        .wait_time_seconds(wait_time_seconds)
                        .visibility_timeout(visibility_timeout)
                        .send() => result,
                };
                let response = match received {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::warn!(%err, "sqs receive_message failed, backing off");
                        sleep(TRANSPORT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                for message in response.messages() {
                    let Some(body) = message.body() else { continue };
                    let Some(event) = parse_cloudtrail_envelope(body) else {
                        tracing::warn!("sqs message body did not match the expected cloudtrail envelope");
                        continue;
                    };
                    let _ = sender.send(event).await;
                    if let Some(receipt_handle) = message.receipt_handle() {
                        if let Err(err) = client
                            .delete_message()
                            .queue_url(&queue_url)
                            .receipt_handle(receipt_handle)
                            .send()
                            .await
                        {
                            tracing::warn!(%err, "failed to delete sqs message after processing");
                        }
                    }
                }
            }
        });
        *self.handle.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ListenerError> {
        self.cancel.cancel();
        let task = self.handle.lock().take();
        await_shutdown(task).await;
        self.state.set(ListenerState::Stopped);
        Ok(())
    }

    fn state(&self) -> ListenerState {
        self.state.get()
    }
}

/// Parses `{"detail":{"eventTime":…, "requestParameters":{"secretId":…}}}`.
fn parse_cloudtrail_envelope(body: &str) -> Option<RotationEvent> {
    if !gjson::valid(body) {
        return None;
    }
    let secret_id = gjson::get(body, "detail.requestParameters.secretId");
    let event_time = gjson::get(body, "detail.eventTime");
    if !secret_id.exists() || !event_time.exists() {
        return None;
    }
    Some(RotationEvent::new(secret_id.str(), event_time.str(), "aws-sqs"))
}

pub fn factory() -> ListenerFactory {
    Arc::new(|context, source| match source {
        NotificationSource::AwsSqs(config) => {
            Ok(Arc::new(AwsSqsListener::new(context, config)) as Arc<dyn Listener>)
        }
        _ => Err(ListenerError::InvalidConfig("aws_sqs factory given a non-AwsSqs source".into())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cloudtrail_envelope() {
        let body = r#"{"detail":{"eventTime":"2026-08-01T00:00:00Z","requestParameters":{"secretId":"db-password"}}}"#;
        let event = parse_cloudtrail_envelope(body).unwrap();
        assert_eq!(event.secret_identifier, "db-password");
        assert_eq!(event.rotation_timestamp, "2026-08-01T00:00:00Z");
        assert_eq!(event.trigger_source, "aws-sqs");
    }

    #[test]
    fn rejects_envelope_missing_secret_id() {
        let body = r#"{"detail":{"eventTime":"2026-08-01T00:00:00Z"}}"#;
        assert!(parse_cloudtrail_envelope(body).is_none());
    }
}
