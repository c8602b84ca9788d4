//! Exchanges a Kubernetes service-account token for cloud-provider
//! credentials, the two supported paths being AWS IRSA
//! (`AssumeRoleWithWebIdentity`) and GCP Workload Identity (federated token,
//! optionally impersonated into a specific service account via the IAM
//! Credentials API).

use aws_sdk_sts::config::Region;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use kube::api::{Api, PostParams};
use kube::Client;
use reloader_api::ServiceAccountSelector;

use crate::error::ListenerError;

/// Requests a `TokenRequest` subresource token for `selector`, the same
/// mechanism `kubectl create token` and the projected-volume kubelet path use.
pub async fn service_account_token(
    client: &Client,
    selector: &ServiceAccountSelector,
    default_audience: &str,
) -> Result<String, ListenerError> {
    let api: Api<k8s_openapi::api::core::v1::ServiceAccount> =
        Api::namespaced(client.clone(), &selector.namespace);
    let mut audiences = selector.audiences.clone();
    if audiences.is_empty() {
        audiences.push(default_audience.to_string());
    }
    let request = TokenRequest {
        spec: TokenRequestSpec {
            audiences,
            ..Default::default()
        },
        ..Default::default()
    };
    let body = serde_json::to_vec(&request)
        .map_err(|e| ListenerError::InvalidConfig(format!("failed to encode token request: {e}")))?;
    let response: TokenRequest = api
        .create_subresource("token", &selector.name, &PostParams::default(), body)
        .await?;
    response
        .status
        .map(|s| s.token)
        .ok_or_else(|| ListenerError::InvalidConfig("token request returned no status".into()))
}

/// AWS IRSA: exchange a projected service-account token (audience
/// `sts.amazonaws.com`) for temporary credentials by assuming `role_arn`.
pub async fn assume_role_with_web_identity(
    client: &Client,
    role_arn: &str,
    service_account: &ServiceAccountSelector,
    region: &str,
) -> Result<aws_credential_types::Credentials, ListenerError> {
    let web_identity_token = service_account_token(client, service_account, "sts.amazonaws.com").await?;

    let config = aws_sdk_sts::config::Builder::new()
        .region(Region::new(region.to_string()))
        .behavior_version(aws_sdk_sts::config::BehaviorVersion::latest())
        .build();
    let sts = aws_sdk_sts::Client::from_conf(config);

    let resp = sts
        .assume_role_with_web_identity()
        .role_arn(role_arn)
        .role_session_name("reloader")
        .web_identity_token(web_identity_token)
        .send()
        .await
        .map_err(|e| ListenerError::Transport(e.into()))?;

    let creds = resp
        .credentials
        .ok_or_else(|| ListenerError::InvalidConfig("AssumeRoleWithWebIdentity returned no credentials".into()))?;

    Ok(aws_credential_types::Credentials::new(
        creds.access_key_id,
        creds.secret_access_key,
        Some(creds.session_token),
        std::time::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(creds.expiration.secs().max(0) as u64)),
        "reloader-irsa",
    ))
}

/// GCP Workload Identity: exchange the service-account token for a federated
/// access token, then (if `impersonate_service_account` is set) swap that
/// for a short-lived token on the target service account via the IAM
/// Credentials API's `generateAccessToken`.
pub async fn workload_identity_access_token(
    client: &Client,
    service_account: &ServiceAccountSelector,
    impersonate_service_account: &str,
) -> Result<String, ListenerError> {
    let token = service_account_token(client, service_account, "https://iam.googleapis.com").await?;

    let http = reqwest::Client::new();
    let url = format!(
        "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{impersonate_service_account}:generateAccessToken"
    );
    let response = http
        .post(url)
        .bearer_auth(token)
        .json(&serde_json::json!({ "scope": ["https://www.googleapis.com/auth/cloud-platform"] }))
        .send()
        .await
        .map_err(|e| ListenerError::Transport(e.into()))?;

    if !response.status().is_success() {
        return Err(ListenerError::Transport(anyhow::anyhow!(
            "generateAccessToken failed with status {}",
            response.status()
        )));
    }

    #[derive(serde::Deserialize)]
    struct AccessTokenResponse {
        #[serde(rename = "accessToken")]
        access_token: String,
    }
    let parsed: AccessTokenResponse = response
        .json()
        .await
        .map_err(|e| ListenerError::Transport(e.into()))?;
    Ok(parsed.access_token)
}
