//! VPC service handle: API endpoint plus an IAM bearer token exchanged once
//! per reconcile, grounded on `vpc/service.go`'s `CreateVpcServiceFromEnv`.

use crate::vpc::VpcErrKind;
use hpcr_definitions::Environment;

pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";

const KEY_API_KEY: &str = "IBMCLOUD_API_KEY";
const KEY_IS_ENDPOINT: &str = "IBMCLOUD_IS_API_ENDPOINT";
const KEY_IAM_ENDPOINT: &str = "IBMCLOUD_IAM_API_ENDPOINT";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// A short-lived handle over one IAM-authenticated VPC API session, rebuilt
/// per reconcile the same way [`crate::libvirt::LibvirtClient`] is.
pub struct VpcService {
    pub client: reqwest::Client,
    pub api_endpoint: String,
    token: String,
}

impl VpcService {
    pub fn from_env(env: &Environment, region: &str) -> crate::Result<VpcService> {
        let api_key = env
            .get(KEY_API_KEY)
            .cloned()
            .ok_or_else(|| VpcErrKind::MissingEnv(KEY_API_KEY.into()))?;
        let iam_endpoint = env.get(KEY_IAM_ENDPOINT).cloned().unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string());
        let api_endpoint = env
            .get(KEY_IS_ENDPOINT)
            .cloned()
            .unwrap_or_else(|| format!("https://{}.iaas.cloud.ibm.com", region));

        let client = reqwest::Client::new();
        let token = exchange_iam_token(&client, &iam_endpoint, &api_key)?;

        Ok(VpcService {
            client,
            api_endpoint,
            token,
        })
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Builds a handle against a fixed endpoint/token, bypassing the IAM
    /// exchange, for pointing call sites at a `mockito` server in tests.
    #[cfg(test)]
    pub(crate) fn for_testing(api_endpoint: String, token: String) -> VpcService {
        VpcService {
            client: reqwest::Client::new(),
            api_endpoint,
            token,
        }
    }
}

fn exchange_iam_token(client: &reqwest::Client, iam_endpoint: &str, api_key: &str) -> crate::Result<String> {
    let url = format!("{}/identity/token", iam_endpoint);
    let mut response = client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(reqwest::header::ACCEPT, "application/json")
        .body(format!(
            "grant_type=urn:ibm:params:oauth:grant-type:apikey&apikey={}",
            api_key
        ))
        .send()
        .map_err(|e| VpcErrKind::AuthFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::AuthFailed(format!("IAM returned {}", response.status())).into());
    }

    let parsed: TokenResponse = response.json().map_err(|e| VpcErrKind::AuthFailed(e.to_string()))?;
    Ok(parsed.access_token)
}
