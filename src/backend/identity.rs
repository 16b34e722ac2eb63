use super::{AuthSession, BackendError, Identity, IdentityProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Firebase Authentication client speaking the Identity Toolkit REST API.
pub struct IdentityToolkitClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl IdentityToolkitClient {
    /// Create a client for the given endpoint and web API key.
    pub fn new(base_url: String, api_key: String) -> Self {
        let http = Client::builder()
            .user_agent("rusty-scribe/identity")
            .build()
            .expect("Failed to construct reqwest::Client for identity");
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1/accounts:{action}",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, body: Value) -> Result<T, BackendError> {
        let response = self
            .http
            .post(self.endpoint(action))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                BackendError::Unavailable(format!(
                    "failed to reach identity provider at {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = error_code(&body);
            return Err(if status.is_client_error() {
                map_client_error(&code)
            } else {
                BackendError::RequestFailed(format!("identity provider returned {status}: {code}"))
            });
        }

        response.json().await.map_err(|error| {
            BackendError::InvalidResponse(format!("failed to decode {action} response: {error}"))
        })
    }

    async fn password_flow(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let body: TokenResponse = self
            .call(
                action,
                json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(AuthSession {
            identity: Identity {
                uid: body.local_id,
                email: body.email.or_else(|| Some(email.to_string())),
            },
            id_token: body.id_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in.trim().parse().unwrap_or(3600),
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn verify(&self, id_token: &str) -> Result<Identity, BackendError> {
        let body: LookupResponse = self.call("lookup", json!({ "idToken": id_token })).await?;
        let user = body
            .users
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Unauthorized("token does not match a user".into()))?;
        Ok(Identity {
            uid: user.local_id,
            email: user.email,
        })
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.password_flow("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.password_flow("signInWithPassword", email, password)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Extract `error.message` from an Identity Toolkit error body.
fn error_code(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn map_client_error(code: &str) -> BackendError {
    // Codes may carry detail after a colon, e.g. "WEAK_PASSWORD : Password should be ...".
    let head = code.split(':').next().unwrap_or_default().trim();
    match head {
        "EMAIL_EXISTS" => BackendError::EmailInUse,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            BackendError::InvalidCredentials
        }
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            BackendError::Unauthorized(head.to_string())
        }
        _ => BackendError::Rejected(code.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client(server: &MockServer) -> IdentityToolkitClient {
        IdentityToolkitClient::new(server.base_url(), "web-key".into())
    }

    #[tokio::test]
    async fn verify_resolves_lookup_user() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/accounts:lookup")
                    .query_param("key", "web-key")
                    .json_body(json!({ "idToken": "token-1" }));
                then.status(200).json_body(json!({
                    "users": [{ "localId": "uid-1", "email": "a@example.com" }]
                }));
            })
            .await;

        let identity = client(&server).verify("token-1").await.expect("identity");
        mock.assert_async().await;
        assert_eq!(identity.uid, "uid-1");
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn verify_maps_invalid_token_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/accounts:lookup");
                then.status(400)
                    .json_body(json!({ "error": { "code": 400, "message": "INVALID_ID_TOKEN" } }));
            })
            .await;

        let error = client(&server).verify("stale").await.expect_err("rejected");
        assert!(matches!(error, BackendError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn sign_up_returns_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/accounts:signUp")
                    .body_contains("\"returnSecureToken\":true");
                then.status(200).json_body(json!({
                    "idToken": "id-1",
                    "refreshToken": "refresh-1",
                    "expiresIn": "3600",
                    "localId": "uid-9",
                    "email": "new@example.com"
                }));
            })
            .await;

        let session = client(&server)
            .sign_up("new@example.com", "hunter22")
            .await
            .expect("session");
        assert_eq!(session.identity.uid, "uid-9");
        assert_eq!(session.id_token, "id-1");
        assert_eq!(session.expires_in, 3600);
    }

    #[tokio::test]
    async fn sign_in_errors_are_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/accounts:signInWithPassword");
                then.status(400).json_body(
                    json!({ "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" } }),
                );
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/accounts:signUp");
                then.status(400).json_body(json!({
                    "error": { "code": 400, "message": "WEAK_PASSWORD : Password should be at least 6 characters" }
                }));
            })
            .await;

        let client = client(&server);
        assert!(matches!(
            client.sign_in("a@example.com", "nope").await,
            Err(BackendError::InvalidCredentials)
        ));
        assert!(matches!(
            client.sign_up("a@example.com", "123").await,
            Err(BackendError::Rejected(message)) if message.starts_with("WEAK_PASSWORD")
        ));
    }

    #[test]
    fn email_exists_maps_to_email_in_use() {
        assert!(matches!(
            map_client_error("EMAIL_EXISTS"),
            BackendError::EmailInUse
        ));
    }
}
