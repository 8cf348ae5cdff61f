use crate::{
    account::{
        Account,
        AccountId,
    },
    error::StoreError,
    store::BalanceStore,
};
use reqwest::StatusCode;
use serde::{
    Deserialize,
    de::DeserializeOwned,
};
use serde_json::{
    Value,
    json,
};

pub const DEFAULT_BACKEND_URL: &str = "https://tapme-backend-bbs3.onrender.com";

const GET_USER: &str = "query GetUser($username: String!) { \
    getUser(username: $username) { id username coins } }";

const CREATE_USER: &str = "mutation CreateUser($username: String!) { \
    createUser(username: $username) { id username coins } }";

const UPDATE_COINS: &str = "mutation UpdateCoins($id: ID!, $coins: Int!) { \
    updateCoins(id: $id, coins: $coins) { id coins } }";

/// Balance store backed by the game's GraphQL endpoint.
#[derive(Clone)]
pub struct GraphQlBalanceStore {
    endpoint: String,
    http: reqwest::Client,
}

impl GraphQlBalanceStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, StoreError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, StoreError> {
        let res = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        // GraphQL servers commonly report resolver errors with a 4xx plus an `errors` body
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            let body = String::from_utf8_lossy(&bytes);
            return Err(StoreError::Rejected(format!(
                "backend responded with {status}: {body}"
            )));
        }
        decode_response(&bytes)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    #[serde(default)]
    username: Option<String>,
    coins: i64,
}

impl UserDto {
    fn into_account(self, requested_name: &str) -> Account {
        let display_name = self
            .username
            .unwrap_or_else(|| requested_name.to_string());
        Account::new(self.id, display_name, self.coins.max(0) as u64)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUserData {
    get_user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserData {
    create_user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCoinsData {
    update_coins: Option<UserDto>,
}

fn decode_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let response: GraphQlResponse<T> = serde_json::from_slice(bytes)?;
    if !response.errors.is_empty() {
        let message = response
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StoreError::Rejected(message));
    }
    response
        .data
        .ok_or_else(|| StoreError::Rejected("response carried no data".to_string()))
}

fn is_duplicate_user(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already exists") || message.contains("duplicate")
}

impl BalanceStore for GraphQlBalanceStore {
    async fn resolve_account(&self, display_name: &str) -> Result<Option<Account>, StoreError> {
        let data: GetUserData = self
            .execute(GET_USER, json!({ "username": display_name }))
            .await?;
        Ok(data.get_user.map(|user| user.into_account(display_name)))
    }

    async fn create_account(&self, display_name: &str) -> Result<Account, StoreError> {
        let result: Result<CreateUserData, StoreError> = self
            .execute(CREATE_USER, json!({ "username": display_name }))
            .await;
        match result {
            Ok(CreateUserData {
                create_user: Some(user),
            }) => Ok(user.into_account(display_name)),
            Ok(CreateUserData { create_user: None }) => Err(StoreError::Rejected(
                "createUser returned no account".to_string(),
            )),
            Err(StoreError::Rejected(message)) if is_duplicate_user(&message) => {
                Err(StoreError::AlreadyExists {
                    display_name: display_name.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn update_balance(
        &self,
        account_id: &AccountId,
        new_balance: u64,
    ) -> Result<u64, StoreError> {
        let coins = i64::try_from(new_balance).map_err(|_| {
            StoreError::Rejected(format!("balance {new_balance} exceeds backend range"))
        })?;
        let data: UpdateCoinsData = self
            .execute(
                UPDATE_COINS,
                json!({ "id": account_id.as_str(), "coins": coins }),
            )
            .await?;
        let user = data
            .update_coins
            .ok_or_else(|| StoreError::InvalidAccount(account_id.clone()))?;
        Ok(user.coins.max(0) as u64)
    }
}
