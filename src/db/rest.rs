use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{DataError, TodoStore};
use crate::models::{Todo, TodoPatch};

const PREFER: &str = "prefer";
const RETURN_MINIMAL: &str = "return=minimal";
const RETURN_REPRESENTATION: &str = "return=representation";

/// Client for a hosted table exposed over a PostgREST interface
/// (`{base}/rest/v1/{table}`). Authenticates every request with the project
/// key in both the `apikey` and bearer headers.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    endpoint: Url,
    api_key: Arc<str>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Result<Self, DataError> {
        let endpoint = format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table);
        let endpoint = Url::parse(&endpoint).map_err(|e| DataError::InvalidUrl(e.to_string()))?;

        Ok(RestClient {
            http: Client::new(),
            endpoint,
            api_key: Arc::from(api_key),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, method: Method, filters: &[(&str, String)]) -> RequestBuilder {
        let mut url = self.endpoint.clone();
        if !filters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (column, value) in filters {
                query.append_pair(column, value);
            }
        }

        self.http
            .request(method, url)
            .header("apikey", &*self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn rows<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Vec<T>, DataError> {
        Ok(send(builder).await?.json().await?)
    }
}

impl TodoStore for RestClient {
    async fn list_todos(&self) -> Result<Vec<Todo>, DataError> {
        self.rows(self.request(Method::GET, &[("select", "*".to_string())]))
            .await
    }

    async fn find_todo(&self, id: &str) -> Result<Option<Todo>, DataError> {
        let filters = [("select", "*".to_string()), ("id", eq(id))];
        let todos: Vec<Todo> = self.rows(self.request(Method::GET, &filters)).await?;
        Ok(todos.into_iter().next())
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), DataError> {
        let builder = self
            .request(Method::POST, &[])
            .header(PREFER, RETURN_MINIMAL)
            .json(todo);
        send(builder).await?;
        Ok(())
    }

    async fn update_todo(&self, id: &str, patch: &TodoPatch) -> Result<(), DataError> {
        let builder = self
            .request(Method::PATCH, &[("id", eq(id))])
            .header(PREFER, RETURN_MINIMAL)
            .json(patch);
        send(builder).await?;
        Ok(())
    }

    async fn update_todo_if_unchanged(
        &self,
        id: &str,
        last_updated: OffsetDateTime,
        patch: &TodoPatch,
    ) -> Result<bool, DataError> {
        let filters = [
            ("id", eq(id)),
            ("updated_at", eq(&last_updated.format(&Rfc3339)?)),
        ];
        let builder = self
            .request(Method::PATCH, &filters)
            .header(PREFER, RETURN_REPRESENTATION)
            .json(patch);
        let changed: Vec<serde_json::Value> = self.rows(builder).await?;
        Ok(!changed.is_empty())
    }

    async fn delete_todo(&self, id: &str) -> Result<(), DataError> {
        send(self.request(Method::DELETE, &[("id", eq(id))])).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

async fn send(builder: RequestBuilder) -> Result<Response, DataError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(DataError::Status {
        status: status.as_u16(),
        body,
    })
}
