//! HTTP vault backend speaking a Connect-style REST API.
//!
//! Endpoints used:
//! - `GET /v1/vaults?filter=title eq "<name>"`
//! - `GET /v1/vaults/{vault}/items?filter=title eq "<title>"`
//! - `GET /v1/vaults/{vault}/items/{item}`
//! - `PUT /v1/vaults/{vault}/items/{item}` (the batched write)

use super::cache::LookupCache;
use super::client::VaultClient;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use vaultsync_types::{is_valid_name, Reference, SyncTarget, VariableSet};

/// Connection settings for a Connect-style vault server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Server base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Bearer token.
    pub token: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectionRef {
    id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Section {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Field {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<SectionRef>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// A full item. Unknown attributes are carried through untouched so the
/// batched write does not drop anything the server returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Item {
    id: String,
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    fields: Vec<Field>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    fn section_id(&self, label: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.label.as_deref() == Some(label))
            .map(|s| s.id.as_str())
    }

    fn field_in_section(field: &Field, section_id: Option<&str>) -> bool {
        field.section.as_ref().map(|s| s.id.as_str()) == section_id
    }

    fn variables(&self, subsection: Option<&str>) -> VariableSet {
        let section_id = match subsection {
            Some(label) => match self.section_id(label) {
                Some(id) => Some(id),
                None => return VariableSet::new(),
            },
            None => None,
        };

        let mut set = VariableSet::new();
        for field in &self.fields {
            if !Self::field_in_section(field, section_id) {
                continue;
            }
            let Some(label) = field.label.as_deref().filter(|l| !l.is_empty()) else {
                continue;
            };
            if let Err(e) = set.insert(label, field.value.clone().unwrap_or_default()) {
                debug!("Skipping field {:?}: {}", label, e);
            }
        }
        set
    }

    fn replace_variables(&mut self, subsection: Option<&str>, variables: &VariableSet) {
        let section_id = match subsection {
            Some(label) => Some(match self.section_id(label) {
                Some(id) => id.to_string(),
                None => {
                    let id = format!("section_{}", label.to_ascii_lowercase());
                    self.sections.push(Section {
                        id: id.clone(),
                        label: Some(label.to_string()),
                        extra: serde_json::Map::new(),
                    });
                    id
                }
            }),
            None => None,
        };

        // Only fields that read back as variables are owned by the sync.
        // Everything else in the section, and every attribute of an updated
        // field other than its value, is left as the server returned it.
        let mut written = std::collections::HashSet::new();
        let mut kept = Vec::with_capacity(self.fields.len());
        for mut field in self.fields.drain(..) {
            let owned = Self::field_in_section(&field, section_id.as_deref())
                && field.label.as_deref().is_some_and(is_valid_name);
            if !owned {
                kept.push(field);
                continue;
            }
            let label = field.label.clone().unwrap_or_default();
            match variables.get(&label) {
                Some(value) if written.insert(label.clone()) => {
                    field.value = Some(value.to_string());
                    kept.push(field);
                }
                Some(_) => debug!("Dropping duplicate field {:?}", label),
                None => debug!("Removing field {:?}", label),
            }
        }

        for (key, value) in variables.iter() {
            if written.contains(key) {
                continue;
            }
            let id = match &section_id {
                Some(section) => format!("{section}.{key}"),
                None => key.to_string(),
            };
            let mut extra = serde_json::Map::new();
            extra.insert("type".to_string(), serde_json::Value::from("CONCEALED"));
            kept.push(Field {
                id,
                label: Some(key.to_string()),
                value: Some(value.to_string()),
                section: section_id.clone().map(|id| SectionRef { id }),
                extra,
            });
        }
        self.fields = kept;
    }

    fn reference_value(&self, reference: &Reference) -> Option<String> {
        let matches_label = |f: &&Field| f.label.as_deref() == Some(reference.field.as_str());
        let field = match &reference.subsection {
            Some(label) => {
                let section_id = self.section_id(label)?;
                self.fields
                    .iter()
                    .filter(|f| Self::field_in_section(f, Some(section_id)))
                    .find(matches_label)
            }
            None => self
                .fields
                .iter()
                .filter(|f| f.section.is_none())
                .find(matches_label)
                .or_else(|| self.fields.iter().find(matches_label)),
        };
        field.map(|f| f.value.clone().unwrap_or_default())
    }
}

/// Maps an unsuccessful HTTP status to a classified error.
fn status_error(status: StatusCode, context: &str, body: &str) -> SyncError {
    let detail = if body.is_empty() {
        format!("{context}: HTTP {}", status.as_u16())
    } else {
        format!("{context}: HTTP {}: {body}", status.as_u16())
    };
    match status.as_u16() {
        400 | 422 => SyncError::InvalidInput(detail),
        401 => SyncError::Auth(detail),
        403 => SyncError::PermissionDenied(detail),
        404 => SyncError::NotFound(detail),
        408 => SyncError::Timeout(detail),
        429 => SyncError::RateLimited(detail),
        502 | 503 | 504 => SyncError::Unavailable(detail),
        _ => SyncError::Remote(detail),
    }
}

fn transport_error(context: &str, e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout(format!("{context}: {e}"))
    } else if e.is_connect() || e.is_request() {
        SyncError::Network(format!("{context}: {e}"))
    } else if e.is_decode() {
        SyncError::InvalidInput(format!("{context}: unexpected response: {e}"))
    } else {
        SyncError::Remote(format!("{context}: {e}"))
    }
}

/// [`VaultClient`] backed by a Connect-style HTTP server.
pub struct ConnectVault {
    config: ConnectConfig,
    client: Client,
    cache: LookupCache,
}

impl ConnectVault {
    /// Creates a client. Fails only if the HTTP client cannot be built.
    pub fn new(config: ConnectConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            cache: LookupCache::new(),
        })
    }

    /// The per-run lookup cache.
    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> SyncResult<T> {
        let response = request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| transport_error(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, context, &body));
        }

        response
            .json()
            .await
            .map_err(|e| transport_error(context, e))
    }

    async fn vault_id(&self, name: &str) -> SyncResult<String> {
        if let Some(id) = self.cache.vault_id(name).await {
            return Ok(id);
        }

        let filter = format!("title eq \"{name}\"");
        let vaults: Vec<IdOnly> = self
            .send_json(
                self.client
                    .get(self.url("/v1/vaults"))
                    .query(&[("filter", filter.as_str())]),
                "vault lookup",
            )
            .await?;
        let id = vaults
            .into_iter()
            .next()
            .map(|v| v.id)
            .ok_or_else(|| SyncError::NotFound(format!("vault {name:?}")))?;

        self.cache.put_vault_id(name, &id).await;
        Ok(id)
    }

    async fn record_id(&self, vault_id: &str, title: &str) -> SyncResult<String> {
        if let Some(id) = self.cache.record_id(vault_id, title).await {
            return Ok(id);
        }

        let filter = format!("title eq \"{title}\"");
        let items: Vec<IdOnly> = self
            .send_json(
                self.client
                    .get(self.url(&format!(
                        "/v1/vaults/{}/items",
                        urlencoding::encode(vault_id)
                    )))
                    .query(&[("filter", filter.as_str())]),
                "record lookup",
            )
            .await?;
        let id = items
            .into_iter()
            .next()
            .map(|i| i.id)
            .ok_or_else(|| SyncError::NotFound(format!("record {title:?}")))?;

        self.cache.put_record_id(vault_id, title, &id).await;
        Ok(id)
    }

    fn item_url(&self, vault_id: &str, item_id: &str) -> String {
        self.url(&format!(
            "/v1/vaults/{}/items/{}",
            urlencoding::encode(vault_id),
            urlencoding::encode(item_id)
        ))
    }

    async fn fetch_item(&self, vault: &str, record: &str) -> SyncResult<(String, Item)> {
        let vault_id = self.vault_id(vault).await?;
        let item_id = self.record_id(&vault_id, record).await?;
        let item = self
            .send_json(self.client.get(self.item_url(&vault_id, &item_id)), "record read")
            .await?;
        Ok((vault_id, item))
    }
}

#[async_trait]
impl VaultClient for ConnectVault {
    fn provider_name(&self) -> &'static str {
        "connect"
    }

    async fn read_variables(&self, target: &SyncTarget) -> SyncResult<VariableSet> {
        let (_, item) = self.fetch_item(&target.vault, &target.record).await?;
        let variables = item.variables(target.subsection.as_deref());
        debug!("Read {} variables from {}", variables.len(), target);
        Ok(variables)
    }

    async fn write_variables(
        &self,
        target: &SyncTarget,
        variables: &VariableSet,
    ) -> SyncResult<()> {
        let (vault_id, mut item) = self.fetch_item(&target.vault, &target.record).await?;
        item.replace_variables(target.subsection.as_deref(), variables);

        let url = self.item_url(&vault_id, &item.id);
        let _: serde_json::Value = self
            .send_json(self.client.put(url).json(&item), "record write")
            .await?;
        info!("Wrote {} variables to {}", variables.len(), target);
        Ok(())
    }

    async fn read_reference(&self, reference: &Reference) -> SyncResult<String> {
        let (_, item) = self.fetch_item(&reference.vault, &reference.record).await?;
        item.reference_value(reference)
            .ok_or_else(|| SyncError::NotFound(reference.to_string()))
    }

    async fn end_run(&self) {
        self.cache.clear().await;
    }
}
