//! Blocking Grafana HTTP client.
//!
//! Endpoints used:
//!
//! | operation          | request                                   |
//! |--------------------|-------------------------------------------|
//! | `search_by_tag`    | `GET /api/search?type=dash-db&tag=<tag>`  |
//! | `get_by_uid`       | `GET /api/dashboards/uid/<uid>`           |
//! | `create_or_update` | `POST /api/dashboards/db`                 |
//! | `get_folder`       | `GET /api/folders`                        |
//! | `create_folder`    | `POST /api/folders`                       |
//!
//! Any non-2xx status becomes [`StoreError::Remote`], except a 404 on
//! `get_by_uid`, which means the dashboard does not exist.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use dashsync_core::types::fields;
use dashsync_core::{
    DashboardDocument, DashboardHit, FolderRef, LiveAuth, LiveStore, StoreError, SyncJob,
    WriteStatus, GENERAL_FOLDER,
};

use crate::error::ClientError;

const SERVICE: &str = "grafana";
const TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    folder_id: i64,
    #[serde(default)]
    folder_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardEnvelope {
    dashboard: Value,
    #[serde(default)]
    meta: DashboardMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardMeta {
    #[serde(default)]
    folder_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveDashboard<'a> {
    dashboard: Value,
    folder_id: i64,
    message: &'a str,
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct Folder {
    id: i64,
    title: String,
}

#[derive(Debug, Serialize)]
struct NewFolder<'a> {
    title: &'a str,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GrafanaClient {
    agent: ureq::Agent,
    base_url: Url,
    authorization: String,
}

impl fmt::Debug for GrafanaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrafanaClient")
            .field("base_url", &self.base_url())
            .finish_non_exhaustive()
    }
}

impl GrafanaClient {
    pub fn new(base_url: &str, auth: &LiveAuth) -> Result<Self, ClientError> {
        let invalid = || ClientError::InvalidUrl {
            url: base_url.to_owned(),
        };
        let parsed = Url::parse(base_url).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(invalid());
        }
        let authorization = match auth {
            LiveAuth::Token(token) => format!("Bearer {}", token.expose()),
            LiveAuth::Basic { user, password } => {
                let pair = format!("{user}:{}", password.expose());
                format!("Basic {}", STANDARD.encode(pair))
            }
        };
        let agent = ureq::AgentBuilder::new().timeout(TIMEOUT).build();
        tracing::debug!(url = %base_url, "grafana client created");
        Ok(Self {
            agent,
            base_url: parsed,
            authorization,
        })
    }

    /// Client for the instance and credentials of `job`.
    pub fn from_job(job: &SyncJob) -> Result<Self, ClientError> {
        let auth = job.live_auth().ok_or_else(|| ClientError::MissingCredentials {
            job: job.job_name.clone(),
        })?;
        Self::new(&job.grafana_url, &auth)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `segments` appended to the base URL, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::remote(SERVICE, "base URL cannot take path segments"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, segments: &[&str]) -> Result<ureq::Request, StoreError> {
        let url = self.endpoint(segments)?;
        Ok(self
            .agent
            .get(url.as_str())
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json"))
    }

    fn post(&self, segments: &[&str]) -> Result<ureq::Request, StoreError> {
        let url = self.endpoint(segments)?;
        Ok(self
            .agent
            .post(url.as_str())
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json"))
    }

    fn list_folders(&self) -> Result<Vec<Folder>, StoreError> {
        let response = self
            .get(&["api", "folders"])?
            .call()
            .map_err(|e| remote_error("list folders", e))?;
        decode(response, "list folders")
    }
}

impl LiveStore for GrafanaClient {
    fn search_by_tag(&mut self, tag: &str) -> Result<Vec<DashboardHit>, StoreError> {
        let what = "search dashboards";
        let response = self
            .get(&["api", "search"])?
            .query("type", "dash-db")
            .query("tag", tag)
            .call()
            .map_err(|e| remote_error(what, e))?;
        let hits: Vec<SearchHit> = decode(response, what)?;
        tracing::debug!(tag = %tag, amount = hits.len(), "grafana search finished");
        Ok(hits
            .into_iter()
            .map(|hit| DashboardHit {
                uid: hit.uid,
                title: hit.title,
                folder_id: hit.folder_id,
                folder_title: hit
                    .folder_title
                    .unwrap_or_else(|| GENERAL_FOLDER.to_owned()),
            })
            .collect())
    }

    fn get_by_uid(&mut self, uid: &str) -> Result<Option<DashboardDocument>, StoreError> {
        let what = "get dashboard";
        let response = match self.get(&["api", "dashboards", "uid", uid])?.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                tracing::debug!(uid = %uid, "dashboard not found in grafana");
                return Ok(None);
            }
            Err(err) => return Err(remote_error(what, err)),
        };
        let envelope: DashboardEnvelope = decode(response, what)?;
        let folder = envelope
            .meta
            .folder_title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| GENERAL_FOLDER.to_owned());
        DashboardDocument::from_model(folder, envelope.dashboard)
            .map(Some)
            .map_err(|e| StoreError::remote(SERVICE, format!("{what} '{uid}': {e}")))
    }

    fn create_or_update(
        &mut self,
        document: &DashboardDocument,
        folder_id: i64,
        message: &str,
    ) -> Result<WriteStatus, StoreError> {
        let what = "save dashboard";
        // Numeric ids are per instance; the uid identifies the dashboard.
        let mut dashboard = document.to_value();
        if let Some(model) = dashboard.as_object_mut() {
            model.insert(fields::ID.to_owned(), Value::Null);
        }
        let body = SaveDashboard {
            dashboard,
            folder_id,
            message,
            overwrite: true,
        };
        let response = self
            .post(&["api", "dashboards", "db"])?
            .send_json(&body)
            .map_err(|e| remote_error(what, e))?;
        let saved: SaveResponse = decode(response, what)?;
        tracing::debug!(uid = %saved.uid, version = saved.version, "dashboard saved in grafana");
        Ok(WriteStatus {
            uid: saved.uid,
            version: saved.version,
            status: saved.status,
        })
    }

    fn get_folder(&mut self, name: &str) -> Result<Option<FolderRef>, StoreError> {
        if FolderRef::is_reserved(name) {
            return Ok(Some(FolderRef::general()));
        }
        Ok(self
            .list_folders()?
            .into_iter()
            .find(|folder| folder.title == name)
            .map(|folder| FolderRef {
                name: folder.title,
                id: folder.id,
            }))
    }

    fn create_folder(&mut self, name: &str) -> Result<FolderRef, StoreError> {
        if FolderRef::is_reserved(name) {
            return Ok(FolderRef::general());
        }
        let what = "create folder";
        let response = self
            .post(&["api", "folders"])?
            .send_json(NewFolder { title: name })
            .map_err(|e| remote_error(what, e))?;
        let folder: Folder = decode(response, what)?;
        Ok(FolderRef {
            name: folder.title,
            id: folder.id,
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    response: ureq::Response,
    what: &str,
) -> Result<T, StoreError> {
    response
        .into_json()
        .map_err(|e| StoreError::remote(SERVICE, format!("{what}: unreadable response: {e}")))
}

fn remote_error(what: &str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            StoreError::remote(SERVICE, format!("{what}: HTTP {code}: {}", body.trim()))
        }
        ureq::Error::Transport(transport) => {
            StoreError::remote(SERVICE, format!("{what}: {transport}"))
        }
    }
}
