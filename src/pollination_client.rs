// src/pollination_client.rs
//
// Thin typed REST client for the Pollination API. Implements the
// `ArtifactStore` contract used by the sync engine, plus the handful of
// account/project/simulation calls the CLI needs.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth;
use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransfer;
use crate::object_store::{ArtifactStore, ByteStream};
use crate::types::{
    Account, ArtifactCategory, ArtifactEntry, ArtifactKey, CreatedSimulation, Namespace,
    NewProject, Project, Simulation, SimulationPage, SubmitSimulation, UploadTicket,
};

#[derive(Serialize)]
struct KeyRequest<'a> {
    key: &'a str,
}

/// Whether an `ensure_*` call found the resource or had to create it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Existing,
    Created,
}

#[derive(Debug, Clone)]
pub struct PollinationClient {
    config: Config,
    transfer: HttpTransfer,
}

impl PollinationClient {
    /// Build a client from `config` as-is, without touching credentials.
    pub fn new(config: Config) -> SyncResult<Self> {
        let http = config.http.build()?;
        Ok(Self { config, transfer: HttpTransfer::new(http) })
    }

    /// Build a client, logging in first if the configuration carries no
    /// access token.
    pub async fn connect(config: Config) -> SyncResult<Self> {
        let http = config.http.build()?;
        let config = auth::refresh(&http, config).await?;
        Ok(Self { config, transfer: HttpTransfer::new(http) })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Transfer helper sharing this client's connection pool.
    pub fn transfer(&self) -> &HttpTransfer {
        &self.transfer
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut rb = self.transfer.client().request(method, self.config.api_url(path));
        if let Some(header) = self.config.auth_header() {
            rb = rb.header(reqwest::header::AUTHORIZATION, header);
        }
        rb
    }

    pub(crate) async fn send(&self, rb: RequestBuilder, what: &str) -> SyncResult<reqwest::Response> {
        let response = rb.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Store { status: status.as_u16(), message });
        }
        Ok(response)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder, what: &str) -> SyncResult<T> {
        let response = self.send(rb, what).await?;
        response.json::<T>().await.map_err(|e| SyncError::Decode(format!("{what}: {e}")))
    }

    /// Endpoints that answer with a bare URL, either JSON-quoted or plain.
    async fn send_url(&self, rb: RequestBuilder, what: &str) -> SyncResult<String> {
        let text = self.send(rb, what).await?.text().await?;
        let url = serde_json::from_str::<String>(&text).unwrap_or_else(|_| text.trim().to_string());
        if url.is_empty() {
            return Err(SyncError::Decode(format!("{what}: empty URL")));
        }
        Ok(url)
    }

    fn artifacts_path(ns: &Namespace) -> String {
        format!("/projects/{}/{}/artifacts", ns.owner, ns.project)
    }

    fn simulations_path(ns: &Namespace) -> String {
        format!("/projects/{}/{}/simulations", ns.owner, ns.project)
    }

    // -------------------------------------------------------------------------
    // Account / projects
    // -------------------------------------------------------------------------

    pub async fn get_account(&self) -> SyncResult<Account> {
        self.send_json(self.request(Method::GET, "/user"), "account").await
    }

    pub async fn get_project(&self, ns: &Namespace) -> SyncResult<Project> {
        let path = format!("/projects/{}/{}", ns.owner, ns.project);
        self.send_json(self.request(Method::GET, &path), &format!("project {ns}")).await
    }

    pub async fn create_project(&self, owner: &str, project: &NewProject) -> SyncResult<()> {
        let rb = self.request(Method::POST, &format!("/projects/{owner}")).json(project);
        self.send(rb, &format!("owner {owner}")).await?;
        info!("created project {}/{}", owner, project.name);
        Ok(())
    }

    /// Look the project up and create it when missing and allowed to.
    pub async fn ensure_project(
        &self,
        ns: &Namespace,
        public: bool,
        create_if_missing: bool,
    ) -> SyncResult<Ensured> {
        match self.get_project(ns).await {
            Ok(_) => Ok(Ensured::Existing),
            Err(SyncError::NotFound(what)) if !create_if_missing => Err(SyncError::NotFound(what)),
            Err(SyncError::NotFound(_)) => {
                let new_project = NewProject {
                    name: ns.project.clone(),
                    public,
                    description: String::new(),
                };
                self.create_project(&ns.owner, &new_project).await?;
                Ok(Ensured::Created)
            }
            Err(e) => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Simulations
    // -------------------------------------------------------------------------

    pub async fn list_simulations(&self, ns: &Namespace, page: u32) -> SyncResult<SimulationPage> {
        let rb = self.request(Method::GET, &Self::simulations_path(ns)).query(&[("page", page)]);
        self.send_json(rb, &format!("project {ns}")).await
    }

    pub async fn get_simulation(&self, ns: &Namespace, id: &str) -> SyncResult<Simulation> {
        let path = format!("{}/{}", Self::simulations_path(ns), id);
        self.send_json(self.request(Method::GET, &path), &format!("simulation {ns}/{id}")).await
    }

    /// Submit a simulation. The project must already exist: a missing
    /// project is `NotFound` and nothing is posted.
    pub async fn submit_simulation(
        &self,
        ns: &Namespace,
        submit: &SubmitSimulation,
    ) -> SyncResult<CreatedSimulation> {
        self.ensure_project(ns, false, false).await?;
        let rb = self.request(Method::POST, &Self::simulations_path(ns)).json(submit);
        self.send_json(rb, &format!("project {ns}")).await
    }
}

#[async_trait]
impl ArtifactStore for PollinationClient {
    async fn create_upload_ticket(&self, ns: &Namespace, key: &ArtifactKey) -> SyncResult<UploadTicket> {
        let rb = self
            .request(Method::POST, &Self::artifacts_path(ns))
            .json(&KeyRequest { key: key.as_str() });
        self.send_json(rb, &format!("project {ns}")).await
    }

    async fn list_entries(&self, ns: &Namespace, path: Option<&str>) -> SyncResult<Vec<ArtifactEntry>> {
        let mut rb = self.request(Method::GET, &Self::artifacts_path(ns));
        if let Some(p) = path {
            rb = rb.query(&[("path", p)]);
        }
        debug!("listing {}:{}", ns, path.unwrap_or("/"));
        self.send_json(rb, &format!("artifacts {ns}:{}", path.unwrap_or("/"))).await
    }

    async fn get_download_url(&self, ns: &Namespace, key: &ArtifactKey) -> SyncResult<String> {
        let rb = self
            .request(Method::GET, &format!("{}/download", Self::artifacts_path(ns)))
            .query(&[("path", key.as_str())]);
        self.send_url(rb, &format!("artifact {ns}:{key}")).await
    }

    async fn delete(&self, ns: &Namespace, path: Option<&str>) -> SyncResult<()> {
        let mut rb = self.request(Method::DELETE, &Self::artifacts_path(ns));
        if let Some(p) = path {
            rb = rb.query(&[("path", p)]);
        }
        self.send(rb, &format!("artifacts {ns}:{}", path.unwrap_or("/"))).await?;
        info!("deleted {}:{}", ns, path.unwrap_or("/"));
        Ok(())
    }

    async fn get_bulk_archive_stream(
        &self,
        ns: &Namespace,
        simulation_id: &str,
        category: ArtifactCategory,
    ) -> SyncResult<ByteStream> {
        let path = format!("{}/{}/{}", Self::simulations_path(ns), simulation_id, category);
        let url = self
            .send_url(self.request(Method::GET, &path), &format!("{category} of simulation {simulation_id}"))
            .await?;
        self.transfer.get_stream(&url).await
    }
}
