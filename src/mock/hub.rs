//! In-process hub double

use super::failure::{FailureConfig, FailureInjector, HubOperation};
use crate::hub::{HubApi, HubError, HubResult};
use async_trait::async_trait;
use golem_protocol::{Command, DeploymentSpec, HubInfo, PeerHardware, PeerInfo};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// One `update_deployment` call as received
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub node_id: String,
    pub deployment_id: String,
    pub commands: Vec<Command>,
}

/// One `create_deployment` call as received
#[derive(Debug, Clone)]
pub struct RecordedDeployment {
    pub node_id: String,
    pub deployment_id: String,
    pub spec: DeploymentSpec,
}

#[derive(Debug)]
struct MockHubState {
    info: HubInfo,
    peers: Vec<(PeerInfo, PeerHardware)>,
    deployments: HashMap<String, String>,
    next_deployment: u64,
    exec_outputs: VecDeque<String>,
    default_exec_output: String,
    updates: Vec<RecordedUpdate>,
    created: Vec<RecordedDeployment>,
    dropped: Vec<String>,
    hardware_queries: usize,
}

/// Mock hub for tests
///
/// Peers, exec output and failures are configured up front; every
/// deployment call is recorded for assertions. Exec commands can be held
/// open with [`MockHub::hold_execs`] to keep dispatches in flight.
pub struct MockHub {
    state: Mutex<MockHubState>,
    failures: Mutex<FailureInjector>,
    exec_gate: watch::Sender<bool>,
}

impl MockHub {
    pub fn new() -> Self {
        let (exec_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MockHubState {
                info: HubInfo {
                    node_id: "0xmockhub".to_string(),
                    version: "0.0.0-mock".to_string(),
                    description: None,
                },
                peers: Vec::new(),
                deployments: HashMap::new(),
                next_deployment: 1,
                exec_outputs: VecDeque::new(),
                default_exec_output: String::new(),
                updates: Vec::new(),
                created: Vec::new(),
                dropped: Vec::new(),
                hardware_queries: 0,
            }),
            failures: Mutex::new(FailureInjector::new()),
            exec_gate,
        }
    }

    /// Builder form of [`MockHub::add_peer`]
    pub fn with_peer(self, node_id: &str, cores: u32) -> Self {
        self.add_peer(node_id, cores);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockHubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Configuration ===

    pub fn add_peer(&self, node_id: &str, cores: u32) {
        let mut state = self.state();
        state.peers.retain(|(p, _)| p.node_id != node_id);
        let addr = format!("10.0.0.{}:7464", state.peers.len() + 1);
        state
            .peers
            .push((PeerInfo::new(node_id, addr), PeerHardware::with_cores(cores)));
    }

    pub fn remove_peer(&self, node_id: &str) {
        self.state().peers.retain(|(p, _)| p.node_id != node_id);
    }

    /// Output returned by every exec without a queued output
    pub fn set_exec_output(&self, output: &str) {
        self.state().default_exec_output = output.to_string();
    }

    /// Output for the next exec only
    pub fn push_exec_output(&self, output: &str) {
        self.state().exec_outputs.push_back(output.to_string());
    }

    /// Block exec commands until [`MockHub::release_execs`]
    pub fn hold_execs(&self) {
        self.exec_gate.send_replace(false);
    }

    pub fn release_execs(&self) {
        self.exec_gate.send_replace(true);
    }

    pub fn inject_failure(&self, op: HubOperation, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .inject(op, config);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    // === Assertions ===

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.state().updates.clone()
    }

    pub fn created_deployments(&self) -> Vec<RecordedDeployment> {
        self.state().created.clone()
    }

    pub fn dropped_deployments(&self) -> Vec<String> {
        self.state().dropped.clone()
    }

    pub fn active_deployments(&self) -> usize {
        self.state().deployments.len()
    }

    pub fn hardware_queries(&self) -> usize {
        self.state().hardware_queries
    }

    /// Number of upload commands received across all updates
    pub fn upload_count(&self) -> usize {
        self.state()
            .updates
            .iter()
            .flat_map(|u| u.commands.iter())
            .filter(|c| c.is_upload())
            .count()
    }

    // === Internal helpers ===

    async fn apply_failure(&self, op: HubOperation) -> HubResult<()> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .check(op)
            .cloned();
        let Some(failure) = failure else {
            return Ok(());
        };

        if let Some(delay) = failure.delay {
            tokio::time::sleep(delay).await;
        }
        if failure.panic {
            panic!(
                "injected panic in {:?}: {}",
                op,
                failure.message.unwrap_or_default()
            );
        }
        match failure.message {
            Some(message) => Err(HubError::ConnectionFailed(message)),
            None => Ok(()),
        }
    }

    async fn wait_for_exec_gate(&self) {
        let mut gate = self.exec_gate.subscribe();
        // The sender lives as long as self, so this only ends when opened.
        let _ = gate.wait_for(|open| *open).await;
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubApi for MockHub {
    async fn hub_info(&self) -> HubResult<HubInfo> {
        self.apply_failure(HubOperation::HubInfo).await?;
        Ok(self.state().info.clone())
    }

    async fn list_peers(&self) -> HubResult<Vec<PeerInfo>> {
        self.apply_failure(HubOperation::ListPeers).await?;
        Ok(self.state().peers.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn peer_hardware(&self, node_id: &str) -> HubResult<PeerHardware> {
        self.apply_failure(HubOperation::PeerHardware).await?;
        let mut state = self.state();
        state.hardware_queries += 1;
        state
            .peers
            .iter()
            .find(|(p, _)| p.node_id == node_id)
            .map(|(_, hw)| hw.clone())
            .ok_or_else(|| HubError::UnknownPeer(node_id.to_string()))
    }

    async fn create_deployment(&self, node_id: &str, spec: &DeploymentSpec) -> HubResult<String> {
        self.apply_failure(HubOperation::CreateDeployment).await?;
        let mut state = self.state();
        if !state.peers.iter().any(|(p, _)| p.node_id == node_id) {
            return Err(HubError::UnknownPeer(node_id.to_string()));
        }
        let deployment_id = format!("dep-{}", state.next_deployment);
        state.next_deployment += 1;
        state
            .deployments
            .insert(deployment_id.clone(), node_id.to_string());
        state.created.push(RecordedDeployment {
            node_id: node_id.to_string(),
            deployment_id: deployment_id.clone(),
            spec: spec.clone(),
        });
        Ok(deployment_id)
    }

    async fn update_deployment(
        &self,
        node_id: &str,
        deployment_id: &str,
        commands: &[Command],
    ) -> HubResult<Vec<String>> {
        self.apply_failure(HubOperation::UpdateDeployment).await?;
        {
            let mut state = self.state();
            if state.deployments.get(deployment_id).map(String::as_str) != Some(node_id) {
                return Err(HubError::UnknownDeployment {
                    node_id: node_id.to_string(),
                    deployment_id: deployment_id.to_string(),
                });
            }
            state.updates.push(RecordedUpdate {
                node_id: node_id.to_string(),
                deployment_id: deployment_id.to_string(),
                commands: commands.to_vec(),
            });
        }

        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let output = match command {
                Command::DownloadFile { file_path, .. } => format!("downloaded {}", file_path),
                Command::Exec { .. } => {
                    self.wait_for_exec_gate().await;
                    let mut state = self.state();
                    match state.exec_outputs.pop_front() {
                        Some(output) => output,
                        None => state.default_exec_output.clone(),
                    }
                }
                Command::UploadFile { uri, .. } => format!("uploaded {}", uri),
            };
            results.push(output);
        }
        Ok(results)
    }

    async fn drop_deployment(&self, node_id: &str, deployment_id: &str) -> HubResult<()> {
        self.apply_failure(HubOperation::DropDeployment).await?;
        let mut state = self.state();
        if state.deployments.remove(deployment_id).is_none() {
            return Err(HubError::UnknownDeployment {
                node_id: node_id.to_string(),
                deployment_id: deployment_id.to_string(),
            });
        }
        state.dropped.push(deployment_id.to_string());
        Ok(())
    }
}
