//! The routing gateway: registry snapshots plus the four public operations.
//!
//! The current `(Registry, GroupAssignment)` pair lives in one immutable
//! [`Snapshot`] behind an atomic pointer. Every operation loads the pointer
//! once and works against that snapshot to the end, so a concurrent refresh
//! is observed either entirely or not at all.

use crate::backend::{CallOptions, ToolProvider};
use crate::config::{GatewayConfig, GatewaySettings, InitPolicy};
use crate::error::GatewayError;
use crate::grouping::{GroupAssignment, GroupRules};
use crate::registry::{Registry, ToolRecord};
use crate::retrieval::{RetrievalCandidate, RetrievalIndex, RetrievalWeights};
use crate::router::{RoutingDecision, Router};
use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub registry: Registry,
    pub groups: GroupAssignment,
    pub index: RetrievalIndex,
}

impl Snapshot {
    pub fn build(
        generation: u64,
        registry: Registry,
        rules: &GroupRules,
        weights: RetrievalWeights,
    ) -> Self {
        let groups = rules.assign(registry.records());
        let index = RetrievalIndex::new(&registry, weights);
        Self {
            generation,
            registry,
            groups,
            index,
        }
    }

    /// One JSON object per record, in `tool_id` order.
    pub fn export_jsonl(&self, writer: &mut impl Write) -> std::io::Result<usize> {
        for record in self.registry.records() {
            let line = json!({
                "tool_id": record.tool_id,
                "name": record.name,
                "description": record.description,
                "group": self.groups.group_of(&record.tool_id),
                "tags": record.tags,
                "schema_hash": record.schema_hash,
                "required_capability": record.required_capability,
                "input_schema": record.normalized_input_schema,
                "output_schema": record.normalized_output_schema,
            });
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
        }
        Ok(self.registry.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub candidate: RetrievalCandidate,
    pub name: String,
    pub description: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    /// Decision `route_and_call` would make for this query and filter.
    pub route: Option<RoutingDecision>,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescription {
    #[serde(flatten)]
    pub record: ToolRecord,
    pub group: String,
    /// Index of the grouping rule that placed the tool.
    pub group_rule: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub tool_id: String,
    pub tool_name: String,
    /// Backend result, verbatim.
    pub result: Value,
    /// Backend reported a tool-level failure (`isError: true`).
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteAndCallOutcome {
    pub decision: RoutingDecision,
    pub tool_name: String,
    pub result: Value,
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub generation: u64,
    pub count: usize,
    pub groups: BTreeMap<String, usize>,
}

pub struct GatewayContext {
    provider: Arc<dyn ToolProvider>,
    rules: GroupRules,
    weights: RetrievalWeights,
    router: Router,
    settings: GatewaySettings,
    current: ArcSwapOption<Snapshot>,
    build_lock: Mutex<()>,
    generation: AtomicU64,
}

impl GatewayContext {
    pub fn new(provider: Arc<dyn ToolProvider>, rules: GroupRules, config: &GatewayConfig) -> Self {
        Self {
            provider,
            rules,
            weights: config.retrieval,
            router: Router::new(config.router.aggregation),
            settings: config.gateway.clone(),
            current: ArcSwapOption::empty(),
            build_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Rebuild from a fresh backend listing and swap it in.
    ///
    /// On failure the previous snapshot, if any, stays current.
    pub fn refresh(&self) -> Result<RefreshOutcome, GatewayError> {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.rebuild().inspect_err(|err| {
            if err.is_build_failure() && self.is_ready() {
                tracing::warn!("refresh rejected; previous registry stays current");
            }
        })?;
        Ok(RefreshOutcome {
            generation: snapshot.generation,
            count: snapshot.registry.len(),
            groups: snapshot
                .groups
                .counts()
                .into_iter()
                .map(|(group, count)| (group.to_string(), count))
                .collect(),
        })
    }

    /// Current snapshot, building the first one if the policy allows it.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>, GatewayError> {
        if let Some(snapshot) = self.current.load_full() {
            return Ok(snapshot);
        }
        match self.settings.on_uninitialized {
            InitPolicy::Fail => Err(GatewayError::NotInitialized),
            InitPolicy::Build => {
                let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
                // Another caller may have finished the build while we waited.
                if let Some(snapshot) = self.current.load_full() {
                    return Ok(snapshot);
                }
                self.rebuild()
            }
        }
    }

    /// Caller holds `build_lock`.
    fn rebuild(&self) -> Result<Arc<Snapshot>, GatewayError> {
        let label = self.provider.label();
        let descriptors = self
            .provider
            .list_tools()
            .map_err(|source| GatewayError::backend("tools/list", source))?;
        let registry = Registry::build(descriptors).inspect_err(|err| {
            tracing::error!(backend = %label, error = %err, "registry build failed");
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot::build(
            generation,
            registry,
            &self.rules,
            self.weights,
        ));
        tracing::info!(
            backend = %label,
            generation,
            tools = snapshot.registry.len(),
            assigned = snapshot.groups.assigned_count(),
            groups = snapshot.groups.counts().len(),
            "registry built"
        );
        if snapshot.registry.is_empty() {
            tracing::warn!(backend = %label, "backend listed no tools");
        }
        self.current.store(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    fn clamp_top_k(&self, top_k: Option<usize>) -> Result<usize, GatewayError> {
        let top_k = top_k.unwrap_or(self.settings.default_top_k);
        if top_k == 0 {
            return Err(GatewayError::InvalidInput("top_k must be at least 1".into()));
        }
        Ok(top_k.min(self.settings.max_top_k))
    }

    pub fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        group: Option<&str>,
    ) -> Result<SearchOutcome, GatewayError> {
        let top_k = self.clamp_top_k(top_k)?;
        if let Some(group) = group
            && !self.rules.labels().contains(group)
        {
            return Err(GatewayError::InvalidInput(format!("unknown group: {group}")));
        }
        let snapshot = self.snapshot()?;

        let mut candidates = snapshot.index.score(query);
        if let Some(group) = group {
            candidates.retain(|candidate| snapshot.groups.group_of(&candidate.tool_id) == group);
        }
        let route = self
            .router
            .route(query, &candidates, &snapshot.groups)
            .ok();

        let results = candidates
            .into_iter()
            .take(top_k)
            .filter_map(|candidate| {
                let record = snapshot.registry.lookup(&candidate.tool_id).ok()?;
                Some(SearchHit {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    group: snapshot.groups.group_of(&candidate.tool_id).to_string(),
                    candidate,
                })
            })
            .collect();

        Ok(SearchOutcome {
            query: query.to_string(),
            route,
            results,
        })
    }

    pub fn describe(&self, tool_id: &str) -> Result<ToolDescription, GatewayError> {
        let snapshot = self.snapshot()?;
        let record = snapshot.registry.lookup(tool_id)?;
        let entry = snapshot.groups.entry(tool_id);
        Ok(ToolDescription {
            record: record.clone(),
            group: snapshot.groups.group_of(tool_id).to_string(),
            group_rule: entry.and_then(|entry| entry.rule),
        })
    }

    /// The routing step of `route_and_call`, without the forward.
    pub fn route(&self, query: &str) -> Result<RoutingDecision, GatewayError> {
        let snapshot = self.snapshot()?;
        self.route_in(&snapshot, query)
    }

    fn route_in(&self, snapshot: &Snapshot, query: &str) -> Result<RoutingDecision, GatewayError> {
        let candidates = snapshot.index.score(query);
        Ok(self.router.route(query, &candidates, &snapshot.groups)?)
    }

    pub fn call(
        &self,
        tool_id: &str,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<CallOutcome, GatewayError> {
        ensure_object(arguments)?;
        let snapshot = self.snapshot()?;
        let record = snapshot.registry.lookup(tool_id)?;
        let (result, is_error) = self.forward(record, arguments, options)?;
        Ok(CallOutcome {
            tool_id: record.tool_id.clone(),
            tool_name: record.name.clone(),
            result,
            is_error,
        })
    }

    pub fn route_and_call(
        &self,
        query: &str,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<RouteAndCallOutcome, GatewayError> {
        ensure_object(arguments)?;
        let snapshot = self.snapshot()?;
        let decision = self.route_in(&snapshot, query)?;
        let record = snapshot.registry.lookup(&decision.tool_id)?;
        let (result, is_error) = self.forward(record, arguments, options)?;
        Ok(RouteAndCallOutcome {
            tool_name: record.name.clone(),
            decision,
            result,
            is_error,
        })
    }

    fn forward(
        &self,
        record: &ToolRecord,
        arguments: &Value,
        options: &CallOptions,
    ) -> Result<(Value, bool), GatewayError> {
        if let Some(required) = record.required_capability
            && let Some(capabilities) = self.provider.capabilities()
            && !capabilities.supports(required)
        {
            return Err(GatewayError::NotSupported {
                tool_id: record.tool_id.clone(),
                capability: required,
                platform: capabilities.platform,
            });
        }

        let result = self
            .provider
            .call_tool(&record.name, arguments, options)
            .map_err(|source| {
                tracing::warn!(tool_id = %record.tool_id, error = %source, "backend call failed");
                GatewayError::backend(record.tool_id.as_str(), source)
            })?;
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok((result, is_error))
    }
}

fn ensure_object(arguments: &Value) -> Result<(), GatewayError> {
    if arguments.is_object() {
        Ok(())
    } else {
        Err(GatewayError::InvalidInput("arguments must be an object".into()))
    }
}
