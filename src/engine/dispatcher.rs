//! The query dispatcher.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{DatasetMode, EngineConfig, LimitsConfig};
use crate::dataset::{DatasetHandle, Generation, GenerationId, StorageConfig};
use crate::engine::{Query, Reply, StartupError, Status};
use crate::gate::{GateStats, QueryBarrier, QueryGate};
use crate::handlers::{
    Handler, HandlerResult, MatchHandler, MatchRequest, MatchResponse, NearestHandler,
    NearestRequest, NearestResponse, RouteHandler, RouteRequest, RouteResponse, TableHandler,
    TableRequest, TableResponse, TileHandler, TileRequest, TripHandler, TripRequest, TripResponse,
};
use crate::observability::metrics;
use crate::watchdog::{GenerationLoader, SharedWatchdog};

/// Runs queries against the current dataset generation.
///
/// In standalone mode there is no gate: the single generation never
/// changes, so handlers are called directly. In shared mode every query is
/// admitted on the [`QueryGate`], which may install a newer generation
/// before the handler runs.
pub struct Engine {
    mode: DatasetMode,
    current: ArcSwap<Generation>,
    gate: Option<QueryGate>,
    route: RouteHandler,
    table: TableHandler,
    nearest: NearestHandler,
    trip: TripHandler,
    matching: MatchHandler,
    tile: TileHandler,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.mode)
            .field("generation", &self.current_generation())
            .field("gate", &self.gate)
            .finish()
    }
}

impl Engine {
    /// Build the engine selected by `config`.
    ///
    /// Fails when shared mode finds no published generation, or when the
    /// standalone dataset location is not a valid dataset.
    pub fn new(config: &EngineConfig) -> Result<Self, StartupError> {
        let limits = config.limits.clone();
        match config.engine.mode {
            DatasetMode::Shared => {
                let root = config
                    .engine
                    .shared_root
                    .as_deref()
                    .ok_or(StartupError::MissingSetting("engine.shared_root"))?;
                if !SharedWatchdog::try_connect(root) {
                    return Err(StartupError::NoGeneration(root.to_path_buf()));
                }

                let watchdog = SharedWatchdog::connect(root)?;
                let barrier = QueryBarrier::new(Arc::clone(watchdog.region()));
                let initial = watchdog.load_current()?;
                Ok(Self::build(
                    DatasetMode::Shared,
                    &limits,
                    initial,
                    Some(QueryGate::new(barrier, Box::new(watchdog))),
                ))
            }
            DatasetMode::Standalone => {
                let path = config
                    .engine
                    .dataset_path
                    .as_deref()
                    .ok_or(StartupError::MissingSetting("engine.dataset_path"))?;
                let storage = StorageConfig::new(path);
                if !storage.is_valid() {
                    return Err(StartupError::InvalidDatasetLocation(path.to_path_buf()));
                }
                let generation = Generation::load(&storage, GenerationId::STANDALONE)?;
                Ok(Self::standalone(&limits, Arc::new(generation)))
            }
        }
    }

    /// An engine over a single, fixed generation.
    pub fn standalone(limits: &LimitsConfig, dataset: DatasetHandle) -> Self {
        Self::build(DatasetMode::Standalone, limits, dataset, None)
    }

    /// A gated engine fed by `loader`, which must have a first generation ready.
    pub fn with_loader<L>(
        limits: &LimitsConfig,
        loader: L,
        barrier: QueryBarrier,
    ) -> Result<Self, StartupError>
    where
        L: GenerationLoader + 'static,
    {
        let initial = loader.load_if_newer().ok_or(StartupError::LoaderEmpty)?;
        Ok(Self::build(
            DatasetMode::Shared,
            limits,
            initial,
            Some(QueryGate::new(barrier, Box::new(loader))),
        ))
    }

    fn build(
        mode: DatasetMode,
        limits: &LimitsConfig,
        initial: DatasetHandle,
        gate: Option<QueryGate>,
    ) -> Self {
        tracing::info!(
            mode = %mode,
            generation = %initial.id(),
            dataset = %initial.name(),
            "Engine ready"
        );
        metrics::set_current_generation(initial.id());
        Self {
            mode,
            current: ArcSwap::new(initial),
            gate,
            route: RouteHandler::new(limits.max_locations_viaroute),
            table: TableHandler::new(limits.max_locations_distance_table),
            nearest: NearestHandler::new(limits.max_results_nearest),
            trip: TripHandler::new(limits.max_locations_trip),
            matching: MatchHandler::new(
                limits.max_locations_map_matching,
                limits.max_matching_radius_m,
            ),
            tile: TileHandler::new(),
        }
    }

    /// Run `handler` under the gate protocol and pass its status through.
    pub fn execute<H: Handler>(
        &self,
        handler: &H,
        request: &H::Request,
    ) -> (Status, HandlerResult<H::Output>) {
        let start = Instant::now();
        let (status, result) = match &self.gate {
            None => handler.handle_request(&self.current.load(), request),
            Some(gate) => {
                let _admission = gate.admit();
                let dataset = gate.checkout(&self.current);
                handler.handle_request(&dataset, request)
            }
        };
        tracing::debug!(
            kind = H::KIND,
            status = %status,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Query finished"
        );
        metrics::record_query(H::KIND, status, start);
        (status, result)
    }

    pub fn route(&self, request: &RouteRequest) -> (Status, HandlerResult<RouteResponse>) {
        self.execute(&self.route, request)
    }

    pub fn table(&self, request: &TableRequest) -> (Status, HandlerResult<TableResponse>) {
        self.execute(&self.table, request)
    }

    pub fn nearest(&self, request: &NearestRequest) -> (Status, HandlerResult<NearestResponse>) {
        self.execute(&self.nearest, request)
    }

    pub fn trip(&self, request: &TripRequest) -> (Status, HandlerResult<TripResponse>) {
        self.execute(&self.trip, request)
    }

    pub fn matching(&self, request: &MatchRequest) -> (Status, HandlerResult<MatchResponse>) {
        self.execute(&self.matching, request)
    }

    pub fn tile(&self, request: &TileRequest) -> (Status, HandlerResult<String>) {
        self.execute(&self.tile, request)
    }

    /// Run any kind of query.
    pub fn dispatch(&self, query: &Query) -> (Status, Reply) {
        match query {
            Query::Route(r) => reply(self.route(r), Reply::Route),
            Query::Table(r) => reply(self.table(r), Reply::Table),
            Query::Nearest(r) => reply(self.nearest(r), Reply::Nearest),
            Query::Trip(r) => reply(self.trip(r), Reply::Trip),
            Query::Match(r) => reply(self.matching(r), Reply::Match),
            Query::Tile(r) => reply(self.tile(r), Reply::Tile),
        }
    }

    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    /// The generation new queries currently run against.
    pub fn current_generation(&self) -> GenerationId {
        self.current.load().id()
    }

    /// A reference to the current generation.
    pub fn dataset(&self) -> DatasetHandle {
        self.current.load_full()
    }

    /// The gate, `None` in standalone mode.
    pub fn gate(&self) -> Option<&QueryGate> {
        self.gate.as_ref()
    }

    pub fn gate_stats(&self) -> Option<GateStats> {
        self.gate.as_ref().map(QueryGate::stats)
    }
}

fn reply<T>((status, result): (Status, HandlerResult<T>), wrap: fn(T) -> Reply) -> (Status, Reply) {
    (status, result.map_or_else(Reply::Error, wrap))
}
