//! End-to-end forecast stack assembly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::archive::ArchiveConnector;
use crate::catalog::FileCatalog;
use crate::connection::ConnectionManager;
use crate::decoder;
use crate::error::{ConfigError, Result};
use crate::filename::ForecastFileName;
use crate::geometry::{
    FootprintBuilder, FootprintGrid, FullExtent, RectangularFootprint, RegionClipper,
};
use crate::model::{ForecastModel, ForecastRun, RunSelector};
use crate::precision::CellValue;
use crate::retrieval::RetrievalEngine;
use crate::retry::RetryPolicy;
use crate::stack::{RasterStack, StackBuilder};

/// What to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub model: ForecastModel,
    /// Archive directory name of the variable, e.g. "tot_prec"
    pub feature: String,
    /// Substring selecting one grid resolution, e.g. "regular"
    pub grid_marker: String,
    pub buffer_hours: u32,
}

impl ForecastRequest {
    /// Validate a request. Unknown models are rejected here, before any connection.
    pub fn new(
        model: &str,
        feature: impl Into<String>,
        buffer_hours: u32,
    ) -> std::result::Result<Self, ConfigError> {
        let model = model.parse::<ForecastModel>()?;
        let feature = feature.into();
        if feature.trim().is_empty() || feature.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "feature",
                reason: format!("'{}' is not a directory name", feature),
            });
        }

        Ok(Self {
            model,
            feature,
            grid_marker: "regular".to_string(),
            buffer_hours,
        })
    }

    pub fn with_grid_marker(mut self, grid_marker: impl Into<String>) -> Self {
        self.grid_marker = grid_marker.into();
        self
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct ForecastStack<T> {
    pub run: ForecastRun,
    pub stack: RasterStack<T>,
    pub footprint: FootprintGrid,
}

impl<T: CellValue> ForecastStack<T> {
    /// Valid times of the stack, ascending.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        self.stack.timestamps()
    }
}

/// Sequences run selection, retrieval, decoding and stacking.
pub struct ForecastPipeline<C> {
    connector: C,
    request: ForecastRequest,
    policy: RetryPolicy,
    catalog: FileCatalog,
    engine: RetrievalEngine,
    clipper: Arc<dyn RegionClipper>,
    footprint: Arc<dyn FootprintBuilder>,
}

impl<C: ArchiveConnector> ForecastPipeline<C> {
    pub fn new(connector: C, request: ForecastRequest) -> Self {
        let catalog = FileCatalog::new(request.grid_marker.clone());
        Self {
            connector,
            request,
            policy: RetryPolicy::default(),
            catalog,
            engine: RetrievalEngine::new(),
            clipper: Arc::new(FullExtent),
            footprint: Arc::new(RectangularFootprint),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clipper(mut self, clipper: impl RegionClipper + 'static) -> Self {
        self.clipper = Arc::new(clipper);
        self
    }

    pub fn with_footprint_builder(mut self, footprint: impl FootprintBuilder + 'static) -> Self {
        self.footprint = Arc::new(footprint);
        self
    }

    pub fn request(&self) -> &ForecastRequest {
        &self.request
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Fetch and stack every file of the run selected for `now`.
    ///
    /// The archive session is closed before returning, whatever the outcome;
    /// a failure to close it is only logged.
    #[instrument(skip(self), fields(model = %self.request.model, feature = %self.request.feature))]
    pub async fn run<T: CellValue>(&self, now: DateTime<Utc>) -> Result<ForecastStack<T>> {
        let run = RunSelector::new(self.request.model, self.request.buffer_hours).select(now);
        info!(
            run = %run,
            buffer_hours = run.buffer_hours,
            precision = %T::PRECISION,
            "Selected forecast run"
        );

        let mut connection = ConnectionManager::new(&self.connector, self.policy.clone());
        let collected = self.collect::<T>(&run, &mut connection).await;

        if let Err(e) = connection.close().await {
            warn!(error = %e, "Failed to close archive session");
        }

        let stack = collected?;
        let footprint = self
            .footprint
            .build(stack.transform(), stack.shape(), stack.crs());

        info!(
            run = %run,
            depth = stack.depth(),
            shape = %stack.shape(),
            reconnects = connection.reconnects(),
            "Forecast stack assembled"
        );

        Ok(ForecastStack {
            run,
            stack,
            footprint,
        })
    }

    async fn collect<T: CellValue>(
        &self,
        run: &ForecastRun,
        connection: &mut ConnectionManager<'_, C>,
    ) -> Result<RasterStack<T>> {
        connection.connect().await?;
        connection
            .navigate(&run.archive_path(&self.request.feature))
            .await?;

        let names = self.catalog.fetch(connection).await?;
        if names.is_empty() {
            warn!(path = %run.archive_path(&self.request.feature), "No matching forecast files");
        }

        let layout = run.model.file_layout();
        let mut builder = StackBuilder::with_clipper(Arc::clone(&self.clipper));

        for name in &names {
            let file = ForecastFileName::parse(name, &layout)?;
            if file.base != run.run_time() {
                warn!(file = %name, run = %run, "File belongs to a different run");
            }

            let payload = self.engine.retrieve(connection, name).await?;
            let frame = decoder::decode::<T>(&payload)?;
            builder.append(frame, file.valid_time())?;

            info!(
                file = %name,
                lead_hours = file.lead_hours,
                depth = builder.depth(),
                "Stacked forecast file"
            );
        }

        Ok(builder.finalize()?)
    }
}
