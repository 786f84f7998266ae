//! sled-backed `ModelStore`.
//!
//! Two trees, both keyed by vehicle id with JSON values:
//! - `history`: the raw `Vec<EfficiencyReading>`
//! - `models`:  `PersistedModels` (control limits, forest, trained_at)
//!
//! History is the source of truth. A model blob that fails to decode, or
//! was written under another schema version, is discarded and rebuilt from
//! history on load.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{TransactionError, Transactional};
use sled::{Db, Tree};
use tracing::{debug, info, warn};

use super::{ModelStore, StoreError};
use crate::baseline::ControlLimits;
use crate::config::ModelSettings;
use crate::registry::rebuild_models;
use crate::robust::RobustModelArtifact;
use crate::types::{EfficiencyReading, VehicleModelState};

/// Version stamped on every model blob. Bump when `PersistedModels` or the
/// forest layout changes.
pub const MODEL_SCHEMA_VERSION: u32 = 1;

const HISTORY_TREE: &str = "history";
const MODELS_TREE: &str = "models";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedModels {
    schema_version: u32,
    statistical: Option<ControlLimits>,
    robust: Option<RobustModelArtifact>,
    trained_at: Option<DateTime<Utc>>,
}

/// Embedded on-disk vehicle state store
pub struct SledStore {
    db: Db,
    history: Tree,
    models: Tree,
    /// Used to rebuild models when a model blob is unreadable
    settings: ModelSettings,
}

impl SledStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P, settings: ModelSettings) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        info!(path = %path_ref.display(), "Vehicle state store opened");
        Self::from_db(db, settings)
    }

    /// Open a throwaway database (for testing)
    pub fn open_temp(settings: ModelSettings) -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, settings)
    }

    fn from_db(db: Db, settings: ModelSettings) -> Result<Self, StoreError> {
        let history = db.open_tree(HISTORY_TREE)?;
        let models = db.open_tree(MODELS_TREE)?;
        Ok(Self {
            db,
            history,
            models,
            settings,
        })
    }

    /// Number of vehicles with a stored history
    pub fn vehicle_count(&self) -> usize {
        self.history.len()
    }

    fn decode_models(vehicle_id: &str, bytes: &[u8]) -> Result<PersistedModels, StoreError> {
        let models: PersistedModels =
            serde_json::from_slice(bytes).map_err(|e| StoreError::ModelArtifactCorrupt {
                vehicle_id: vehicle_id.to_string(),
                reason: e.to_string(),
            })?;
        if models.schema_version != MODEL_SCHEMA_VERSION {
            return Err(StoreError::ModelArtifactCorrupt {
                vehicle_id: vehicle_id.to_string(),
                reason: format!(
                    "schema version {} (expected {})",
                    models.schema_version, MODEL_SCHEMA_VERSION
                ),
            });
        }
        Ok(models)
    }
}

impl ModelStore for SledStore {
    fn get(&self, vehicle_id: &str) -> Result<Option<VehicleModelState>, StoreError> {
        let key = vehicle_id.as_bytes();
        let raw_history = self.history.get(key)?;
        let raw_models = self.models.get(key)?;

        let Some(raw_history) = raw_history else {
            if raw_models.is_some() {
                return Err(StoreError::HistoryUnavailable {
                    vehicle_id: vehicle_id.to_string(),
                    reason: "model blob present without history".to_string(),
                });
            }
            return Ok(None);
        };

        let history: Vec<EfficiencyReading> =
            serde_json::from_slice(&raw_history).map_err(|e| StoreError::HistoryUnavailable {
                vehicle_id: vehicle_id.to_string(),
                reason: e.to_string(),
            })?;

        let mut state = VehicleModelState::empty(vehicle_id);
        state.history = history;

        let decoded = match raw_models {
            Some(bytes) => Self::decode_models(vehicle_id, &bytes).map(Some),
            None => Ok(None),
        };

        match decoded {
            Ok(Some(models)) => {
                state.statistical = models.statistical;
                state.robust = models.robust;
                state.trained_at = models.trained_at;
            }
            Ok(None) => {
                if state.len() >= self.settings.statistical.min_readings {
                    warn!(vehicle_id, "Model blob missing, rebuilding from history");
                    rebuild_models(&mut state, &self.settings);
                }
            }
            Err(e) => {
                warn!(vehicle_id, error = %e, "Rebuilding models from history");
                rebuild_models(&mut state, &self.settings);
            }
        }

        debug!(vehicle_id, readings = state.len(), "Vehicle state loaded");
        Ok(Some(state))
    }

    fn put(&self, state: &VehicleModelState) -> Result<(), StoreError> {
        let key = state.vehicle_id.as_bytes();
        let history_bytes = serde_json::to_vec(&state.history)?;
        let model_bytes = serde_json::to_vec(&PersistedModels {
            schema_version: MODEL_SCHEMA_VERSION,
            statistical: state.statistical,
            robust: state.robust.clone(),
            trained_at: state.trained_at,
        })?;

        (&self.history, &self.models)
            .transaction(|(history, models)| {
                history.insert(key, history_bytes.as_slice())?;
                models.insert(key, model_bytes.as_slice())?;
                Ok::<(), sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(transaction_error)?;
        self.db.flush()?;

        debug!(
            vehicle_id = %state.vehicle_id,
            readings = state.len(),
            "Vehicle state stored"
        );
        Ok(())
    }

    fn remove(&self, vehicle_id: &str) -> Result<(), StoreError> {
        let key = vehicle_id.as_bytes();
        (&self.history, &self.models)
            .transaction(|(history, models)| {
                history.remove(key)?;
                models.remove(key)?;
                Ok::<(), sled::transaction::ConflictableTransactionError<()>>(())
            })
            .map_err(transaction_error)?;
        self.db.flush()?;
        info!(vehicle_id, "Vehicle state removed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

fn transaction_error(err: TransactionError<()>) -> StoreError {
    match err {
        TransactionError::Storage(e) => StoreError::Database(e),
        TransactionError::Abort(()) => {
            StoreError::Database(sled::Error::Unsupported("transaction aborted".to_string()))
        }
    }
}
