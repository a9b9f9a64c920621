//! # Device Identity
//!
//! Stable opaque identifier for this scanner, stamped into every payload.
//!
//! ```text
//! CheckInConfig.device.id ──► set?  ──yes──► DeviceIdentity::fixed(id)
//!                               │
//!                               no
//!                               ▼
//!                  device_settings["device_id"]  (INSERT OR IGNORE uuid v4)
//!                               │
//!                               ▼
//!                  same value on every later start
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use checkin_core::validation::validate_device_id;
use checkin_db::{Database, DEVICE_ID_KEY};

use crate::error::{CheckInError, CheckInResult};

/// The identifier of this device. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: Arc<str>,
}

impl DeviceIdentity {
    /// Loads the persisted identifier, generating one on first run.
    pub async fn load_or_create(db: &Database) -> CheckInResult<Self> {
        let id = db
            .settings()
            .get_or_insert_with(DEVICE_ID_KEY, || Uuid::new_v4().to_string())
            .await?;

        let id = validate_device_id(&id).map_err(|_| CheckInError::MissingDeviceId)?;
        info!(device_id = %id, "Device identity loaded");

        Ok(DeviceIdentity { id: id.into() })
    }

    /// Uses the configured override when present, otherwise the persisted
    /// identifier.
    pub async fn resolve(configured: Option<&str>, db: &Database) -> CheckInResult<Self> {
        match configured {
            Some(id) => Self::fixed(id),
            None => Self::load_or_create(db).await,
        }
    }

    /// An explicitly chosen identifier (config override, tests).
    pub fn fixed(id: &str) -> CheckInResult<Self> {
        let id = validate_device_id(id).map_err(|_| CheckInError::MissingDeviceId)?;
        Ok(DeviceIdentity { id: id.into() })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
