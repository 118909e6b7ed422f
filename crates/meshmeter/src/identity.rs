//! Virtual meter identity: a generated id and secret, created once per store.

use crate::store::{KeyValueStore, Result, StoreError};

/// Store key of the meter id.
pub const METER_ID_KEY: &str = "meterid";

/// Store key of the meter secret.
pub const METER_SECRET_KEY: &str = "metersecret";

/// Credentials of one virtual meter on the Corrently API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub meter_id: String,
    pub meter_secret: String,
}

impl Identity {
    /// Generate a fresh identity from the prefix and the current time.
    ///
    /// The id is `<prefix><unix millis>`; the secret is a random fraction
    /// scaled by the same timestamp. Neither is meant to be a strong
    /// credential.
    pub fn generate(prefix: &str) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        Self::generate_at(prefix, millis, rand::random::<f64>())
    }

    fn generate_at(prefix: &str, millis: i64, fraction: f64) -> Self {
        let secret = fraction * millis as f64;
        Self {
            meter_id: format!("{prefix}{millis}"),
            meter_secret: secret.to_string(),
        }
    }
}

/// Read the stored identity, creating it on first use.
///
/// Both keys absent: a new identity is generated and written atomically.
/// If another writer got there first, its identity is returned instead.
/// Only one key present: fails with [`StoreError::Incomplete`] and leaves
/// the store untouched.
pub fn load_identity<S: KeyValueStore + ?Sized>(store: &S, prefix: &str) -> Result<Identity> {
    if let Some(identity) = read_identity(store)? {
        log::debug!("Using stored meter identity {}", identity.meter_id);
        return Ok(identity);
    }

    let identity = Identity::generate(prefix);
    let written = store.insert_all_if_absent(&[
        (METER_ID_KEY, identity.meter_id.as_str()),
        (METER_SECRET_KEY, identity.meter_secret.as_str()),
    ])?;
    if written {
        log::info!("Created new meter identity {}", identity.meter_id);
        return Ok(identity);
    }

    log::warn!("Meter identity was created concurrently, adopting the stored one");
    // the winning writer stored both keys in one transaction, so they can
    // only be missing here if the store was wiped in between
    read_identity(store)?.ok_or(StoreError::Unreadable)
}

fn read_identity<S: KeyValueStore + ?Sized>(store: &S) -> Result<Option<Identity>> {
    let meter_id = store.get(METER_ID_KEY)?;
    let meter_secret = store.get(METER_SECRET_KEY)?;
    match (meter_id, meter_secret) {
        (Some(meter_id), Some(meter_secret)) => Ok(Some(Identity {
            meter_id,
            meter_secret,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(StoreError::Incomplete {
            present: METER_ID_KEY,
            missing: METER_SECRET_KEY,
        }),
        (None, Some(_)) => Err(StoreError::Incomplete {
            present: METER_SECRET_KEY,
            missing: METER_ID_KEY,
        }),
    }
}
