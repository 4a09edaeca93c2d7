use std::{sync::Arc, time::Duration};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::address::AddressTable;

pub const DEFAULT_DEVICE_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_PATH: &str = "/status";

/// Whatever the device answered, untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReply {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no address known for device {0}")]
    UnknownDevice(u32),
    #[error("device {id} at {address} did not answer in time")]
    Timeout { id: u32, address: String },
    #[error("device {id} at {address} is unreachable: {source}")]
    Unreachable {
        id: u32,
        address: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("device {id} at {address} sent a malformed status body: {source}")]
    MalformedBody {
        id: u32,
        address: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Forwards status queries to devices listed in the address table.
pub struct StatusRelay {
    addresses: Arc<AddressTable>,
    client: reqwest::Client,
    port: u16,
}

impl StatusRelay {
    pub fn new(
        addresses: Arc<AddressTable>,
        port: u16,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            addresses,
            client,
            port,
        })
    }

    /// Non-2xx answers are a successful relay: the status code is part of
    /// the reply. Only failing to get an answer at all is an error.
    pub async fn fetch_status(&self, id: u32) -> Result<StatusReply, RelayError> {
        let address = self
            .addresses
            .resolve(id)
            .ok_or(RelayError::UnknownDevice(id))?;
        let uri = format!("http://{address}:{}{STATUS_PATH}", self.port);
        debug!("querying status of device {id} at {uri}");

        let res = self
            .client
            .get(&uri)
            .send()
            .await
            .map_err(|err| transport_error(id, address, err))?;
        let status = res.status().as_u16();
        let body: Value = res.json().await.map_err(|err| {
            if err.is_timeout() {
                transport_error(id, address, err)
            } else {
                RelayError::MalformedBody {
                    id,
                    address: address.to_owned(),
                    source: err,
                }
            }
        })?;

        Ok(StatusReply { status, body })
    }
}

fn transport_error(id: u32, address: &str, err: reqwest::Error) -> RelayError {
    let address = address.to_owned();
    if err.is_timeout() {
        RelayError::Timeout { id, address }
    } else {
        RelayError::Unreachable {
            id,
            address,
            source: err,
        }
    }
}
