use std::fmt;

use thiserror::Error;

use crate::types::SensorKind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    Connect,
    Subscribe,
    Publish,
    Service,
    Disconnect,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Subscribe => "subscribe",
            Self::Publish => "publish",
            Self::Service => "service",
            Self::Disconnect => "disconnect",
        })
    }
}

/// Nothing here is retried: every variant ends the run that raised it.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("{kind} sensor read failed: {source}")]
    Sensor {
        kind: SensorKind,
        #[source]
        source: BoxError,
    },
    #[error("touch sample failed: {0}")]
    Touch(#[source] BoxError),
    #[error("transport {op} failed: {source}")]
    Transport {
        op: TransportOp,
        #[source]
        source: BoxError,
    },
    #[error("display update failed: {0}")]
    Display(#[source] BoxError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("portal loop already stopped")]
    Stopped,
}

impl PortalError {
    pub fn sensor<E>(kind: SensorKind, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Sensor {
            kind,
            source: Box::new(err),
        }
    }

    pub fn touch<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Touch(Box::new(err))
    }

    pub fn display<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Display(Box::new(err))
    }

    pub fn transport<E>(op: TransportOp, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            op,
            source: Box::new(err),
        }
    }
}
