use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dbus connection error")]
    DbusError(#[from] zbus::Error),
    #[error("Dbus request failed")]
    FdoError(#[from] zbus::fdo::Error),
    #[error("Service {service:?} was not understood: {reason}")]
    InvalidService { service: String, reason: String },
    #[error("Could not become the owner of {0}")]
    NameNotAcquired(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for zbus::fdo::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::DbusError(zbus::Error::FDO(e)) => *e,
            Error::DbusError(e) => zbus::fdo::Error::ZBus(e),
            Error::FdoError(e) => e,
            Error::InvalidService { service, reason } => {
                zbus::fdo::Error::InvalidArgs(format!("Invalid bus name from {service:?}: {reason}"))
            }
            Error::NameNotAcquired(name) => zbus::fdo::Error::Failed(format!("Could not own {name}")),
        }
    }
}
