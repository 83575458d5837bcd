use common::FsError;

use crate::mount::MountError;

/// Everything the host API can fail with
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Mount(#[from] MountError),
}

impl Error {
    pub fn as_fs(&self) -> Option<&FsError> {
        match self {
            Error::Fs(e) => Some(e),
            Error::Mount(_) => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
