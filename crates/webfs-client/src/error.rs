use thiserror::Error;
use tokio_tungstenite::tungstenite;
use webfs_rpc::RpcError;
use webfs_types::NtStatus;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(#[from] tungstenite::Error),

    #[error("connect timed out")]
    Timeout,

    #[error("invalid origin header: {0}")]
    InvalidOrigin(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The server never completed the readiness handshake.
    #[error("handshake failed")]
    Handshake,

    #[error("cancelled")]
    Cancelled,
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<ClientError> for NtStatus {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Rpc(rpc) => rpc.into(),
            ClientError::InvalidOrigin(_) => NtStatus::InvalidParameter,
            _ => NtStatus::Unsuccessful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let remote = ClientError::Rpc(RpcError::Remote(NtStatus::AccessDenied));
        assert_eq!(NtStatus::from(remote), NtStatus::AccessDenied);
        assert_eq!(NtStatus::from(ClientError::Timeout), NtStatus::Unsuccessful);
        assert_eq!(
            NtStatus::from(ClientError::InvalidOrigin("\n".into())),
            NtStatus::InvalidParameter
        );
    }
}
