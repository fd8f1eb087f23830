use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("link not readable: {0}")]
    InvalidLink(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("naming error: {0}")]
    Naming(#[from] vmnet_naming::NamingError),

    #[error("enumerator error: {0}")]
    Enumerator(#[from] vmnet_enumerator::EnumeratorError),

    #[error("vpc error: {0}")]
    Vpc(#[from] vmnet_vpc::VpcError),
}
