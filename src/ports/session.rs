/// Identity boundary
///
/// Authentication itself happens in an external provider. The ledger only needs to know
/// whether an operator is signed in.
#[mockall::automock]
#[async_trait::async_trait]
pub trait SessionPort: Send + Sync {
    /// The signed-in operator, or `None` when there is no valid session
    async fn principal(&self) -> Result<Option<Principal>, Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// Opaque identifier handed out by the identity provider
    pub subject: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    ///
    /// For example, the identity provider could not be reached to validate the session.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
