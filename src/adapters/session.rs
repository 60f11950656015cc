use crate::ports::session::{Error, Principal, SessionPort};

/// Session whose state is fixed when it is created
///
/// Used by the desk console, where the operator is named in the configuration, and by tests.
#[derive(Clone, Debug, Default)]
pub struct StaticSession {
    principal: Option<Principal>,
}

impl StaticSession {
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            principal: Some(Principal {
                subject: subject.into(),
            }),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionPort for StaticSession {
    async fn principal(&self) -> Result<Option<Principal>, Error> {
        Ok(self.principal.clone())
    }
}
