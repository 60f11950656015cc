use std::task::{Context, Poll};

use tower::Service;
use tracing::{debug, info};

use crate::{
    domain::{scan::parse_payload, LookupKey, Member},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{DomainLogic, Error, ServiceFuture};

/// A scan event: the text decoded from a member card
#[derive(Clone, Debug)]
pub struct ScanRequest {
    pub payload: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ScanResponse {
    Found(Member),
    /// The payload was readable, but no member has this key
    NotFound(LookupKey),
}

impl<D, C, S> Service<ScanRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = ScanResponse;
    type Error = Error;
    type Future = ServiceFuture<ScanResponse>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ScanRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let key = parse_payload(&req.payload, &logic.settings.scan_scheme)
                .ok_or(Error::InvalidInput("unreadable scan payload".into()))?;

            match logic.database.find_member(&key).await? {
                Some(member) => {
                    debug!(member_id = %member.id, "scanned {}", key);
                    Ok(ScanResponse::Found(member))
                }
                None => {
                    info!("no member for {}", key);
                    Ok(ScanResponse::NotFound(key))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{database::memory::MemoryDatabase, session::StaticSession},
        commands::test_support::memory_logic,
        config::LedgerSettings,
        domain::NewMember,
        ports::{catalog::MockCatalogPort, database::MockDatabasePort},
    };
    use mockall::predicate::*;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    #[fixture]
    async fn database() -> MemoryDatabase {
        let database = MemoryDatabase::default();
        database
            .insert_member(NewMember {
                email: "ana@example.com".to_string(),
                first_name: "Ana".to_string(),
                last_name: "Lopez".to_string(),
                external_id: Some("1234".to_string()),
            })
            .await
            .unwrap();
        database
    }

    #[rstest]
    #[case("BB:1234")]
    #[case("ana@example.com")]
    #[case(" 1234\n")]
    #[tokio::test]
    async fn test_found(
        #[future] database: MemoryDatabase,
        #[case] payload: &str,
    ) -> Result<(), BoxError> {
        let database = database.await;

        let res = memory_logic(&database)
            .oneshot(ScanRequest {
                payload: payload.to_string(),
            })
            .await?;

        assert_that!(res).matches(
            |res| matches!(res, ScanResponse::Found(member) if member.email == "ana@example.com"),
        );

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_not_found(#[future] database: MemoryDatabase) -> Result<(), BoxError> {
        let database = database.await;

        let res = memory_logic(&database)
            .oneshot(ScanRequest {
                payload: "BB:9999".to_string(),
            })
            .await?;

        assert_that!(res)
            .is_equal_to(ScanResponse::NotFound(LookupKey::ExternalId("9999".to_string())));

        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable() {
        // The database is never queried for an empty payload
        let logic = DomainLogic::new(
            Arc::new(MockDatabasePort::new()),
            Arc::new(MockCatalogPort::new()),
            Arc::new(StaticSession::authenticated("staff")),
            LedgerSettings::default(),
        );

        let res = logic
            .oneshot(ScanRequest {
                payload: "  ".to_string(),
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_custom_scheme() -> Result<(), BoxError> {
        let key = LookupKey::ExternalId("1234".to_string());
        let mut database = MockDatabasePort::new();
        database
            .expect_find_member()
            .times(1)
            .with(eq(key.clone()))
            .returning(|_| Ok(None));
        let logic = DomainLogic::new(
            Arc::new(database),
            Arc::new(MockCatalogPort::new()),
            Arc::new(StaticSession::authenticated("staff")),
            LedgerSettings {
                scan_scheme: "QR".to_string(),
                ..Default::default()
            },
        );

        let res = logic
            .oneshot(ScanRequest {
                payload: "qr:1234".to_string(),
            })
            .await?;

        assert_that!(res).is_equal_to(ScanResponse::NotFound(key));

        Ok(())
    }
}
