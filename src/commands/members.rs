use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::{
    domain::{Member, NewMember},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

use super::{DomainLogic, Error, ServiceFuture};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrollRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub external_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListMembersRequest;

impl<D, C, S> Service<EnrollRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = Member;
    type Error = Error;
    type Future = ServiceFuture<Member>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EnrollRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;

            let new_member = normalize(req)?;
            let member = logic.database.insert_member(new_member).await?;
            info!(member_id = %member.id, "enrolled {}", member.email);

            Ok(member)
        })
    }
}

impl<D, C, S> Service<ListMembersRequest> for DomainLogic<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    type Response = Vec<Member>;
    type Error = Error;
    type Future = ServiceFuture<Vec<Member>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ListMembersRequest) -> Self::Future {
        let logic = self.clone();
        Box::pin(async move {
            logic.authorize().await?;
            Ok(logic.database.list_members().await?)
        })
    }
}

/// Trim every field and check the email
fn normalize(req: EnrollRequest) -> Result<NewMember, Error> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') || email.contains(char::is_whitespace) {
        return Err(Error::InvalidInput(
            format!("{:?} is not an email address", req.email).into(),
        ));
    }

    Ok(NewMember {
        email: email.to_string(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        external_id: req
            .external_id
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::database::memory::MemoryDatabase, commands::test_support::memory_logic,
        domain::LookupKey,
    };
    use rstest::*;
    use speculoos::prelude::*;
    use tower::{BoxError, ServiceExt};

    fn request(email: &str, external_id: Option<&str>) -> EnrollRequest {
        EnrollRequest {
            email: email.to_string(),
            first_name: " Ana ".to_string(),
            last_name: "Lopez".to_string(),
            external_id: external_id.map(str::to_string),
        }
    }

    #[rstest]
    #[case("ana@example.com", true)]
    #[case(" ana@example.com ", true)]
    #[case("ana.example.com", false)]
    #[case("ana @example.com", false)]
    #[case("", false)]
    fn test_normalize_email(#[case] email: &str, #[case] valid: bool) {
        assert_that!(normalize(request(email, None)).is_ok()).is_equal_to(valid);
    }

    #[test]
    fn test_normalize_fields() {
        let res = normalize(request("ana@example.com", Some("   ")));

        assert_that!(res).is_ok().matches(|member| {
            member.first_name == "Ana" && member.external_id.is_none()
        });
    }

    #[tokio::test]
    async fn test_enroll_and_list() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let logic = memory_logic(&database);

        let ana = logic
            .clone()
            .oneshot(request("ana@example.com", Some("1234")))
            .await?;
        assert_that!(ana.points).is_equal_to(0);
        logic
            .clone()
            .oneshot(EnrollRequest {
                last_name: "Adams".to_string(),
                ..request("ben@example.com", None)
            })
            .await?;

        let members = logic.oneshot(ListMembersRequest).await?;
        let emails: Vec<_> = members.iter().map(|member| member.email.as_str()).collect();
        assert_that!(emails).is_equal_to(vec!["ben@example.com", "ana@example.com"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_code() -> Result<(), BoxError> {
        let database = MemoryDatabase::default();
        let logic = memory_logic(&database);
        logic
            .clone()
            .oneshot(request("ana@example.com", Some("1234")))
            .await?;

        let res = logic
            .oneshot(request("other@example.com", Some("1234")))
            .await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::DuplicateMember(LookupKey::ExternalId(code)) if code == "1234")
        });

        Ok(())
    }
}
