//! Operator console.
//!
//! Each input line is either a scan payload passed to a command or a catalog/report command.
//! Lines are parsed into a [`DeskCommand`] and run against the ledger by a [`Desk`].

use futures::TryStreamExt;
use tracing::info;
use uuid::Uuid;

use crate::{
    commands::{
        self,
        analytics::AnalyticsRequest,
        audit::AuditRequest,
        award::{AwardOrigin, AwardRequest},
        balance::BalanceRequest,
        history::HistoryRequest,
        lookup::{ScanRequest, ScanResponse},
        members::{EnrollRequest, ListMembersRequest},
        redeem::RedeemRequest,
        retry::call_with_retry,
        rewards::{CreateRewardRequest, SetRewardActiveRequest},
        DomainLogic,
    },
    config::{RetryConfig, SeedConfig},
    domain::{LookupKey, Member, Source, Transaction},
    ports::{catalog::CatalogPort, database::DatabasePort, session::SessionPort},
};

/// Number of transactions printed by `history`
const HISTORY_LINES: usize = 20;

pub const HELP: &str = "\
commands:
  scan <payload>                          look up a member card
  award <payload> [points]                add points for a scanned card
  manual-add <payload> [points]           add points from the dashboard
  redeem <payload> <reward-id>            spend points on a reward at the till
  manual-redeem <payload> <reward-id>     spend points from the dashboard
  balance <payload>                       show a member's points
  history [payload]                       latest transactions
  rewards                                 list the reward catalog
  reward-add <cost> <name...>             add a reward
  reward-toggle <reward-id> on|off        enable or disable a reward
  enroll <email> <first> <last> [code]    add a member
  members                                 list members
  stats                                   today's figures
  audit <payload>                         check a balance against its log
  help
  quit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeskCommand {
    Scan(String),
    Award {
        payload: String,
        points: Option<u32>,
        origin: AwardOrigin,
    },
    Redeem {
        payload: String,
        reward_id: Uuid,
        source: Source,
    },
    Balance(String),
    History(Option<String>),
    Rewards,
    AddReward { cost: u32, name: String },
    ToggleReward { reward_id: Uuid, active: bool },
    Enroll(EnrollRequest),
    Members,
    Stats,
    Audit(String),
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown command {0:?}, try `help`")]
    UnknownCommand(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid {what}: {value:?}")]
    InvalidArgument { what: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error(transparent)]
    Command(#[from] commands::Error),
    #[error("no member for {0}")]
    UnknownMember(LookupKey),
}

impl DeskCommand {
    /// Parse one input line, `None` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("scan", [payload]) => DeskCommand::Scan(payload.to_string()),
            ("scan", _) => return Err(ParseError::Usage("scan <payload>")),
            ("award" | "manual-add", [payload, rest @ ..]) if rest.len() <= 1 => {
                DeskCommand::Award {
                    payload: payload.to_string(),
                    points: rest
                        .first()
                        .map(|points| parse_arg("points", points))
                        .transpose()?,
                    origin: if name.eq_ignore_ascii_case("award") {
                        AwardOrigin::Scan
                    } else {
                        AwardOrigin::Dashboard
                    },
                }
            }
            ("award", _) => return Err(ParseError::Usage("award <payload> [points]")),
            ("manual-add", _) => return Err(ParseError::Usage("manual-add <payload> [points]")),
            ("redeem" | "manual-redeem", [payload, reward_id]) => DeskCommand::Redeem {
                payload: payload.to_string(),
                reward_id: parse_arg("reward id", reward_id)?,
                source: if name.eq_ignore_ascii_case("redeem") {
                    Source::Scan
                } else {
                    Source::Dashboard
                },
            },
            ("redeem", _) => return Err(ParseError::Usage("redeem <payload> <reward-id>")),
            ("manual-redeem", _) => {
                return Err(ParseError::Usage("manual-redeem <payload> <reward-id>"))
            }
            ("balance", [payload]) => DeskCommand::Balance(payload.to_string()),
            ("balance", _) => return Err(ParseError::Usage("balance <payload>")),
            ("history", []) => DeskCommand::History(None),
            ("history", [payload]) => DeskCommand::History(Some(payload.to_string())),
            ("history", _) => return Err(ParseError::Usage("history [payload]")),
            ("rewards", []) => DeskCommand::Rewards,
            ("reward-add", [cost, name @ ..]) if !name.is_empty() => DeskCommand::AddReward {
                cost: parse_arg("cost", cost)?,
                name: name.join(" "),
            },
            ("reward-add", _) => return Err(ParseError::Usage("reward-add <cost> <name...>")),
            ("reward-toggle", [reward_id, state]) => DeskCommand::ToggleReward {
                reward_id: parse_arg("reward id", reward_id)?,
                active: match *state {
                    "on" => true,
                    "off" => false,
                    other => {
                        return Err(ParseError::InvalidArgument {
                            what: "state",
                            value: other.to_string(),
                        })
                    }
                },
            },
            ("reward-toggle", _) => {
                return Err(ParseError::Usage("reward-toggle <reward-id> on|off"))
            }
            ("enroll", [email, first_name, last_name, rest @ ..]) if rest.len() <= 1 => {
                DeskCommand::Enroll(EnrollRequest {
                    email: email.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    external_id: rest.first().map(|code| code.to_string()),
                })
            }
            ("enroll", _) => {
                return Err(ParseError::Usage("enroll <email> <first> <last> [code]"))
            }
            ("members", []) => DeskCommand::Members,
            ("stats", []) => DeskCommand::Stats,
            ("audit", [payload]) => DeskCommand::Audit(payload.to_string()),
            ("audit", _) => return Err(ParseError::Usage("audit <payload>")),
            ("help", _) => DeskCommand::Help,
            ("quit" | "exit", _) => DeskCommand::Quit,
            _ => return Err(ParseError::UnknownCommand(line.trim().to_string())),
        };

        Ok(Some(command))
    }
}

fn parse_arg<T: std::str::FromStr>(what: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidArgument {
        what,
        value: value.to_string(),
    })
}

/// Runs console commands for one signed-in operator
pub struct Desk<D, C, S> {
    logic: DomainLogic<D, C, S>,
    retry: RetryConfig,
}

impl<D, C, S> Desk<D, C, S>
where
    D: DatabasePort + 'static,
    C: CatalogPort + 'static,
    S: SessionPort + 'static,
{
    pub fn new(logic: DomainLogic<D, C, S>, retry: RetryConfig) -> Self {
        Self { logic, retry }
    }

    /// Enroll the configured members and add the configured rewards
    pub async fn seed(&self, seed: &SeedConfig) -> Result<(), DeskError> {
        for member in &seed.members {
            self.send(EnrollRequest {
                email: member.email.clone(),
                first_name: member.first_name.clone(),
                last_name: member.last_name.clone(),
                external_id: member.external_id.clone(),
            })
            .await?;
        }
        for reward in &seed.rewards {
            let created = self
                .send(CreateRewardRequest {
                    name: reward.name.clone(),
                    cost: reward.cost,
                })
                .await?;
            if !reward.active {
                self.send(SetRewardActiveRequest {
                    reward_id: created.id,
                    active: false,
                })
                .await?;
            }
        }
        info!(
            "seeded {} members and {} rewards",
            seed.members.len(),
            seed.rewards.len()
        );

        Ok(())
    }

    /// Run a command and render its result
    pub async fn execute(&self, command: DeskCommand) -> Result<String, DeskError> {
        let output = match command {
            DeskCommand::Scan(payload) => {
                let member = self.resolve(&payload).await?;
                describe_member(&member)
            }
            DeskCommand::Award {
                payload,
                points,
                origin,
            } => {
                let member = self.resolve(&payload).await?;
                let res = self
                    .send(AwardRequest {
                        member_id: member.id,
                        points,
                        origin,
                    })
                    .await?;
                format!(
                    "+{} points for {}: {} -> {}",
                    res.transaction.points_delta,
                    member.email,
                    res.old_points,
                    res.new_points
                )
            }
            DeskCommand::Redeem {
                payload,
                reward_id,
                source,
            } => {
                let member = self.resolve(&payload).await?;
                let res = self
                    .send(RedeemRequest {
                        member_id: member.id,
                        reward_id,
                        source,
                    })
                    .await?;
                format!(
                    "redeemed {} for {}: {} -> {}",
                    res.reward.name, member.email, res.old_points, res.new_points
                )
            }
            DeskCommand::Balance(payload) => {
                let member = self.resolve(&payload).await?;
                let res = self
                    .send(BalanceRequest {
                        member_id: member.id,
                    })
                    .await?;
                format!("{}: {} points", member.email, res.points)
            }
            DeskCommand::History(payload) => {
                let member_id = match payload {
                    Some(payload) => Some(self.resolve(&payload).await?.id),
                    None => None,
                };
                let transactions: Vec<Transaction> = self
                    .logic
                    .history_stream(HistoryRequest {
                        member_id,
                        limit: Some(HISTORY_LINES),
                        ..Default::default()
                    })
                    .try_collect()
                    .await?;
                render_lines(transactions.iter().map(describe_transaction), "no transactions")
            }
            DeskCommand::Rewards => {
                let rewards: Vec<_> = self.logic.rewards_stream(false).try_collect().await?;
                render_lines(
                    rewards.iter().map(|reward| {
                        format!(
                            "{}  {:>6}  {:<8}  {}",
                            reward.id,
                            reward.cost,
                            if reward.active { "active" } else { "inactive" },
                            reward.name
                        )
                    }),
                    "no rewards",
                )
            }
            DeskCommand::AddReward { cost, name } => {
                let reward = self.send(CreateRewardRequest { name, cost }).await?;
                format!("created {} ({} points): {}", reward.name, reward.cost, reward.id)
            }
            DeskCommand::ToggleReward { reward_id, active } => {
                let reward = self
                    .send(SetRewardActiveRequest { reward_id, active })
                    .await?;
                format!(
                    "{} is now {}",
                    reward.name,
                    if reward.active { "active" } else { "inactive" }
                )
            }
            DeskCommand::Enroll(request) => {
                let member = self.send(request).await?;
                format!("enrolled {}", describe_member(&member))
            }
            DeskCommand::Members => {
                let members = self.send(ListMembersRequest).await?;
                render_lines(members.iter().map(describe_member), "no members")
            }
            DeskCommand::Stats => {
                let stats = self.send(AnalyticsRequest::today()).await?;
                let mut lines = vec![
                    format!("members:          {}", stats.total_members),
                    format!("points today:     {}", stats.points_awarded),
                    format!("redeemed today:   {}", stats.redemptions),
                ];
                lines.extend(
                    stats
                        .top_members
                        .iter()
                        .enumerate()
                        .map(|(rank, member)| format!("#{} {}", rank + 1, describe_member(member))),
                );
                lines.join("\n")
            }
            DeskCommand::Audit(payload) => {
                let member = self.resolve(&payload).await?;
                let report = self
                    .send(AuditRequest {
                        member_id: member.id,
                    })
                    .await?;
                format!(
                    "{}: balance {}, log sum {} over {} transactions ({})",
                    member.email,
                    report.balance,
                    report.replayed,
                    report.transactions,
                    if report.is_consistent() { "ok" } else { "MISMATCH" }
                )
            }
            DeskCommand::Help => HELP.to_string(),
            DeskCommand::Quit => String::new(),
        };

        Ok(output)
    }

    async fn send<Req>(
        &self,
        request: Req,
    ) -> Result<<DomainLogic<D, C, S> as tower::Service<Req>>::Response, commands::Error>
    where
        Req: Clone,
        DomainLogic<D, C, S>: tower::Service<Req, Error = commands::Error>,
    {
        call_with_retry(&self.logic, request, &self.retry).await
    }

    async fn resolve(&self, payload: &str) -> Result<Member, DeskError> {
        match self
            .send(ScanRequest {
                payload: payload.to_string(),
            })
            .await?
        {
            ScanResponse::Found(member) => Ok(member),
            ScanResponse::NotFound(key) => Err(DeskError::UnknownMember(key)),
        }
    }
}

fn describe_member(member: &Member) -> String {
    format!(
        "{} <{}>{}: {} points",
        member.display_name(),
        member.email,
        member
            .external_id
            .as_deref()
            .map(|code| format!(" [{code}]"))
            .unwrap_or_default(),
        member.points
    )
}

fn describe_transaction(transaction: &Transaction) -> String {
    format!(
        "{}  {:+6}  {:<13}  {:<9}  {}",
        transaction.created_at.format("%Y-%m-%d %H:%M:%S"),
        transaction.points_delta,
        transaction.reason,
        transaction.source,
        transaction.member_id
    )
}

fn render_lines<I>(lines: I, empty: &str) -> String
where
    I: Iterator<Item = String>,
{
    let lines: Vec<_> = lines.collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{database::memory::MemoryDatabase, session::StaticSession},
        commands::test_support::memory_logic,
        config::{SeedMember, SeedReward},
        ports::catalog::CatalogPort,
    };
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;

    fn award(payload: &str, points: Option<u32>, origin: AwardOrigin) -> DeskCommand {
        DeskCommand::Award {
            payload: payload.into(),
            points,
            origin,
        }
    }

    fn redeem(payload: &str, reward_id: Uuid, source: Source) -> DeskCommand {
        DeskCommand::Redeem {
            payload: payload.into(),
            reward_id,
            source,
        }
    }

    fn invalid(what: &'static str, value: &str) -> ParseError {
        ParseError::InvalidArgument {
            what,
            value: value.into(),
        }
    }

    const REWARD_ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    #[rstest]
    #[case("", None)]
    #[case("   ", None)]
    #[case("scan BB:1234", Some(DeskCommand::Scan("BB:1234".into())))]
    #[case("AWARD ana@example.com", Some(award("ana@example.com", None, AwardOrigin::Scan)))]
    #[case("award BB:1 25", Some(award("BB:1", Some(25), AwardOrigin::Scan)))]
    #[case("manual-add BB:1 5", Some(award("BB:1", Some(5), AwardOrigin::Dashboard)))]
    #[case("history", Some(DeskCommand::History(None)))]
    #[case(
        "reward-add 50 Free coffee",
        Some(DeskCommand::AddReward { cost: 50, name: "Free coffee".into() })
    )]
    #[case("stats", Some(DeskCommand::Stats))]
    #[case("exit", Some(DeskCommand::Quit))]
    fn test_parse(#[case] line: &str, #[case] expected: Option<DeskCommand>) {
        assert_that!(DeskCommand::parse(line)).is_ok().is_equal_to(expected);
    }

    #[rstest]
    #[case("redeem", Source::Scan)]
    #[case("manual-redeem", Source::Dashboard)]
    fn test_parse_redeem(#[case] name: &str, #[case] source: Source) {
        let reward_id: Uuid = REWARD_ID.parse().unwrap();

        let res = DeskCommand::parse(&format!("{name} BB:1 {REWARD_ID}"));

        assert_that!(res)
            .is_ok()
            .is_equal_to(Some(redeem("BB:1", reward_id, source)));
    }

    #[rstest]
    #[case("dance", ParseError::UnknownCommand("dance".into()))]
    #[case("scan", ParseError::Usage("scan <payload>"))]
    #[case("manual-add", ParseError::Usage("manual-add <payload> [points]"))]
    #[case("award BB:1 lots", invalid("points", "lots"))]
    #[case("award BB:1 -5", invalid("points", "-5"))]
    #[case("redeem BB:1 coffee", invalid("reward id", "coffee"))]
    #[case("reward-add 50", ParseError::Usage("reward-add <cost> <name...>"))]
    #[case("reward-toggle 67e55044-10b1-426f-9247-bb680e5fe0c8 maybe", invalid("state", "maybe"))]
    fn test_parse_errors(#[case] line: &str, #[case] expected: ParseError) {
        assert_that!(DeskCommand::parse(line)).is_err().is_equal_to(expected);
    }

    #[test]
    fn test_parse_enroll() {
        let res = DeskCommand::parse("enroll ana@example.com Ana Lopez 1234");

        assert_that!(res).is_ok().is_equal_to(Some(DeskCommand::Enroll(EnrollRequest {
            email: "ana@example.com".into(),
            first_name: "Ana".into(),
            last_name: "Lopez".into(),
            external_id: Some("1234".into()),
        })));
    }

    fn seed() -> SeedConfig {
        SeedConfig {
            members: vec![SeedMember {
                email: "ana@example.com".into(),
                first_name: "Ana".into(),
                last_name: "Lopez".into(),
                external_id: Some("1234".into()),
            }],
            rewards: vec![
                SeedReward {
                    name: "Coffee".into(),
                    cost: 20,
                    active: true,
                },
                SeedReward {
                    name: "Cake".into(),
                    cost: 30,
                    active: false,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_scan_award_redeem() -> Result<(), DeskError> {
        let database = MemoryDatabase::default();
        let desk = Desk::new(memory_logic(&database), RetryConfig::default());
        desk.seed(&seed()).await?;
        let rewards = database.list_rewards(false, None, 10).await.unwrap();
        assert_that!(rewards).has_length(2);
        assert_that!(rewards[1].active).is_false();

        let out = desk
            .execute(award("BB:1234", None, AwardOrigin::Scan))
            .await?;
        assert_that!(out.as_str()).is_equal_to("+10 points for ana@example.com: 0 -> 10");

        desk.execute(award("ana@example.com", Some(15), AwardOrigin::Dashboard))
            .await?;
        let out = desk
            .execute(redeem("1234", rewards[0].id, Source::Dashboard))
            .await?;
        assert_that!(out.as_str()).is_equal_to("redeemed Coffee for ana@example.com: 25 -> 5");

        let out = desk.execute(DeskCommand::Audit("BB:1234".into())).await?;
        assert_that!(out.as_str()).ends_with("(ok)");

        let out = desk.execute(DeskCommand::History(None)).await?;
        let lines: Vec<_> = out.lines().collect();
        assert_that!(lines).has_length(3);
        // Newest first: the dashboard redemption, the manual award, then the scan
        assert_that!(lines[0]).contains("reward_redeem  dashboard");
        assert_that!(lines[1]).contains("manual_add     dashboard");
        assert_that!(lines[2]).contains("scan_add       scan");

        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let database = MemoryDatabase::default();
        let desk = Desk::new(memory_logic(&database), RetryConfig::default());

        let res = desk.execute(DeskCommand::Balance("BB:0000".into())).await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, DeskError::UnknownMember(LookupKey::ExternalId(code)) if code == "0000")
        });
    }

    #[tokio::test]
    async fn test_signed_out() {
        let database = MemoryDatabase::default();
        let logic = DomainLogic::new(
            Arc::new(database.clone()),
            Arc::new(database),
            Arc::new(StaticSession::anonymous()),
            Default::default(),
        );
        let desk = Desk::new(logic, RetryConfig::default());

        let res = desk.execute(DeskCommand::Members).await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, DeskError::Command(commands::Error::Unauthenticated))
        });
    }
}
