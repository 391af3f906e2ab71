//! Parsing of chat commands and button action ids.

use socialcredit_execution::{SessionId, Side};
use socialcredit_types::UserId;
use std::fmt;
use std::str::FromStr;

pub const PREFIX: char = '!';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Balance(Option<UserId>),
    Leaderboard,
    Give { to: UserId, amount: u64 },
    Duel { wager: u64, target: Option<UserId> },
    Flip(Option<(Side, u64)>),
    Bank,
    Buy(String),
    Open(String),
    Inventory(Option<UserId>),
    Sell { count: u32, item: String },
    Trade {
        count: u32,
        price: u64,
        item: String,
        buyer: Option<UserId>,
    },
    Price,
    Grant { user: UserId, amount: i64 },
    GrantContainer {
        user: UserId,
        count: u32,
        container: String,
    },
}

impl Command {
    pub fn is_admin(&self) -> bool {
        matches!(self, Command::Grant { .. } | Command::GrantContainer { .. })
    }
}

pub const USAGE: &str = "\
!balance [@user] | !leaderboard | !give @user <amount>
!duel <wager> [@user] | !flip [red|black <wager>]
!bank | !buy <container> | !open <container> | !inventory [@user]
!sell <count> <item> | !trade <count> <price> <item> [@buyer] | !price";

/// Parses one chat message. Returns `None` when the message is not a command at all.
pub fn parse_command(text: &str) -> Option<Result<Command, String>> {
    let body = text.trim().strip_prefix(PREFIX)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_ascii_lowercase();
    let args: Vec<&str> = words.collect();
    Some(parse_args(&name, &args))
}

fn parse_args(name: &str, args: &[&str]) -> Result<Command, String> {
    match (name, args) {
        ("help", _) => Ok(Command::Help),
        ("balance" | "bal", []) => Ok(Command::Balance(None)),
        ("balance" | "bal", [user]) => Ok(Command::Balance(Some(parse_user(user)?))),
        ("leaderboard" | "top", []) => Ok(Command::Leaderboard),
        ("give" | "transfer", [user, amount]) => Ok(Command::Give {
            to: parse_user(user)?,
            amount: parse_amount(amount)?,
        }),
        ("duel", [wager]) => Ok(Command::Duel {
            wager: parse_amount(wager)?,
            target: None,
        }),
        ("duel", [wager, user]) => Ok(Command::Duel {
            wager: parse_amount(wager)?,
            target: Some(parse_user(user)?),
        }),
        ("flip" | "coinflip", []) => Ok(Command::Flip(None)),
        ("flip" | "coinflip", [side, wager]) => Ok(Command::Flip(Some((
            side.parse::<Side>()
                .map_err(|_| format!("pick red or black, not {side:?}"))?,
            parse_amount(wager)?,
        )))),
        ("bank", []) => Ok(Command::Bank),
        ("buy", [_, ..]) => Ok(Command::Buy(args.join(" "))),
        ("open", [_, ..]) => Ok(Command::Open(args.join(" "))),
        ("inventory" | "inv", []) => Ok(Command::Inventory(None)),
        ("inventory" | "inv", [user]) => Ok(Command::Inventory(Some(parse_user(user)?))),
        ("sell", [count, _, ..]) => Ok(Command::Sell {
            count: parse_count(count)?,
            item: args[1..].join(" "),
        }),
        ("trade", [count, price, _, ..]) => {
            let mut rest = &args[2..];
            let mut buyer = None;
            if let Some((last, head)) = rest.split_last() {
                if is_mention(last) && !head.is_empty() {
                    buyer = Some(parse_user(last)?);
                    rest = head;
                }
            }
            Ok(Command::Trade {
                count: parse_count(count)?,
                price: parse_amount(price)?,
                item: rest.join(" "),
                buyer,
            })
        }
        ("price" | "prices", []) => Ok(Command::Price),
        ("grant", [user, amount]) => Ok(Command::Grant {
            user: parse_user(user)?,
            amount: amount
                .parse::<i64>()
                .map_err(|_| format!("{amount:?} is not a whole number"))?,
        }),
        ("grantcase" | "grant-case", [user, count, _, ..]) => Ok(Command::GrantContainer {
            user: parse_user(user)?,
            count: parse_count(count)?,
            container: args[2..].join(" "),
        }),
        (
            "balance" | "bal" | "leaderboard" | "top" | "give" | "transfer" | "duel" | "flip"
            | "coinflip" | "bank" | "buy" | "open" | "inventory" | "inv" | "sell" | "trade"
            | "price" | "prices" | "grant" | "grantcase" | "grant-case",
            _,
        ) => Err(format!("wrong arguments for !{name}. {}", usage_line(name))),
        _ => Err(format!("unknown command !{name}. Try !help")),
    }
}

fn usage_line(name: &str) -> &'static str {
    match name {
        "give" | "transfer" => "Usage: !give @user <amount>",
        "duel" => "Usage: !duel <wager> [@user]",
        "flip" | "coinflip" => "Usage: !flip [red|black <wager>]",
        "sell" => "Usage: !sell <count> <item>",
        "trade" => "Usage: !trade <count> <price> <item> [@buyer]",
        "grant" => "Usage: !grant @user <amount>",
        "grantcase" | "grant-case" => "Usage: !grantcase @user <count> <container>",
        _ => "See !help",
    }
}

fn is_mention(raw: &str) -> bool {
    raw.starts_with('@') || (raw.starts_with("<@") && raw.ends_with('>'))
}

/// Accepts a bare id, `@id`, or a platform mention such as `<@id>` / `<@!id>`.
pub fn parse_user(raw: &str) -> Result<UserId, String> {
    let trimmed = raw
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.trim_start_matches('!'))
        .or_else(|| raw.strip_prefix('@'))
        .unwrap_or(raw);
    trimmed
        .parse::<UserId>()
        .map_err(|err| format!("{raw:?} is not a user: {err}"))
}

fn parse_amount(raw: &str) -> Result<u64, String> {
    match raw.parse::<u64>() {
        Ok(0) => Err("amount must be positive".to_string()),
        Ok(amount) => Ok(amount),
        Err(_) => Err(format!("{raw:?} is not a whole number of credits")),
    }
}

fn parse_count(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(0) => Err("count must be positive".to_string()),
        Ok(count) => Ok(count),
        Err(_) => Err(format!("{raw:?} is not a count")),
    }
}

/// Button ids. The session id always comes last so it may itself contain separators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionId {
    DuelAccept(SessionId),
    DuelDecline(SessionId),
    Flip {
        side: Side,
        wager: u64,
        round: SessionId,
    },
    FlipReplay(SessionId),
    SaleConfirm(SessionId),
    SaleCancel(SessionId),
    TradeAccept(SessionId),
    TradeCancel(SessionId),
}

impl ActionId {
    pub fn session(&self) -> &SessionId {
        match self {
            ActionId::DuelAccept(id)
            | ActionId::DuelDecline(id)
            | ActionId::FlipReplay(id)
            | ActionId::SaleConfirm(id)
            | ActionId::SaleCancel(id)
            | ActionId::TradeAccept(id)
            | ActionId::TradeCancel(id) => id,
            ActionId::Flip { round, .. } => round,
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionId::DuelAccept(id) => write!(f, "duel:accept:{id}"),
            ActionId::DuelDecline(id) => write!(f, "duel:decline:{id}"),
            ActionId::Flip { side, wager, round } => write!(f, "flip:{side}:{wager}:{round}"),
            ActionId::FlipReplay(id) => write!(f, "flip:replay:{id}"),
            ActionId::SaleConfirm(id) => write!(f, "sale:confirm:{id}"),
            ActionId::SaleCancel(id) => write!(f, "sale:cancel:{id}"),
            ActionId::TradeAccept(id) => write!(f, "trade:accept:{id}"),
            ActionId::TradeCancel(id) => write!(f, "trade:cancel:{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action {:?}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = UnknownAction;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(raw.to_string());
        let mut parts = raw.splitn(3, ':');
        let (Some(engine), Some(verb), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(unknown());
        };
        if rest.is_empty() {
            return Err(unknown());
        }
        let id = || SessionId::from(rest);
        let action = match (engine, verb) {
            ("duel", "accept") => ActionId::DuelAccept(id()),
            ("duel", "decline") => ActionId::DuelDecline(id()),
            ("flip", "replay") => ActionId::FlipReplay(id()),
            ("flip", side) => {
                let side = side.parse::<Side>().map_err(|_| unknown())?;
                let (wager, round) = rest.split_once(':').ok_or_else(unknown)?;
                let wager = wager.parse::<u64>().map_err(|_| unknown())?;
                if round.is_empty() {
                    return Err(unknown());
                }
                ActionId::Flip {
                    side,
                    wager,
                    round: SessionId::from(round),
                }
            }
            ("sale", "confirm") => ActionId::SaleConfirm(id()),
            ("sale", "cancel") => ActionId::SaleCancel(id()),
            ("trade", "accept") => ActionId::TradeAccept(id()),
            ("trade", "cancel") => ActionId::TradeCancel(id()),
            _ => return Err(unknown()),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Command, String> {
        parse_command(text).expect("is a command")
    }

    #[test]
    fn test_non_commands_are_ignored() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("!"), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("!balance"), Ok(Command::Balance(None)));
        assert_eq!(
            parse("!BAL <@!42>"),
            Ok(Command::Balance(Some(UserId::new("42"))))
        );
        assert_eq!(
            parse("!give @7 250"),
            Ok(Command::Give {
                to: UserId::new("7"),
                amount: 250
            })
        );
        assert_eq!(
            parse("!duel 50 <@9>"),
            Ok(Command::Duel {
                wager: 50,
                target: Some(UserId::new("9"))
            })
        );
        assert_eq!(parse("!flip"), Ok(Command::Flip(None)));
        assert_eq!(parse("!flip b 20"), Ok(Command::Flip(Some((Side::Black, 20)))));
        assert_eq!(
            parse("!buy Standard Case"),
            Ok(Command::Buy("Standard Case".to_string()))
        );
        assert_eq!(
            parse("!sell 3 Jade Seal"),
            Ok(Command::Sell {
                count: 3,
                item: "Jade Seal".to_string()
            })
        );
        assert_eq!(
            parse("!grant @3 -40"),
            Ok(Command::Grant {
                user: UserId::new("3"),
                amount: -40
            })
        );
        assert!(parse("!grantcase @3 2 premium").unwrap().is_admin());
    }

    #[test]
    fn test_trade_with_and_without_buyer() {
        assert_eq!(
            parse("!trade 2 80 Old Coin @5"),
            Ok(Command::Trade {
                count: 2,
                price: 80,
                item: "Old Coin".to_string(),
                buyer: Some(UserId::new("5")),
            })
        );
        assert_eq!(
            parse("!trade 1 10 stonks"),
            Ok(Command::Trade {
                count: 1,
                price: 10,
                item: "stonks".to_string(),
                buyer: None,
            })
        );
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(parse("!duel").unwrap_err().contains("Usage: !duel"));
        assert!(parse("!duel 0").unwrap_err().contains("positive"));
        assert!(parse("!duel ten").is_err());
        assert!(parse("!flip green 5").unwrap_err().contains("red or black"));
        assert!(parse("!sell 0 stonks").is_err());
        assert!(parse("!give @7 -5").is_err());
        assert!(parse("!frobnicate").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn test_action_ids() {
        // Owner ids may contain the separator; the session id is always the tail.
        let id = SessionId::from("duel-a:b-18c-00ff");
        let accept = ActionId::DuelAccept(id.clone());
        assert_eq!(accept.to_string(), "duel:accept:duel-a:b-18c-00ff");
        assert_eq!(accept.to_string().parse::<ActionId>(), Ok(accept));
        assert_eq!(
            "sale:cancel:sale-x-1-2".parse::<ActionId>().unwrap().session(),
            &SessionId::from("sale-x-1-2")
        );

        assert_eq!(
            "flip:red:50:round-1".parse::<ActionId>(),
            Ok(ActionId::Flip {
                side: Side::Red,
                wager: 50,
                round: SessionId::from("round-1"),
            })
        );
        for bad in ["duel:accept", "duel:accept:", "flip:red:x:r", "flip:red:5:", "bogus:x:y"] {
            assert!(bad.parse::<ActionId>().is_err(), "{bad}");
        }
    }
}
