//! Turns engine results into chat text and buttons.

use socialcredit_execution::{
    gacha::{
        BankView, Grant, InventoryView, Opening, Purchase, SaleQuote, SaleReceipt,
        TradeCancelled, TradeOffer, TradeReceipt,
    },
    Adjustment, DuelChallenge, DuelDeclined, DuelOutcome, EconomyError, Notice, RevealFrame,
    RoundOutcome, RoundStarted, Side,
};
use socialcredit_types::{Account, Item, UserId, PRICE_SCALE_BPS};
use std::fmt::Write as _;
use std::time::Duration;

use crate::{
    command::{ActionId, USAGE},
    wire::Reply,
};

/// Preset stakes offered on a fresh coin-flip round.
const FLIP_STAKES: [u64; 3] = [10, 50, 100];

fn mention(user: &UserId) -> String {
    format!("<@{user}>")
}

fn fmt_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        s if s >= 3_600 && s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s >= 3_600 => format!("{}h {}m", s / 3_600, (s % 3_600) / 60),
        s if s >= 60 && s % 60 == 0 => format!("{}m", s / 60),
        s if s >= 60 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{s}s"),
    }
}

fn item_label(item: &Item) -> String {
    format!("{} ({})", item.name, item.rarity)
}

pub fn help() -> Reply {
    Reply::text(format!("Social credit commands:\n{USAGE}"))
}

pub fn rejection(err: &EconomyError) -> Reply {
    let text = match err {
        EconomyError::AlreadyHandled => "That was already handled.".to_string(),
        EconomyError::NotFound(kind)
            if matches!(kind.as_str(), "duel" | "round" | "sale" | "trade") =>
        {
            format!("That {kind} is over or no longer exists.")
        }
        EconomyError::Store(_) => {
            "The ledger is unavailable right now. Nothing was changed, try again shortly."
                .to_string()
        }
        other => format!("Sorry, {other}."),
    };
    Reply::text(text)
}

pub fn usage_error(message: &str) -> Reply {
    Reply::text(format!("Sorry, {message}"))
}

pub fn rate_limited() -> Reply {
    Reply::text("Slow down, try again in a moment.")
}

pub fn admins_only() -> Reply {
    Reply::text("Only admins can do that.")
}

pub fn balance(account: &Account) -> Reply {
    let stats = &account.stats;
    Reply::text(format!(
        "{} has {} credits. Duels {}/{} won, flips {}/{} won, {} containers opened.",
        mention(&account.id),
        account.balance,
        stats.duels_won,
        stats.duels_played,
        stats.flips_won,
        stats.flips_played,
        stats.containers_opened,
    ))
}

pub fn leaderboard(accounts: &[Account]) -> Reply {
    if accounts.is_empty() {
        return Reply::text("Nobody has any credits yet.");
    }
    let mut text = String::from("Top balances:");
    for (rank, account) in accounts.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. {} {}",
            rank + 1,
            mention(&account.id),
            account.balance
        );
    }
    Reply::text(text)
}

pub fn transfer(sent: &Adjustment, received: &Adjustment) -> Reply {
    Reply::text(format!(
        "{} sent {} credits to {}. Balance: {}.",
        mention(&sent.user),
        sent.old.saturating_sub(sent.new),
        mention(&received.user),
        sent.new
    ))
}

pub fn granted(adjustment: &Adjustment) -> Reply {
    Reply::text(format!(
        "{} balance adjusted by {}: {} -> {}.",
        mention(&adjustment.user),
        adjustment.delta(),
        adjustment.old,
        adjustment.new
    ))
}

pub fn duel_challenge(challenge: &DuelChallenge) -> Reply {
    let who = match &challenge.target {
        Some(target) => mention(target),
        None => "anyone".to_string(),
    };
    Reply::text(format!(
        "{} challenges {} to a duel for {} credits. Expires in {}.",
        mention(&challenge.challenger),
        who,
        challenge.wager,
        fmt_duration(challenge.ttl)
    ))
    .with_action(ActionId::DuelAccept(challenge.id.clone()), "Accept")
    .with_action(ActionId::DuelDecline(challenge.id.clone()), "Decline")
}

pub fn duel_outcome(outcome: &DuelOutcome) -> Reply {
    Reply::text(format!(
        "{} wins the duel against {} and takes {} credits! Balances: {} {}, {} {}.",
        mention(&outcome.winner),
        mention(&outcome.loser),
        outcome.pot,
        mention(&outcome.winner),
        outcome.winner_balance,
        mention(&outcome.loser),
        outcome.loser_balance
    ))
}

pub fn duel_declined(declined: &DuelDeclined) -> Reply {
    let text = if declined.declined_by == declined.challenger {
        format!(
            "{} withdrew the challenge. {} credits refunded.",
            mention(&declined.challenger),
            declined.refunded
        )
    } else {
        format!(
            "{} declined the duel. {} credits refunded to {}.",
            mention(&declined.declined_by),
            declined.refunded,
            mention(&declined.challenger)
        )
    };
    Reply::text(text)
}

/// Stakes offered as buttons: the presets the player can afford, or all-in when none fit.
pub fn flip_stakes(balance: u64) -> Vec<u64> {
    let stakes: Vec<u64> = FLIP_STAKES
        .iter()
        .copied()
        .filter(|stake| *stake <= balance)
        .collect();
    if stakes.is_empty() && balance > 0 {
        return vec![balance];
    }
    stakes
}

pub fn round_started(round: &RoundStarted) -> Reply {
    let stakes = flip_stakes(round.balance);
    let text = if stakes.is_empty() {
        format!(
            "{} has no credits to flip with.",
            mention(&round.player)
        )
    } else {
        format!(
            "{}, pick a side and a stake. Balance: {}. Expires in {}.",
            mention(&round.player),
            round.balance,
            fmt_duration(round.ttl)
        )
    };
    let mut reply = Reply::text(text);
    for side in [Side::Red, Side::Black] {
        for stake in &stakes {
            reply = reply.with_action(
                ActionId::Flip {
                    side,
                    wager: *stake,
                    round: round.id.clone(),
                },
                format!("{} {}", side.as_str().to_uppercase(), stake),
            );
        }
    }
    reply
}

pub fn flipping(player: &UserId, side: Side, wager: u64) -> Reply {
    Reply::text(format!(
        "{} bets {} on {}. Flipping...",
        mention(player),
        wager,
        side.as_str().to_uppercase()
    ))
}

pub fn reveal_frame(frame: &RevealFrame) -> Reply {
    Reply::text(format!(
        "The coin spins... {} ({}/{})",
        frame.showing.as_str().to_uppercase(),
        frame.step,
        frame.of
    ))
}

pub fn round_outcome(outcome: &RoundOutcome) -> Reply {
    let verdict = if outcome.won {
        format!("won, collecting {} credits", outcome.payout)
    } else {
        format!("lost {} credits", outcome.wager)
    };
    Reply::text(format!(
        "It landed on {}! {} bet {} and {}. Balance: {}.",
        outcome.landed.as_str().to_uppercase(),
        mention(&outcome.player),
        outcome.side.as_str().to_uppercase(),
        verdict,
        outcome.balance
    ))
    .with_action(ActionId::FlipReplay(outcome.id.clone()), "Play again")
}

pub fn bank(view: &BankView) -> Reply {
    let mut text = String::from("Container bank:");
    for (kind, stock) in &view.stock {
        let _ = write!(
            text,
            "\n{}: {} credits, {} in stock",
            kind.name, kind.price, stock
        );
    }
    let _ = write!(
        text,
        "\nRestocks in {}.",
        fmt_duration(Duration::from_secs(view.refill_in))
    );
    Reply::text(text)
}

pub fn purchase(user: &UserId, purchase: &Purchase) -> Reply {
    Reply::text(format!(
        "{} bought a {} for {} credits. Balance: {}. {} left in the bank, {} purchases left today.",
        mention(user),
        purchase.container.name,
        purchase.price,
        purchase.balance,
        purchase.stock_left,
        purchase.purchases_left
    ))
}

pub fn opening(user: &UserId, opening: &Opening) -> Reply {
    let mut text = format!("{} opened a {}:", mention(user), opening.container.name);
    for drawn in &opening.items {
        let _ = write!(text, "\n- {}", item_label(&drawn.item));
        if drawn.first_time {
            text.push_str(" NEW!");
        }
    }
    let _ = write!(text, "\n{} opens left today.", opening.opens_left);
    Reply::text(text)
}

pub fn container_granted(grant: &Grant) -> Reply {
    Reply::text(format!(
        "Granted {}x {} to {}. They now hold {}.",
        grant.count,
        grant.container.name,
        mention(&grant.user),
        grant.held
    ))
}

pub fn inventory(view: &InventoryView, catalogue_size: usize) -> Reply {
    let mut text = format!(
        "{} has collected {}/{} items.",
        mention(&view.owner),
        view.distinct_seen,
        catalogue_size
    );
    if view.items.is_empty() && view.containers.is_empty() {
        text.push_str("\nThe inventory is empty.");
    }
    for (kind, count) in &view.containers {
        let _ = write!(text, "\n{count}x {} (unopened)", kind.name);
    }
    for held in &view.items {
        let _ = write!(
            text,
            "\n{}x {} at {} each",
            held.count,
            item_label(&held.item),
            held.unit_price
        );
    }
    Reply::text(text)
}

pub fn price(multiplier_bps: u64) -> Reply {
    Reply::text(format!(
        "Market multiplier: {}.{:02}x.",
        multiplier_bps / PRICE_SCALE_BPS,
        (multiplier_bps % PRICE_SCALE_BPS) / 100
    ))
}

pub fn sale_quote(seller: &UserId, quote: &SaleQuote) -> Reply {
    Reply::text(format!(
        "{}, sell {}x {} to the bank for {} credits ({} each)? Expires in {}.",
        mention(seller),
        quote.count,
        item_label(&quote.item),
        quote.total,
        quote.unit_price,
        fmt_duration(quote.ttl)
    ))
    .with_action(ActionId::SaleConfirm(quote.id.clone()), "Confirm")
    .with_action(ActionId::SaleCancel(quote.id.clone()), "Cancel")
}

pub fn sale_receipt(seller: &UserId, receipt: &SaleReceipt) -> Reply {
    Reply::text(format!(
        "{} sold {}x {} for {} credits. Balance: {}.",
        mention(seller),
        receipt.count,
        receipt.item.name,
        receipt.credited,
        receipt.balance
    ))
}

pub fn sale_cancelled(item: &Item) -> Reply {
    Reply::text(format!("Sale of {} cancelled.", item.name))
}

pub fn trade_offer(offer: &TradeOffer) -> Reply {
    let who = match &offer.buyer {
        Some(buyer) => mention(buyer),
        None => "anyone".to_string(),
    };
    Reply::text(format!(
        "{} offers {}x {} to {} for {} credits. Expires in {}.",
        mention(&offer.seller),
        offer.count,
        item_label(&offer.item),
        who,
        offer.price,
        fmt_duration(offer.ttl)
    ))
    .with_action(ActionId::TradeAccept(offer.id.clone()), "Buy")
    .with_action(ActionId::TradeCancel(offer.id.clone()), "Withdraw")
}

pub fn trade_receipt(receipt: &TradeReceipt) -> Reply {
    let mut text = format!(
        "{} bought {}x {} from {} for {} credits.",
        mention(&receipt.buyer),
        receipt.count,
        receipt.item.name,
        mention(&receipt.seller),
        receipt.price
    );
    if receipt.first_time {
        text.push_str(" A new addition to their collection!");
    }
    Reply::text(text)
}

pub fn trade_cancelled(cancelled: &TradeCancelled) -> Reply {
    Reply::text(format!(
        "Offer withdrawn. {}x {} returned to the seller.",
        cancelled.count, cancelled.item.name
    ))
}

pub fn notice(notice: &Notice) -> Reply {
    let text = match notice {
        Notice::DuelExpired {
            challenger,
            refunded,
            ..
        } => format!(
            "Nobody accepted {}'s duel. {} credits refunded.",
            mention(challenger),
            refunded
        ),
        Notice::RoundExpired {
            player,
            refunded: Some(refunded),
            ..
        } => format!(
            "{}'s coin flip timed out. {} credits refunded.",
            mention(player),
            refunded
        ),
        Notice::RoundExpired { player, .. } => {
            format!("{}'s coin flip expired.", mention(player))
        }
        Notice::SaleExpired { seller, .. } => {
            format!("{}'s sale was not confirmed in time.", mention(seller))
        }
        Notice::TradeExpired {
            seller,
            item,
            count,
            ..
        } => format!(
            "{}'s trade offer expired. {count}x {item} returned.",
            mention(seller)
        ),
    };
    Reply::text(text)
}
