//! Routes gateway events to the economy and renders the results back.
//!
//! Each inbound event produces at least one outbound message. Rejections are answered with a
//! fresh message so the prompt that carried the button stays usable for the right user.
//! Messages carrying session buttons are remembered so that an expiry notice can replace them.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use socialcredit_execution::{
    Economy, EconomyError, Notice, Reveal, RevealFrame, SessionId, Side, Store,
};
use socialcredit_types::UserId;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info, warn};

use crate::{
    command::{parse_command, ActionId, Command},
    config::RateLimit,
    metrics::{Counter, Metrics},
    render,
    wire::{Inbound, Outbox, Reply},
};

const LEADERBOARD_SIZE: usize = 10;

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub admins: HashSet<UserId>,
    pub economy_channel: String,
    pub rate_limit: RateLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Prompt {
    channel: String,
    message_ref: String,
}

pub struct Dispatcher<S: Store> {
    economy: Economy<S>,
    admins: HashSet<UserId>,
    economy_channel: String,
    limiter: DefaultKeyedRateLimiter<UserId>,
    prompts: Mutex<HashMap<SessionId, Prompt>>,
    metrics: Arc<Metrics>,
}

/// Shows reveal frames by editing the round's message in place.
struct MessageReveal<'a> {
    out: &'a Outbox,
    channel: &'a str,
    message_ref: &'a str,
}

impl Reveal for MessageReveal<'_> {
    async fn show(&self, frame: RevealFrame) {
        self.out
            .edit(self.channel, self.message_ref, render::reveal_frame(&frame));
    }
}

impl<S: Store> Dispatcher<S> {
    pub fn new(economy: Economy<S>, config: DispatcherConfig, metrics: Arc<Metrics>) -> Self {
        let quota =
            Quota::per_minute(config.rate_limit.per_minute).allow_burst(config.rate_limit.burst);
        Self {
            economy,
            admins: config.admins,
            economy_channel: config.economy_channel,
            limiter: RateLimiter::keyed(quota),
            prompts: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn economy(&self) -> &Economy<S> {
        &self.economy
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn handle(&self, inbound: Inbound, out: &Outbox) {
        match inbound {
            Inbound::Command {
                text,
                author,
                channel,
            } => self.on_command(&text, &author, &channel, out).await,
            Inbound::Action {
                action,
                actor,
                channel,
                message,
            } => self.on_action(&action, &actor, &channel, &message, out).await,
        }
    }

    /// Announces a session that ended on its own, replacing its prompt when one is known.
    pub fn announce(&self, notice: &Notice, out: &Outbox) {
        self.metrics.inc(Counter::Notices);
        let reply = render::notice(notice);
        match self.forget(notice.session()) {
            Some(prompt) => out.edit(&prompt.channel, &prompt.message_ref, reply),
            None => {
                out.send(&self.economy_channel, reply);
            }
        }
    }

    /// Expires overdue sessions and drops idle rate-limit state.
    pub async fn sweep(&self) -> usize {
        let expired = self.economy.sweep().await;
        if expired > 0 {
            self.metrics.add(Counter::SessionsSwept, expired as u64);
            info!(expired, "swept overdue sessions");
        }
        self.limiter.retain_recent();
        expired
    }

    fn prompts(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Prompt>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, id: SessionId, channel: &str, message_ref: String) {
        self.prompts().insert(
            id,
            Prompt {
                channel: channel.to_string(),
                message_ref,
            },
        );
    }

    fn forget(&self, id: &SessionId) -> Option<Prompt> {
        self.prompts().remove(id)
    }

    fn allow(&self, user: &UserId) -> bool {
        if self.limiter.check_key(user).is_ok() {
            return true;
        }
        self.metrics.inc(Counter::RateLimited);
        debug!(%user, "rate limited");
        false
    }

    fn reject(&self, channel: &str, out: &Outbox, reply: Reply) {
        self.metrics.inc(Counter::Rejections);
        out.send(channel, reply);
    }

    async fn on_command(&self, text: &str, author: &str, channel: &str, out: &Outbox) {
        let Some(parsed) = parse_command(text) else {
            return;
        };
        self.metrics.inc(Counter::Commands);
        let author = match author.parse::<UserId>() {
            Ok(author) => author,
            Err(err) => {
                self.metrics.inc(Counter::Malformed);
                warn!(author, %err, "command from an invalid author id");
                return;
            }
        };
        if !self.allow(&author) {
            out.send(channel, render::rate_limited());
            return;
        }
        let command = match parsed {
            Ok(command) => command,
            Err(message) => {
                self.reject(channel, out, render::usage_error(&message));
                return;
            }
        };
        if command.is_admin() && !self.admins.contains(&author) {
            warn!(%author, ?command, "admin command refused");
            self.reject(channel, out, render::admins_only());
            return;
        }
        debug!(%author, ?command, "command");
        if let Err(err) = self.run_command(command, &author, channel, out).await {
            debug!(%author, code = err.code(), %err, "command rejected");
            self.reject(channel, out, render::rejection(&err));
        }
    }

    async fn run_command(
        &self,
        command: Command,
        author: &UserId,
        channel: &str,
        out: &Outbox,
    ) -> Result<(), EconomyError> {
        let ledger = self.economy.ledger();
        let gacha = self.economy.gacha();
        match command {
            Command::Help => {
                out.send(channel, render::help());
            }
            Command::Balance(user) => {
                let user = user.unwrap_or_else(|| author.clone());
                let account = ledger.account(&user).await?;
                out.send(channel, render::balance(&account));
            }
            Command::Leaderboard => {
                let top = ledger.leaderboard(LEADERBOARD_SIZE).await?;
                out.send(channel, render::leaderboard(&top));
            }
            Command::Give { to, amount } => {
                let (sent, received) = ledger.transfer(author, &to, amount, "transfer").await?;
                out.send(channel, render::transfer(&sent, &received));
            }
            Command::Duel { wager, target } => {
                let challenge = self
                    .economy
                    .duels()
                    .challenge(author, target.as_ref(), wager)
                    .await?;
                let message_ref = out.send(channel, render::duel_challenge(&challenge));
                self.remember(challenge.id, channel, message_ref);
            }
            Command::Flip(None) => {
                let round = self.economy.flips().start(author).await?;
                let message_ref = out.send(channel, render::round_started(&round));
                self.remember(round.id, channel, message_ref);
            }
            Command::Flip(Some((side, wager))) => {
                let round = self.economy.flips().start(author).await?;
                let message_ref = out.send(channel, render::flipping(author, side, wager));
                self.remember(round.id.clone(), channel, message_ref.clone());
                let result = self
                    .play_round(&round.id, author, side, wager, channel, &message_ref, out)
                    .await;
                match result {
                    Ok(()) | Err(EconomyError::AlreadyHandled) => {}
                    Err(err) => {
                        // The round is still open; turn the message into the regular prompt.
                        self.metrics.inc(Counter::Rejections);
                        let mut prompt = render::round_started(&round);
                        prompt.text = format!("{}\n{}", render::rejection(&err).text, prompt.text);
                        out.edit(channel, &message_ref, prompt);
                    }
                }
            }
            Command::Bank => {
                let view = gacha.bank().await?;
                out.send(channel, render::bank(&view));
            }
            Command::Buy(container) => {
                let purchase = gacha.buy(author, &container).await?;
                out.send(channel, render::purchase(author, &purchase));
            }
            Command::Open(container) => {
                let opening = gacha.open(author, &container).await?;
                out.send(channel, render::opening(author, &opening));
            }
            Command::Inventory(user) => {
                let user = user.unwrap_or_else(|| author.clone());
                let view = gacha.inventory(&user).await?;
                out.send(
                    channel,
                    render::inventory(&view, gacha.catalogue().items.len()),
                );
            }
            Command::Sell { count, item } => {
                let quote = gacha.offer_sale(author, &item, count).await?;
                let message_ref = out.send(channel, render::sale_quote(author, &quote));
                self.remember(quote.id, channel, message_ref);
            }
            Command::Trade {
                count,
                price,
                item,
                buyer,
            } => {
                let offer = gacha
                    .offer_trade(author, &item, count, price, buyer.as_ref())
                    .await?;
                let message_ref = out.send(channel, render::trade_offer(&offer));
                self.remember(offer.id, channel, message_ref);
            }
            Command::Price => {
                out.send(
                    channel,
                    render::price(self.economy.prices().multiplier_bps()),
                );
            }
            Command::Grant { user, amount } => {
                let adjustment = ledger.adjust(&user, amount, "admin grant").await?;
                info!(admin = %author, %user, amount, "balance granted");
                out.send(channel, render::granted(&adjustment));
            }
            Command::GrantContainer {
                user,
                count,
                container,
            } => {
                let grant = gacha.grant_container(&user, &container, count).await?;
                info!(
                    admin = %author,
                    %user,
                    container = %grant.container.id,
                    count,
                    "containers granted"
                );
                out.send(channel, render::container_granted(&grant));
            }
        }
        Ok(())
    }

    async fn on_action(
        &self,
        action: &str,
        actor: &str,
        channel: &str,
        message: &str,
        out: &Outbox,
    ) {
        self.metrics.inc(Counter::Actions);
        let actor = match actor.parse::<UserId>() {
            Ok(actor) => actor,
            Err(err) => {
                self.metrics.inc(Counter::Malformed);
                warn!(actor, %err, "action from an invalid actor id");
                return;
            }
        };
        let action = match action.parse::<ActionId>() {
            Ok(action) => action,
            Err(err) => {
                self.metrics.inc(Counter::Malformed);
                warn!(%actor, %err, "unrecognized action");
                self.reject(
                    channel,
                    out,
                    Reply::text("That button is no longer supported."),
                );
                return;
            }
        };
        if !self.allow(&actor) {
            out.send(channel, render::rate_limited());
            return;
        }
        debug!(%actor, %action, "action");
        if let Err(err) = self.run_action(action, &actor, channel, message, out).await {
            debug!(%actor, code = err.code(), %err, "action rejected");
            self.reject(channel, out, render::rejection(&err));
        }
    }

    async fn run_action(
        &self,
        action: ActionId,
        actor: &UserId,
        channel: &str,
        message: &str,
        out: &Outbox,
    ) -> Result<(), EconomyError> {
        let gacha = self.economy.gacha();
        match action {
            ActionId::DuelAccept(id) => {
                let outcome = self.economy.duels().accept(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::duel_outcome(&outcome));
            }
            ActionId::DuelDecline(id) => {
                let declined = self.economy.duels().decline(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::duel_declined(&declined));
            }
            ActionId::Flip { side, wager, round } => {
                self.play_round(&round, actor, side, wager, channel, message, out)
                    .await?;
            }
            ActionId::FlipReplay(_) => {
                let round = self.economy.flips().replay(actor).await?;
                let message_ref = out.send(channel, render::round_started(&round));
                self.remember(round.id, channel, message_ref);
            }
            ActionId::SaleConfirm(id) => {
                let receipt = gacha.confirm_sale(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::sale_receipt(actor, &receipt));
            }
            ActionId::SaleCancel(id) => {
                let item = gacha.cancel_sale(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::sale_cancelled(&item));
            }
            ActionId::TradeAccept(id) => {
                let receipt = gacha.accept_trade(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::trade_receipt(&receipt));
            }
            ActionId::TradeCancel(id) => {
                let cancelled = gacha.cancel_trade(&id, actor).await?;
                self.forget(&id);
                out.edit(channel, message, render::trade_cancelled(&cancelled));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn play_round(
        &self,
        round: &SessionId,
        player: &UserId,
        side: Side,
        wager: u64,
        channel: &str,
        message_ref: &str,
        out: &Outbox,
    ) -> Result<(), EconomyError> {
        let reveal = MessageReveal {
            out,
            channel,
            message_ref,
        };
        let outcome = self
            .economy
            .flips()
            .play(round, player, side, wager, &reveal)
            .await?;
        self.forget(round);
        out.edit(channel, message_ref, render::round_outcome(&outcome));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Outbound;
    use socialcredit_execution::{
        mocks::{ManualClock, Memory, RecordingAudit, ScriptedEntropy},
        Collaborators, EconomyConfig,
    };
    use std::{num::NonZeroU32, time::Duration};
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: Dispatcher<Arc<Memory>>,
        entropy: Arc<ScriptedEntropy>,
        notices: mpsc::UnboundedReceiver<Notice>,
        out: Outbox,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    fn harness_with(burst: u32) -> Harness {
        let entropy = Arc::new(ScriptedEntropy::new());
        let (economy, notices) = Economy::with_collaborators(
            Arc::new(Memory::default()),
            EconomyConfig::default(),
            Collaborators {
                clock: Arc::new(ManualClock::new(1_700_000_000)),
                entropy: entropy.clone(),
                audit: Arc::new(RecordingAudit::default()),
            },
        );
        let burst = NonZeroU32::new(burst).unwrap();
        let dispatcher = Dispatcher::new(
            economy,
            DispatcherConfig {
                admins: HashSet::from([UserId::new("admin")]),
                economy_channel: "economy".to_string(),
                rate_limit: RateLimit {
                    per_minute: burst,
                    burst,
                },
            },
            Arc::new(Metrics::default()),
        );
        let (out, rx) = Outbox::channel();
        Harness {
            dispatcher,
            entropy,
            notices,
            out,
            rx,
        }
    }

    fn harness() -> Harness {
        harness_with(1_000)
    }

    impl Harness {
        async fn fund(&self, user: &str, amount: u64) {
            self.dispatcher
                .economy()
                .ledger()
                .credit(&UserId::new(user), amount, "seed")
                .await
                .unwrap();
        }

        async fn balance(&self, user: &str) -> u64 {
            self.dispatcher
                .economy()
                .ledger()
                .balance(&UserId::new(user))
                .await
        }

        async fn command(&mut self, author: &str, text: &str) -> Vec<Outbound> {
            let inbound = Inbound::Command {
                text: text.to_string(),
                author: author.to_string(),
                channel: "general".to_string(),
            };
            self.dispatcher.handle(inbound, &self.out).await;
            self.drain()
        }

        async fn press(&mut self, actor: &str, action: &str, message: &str) -> Vec<Outbound> {
            let inbound = Inbound::Action {
                action: action.to_string(),
                actor: actor.to_string(),
                channel: "general".to_string(),
                message: message.to_string(),
            };
            self.dispatcher.handle(inbound, &self.out).await;
            self.drain()
        }

        fn drain(&mut self) -> Vec<Outbound> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages
        }
    }

    /// Returns (ref, text, action ids) of a sent message.
    fn sent(message: &Outbound) -> (String, String, Vec<String>) {
        match message {
            Outbound::Send {
                message_ref,
                text,
                actions,
                ..
            } => (
                message_ref.clone(),
                text.clone(),
                actions.iter().map(|a| a.id.clone()).collect(),
            ),
            other => panic!("expected a send, got {other:?}"),
        }
    }

    fn edited(message: &Outbound) -> (String, String) {
        match message {
            Outbound::Edit {
                message_ref, text, ..
            } => (message_ref.clone(), text.clone()),
            other => panic!("expected an edit, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_chat_is_ignored() {
        let mut h = harness();
        assert!(h.command("u", "hello everyone").await.is_empty());
        assert_eq!(h.dispatcher.metrics().get(Counter::Commands), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_and_transfer() {
        let mut h = harness();
        h.fund("a", 100).await;

        let replies = h.command("a", "!give <@b> 30").await;
        assert_eq!(replies.len(), 1);
        assert!(sent(&replies[0]).1.contains("sent 30 credits to <@b>"));
        assert_eq!(h.balance("b").await, 30);

        let replies = h.command("a", "!give @b 500").await;
        assert!(sent(&replies[0]).1.contains("insufficient funds"));
        assert_eq!(h.balance("a").await, 70);

        let replies = h.command("b", "!balance").await;
        assert!(sent(&replies[0]).1.starts_with("<@b> has 30 credits"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duel_accepted_through_button() {
        let mut h = harness();
        h.fund("a", 100).await;
        h.fund("b", 100).await;

        let replies = h.command("a", "!duel 40").await;
        let (prompt, _, actions) = sent(&replies[0]);
        assert_eq!(actions.len(), 2);
        assert!(actions[0].starts_with("duel:accept:"));
        assert_eq!(h.balance("a").await, 60);

        // The challenger cannot accept their own duel; the prompt stays.
        let replies = h.press("a", &actions[0], &prompt).await;
        assert!(matches!(replies[0], Outbound::Send { .. }));

        h.entropy.push_flips([true]);
        let replies = h.press("b", &actions[0], &prompt).await;
        let (message_ref, text) = edited(&replies[0]);
        assert_eq!(message_ref, prompt);
        assert!(text.starts_with("<@a> wins the duel"));
        assert_eq!(h.balance("a").await, 140);
        assert_eq!(h.balance("b").await, 60);

        let replies = h.press("c", &actions[0], &prompt).await;
        assert!(sent(&replies[0]).1.contains("no longer exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flip_with_bet_reveals_then_settles() {
        let mut h = harness();
        h.fund("p", 60).await;
        h.entropy.push_flips([true]);

        let replies = h.command("p", "!flip red 20").await;
        let (prompt, text, _) = sent(&replies[0]);
        assert!(text.contains("Flipping"));
        // Five reveal frames then the result, all on the same message.
        assert_eq!(replies.len(), 7);
        for reply in &replies[1..] {
            assert_eq!(edited(reply).0, prompt);
        }
        let (_, outcome) = edited(&replies[6]);
        assert!(outcome.contains("landed on RED"));
        assert_eq!(h.balance("p").await, 80);
        assert_eq!(h.dispatcher.economy().open_sessions().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flip_bet_too_large_keeps_round_open() {
        let mut h = harness();
        h.fund("p", 15).await;

        let replies = h.command("p", "!flip black 50").await;
        assert_eq!(replies.len(), 2);
        let (prompt, _, _) = sent(&replies[0]);
        let (message_ref, text) = edited(&replies[1]);
        assert_eq!(message_ref, prompt);
        assert!(text.starts_with("Sorry, insufficient funds"));
        assert_eq!(h.balance("p").await, 15);

        // The prompt's buttons still work.
        let action = match &replies[1] {
            Outbound::Edit { actions, .. } => actions[0].id.clone(),
            _ => unreachable!(),
        };
        assert!(action.starts_with("flip:red:10:"));
        h.entropy.push_flips([false]);
        let replies = h.press("p", &action, &prompt).await;
        assert!(edited(replies.last().unwrap()).1.contains("lost 10 credits"));
        assert_eq!(h.balance("p").await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sale_prompt_bound_to_seller() {
        let mut h = harness();
        h.dispatcher
            .economy()
            .gacha()
            .grant_container(&UserId::new("s"), "standard", 1)
            .await
            .unwrap();
        let replies = h.command("s", "!open standard").await;
        assert!(sent(&replies[0]).1.contains("opened a Standard Case"));
        let view = h
            .dispatcher
            .economy()
            .gacha()
            .inventory(&UserId::new("s"))
            .await
            .unwrap();
        let item = view.items[0].item.id.clone();

        let replies = h.command("s", &format!("!sell 1 {item}")).await;
        let (prompt, _, actions) = sent(&replies[0]);
        assert!(actions[0].starts_with("sale:confirm:"));

        let replies = h.press("intruder", &actions[0], &prompt).await;
        assert!(sent(&replies[0]).1.contains("only the seller"));

        let replies = h.press("s", &actions[0], &prompt).await;
        let (message_ref, text) = edited(&replies[0]);
        assert_eq!(message_ref, prompt);
        assert!(text.contains("<@s> sold 1x"));
        assert!(h.balance("s").await > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_duel_replaces_prompt() {
        let mut h = harness();
        h.fund("a", 73).await;
        let replies = h.command("a", "!duel 73").await;
        let (prompt, _, _) = sent(&replies[0]);
        assert_eq!(h.balance("a").await, 0);

        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        let notice = h.notices.recv().await.unwrap();
        h.dispatcher.announce(&notice, &h.out);

        let replies = h.drain();
        let (message_ref, text) = edited(&replies[0]);
        assert_eq!(message_ref, prompt);
        assert!(text.contains("73 credits refunded"));
        assert_eq!(h.balance("a").await, 73);

        // Unknown sessions are announced in the economy channel.
        h.dispatcher.announce(&notice, &h.out);
        match &h.drain()[0] {
            Outbound::Send { channel, .. } => assert_eq!(channel, "economy"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_commands() {
        let mut h = harness();
        let replies = h.command("u", "!grant @u 500").await;
        assert_eq!(sent(&replies[0]).1, "Only admins can do that.");
        assert_eq!(h.balance("u").await, 0);

        h.command("admin", "!grant @u 500").await;
        let replies = h.command("admin", "!grant @u -900").await;
        assert!(sent(&replies[0]).1.contains("500 -> 0"));

        let replies = h.command("admin", "!grantcase @u 2 Premium Case").await;
        assert!(sent(&replies[0]).1.contains("They now hold 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_and_malformed_input() {
        let mut h = harness_with(2);
        h.command("u", "!balance").await;
        h.command("u", "!balance").await;
        let replies = h.command("u", "!balance").await;
        assert_eq!(sent(&replies[0]).1, "Slow down, try again in a moment.");
        assert_eq!(h.dispatcher.metrics().get(Counter::RateLimited), 1);

        let replies = h.command("v", "!duel lots").await;
        assert!(sent(&replies[0]).1.contains("not a whole number"));

        let replies = h.press("v", "roulette:spin:1", "m").await;
        assert_eq!(sent(&replies[0]).1, "That button is no longer supported.");
        assert_eq!(h.dispatcher.metrics().get(Counter::Malformed), 1);
    }
}
