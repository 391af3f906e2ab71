use socialcredit_types::UserId;
use tokio::sync::mpsc;

use crate::registry::SessionId;

/// Outcome of a session that ended without a user action, for the surface to announce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    DuelExpired {
        id: SessionId,
        challenger: UserId,
        refunded: u64,
    },
    RoundExpired {
        id: SessionId,
        player: UserId,
        refunded: Option<u64>,
    },
    SaleExpired {
        id: SessionId,
        seller: UserId,
    },
    TradeExpired {
        id: SessionId,
        seller: UserId,
        item: String,
        count: u32,
    },
}

impl Notice {
    pub fn session(&self) -> &SessionId {
        match self {
            Notice::DuelExpired { id, .. }
            | Notice::RoundExpired { id, .. }
            | Notice::SaleExpired { id, .. }
            | Notice::TradeExpired { id, .. } => id,
        }
    }
}

pub type Notifier = mpsc::UnboundedSender<Notice>;

/// Sends a notice, ignoring a closed receiver.
pub(crate) fn notify(notifier: &Notifier, notice: Notice) {
    if notifier.send(notice).is_err() {
        tracing::debug!("notice receiver closed");
    }
}
