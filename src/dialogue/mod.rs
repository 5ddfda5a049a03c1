//! Conversational front end of the ledger. Transport agnostic: it consumes
//! text or a shared contact per external identity and produces one outbound
//! message per input.

pub mod messages;
pub mod session;
pub mod state;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use crate::error::{LedgerError, LedgerResult};
use crate::notify::Outbound;
use crate::service::AccountService;

pub use self::session::SessionRegistry;
pub use self::state::{Call, Input, Outcome, Step};

const HISTORY_LIMIT: i64 = 5;
const USERS_PAGE: i64 = 10;

#[derive(Clone)]
pub struct Dialogue {
    service: AccountService,
    admins: Arc<HashSet<String>>,
    sessions: Arc<SessionRegistry>,
}

impl Dialogue {
    pub fn new(service: AccountService, admins: HashSet<String>, session_ttl: Duration) -> Self {
        Self {
            service,
            admins: Arc::new(admins),
            sessions: Arc::new(SessionRegistry::new(session_ttl)),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Applies one input. Inputs of the same identity are serialized on its
    /// session lock, including the ledger call they trigger.
    #[instrument(skip(self, input))]
    pub fn handle(&self, external_id: &str, input: Input) -> Outbound {
        let slot = self.sessions.slot(external_id);
        let mut slot = SessionRegistry::lock(&slot);
        if slot.expire_if_stale(self.sessions.ttl()) {
            info!("abandoned flow discarded");
        }

        let is_admin = self.admins.contains(external_id);
        let (next, reply) = match state::plan(&slot.session, &input, is_admin) {
            Step::Reply { next, reply } => (next, reply),
            Step::Call(call) => {
                let result = self.execute(external_id, &call);
                if let Err(e @ LedgerError::Storage(_)) = &result {
                    error!(?call, "ledger call failed: {e}");
                }
                state::settle(&slot.session, &call, result)
            }
        };
        slot.session = next;
        slot.touch();

        let text = messages::render(&reply, self.service.policy());
        let outbound = Outbound::text(external_id, text);
        match messages::attachment(&reply) {
            Some(code) => outbound.with_code(code),
            None => outbound,
        }
    }

    fn execute(&self, external_id: &str, call: &Call) -> LedgerResult<Outcome> {
        let service = &self.service;
        let own = || service.account_for(external_id);
        Ok(match call {
            Call::Status | Call::BeginPurchase | Call::BeginRedeem | Call::CheckPoints(_) | Call::Balance | Call::Profile => {
                Outcome::Account(own()?)
            }
            Call::Register(profile) => Outcome::Registered(service.register(external_id, profile.clone())?),
            Call::RecordPurchase(amount) => {
                Outcome::Purchase(service.record_purchase_by_account(own()?.account_id, amount)?)
            }
            Call::Redeem {
                points,
                purchase_amount,
            } => Outcome::Redemption(service.redeem_points(own()?.account_id, *points, purchase_amount)?),
            Call::History => Outcome::History(service.history(own()?.account_id, HISTORY_LIMIT)?),
            Call::SystemStatus | Call::AdminStats => Outcome::Stats(service.stats()?),
            Call::AdminUsers => {
                let (accounts, total) = service.list_accounts(USERS_PAGE, 0)?;
                Outcome::Accounts(accounts, total)
            }
            Call::AdminAdjust { account_id, delta } => Outcome::Account(service.adjust_points(
                *account_id,
                *delta,
                &format!("adjusted by admin {external_id}"),
            )?),
            Call::AdminInspect(account_id) => Outcome::Account(service.account_by_id(*account_id)?),
            Call::AdminBirthday(account_id) => Outcome::Account(service.grant_birthday_bonus(*account_id)?),
            Call::AdminDeactivate(account_id) => Outcome::Account(service.deactivate(*account_id)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::state::State;
    use crate::points::PointsPolicy;
    use crate::service::tests::service_with;

    fn dialogue() -> (Dialogue, AccountService) {
        let service = service_with(PointsPolicy::default());
        let admins = HashSet::from(["admin".to_string()]);
        (Dialogue::new(service.clone(), admins, Duration::from_secs(900)), service)
    }

    fn say(dialogue: &Dialogue, who: &str, text: &str) -> Outbound {
        dialogue.handle(who, Input::parse(text))
    }

    fn state_of(dialogue: &Dialogue, who: &str) -> State {
        let slot = dialogue.sessions().slot(who);
        let state = SessionRegistry::lock(&slot).session.state.clone();
        state
    }

    fn register(dialogue: &Dialogue, who: &str) -> Outbound {
        say(dialogue, who, "/start");
        dialogue.handle(who, Input::Contact("+79990001122".into()));
        say(dialogue, who, "Ann");
        say(dialogue, who, "female")
    }

    #[test]
    fn registration_walkthrough() {
        let (dialogue, service) = dialogue();
        let first = say(&dialogue, "u1", "/start");
        assert!(first.text.contains("phone"));
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingPhone);

        dialogue.handle("u1", Input::Contact("+79990001122".into()));
        say(&dialogue, "u1", "Ann");
        let done = say(&dialogue, "u1", "female");

        let account = service.account_for("u1").unwrap();
        assert_eq!(account.balance, 100);
        assert_eq!(account.profile.display_name.as_deref(), Some("Ann"));
        assert_eq!(account.profile.category.as_deref(), Some("female"));
        assert_eq!(done.public_code.as_deref(), Some(account.public_code.as_str()));
        assert_eq!(state_of(&dialogue, "u1"), State::Idle);

        let again = say(&dialogue, "u1", "/start");
        assert!(again.text.contains("Welcome back"));
        assert_eq!(state_of(&dialogue, "u1"), State::Idle);
    }

    #[test]
    fn invalid_amount_loops_without_writing() {
        let (dialogue, service) = dialogue();
        register(&dialogue, "u1");
        let account_id = service.account_for("u1").unwrap().account_id;

        say(&dialogue, "u1", "add purchase");
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingPurchaseAmount);
        say(&dialogue, "u1", "a lot");
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingPurchaseAmount);
        assert_eq!(service.history(account_id, 10).unwrap().len(), 1);

        let reply = say(&dialogue, "u1", "1500");
        assert!(reply.text.contains("75"));
        assert_eq!(state_of(&dialogue, "u1"), State::Idle);
        assert_eq!(service.account_for("u1").unwrap().balance, 175);
    }

    #[test]
    fn redeem_walkthrough() {
        let (dialogue, service) = dialogue();
        register(&dialogue, "u1");

        say(&dialogue, "u1", "redeem");
        say(&dialogue, "u1", "500");
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingSpendPoints);
        say(&dialogue, "u1", "60");
        assert_eq!(
            state_of(&dialogue, "u1"),
            State::AwaitingSpendPurchaseAmount { points: 60 }
        );
        let reply = say(&dialogue, "u1", "1000");
        assert!(reply.text.contains("0.60%"));
        assert_eq!(service.account_for("u1").unwrap().balance, 40);
        assert_eq!(state_of(&dialogue, "u1"), State::Idle);
    }

    #[test]
    fn menu_needs_registration() {
        let (dialogue, _) = dialogue();
        let reply = say(&dialogue, "stranger", "balance");
        assert!(reply.text.contains("not registered"));
        assert_eq!(state_of(&dialogue, "stranger"), State::Idle);
    }

    #[test]
    fn cancel_discards_partial_registration() {
        let (dialogue, service) = dialogue();
        say(&dialogue, "u1", "/start");
        dialogue.handle("u1", Input::Contact("+1".into()));
        say(&dialogue, "u1", "/cancel");
        assert_eq!(state_of(&dialogue, "u1"), State::Idle);
        assert!(service.account_for("u1").is_err());
    }

    #[test]
    fn admin_adjusts_points() {
        let (dialogue, service) = dialogue();
        register(&dialogue, "u1");
        let account_id = service.account_for("u1").unwrap().account_id;

        let denied = say(&dialogue, "u1", "/admin");
        assert!(denied.text.contains("administrators"));

        say(&dialogue, "admin", "/admin");
        assert_eq!(state_of(&dialogue, "admin"), State::AdminMenu);
        say(&dialogue, "admin", "add points");
        say(&dialogue, "admin", "999 10");
        assert_eq!(state_of(&dialogue, "admin"), State::AdminAwaitingAddPoints);
        let reply = say(&dialogue, "admin", &format!("{account_id} 250"));
        assert!(reply.text.contains("350"));
        assert_eq!(state_of(&dialogue, "admin"), State::AdminMenu);

        let stats = say(&dialogue, "admin", "stats");
        assert!(stats.text.contains("Accounts: 1"));
        say(&dialogue, "admin", "edit user");
        let reply = say(&dialogue, "admin", &format!("{account_id} birthday"));
        assert!(reply.text.contains("850"));
        say(&dialogue, "admin", "edit user");
        say(&dialogue, "admin", &format!("{account_id} deactivate"));
        assert!(service.account_for("u1").is_err());
        assert!(!service.account_by_id(account_id).unwrap().active);

        say(&dialogue, "admin", "back");
        assert_eq!(state_of(&dialogue, "admin"), State::Idle);
    }

    #[test]
    fn stale_session_starts_over() {
        let service = service_with(PointsPolicy::default());
        let dialogue = Dialogue::new(service, HashSet::new(), Duration::ZERO);
        say(&dialogue, "u1", "/start");
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingPhone);
        let reply = say(&dialogue, "u1", "Ann");
        // the phone step was dropped, so the text lands on the main menu
        assert!(reply.text.starts_with("Menu"));
    }

    #[test]
    fn identities_do_not_share_sessions() {
        let (dialogue, _) = dialogue();
        register(&dialogue, "u1");
        say(&dialogue, "u1", "add purchase");
        say(&dialogue, "u2", "/start");
        assert_eq!(state_of(&dialogue, "u1"), State::AwaitingPurchaseAmount);
        assert_eq!(state_of(&dialogue, "u2"), State::AwaitingPhone);
    }
}
