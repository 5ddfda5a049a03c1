//! Transition table of the conversation. Both [`plan`] and [`settle`] are pure:
//! `plan` maps (session, input) to either an immediate reply or one ledger
//! call, `settle` maps the call's result to the next session and reply.

use bigdecimal::BigDecimal;

use crate::database::{Account, LedgerStats, Profile, Transaction};
use crate::error::{LedgerError, LedgerResult};
use crate::points;
use crate::service::{PurchaseReceipt, Registration, RedemptionReceipt};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    AwaitingPhone,
    AwaitingName {
        phone: String,
    },
    AwaitingGender {
        phone: String,
        name: String,
    },
    AwaitingPurchaseAmount,
    AwaitingSpendPoints,
    AwaitingSpendPurchaseAmount {
        points: i64,
    },
    AdminMenu,
    AdminAwaitingAddPoints,
    AdminAwaitingEditTarget,
}

/// Conversation state of one external identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub state: State,
    /// Set while the identity works from the admin menu; cancel returns there.
    pub admin: bool,
}

impl Session {
    fn home(&self) -> Session {
        Session {
            state: if self.admin { State::AdminMenu } else { State::Idle },
            admin: self.admin,
        }
    }

    fn to(&self, state: State) -> Session {
        Session {
            state,
            admin: self.admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Admin,
    Cancel,
    Help,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Contact(String),
    Text(String),
}

impl Input {
    pub fn parse(text: &str) -> Input {
        let trimmed = text.trim();
        let command = match trimmed.to_lowercase().as_str() {
            "/start" => Some(Command::Start),
            "/admin" => Some(Command::Admin),
            "/cancel" | "cancel" => Some(Command::Cancel),
            "/help" => Some(Command::Help),
            "/status" => Some(Command::Status),
            _ => None,
        };
        match command {
            Some(command) => Input::Command(command),
            None => Input::Text(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Balance,
    History,
    AddPurchase,
    Redeem,
    Profile,
    Rules,
    Help,
}

impl MenuItem {
    fn from_text(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "balance" => Some(MenuItem::Balance),
            "history" => Some(MenuItem::History),
            "add purchase" | "purchase" => Some(MenuItem::AddPurchase),
            "redeem" | "use points" => Some(MenuItem::Redeem),
            "profile" => Some(MenuItem::Profile),
            "rules" => Some(MenuItem::Rules),
            "help" => Some(MenuItem::Help),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdminItem {
    Stats,
    Users,
    AddPoints,
    EditUser,
    Settings,
    Back,
}

impl AdminItem {
    fn from_text(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "stats" => Some(AdminItem::Stats),
            "users" => Some(AdminItem::Users),
            "add points" => Some(AdminItem::AddPoints),
            "edit user" => Some(AdminItem::EditUser),
            "settings" => Some(AdminItem::Settings),
            "back" | "main menu" => Some(AdminItem::Back),
            _ => None,
        }
    }
}

/// The single ledger call a transition may make.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Status,
    Register(Profile),
    BeginPurchase,
    RecordPurchase(BigDecimal),
    BeginRedeem,
    CheckPoints(i64),
    Redeem { points: i64, purchase_amount: BigDecimal },
    Balance,
    History,
    Profile,
    SystemStatus,
    AdminStats,
    AdminUsers,
    AdminAdjust { account_id: i64, delta: i64 },
    AdminInspect(i64),
    AdminBirthday(i64),
    AdminDeactivate(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Account(Account),
    Registered(Registration),
    Purchase(PurchaseReceipt),
    Redemption(RedemptionReceipt),
    History(Vec<Transaction>),
    Stats(LedgerStats),
    Accounts(Vec<Account>, i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    WelcomeBack(Account),
    AskPhone,
    AskName,
    AskGender { name: String },
    Registered(Account),
    NotRegistered,
    AskPurchaseAmount,
    InvalidAmount,
    PurchaseRecorded(PurchaseReceipt),
    AskSpendPoints { balance: i64 },
    InvalidPoints,
    InsufficientBalance { balance: i64 },
    AskSpendPurchaseAmount { points: i64 },
    Redeemed { receipt: RedemptionReceipt, purchase_amount: BigDecimal },
    Balance(Account),
    History(Vec<Transaction>),
    Profile(Account),
    Rules,
    Help,
    Menu,
    Cancelled,
    NothingToCancel,
    SystemStatus(LedgerStats),
    AdminWelcome,
    AdminDenied,
    AdminStats(LedgerStats),
    AdminUsers { accounts: Vec<Account>, total: i64 },
    AskAdjustment,
    InvalidAdjustment,
    Adjusted { account: Account, delta: i64 },
    AskEditTarget,
    InvalidAccountId,
    AccountMissing,
    AdminAccount(Account),
    BirthdayGranted(Account),
    Deactivated(Account),
    AdminSettings,
    BackToMain,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Reply { next: Session, reply: Reply },
    Call(Call),
}

fn reply(next: Session, reply: Reply) -> Step {
    Step::Reply { next, reply }
}

/// Accepts `1500`, `1500.50` and `1500,50` within the ledger's amount bounds.
pub fn parse_amount(text: &str) -> Option<BigDecimal> {
    points::parse_amount(&text.replace(',', ".")).ok()
}

pub fn parse_points(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok().filter(|p| *p > 0)
}

fn parse_adjustment(text: &str) -> Option<(i64, i64)> {
    let mut parts = text.split_whitespace();
    let account_id = parts.next()?.parse::<i64>().ok().filter(|id| *id > 0)?;
    let delta = parts.next()?.parse::<i64>().ok().filter(|d| *d != 0)?;
    parts.next().is_none().then_some((account_id, delta))
}

// "<id>", "<id> birthday" or "<id> deactivate"
fn parse_edit_target(text: &str) -> Option<Call> {
    let mut parts = text.split_whitespace();
    let account_id = parts.next()?.parse::<i64>().ok().filter(|id| *id > 0)?;
    let call = match parts.next().map(str::to_lowercase).as_deref() {
        None => Call::AdminInspect(account_id),
        Some("birthday") => Call::AdminBirthday(account_id),
        Some("deactivate") => Call::AdminDeactivate(account_id),
        Some(_) => return None,
    };
    parts.next().is_none().then_some(call)
}

fn normalize_gender(text: &str) -> String {
    match text.trim().to_lowercase().as_str() {
        "m" | "male" | "man" => "male".to_string(),
        "f" | "female" | "woman" => "female".to_string(),
        _ => text.trim().to_string(),
    }
}

/// Decides what an input does in the current session.
pub fn plan(session: &Session, input: &Input, is_admin: bool) -> Step {
    // privilege revoked while inside the admin menu
    if session.admin && !is_admin {
        return reply(Session::default(), Reply::AdminDenied);
    }

    let text = match input {
        Input::Command(Command::Cancel) => {
            return if session.state == State::Idle {
                reply(session.clone(), Reply::NothingToCancel)
            } else {
                reply(session.home(), Reply::Cancelled)
            };
        }
        Input::Command(Command::Start) => return Step::Call(Call::Status),
        Input::Command(Command::Admin) => {
            return if is_admin {
                reply(
                    Session {
                        state: State::AdminMenu,
                        admin: true,
                    },
                    Reply::AdminWelcome,
                )
            } else {
                reply(session.clone(), Reply::AdminDenied)
            };
        }
        Input::Command(Command::Help) => return reply(session.clone(), Reply::Help),
        Input::Command(Command::Status) => return Step::Call(Call::SystemStatus),
        Input::Contact(phone) if session.state == State::AwaitingPhone => {
            return reply(session.to(State::AwaitingName { phone: phone.clone() }), Reply::AskName);
        }
        Input::Contact(text) | Input::Text(text) => text.trim(),
    };

    match &session.state {
        State::Idle => match MenuItem::from_text(text) {
            Some(MenuItem::Balance) => Step::Call(Call::Balance),
            Some(MenuItem::History) => Step::Call(Call::History),
            Some(MenuItem::AddPurchase) => Step::Call(Call::BeginPurchase),
            Some(MenuItem::Redeem) => Step::Call(Call::BeginRedeem),
            Some(MenuItem::Profile) => Step::Call(Call::Profile),
            Some(MenuItem::Rules) => reply(session.clone(), Reply::Rules),
            Some(MenuItem::Help) => reply(session.clone(), Reply::Help),
            None => reply(session.clone(), Reply::Menu),
        },
        State::AwaitingPhone => {
            if text.is_empty() {
                reply(session.clone(), Reply::AskPhone)
            } else {
                reply(session.to(State::AwaitingName { phone: text.to_string() }), Reply::AskName)
            }
        }
        State::AwaitingName { phone } => {
            if text.is_empty() {
                reply(session.clone(), Reply::AskName)
            } else {
                reply(
                    session.to(State::AwaitingGender {
                        phone: phone.clone(),
                        name: text.to_string(),
                    }),
                    Reply::AskGender { name: text.to_string() },
                )
            }
        }
        State::AwaitingGender { phone, name } => {
            if text.is_empty() {
                return reply(session.clone(), Reply::AskGender { name: name.clone() });
            }
            Step::Call(Call::Register(Profile {
                display_name: Some(name.clone()),
                contact: Some(phone.clone()),
                category: Some(normalize_gender(text)),
            }))
        }
        State::AwaitingPurchaseAmount => match parse_amount(text) {
            Some(amount) => Step::Call(Call::RecordPurchase(amount)),
            None => reply(session.clone(), Reply::InvalidAmount),
        },
        State::AwaitingSpendPoints => match parse_points(text) {
            Some(points) => Step::Call(Call::CheckPoints(points)),
            None => reply(session.clone(), Reply::InvalidPoints),
        },
        State::AwaitingSpendPurchaseAmount { points } => match parse_amount(text) {
            Some(purchase_amount) => Step::Call(Call::Redeem {
                points: *points,
                purchase_amount,
            }),
            None => reply(session.clone(), Reply::InvalidAmount),
        },
        State::AdminMenu => match AdminItem::from_text(text) {
            Some(AdminItem::Stats) => Step::Call(Call::AdminStats),
            Some(AdminItem::Users) => Step::Call(Call::AdminUsers),
            Some(AdminItem::AddPoints) => reply(session.to(State::AdminAwaitingAddPoints), Reply::AskAdjustment),
            Some(AdminItem::EditUser) => reply(session.to(State::AdminAwaitingEditTarget), Reply::AskEditTarget),
            Some(AdminItem::Settings) => reply(session.clone(), Reply::AdminSettings),
            Some(AdminItem::Back) => reply(Session::default(), Reply::BackToMain),
            None => reply(session.clone(), Reply::AdminWelcome),
        },
        State::AdminAwaitingAddPoints => match parse_adjustment(text) {
            Some((account_id, delta)) => Step::Call(Call::AdminAdjust { account_id, delta }),
            None => reply(session.clone(), Reply::InvalidAdjustment),
        },
        State::AdminAwaitingEditTarget => match parse_edit_target(text) {
            Some(call) => Step::Call(call),
            None => reply(session.clone(), Reply::InvalidAccountId),
        },
    }
}

/// Resolves the session and reply once `call` has run. Errors never leave
/// flow data behind: they either re-prompt in the same state or return home.
pub fn settle(session: &Session, call: &Call, result: LedgerResult<Outcome>) -> (Session, Reply) {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => return settle_error(session, call, e),
    };

    match (call, outcome) {
        (Call::Status, Outcome::Account(account)) => (session.home(), Reply::WelcomeBack(account)),
        (Call::Register(_), Outcome::Registered(registration)) => {
            (session.home(), Reply::Registered(registration.account))
        }
        (Call::BeginPurchase, Outcome::Account(_)) => {
            (session.to(State::AwaitingPurchaseAmount), Reply::AskPurchaseAmount)
        }
        (Call::RecordPurchase(_), Outcome::Purchase(receipt)) => (session.home(), Reply::PurchaseRecorded(receipt)),
        (Call::BeginRedeem, Outcome::Account(account)) => (
            session.to(State::AwaitingSpendPoints),
            Reply::AskSpendPoints {
                balance: account.balance,
            },
        ),
        (Call::CheckPoints(points), Outcome::Account(account)) => {
            if *points > account.balance {
                (
                    session.to(State::AwaitingSpendPoints),
                    Reply::InsufficientBalance {
                        balance: account.balance,
                    },
                )
            } else {
                (
                    session.to(State::AwaitingSpendPurchaseAmount { points: *points }),
                    Reply::AskSpendPurchaseAmount { points: *points },
                )
            }
        }
        (Call::Redeem { purchase_amount, .. }, Outcome::Redemption(receipt)) => (
            session.home(),
            Reply::Redeemed {
                receipt,
                purchase_amount: purchase_amount.clone(),
            },
        ),
        (Call::Balance, Outcome::Account(account)) => (session.clone(), Reply::Balance(account)),
        (Call::History, Outcome::History(transactions)) => (session.clone(), Reply::History(transactions)),
        (Call::Profile, Outcome::Account(account)) => (session.clone(), Reply::Profile(account)),
        (Call::SystemStatus, Outcome::Stats(stats)) => (session.clone(), Reply::SystemStatus(stats)),
        (Call::AdminStats, Outcome::Stats(stats)) => (session.to(State::AdminMenu), Reply::AdminStats(stats)),
        (Call::AdminUsers, Outcome::Accounts(accounts, total)) => {
            (session.to(State::AdminMenu), Reply::AdminUsers { accounts, total })
        }
        (Call::AdminAdjust { delta, .. }, Outcome::Account(account)) => (
            session.to(State::AdminMenu),
            Reply::Adjusted {
                account,
                delta: *delta,
            },
        ),
        (Call::AdminInspect(_), Outcome::Account(account)) => (session.to(State::AdminMenu), Reply::AdminAccount(account)),
        (Call::AdminBirthday(_), Outcome::Account(account)) => {
            (session.to(State::AdminMenu), Reply::BirthdayGranted(account))
        }
        (Call::AdminDeactivate(_), Outcome::Account(account)) => (session.to(State::AdminMenu), Reply::Deactivated(account)),
        _ => (session.home(), Reply::Failure),
    }
}

fn settle_error(session: &Session, call: &Call, error: LedgerError) -> (Session, Reply) {
    match (call, error) {
        (Call::Status, LedgerError::NotFound) => (session.to(State::AwaitingPhone), Reply::AskPhone),
        (Call::RecordPurchase(_), LedgerError::InvalidAmount(_)) => (session.clone(), Reply::InvalidAmount),
        (Call::Redeem { .. }, LedgerError::InsufficientBalance { balance, .. }) => (
            session.to(State::AwaitingSpendPoints),
            Reply::InsufficientBalance { balance },
        ),
        (Call::Redeem { .. }, LedgerError::InvalidAmount(_)) => (session.clone(), Reply::InvalidAmount),
        (Call::Redeem { .. }, LedgerError::InvalidPoints(_)) => {
            (session.to(State::AwaitingSpendPoints), Reply::InvalidPoints)
        }
        (
            Call::AdminAdjust { .. } | Call::AdminInspect(_) | Call::AdminBirthday(_) | Call::AdminDeactivate(_),
            LedgerError::NotFound,
        ) => {
            (session.clone(), Reply::AccountMissing)
        }
        (Call::AdminAdjust { .. }, LedgerError::InsufficientBalance { balance, .. }) => {
            (session.clone(), Reply::InsufficientBalance { balance })
        }
        (Call::AdminAdjust { .. }, LedgerError::InvalidPoints(_)) => (session.clone(), Reply::InvalidAdjustment),
        (_, LedgerError::NotFound) => (session.home(), Reply::NotRegistered),
        (_, _) => (session.home(), Reply::Failure),
    }
}
