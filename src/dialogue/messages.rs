use std::fmt::Write;

use crate::database::{Account, Transaction};
use crate::dialogue::state::Reply;
use crate::points::PointsPolicy;
use crate::service::PurchaseReceipt;

const MENU: &str = "Menu: balance, history, add purchase, redeem, profile, rules, help.";
const ADMIN_MENU: &str = "Admin menu: stats, users, add points, edit user, settings, back.";

/// Sent to the account owner when a terminal reports a purchase.
pub fn purchase_notice(receipt: &PurchaseReceipt) -> String {
    format!(
        "Purchase of {} recorded. You earned {} points, balance is now {}.",
        receipt.amount, receipt.points_earned, receipt.balance
    )
}

fn account_summary(account: &Account, policy: &PointsPolicy) -> String {
    format!(
        "Balance: {} points (available discount {}%).\nYour code: {}",
        account.balance,
        policy.percent_for(account.balance),
        account.public_code
    )
}

fn history_line(tx: &Transaction) -> String {
    let sign = if tx.points_delta > 0 { "+" } else { "" };
    format!(
        "{} {}{} {}",
        tx.created_at.format("%d.%m.%Y %H:%M"),
        sign,
        tx.points_delta,
        tx.note
    )
}

/// Code to render as an image next to the reply text.
pub fn attachment(reply: &Reply) -> Option<&str> {
    match reply {
        Reply::WelcomeBack(account) | Reply::Registered(account) | Reply::Balance(account) => {
            Some(account.public_code.as_str())
        }
        _ => None,
    }
}

pub fn render(reply: &Reply, policy: &PointsPolicy) -> String {
    match reply {
        Reply::WelcomeBack(account) => format!("Welcome back!\n{}", account_summary(account, policy)),
        Reply::AskPhone => "Welcome! To join the loyalty program, share your phone number.".to_string(),
        Reply::AskName => "What is your name?".to_string(),
        Reply::AskGender { name } => format!("Nice to meet you, {name}. Your gender (male / female)?"),
        Reply::Registered(account) => format!(
            "You are registered! {} welcome points are on your account.\n{}",
            policy.welcome_bonus,
            account_summary(account, policy)
        ),
        Reply::NotRegistered => "You are not registered yet. Send /start to join.".to_string(),
        Reply::AskPurchaseAmount => "Enter the purchase amount.".to_string(),
        Reply::InvalidAmount => "Please enter a positive amount, for example 1500 or 1500.50.".to_string(),
        Reply::PurchaseRecorded(receipt) => purchase_notice(receipt),
        Reply::AskSpendPoints { balance } => format!(
            "You have {balance} points. How many do you want to spend? A discount covers at most {}% of a purchase.",
            policy.max_discount_pct
        ),
        Reply::InvalidPoints => "Please enter a whole positive number of points.".to_string(),
        Reply::InsufficientBalance { balance } => {
            format!("Not enough points: your balance is {balance}. Enter a smaller number.")
        }
        Reply::AskSpendPurchaseAmount { points } => {
            format!("Enter the amount of the purchase to apply {points} points to.")
        }
        Reply::Redeemed {
            receipt,
            purchase_amount,
        } => format!(
            "Spent {} points for a {}% discount on {}. Balance: {} points.",
            receipt.points_spent, receipt.discount_pct, purchase_amount, receipt.balance
        ),
        Reply::Balance(account) => account_summary(account, policy),
        Reply::History(transactions) if transactions.is_empty() => "No transactions yet.".to_string(),
        Reply::History(transactions) => {
            let mut text = "Recent transactions:".to_string();
            for tx in transactions {
                let _ = write!(text, "\n{}", history_line(tx));
            }
            text
        }
        Reply::Profile(account) => format!(
            "Name: {}\nPhone: {}\nGender: {}\nRegistered: {}\nTotal spent: {}\nPoints earned: {}\n{}",
            account.profile.display_name.as_deref().unwrap_or("-"),
            account.profile.contact.as_deref().unwrap_or("-"),
            account.profile.category.as_deref().unwrap_or("-"),
            account.created_at.format("%d.%m.%Y"),
            account.lifetime_spend,
            account.lifetime_points,
            account_summary(account, policy)
        ),
        Reply::Rules => rules(policy),
        Reply::Help => format!("Send /start to register, /cancel to stop the current step.\n{MENU}"),
        Reply::Menu => MENU.to_string(),
        Reply::Cancelled => "Cancelled.".to_string(),
        Reply::NothingToCancel => format!("Nothing to cancel.\n{MENU}"),
        Reply::SystemStatus(stats) => format!(
            "Ledger is up. {} active accounts, {} points outstanding.",
            stats.accounts, stats.total_balance
        ),
        Reply::AdminWelcome => ADMIN_MENU.to_string(),
        Reply::AdminDenied => "This command is for administrators only.".to_string(),
        Reply::AdminStats(stats) => format!(
            "Accounts: {}\nTotal spend: {}\nAverage spend: {}\nPoints outstanding: {}",
            stats.accounts, stats.total_spend, stats.average_spend, stats.total_balance
        ),
        Reply::AdminUsers { accounts, total } => {
            let mut text = format!("Accounts ({} of {total}):", accounts.len());
            for account in accounts {
                let _ = write!(
                    text,
                    "\n#{} {} {} {} points",
                    account.account_id,
                    account.public_code,
                    account.profile.display_name.as_deref().unwrap_or("-"),
                    account.balance
                );
            }
            text
        }
        Reply::AskAdjustment => "Send \"<account id> <points>\", points may be negative.".to_string(),
        Reply::InvalidAdjustment => "Expected \"<account id> <points>\", for example \"12 500\".".to_string(),
        Reply::Adjusted { account, delta } => format!(
            "Account #{} adjusted by {delta}, balance is now {}.",
            account.account_id, account.balance
        ),
        Reply::AskEditTarget => {
            "Send an account id to inspect it, or \"<id> birthday\" / \"<id> deactivate\".".to_string()
        }
        Reply::InvalidAccountId => "An account id is a positive number.".to_string(),
        Reply::AccountMissing => "No such account.".to_string(),
        Reply::AdminAccount(account) => format!(
            "Account #{} ({})\nExternal id: {}\nActive: {}\n{}",
            account.account_id,
            account.profile.display_name.as_deref().unwrap_or("-"),
            account.external_id,
            account.active,
            account_summary(account, policy)
        ),
        Reply::BirthdayGranted(account) => format!(
            "Birthday bonus of {} points granted to #{}, balance is now {}.",
            policy.birthday_bonus, account.account_id, account.balance
        ),
        Reply::Deactivated(account) => format!("Account #{} deactivated.", account.account_id),
        Reply::AdminSettings => format!("{}\n{ADMIN_MENU}", rules(policy)),
        Reply::BackToMain => MENU.to_string(),
        Reply::Failure => "Something went wrong, please try again later.".to_string(),
    }
}

fn rules(policy: &PointsPolicy) -> String {
    format!(
        "You earn {}% of every purchase as points.\nOne point is worth {}% of discount, up to {}% of a purchase.\nWelcome bonus: {} points. Birthday bonus: {} points.",
        &policy.earn_rate * bigdecimal::BigDecimal::from(100),
        &policy.redeem_rate,
        policy.max_discount_pct,
        policy.welcome_bonus,
        policy.birthday_bonus
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Profile;
    use crate::service::tests::dec;

    fn account() -> Account {
        Account {
            account_id: 7,
            external_id: "tg-7".into(),
            profile: Profile::default(),
            public_code: crate::public_code::for_account(7),
            lifetime_spend: dec("1500"),
            lifetime_points: 175,
            balance: 175,
            active: true,
            created_at: chrono::NaiveDateTime::from_timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn purchase_notice_mentions_points_and_balance() {
        let receipt = PurchaseReceipt {
            account: account(),
            amount: dec("1500.00"),
            points_earned: 75,
            balance: 175,
        };
        let text = purchase_notice(&receipt);
        assert!(text.contains("1500.00"));
        assert!(text.contains("75 points"));
        assert!(text.contains("175"));
    }

    #[test]
    fn welcome_and_balance_attach_the_code() {
        let policy = PointsPolicy::default();
        let reply = Reply::WelcomeBack(account());
        assert_eq!(attachment(&reply), Some("007-790"));
        assert!(render(&reply, &policy).contains("007-790"));
        assert_eq!(attachment(&Reply::Menu), None);
    }

    #[test]
    fn balance_shows_available_discount() {
        let text = render(&Reply::Balance(account()), &PointsPolicy::default());
        assert!(text.contains("175 points"));
        assert!(text.contains("1.75%"));
    }

    #[test]
    fn profile_shows_registration_date() {
        let mut account = account();
        account.created_at = chrono::NaiveDate::from_ymd_opt(2023, 3, 8)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let text = render(&Reply::Profile(account), &PointsPolicy::default());
        assert!(text.contains("Registered: 08.03.2023"), "{text}");
    }

    #[test]
    fn empty_history_says_so() {
        assert_eq!(
            render(&Reply::History(vec![]), &PointsPolicy::default()),
            "No transactions yet."
        );
    }
}
