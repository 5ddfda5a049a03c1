use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::error::LedgerError;
use crate::notify::{Notifier, Outbound};
use crate::points;
use crate::service::AccountService;

const ENVELOPE_FIELDS: [&str; 2] = ["document", "receipt"];
const AMOUNT_FIELDS: [&str; 3] = ["total", "sum", "amount"];
const EXTRA_FIELDS: [&str; 2] = ["extra", "additional"];
const CODE_FIELDS: [&str; 3] = ["clientCode", "qrCode", "customerCode"];

/// A purchase notification reduced to what the ledger needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseEvent {
    pub code: String,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ok { points: i64, balance: i64 },
    Ignored { reason: String },
    NotFound,
    Error { message: String },
}

// first non-empty scalar under any of `fields`, rendered as a string
fn scalar(object: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match object.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn object<'a>(parent: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .find_map(|field| parent.get(field).filter(|v| v.is_object()))
}

/// Locates the amount and customer code in a payload whose shape varies by
/// terminal firmware. Returns the reason when either is missing.
pub fn extract(payload: &Value) -> Result<PurchaseEvent, String> {
    if !payload.is_object() {
        return Err("payload is not an object".to_string());
    }
    let receipt = object(payload, &ENVELOPE_FIELDS).unwrap_or(payload);

    let amount = scalar(receipt, &AMOUNT_FIELDS).or_else(|| scalar(payload, &AMOUNT_FIELDS));
    let code = object(receipt, &EXTRA_FIELDS)
        .and_then(|extra| scalar(extra, &CODE_FIELDS))
        .or_else(|| scalar(payload, &CODE_FIELDS))
        .or_else(|| scalar(receipt, &CODE_FIELDS))
        .or_else(|| object(payload, &EXTRA_FIELDS).and_then(|extra| scalar(extra, &CODE_FIELDS)));

    let (amount, code) = match (amount, code) {
        (Some(amount), Some(code)) => (amount, code),
        (None, None) => return Err("missing customer code and amount".to_string()),
        (None, _) => return Err("missing amount".to_string()),
        (_, None) => return Err("missing customer code".to_string()),
    };
    let amount = points::parse_amount(&amount).map_err(|e| e.to_string())?;
    Ok(PurchaseEvent { code, amount })
}

pub fn parse(body: &[u8]) -> Result<PurchaseEvent, String> {
    let payload: Value = serde_json::from_slice(body).map_err(|_| "payload is not json".to_string())?;
    extract(&payload)
}

/// Stateless adapter between purchase terminals and the ledger.
#[derive(Clone)]
pub struct WebhookIngestion {
    service: AccountService,
    notifier: Notifier,
}

impl WebhookIngestion {
    pub fn new(service: AccountService, notifier: Notifier) -> Self {
        Self { service, notifier }
    }

    #[instrument(skip_all)]
    pub fn handle(&self, body: &[u8]) -> WebhookOutcome {
        let event = match parse(body) {
            Ok(event) => event,
            Err(reason) => {
                warn!(reason = reason.as_str(), "webhook ignored");
                return WebhookOutcome::Ignored { reason };
            }
        };

        let receipt = match self.service.record_purchase_by_code(&event.code, &event.amount) {
            Ok(receipt) => receipt,
            Err(LedgerError::NotFound) => {
                warn!(code = event.code.as_str(), "webhook for unknown customer");
                return WebhookOutcome::NotFound;
            }
            Err(e) if e.is_user_input() => {
                warn!(code = event.code.as_str(), "webhook ignored: {e}");
                return WebhookOutcome::Ignored { reason: e.to_string() };
            }
            Err(e) => {
                error!(code = event.code.as_str(), "webhook failed: {e}");
                return WebhookOutcome::Error {
                    message: "ledger unavailable".to_string(),
                };
            }
        };

        info!(
            account_id = receipt.account.account_id,
            points = receipt.points_earned,
            "terminal purchase applied"
        );
        // the ledger write is already committed, delivery is best effort
        self.notifier.enqueue(Outbound::text(
            receipt.account.external_id.clone(),
            crate::dialogue::messages::purchase_notice(&receipt),
        ));
        WebhookOutcome::Ok {
            points: receipt.points_earned,
            balance: receipt.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Profile;
    use crate::points::PointsPolicy;
    use crate::service::tests::{dec, service_with};
    use serde_json::json;

    #[test]
    fn extracts_from_receipt_envelope() {
        let payload = json!({"document": {"total": "1500.00", "extra": {"clientCode": "001-6b8"}}});
        assert_eq!(
            extract(&payload).unwrap(),
            PurchaseEvent {
                code: "001-6b8".into(),
                amount: dec("1500.00"),
            }
        );
    }

    #[test]
    fn extracts_alternate_field_names() {
        let payload = json!({"receipt": {"sum": 250, "additional": {"qrCode": "002-d47"}}});
        let event = extract(&payload).unwrap();
        assert_eq!(event.code, "002-d47");
        assert_eq!(event.amount, dec("250"));

        let flat = json!({"amount": 99.5, "clientCode": "003-4e0"});
        let event = extract(&flat).unwrap();
        assert_eq!(event.code, "003-4e0");
        assert_eq!(event.amount, dec("99.5"));
    }

    #[test]
    fn reports_why_payloads_are_ignored() {
        assert_eq!(extract(&json!({})).unwrap_err(), "missing customer code and amount");
        assert_eq!(extract(&json!({"total": 10})).unwrap_err(), "missing customer code");
        assert_eq!(extract(&json!({"clientCode": "x"})).unwrap_err(), "missing amount");
        assert!(extract(&json!({"total": "abc", "clientCode": "x"})).is_err());
        assert!(extract(&json!({"total": -5, "clientCode": "x"})).is_err());
        assert!(extract(&json!({"total": "", "clientCode": "x"})).is_err());
        assert!(extract(&json!([1, 2])).is_err());
        assert_eq!(parse(b"not json").unwrap_err(), "payload is not json");
    }

    fn ingestion() -> (WebhookIngestion, AccountService, tokio::sync::mpsc::Receiver<Outbound>) {
        let service = service_with(PointsPolicy::default());
        let (notifier, receiver) = Notifier::channel(8);
        (WebhookIngestion::new(service.clone(), notifier), service, receiver)
    }

    #[test]
    fn applies_purchase_and_queues_notification() {
        let (ingestion, service, mut receiver) = ingestion();
        let account = service.register("tg-1", Profile::default()).unwrap().account;
        let body = json!({"receipt": {"sum": "1500", "additional": {"qrCode": account.public_code}}});

        let outcome = ingestion.handle(body.to_string().as_bytes());
        assert_eq!(outcome, WebhookOutcome::Ok { points: 75, balance: 175 });

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.external_id, "tg-1");
        assert!(message.text.contains("75"));
    }

    #[test]
    fn unknown_code_is_not_found() {
        let (ingestion, _, mut receiver) = ingestion();
        let body = json!({"total": 10, "clientCode": crate::public_code::for_account(5)});
        assert_eq!(ingestion.handle(body.to_string().as_bytes()), WebhookOutcome::NotFound);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let (ingestion, _, _receiver) = ingestion();
        assert!(matches!(ingestion.handle(b"{}"), WebhookOutcome::Ignored { .. }));
        assert!(matches!(ingestion.handle(b"<xml/>"), WebhookOutcome::Ignored { .. }));
    }

    #[test]
    fn oversized_amount_is_ignored_without_echo() {
        let (ingestion, service, mut receiver) = ingestion();
        let account = service.register("tg-1", Profile::default()).unwrap().account;
        for total in ["1e500000", "0.001", "10000000000000"] {
            let body = json!({"total": total, "clientCode": account.public_code});
            match ingestion.handle(body.to_string().as_bytes()) {
                WebhookOutcome::Ignored { reason } => {
                    assert!(reason.starts_with("invalid amount"), "{reason}");
                    assert!(!reason.contains(total), "{reason}");
                }
                other => panic!("{total}: {other:?}"),
            }
        }
        assert_eq!(service.account_by_id(account.account_id).unwrap().balance, 100);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn notification_failure_does_not_undo_the_purchase() {
        let (ingestion, service, receiver) = ingestion();
        drop(receiver);
        let account = service.register("tg-1", Profile::default()).unwrap().account;
        let body = json!({"total": 100, "clientCode": account.public_code});
        assert_eq!(
            ingestion.handle(body.to_string().as_bytes()),
            WebhookOutcome::Ok { points: 5, balance: 105 }
        );
        assert_eq!(service.account_by_id(account.account_id).unwrap().balance, 105);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let body = serde_json::to_value(WebhookOutcome::Ok { points: 5, balance: 10 }).unwrap();
        assert_eq!(body, json!({"status": "ok", "points": 5, "balance": 10}));
        let body = serde_json::to_value(WebhookOutcome::NotFound).unwrap();
        assert_eq!(body, json!({"status": "not_found"}));
    }
}
