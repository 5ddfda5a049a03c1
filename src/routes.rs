use actix_request_identifier::RequestId;
use actix_web::{get, http::header, post, web, HttpResponse};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, instrument};

use crate::dialogue::{Dialogue, Input};
use crate::error::LedgerError;
use crate::responses;
use crate::service::AccountService;
use crate::webhook::{WebhookIngestion, WebhookOutcome};

const BALANCE_HISTORY: i64 = 5;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_handler)
        .service(webhook_handler)
        .service(chat_handler)
        .service(balance_handler);
}

#[get("/health")]
#[instrument(skip(service), fields(request_id = request_id.as_str()))]
pub async fn health_handler(service: web::Data<AccountService>, request_id: RequestId) -> HttpResponse {
    let ping = web::block(move || service.ping()).await;
    let body = match ping {
        Ok(Ok(())) => json!({"status": "healthy", "database": "connected"}),
        Ok(Err(e)) => {
            error!("health check failed: {e}");
            json!({"status": "unhealthy", "error": e.to_string()})
        }
        Err(e) => {
            error!("{e}");
            json!({"status": "unhealthy", "error": e.to_string()})
        }
    };
    HttpResponse::Ok().json(body)
}

/// Terminals retry on anything but 200, so every outcome is a 200.
#[post("/webhook/purchase")]
#[instrument(skip(ingestion, body), fields(request_id = request_id.as_str()))]
pub async fn webhook_handler(
    ingestion: web::Data<WebhookIngestion>,
    request_id: RequestId,
    body: Bytes,
) -> HttpResponse {
    let outcome = web::block(move || ingestion.handle(&body))
        .await
        .unwrap_or_else(|e| {
            error!("{e}");
            WebhookOutcome::Error {
                message: "ledger unavailable".to_string(),
            }
        });
    HttpResponse::Ok().json(outcome)
}

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl ChatInput {
    fn into_input(self) -> Option<Input> {
        let contact = self.contact.filter(|c| !c.trim().is_empty());
        match (contact, self.text) {
            (Some(contact), _) => Some(Input::Contact(contact.trim().to_string())),
            (None, Some(text)) => Some(Input::parse(&text)),
            (None, None) => None,
        }
    }
}

#[post("/chat/{external_id}")]
#[instrument(skip(dialogue, chat_input), fields(request_id = request_id.as_str()))]
pub async fn chat_handler(
    dialogue: web::Data<Dialogue>,
    request_id: RequestId,
    external_id: web::Path<String>,
    chat_input: web::Json<ChatInput>,
) -> HttpResponse {
    let external_id = external_id.into_inner();
    if external_id.trim().is_empty() {
        return responses::bad_parameter_http_response("external_id", false);
    }
    let input = match chat_input.into_inner().into_input() {
        Some(input) => input,
        None => return responses::bad_parameter_http_response("text", false),
    };

    match web::block(move || dialogue.handle(&external_id, input)).await {
        Ok(outbound) => HttpResponse::Ok().json(outbound),
        Err(e) => {
            error!("{e}");
            responses::internal_error_http_response(false)
        }
    }
}

#[get("/balance/{public_code}")]
#[instrument(skip(service, accept), fields(request_id = request_id.as_str()))]
pub async fn balance_handler(
    service: web::Data<AccountService>,
    request_id: RequestId,
    accept: Option<web::Header<header::Accept>>,
    public_code: web::Path<String>,
) -> HttpResponse {
    let is_protobuf = responses::wants_protobuf(&accept);
    let public_code = public_code.into_inner();

    let lookup = web::block(move || {
        let account = service.account_by_code(&public_code)?;
        let recent = service.history(account.account_id, BALANCE_HISTORY)?;
        let discount_pct = service.available_discount(&account);
        Ok::<_, LedgerError>((account, recent, discount_pct))
    })
    .await;

    match lookup {
        Ok(Ok((account, recent, discount_pct))) => {
            responses::account_balance_http_response(&account, &recent, &discount_pct, is_protobuf)
        }
        Ok(Err(LedgerError::NotFound)) => responses::not_found_http_response(is_protobuf),
        Ok(Err(e)) => {
            error!("{e}");
            responses::internal_error_http_response(is_protobuf)
        }
        Err(e) => {
            error!("{e}");
            responses::internal_error_http_response(is_protobuf)
        }
    }
}
