use actix_web::http::header;
use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use prost::Message;

use crate::database::{Account, Transaction};
use crate::proto::{error, AccountBalanceData, BadParameterError, Error, GenericOutput, InternalError, NotFoundError};

const PROTOBUF: &str = "application/x-protobuf";

const NOT_FOUND_ERROR: Error = Error {
    one_error: Some(error::OneError::NotFound(NotFoundError {})),
};

const INTERNAL_ERROR: Error = Error {
    one_error: Some(error::OneError::Internal(InternalError {})),
};

pub fn wants_protobuf(accept: &Option<web::Header<header::Accept>>) -> bool {
    accept
        .as_ref()
        .map_or(false, |accept| accept.iter().any(|a| a.item.essence_str() == PROTOBUF))
}

fn encoded(data: GenericOutput, is_protobuf: bool) -> HttpResponse {
    if is_protobuf {
        HttpResponse::Ok().content_type(PROTOBUF).body(data.encode_to_vec())
    } else {
        HttpResponse::Ok().json(data)
    }
}

pub fn account_balance_http_response(
    account: &Account,
    recent: &[Transaction],
    discount_pct: &BigDecimal,
    is_protobuf: bool,
) -> HttpResponse {
    let data = GenericOutput {
        account_balance: Some(AccountBalanceData::new(account, recent, discount_pct.to_string())),
        ..Default::default()
    };
    encoded(data, is_protobuf)
}

pub fn not_found_http_response(is_protobuf: bool) -> HttpResponse {
    let data = GenericOutput {
        error: Some(NOT_FOUND_ERROR),
        ..Default::default()
    };
    encoded(data, is_protobuf)
}

pub fn internal_error_http_response(is_protobuf: bool) -> HttpResponse {
    let data = GenericOutput {
        error: Some(INTERNAL_ERROR),
        ..Default::default()
    };
    encoded(data, is_protobuf)
}

pub fn bad_parameter_http_response(field: &str, is_protobuf: bool) -> HttpResponse {
    let data = GenericOutput {
        error: Some(Error {
            one_error: Some(error::OneError::BadParameter(BadParameterError {
                name: field.to_string(),
            })),
        }),
        ..Default::default()
    };
    encoded(data, is_protobuf)
}
