use actix_web::{HttpResponse, web};
use uuid::Uuid;

use super::AppState;
use crate::{
    auth::UserContext,
    currency::Currency,
    error::ApiError,
    exchange_rate::Conversion,
    metrics::Metrics,
    models::{ConversionRequest, ConversionResponse},
    store::NewConversion,
};

const CONVERSION_TABLE: &str = "conversion_history";
/// Metric label for codes that are not supported currencies.
pub const INVALID_CODE_LABEL: &str = "invalid";

fn label(code: &str) -> &'static str {
    code.parse::<Currency>()
        .map_or(INVALID_CODE_LABEL, |currency| currency.code())
}

fn resolve(
    state: &AppState,
    request: &ConversionRequest,
    request_id: Uuid,
) -> Result<Conversion, ApiError> {
    let parse = |code: &str| {
        code.parse::<Currency>()
            .map_err(|source| ApiError::InvalidCurrency {
                source,
                request_id: Some(request_id),
            })
    };

    let from = parse(&request.from_currency)?;
    let to = parse(&request.to_currency)?;

    state
        .rates
        .convert(request.amount, from, to)
        .map_err(|source| ApiError::InvalidAmount {
            source,
            request_id: Some(request_id),
        })
}

pub async fn convert(
    user: UserContext,
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
    body: web::Json<ConversionRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let request_id = request.request_id.unwrap_or_else(Uuid::now_v7);

    let conversion = match resolve(&state, &request, request_id) {
        Ok(conversion) => conversion,
        Err(e) => {
            metrics.record_conversion(
                label(&request.from_currency),
                label(&request.to_currency),
                false,
            );
            log::warn!(
                "Conversion {request_id} rejected for user {} (account {}): {e}",
                user.user_id,
                user.account_id
            );
            return Err(e);
        }
    };

    metrics.record_conversion(conversion.from.code(), conversion.to.code(), true);

    let response = ConversionResponse::new(conversion, request_id);
    let record = NewConversion {
        id: response.conversion_id,
        request_id: Some(request_id),
        amount: response.amount,
        from_currency: response.from_currency,
        to_currency: response.to_currency,
        converted_amount: response.converted_amount,
        exchange_rate: response.exchange_rate,
        account_id: user.account_id.clone(),
        user_id: user.user_id.clone(),
        converted_at: response.conversion_timestamp,
    };

    let stored = state.store.insert_conversion(&record).await;
    metrics.record_database_operation("insert", CONVERSION_TABLE, stored.is_ok());
    stored?;

    log::info!(
        "Converted {} {} to {} {} for user {} (account {})",
        response.amount,
        response.from_currency,
        response.converted_amount,
        response.to_currency,
        user.user_id,
        user.account_id
    );

    Ok(HttpResponse::Ok().json(response))
}
