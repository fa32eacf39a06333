use serde_json::json;
use tanda_core::calendar::format_timestamp;
use tanda_core::stats::{tanda_report, tanda_statistics, ReportFormat};

use super::to_value;
use crate::context::ApiContext;
use crate::http::{json_response, success, ApiError, ApiGatewayResponse, ApiRequest};

pub fn statistics(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    let participants = repo.participants(tanda_id)?;
    let payments = repo.payments(tanda_id)?;

    let report = tanda_statistics(&tanda, &participants, &payments, ctx.now);
    tracing::debug!(
        component = "statistics",
        event = "statistics_computed",
        tanda_id,
        participants = participants.len(),
        payments = payments.len()
    );
    success(200, report)
}

/// Full export of a tanda. Only `json` is rendered; `pdf` and `excel` hand
/// back the same data for client-side rendering.
pub fn report(ctx: &ApiContext, request: &ApiRequest) -> Result<ApiGatewayResponse, ApiError> {
    let claims = ctx.authenticate(request)?;
    let tanda_id = request.path_param("tandaId")?;
    let repo = ctx.repo();
    let tanda = repo.owned_tanda(tanda_id, &claims.id)?;
    let format = ReportFormat::parse(request.query_param("formato").unwrap_or("json"))
        .map_err(|error| ApiError::bad_request("INVALID_FORMAT", error.message()))?;

    let participants = repo.participants(tanda_id)?;
    let payments = repo.payments(tanda_id)?;
    let report = tanda_report(&tanda, &participants, &payments, ctx.now);
    tracing::info!(
        component = "statistics",
        event = "report_generated",
        tanda_id,
        format = format.as_str(),
        generated_at = %format_timestamp(ctx.now)
    );

    match format {
        ReportFormat::Json => success(200, report),
        ReportFormat::Pdf | ReportFormat::Excel => Ok(json_response(
            200,
            json!({
                "success": true,
                "message": format!("Generación de {} no implementada aún", format.as_str()),
                "data": to_value(&report)?,
                "note": "Usa formato=json para obtener los datos y procesarlos en el frontend",
            }),
        )),
    }
}
