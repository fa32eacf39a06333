//! Maps API Gateway HTTP API route keys onto resource handlers.

use serde_json::Value;

use super::{auth, links, notifications, participants, payments, recovery, statistics, tandas};
use crate::context::ApiContext;
use crate::http::{invalid_route, preflight, ApiError, ApiGatewayResponse, ApiRequest};

type Handler = fn(&ApiContext, &ApiRequest) -> Result<ApiGatewayResponse, ApiError>;

fn route(route_key: &str) -> Option<Handler> {
    let handler: Handler = match route_key {
        "POST /auth/register" => auth::register,
        "PUT /auth/register" => auth::request_deletion,
        "POST /auth/login" => auth::login,
        "POST /auth/refresh" => auth::refresh,
        "DELETE /auth/account" => auth::delete_account,
        "POST /auth/forgot-password" => recovery::forgot_password,
        "POST /auth/reset-password" => recovery::reset_password,
        "POST /auth/change-password" => recovery::change_password,

        "POST /tandas" => tandas::create,
        "GET /tandas" => tandas::list,
        "GET /tandas/{tandaId}" => tandas::get,
        "PUT /tandas/{tandaId}" => tandas::update,
        "DELETE /tandas/{tandaId}" => tandas::delete,

        "POST /tandas/{tandaId}/registro-link" => links::create,
        "GET /tandas/{tandaId}/registro-link/activo" => links::active,
        "GET /registro/{token}" => links::registration_info,
        "POST /registro/{token}" => participants::register,

        "POST /tandas/{tandaId}/participantes" => participants::create,
        "GET /tandas/{tandaId}/participantes" => participants::list,
        "PUT /tandas/{tandaId}/participantes/{participanteId}" => participants::update,
        "DELETE /tandas/{tandaId}/participantes/{participanteId}" => participants::delete,

        "POST /tandas/{tandaId}/pagos" => payments::create,
        "GET /tandas/{tandaId}/pagos" => payments::history,
        "GET /tandas/{tandaId}/pagos/matriz" => payments::matrix,
        "PUT /tandas/{tandaId}/pagos/{pagoId}" => payments::update,

        "GET /tandas/{tandaId}/estadisticas" => statistics::statistics,
        "GET /tandas/{tandaId}/reporte" => statistics::report,

        "POST /tandas/{tandaId}/notificaciones/recordatorio" => notifications::remind,
        "POST /tandas/{tandaId}/notificaciones/recordatorio-masivo" => notifications::remind_all,
        "GET /tandas/{tandaId}/notificaciones" => notifications::list,
        _ => return None,
    };
    Some(handler)
}

/// Entry point of the API function: preflight, dispatch, and the error
/// envelope for anything a handler rejects.
pub fn handle_api_event(event: &Value, ctx: &ApiContext) -> ApiGatewayResponse {
    let request = match ApiRequest::from_event(event) {
        Ok(request) => request,
        Err(error) => return error.into_response("unparsed"),
    };
    if request.method == "OPTIONS" {
        return preflight();
    }

    let Some(handler) = route(&request.route_key) else {
        tracing::info!(
            component = "router",
            event = "route_not_found",
            route = %request.route_key
        );
        return invalid_route();
    };

    tracing::debug!(component = "router", event = "dispatch", route = %request.route_key);
    handler(ctx, &request).unwrap_or_else(|error| error.into_response(&request.route_key))
}
