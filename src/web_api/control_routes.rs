//! Control-plane endpoints

use super::{run_blocking, QueryParams};
use crate::camera_driver::{PllConfig, SensorWindow};
use crate::control_plane::CommandOutcome;
use crate::error::Result;
use crate::models::StatusReport;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::collections::HashMap;

/// GET /control?var=<name>&val=<int>
///
/// A missing `val` counts as 0, like any other unparseable value.
pub async fn control(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    let params = QueryParams::new(query)?;
    let variable = params.required("var")?.to_string();
    let value = params.get("val").unwrap_or_default().to_string();

    let control = state.control.clone();
    let outcome = run_blocking(move || control.handle(&variable, &value)).await?;

    Ok(match outcome {
        CommandOutcome::Applied => StatusCode::OK.into_response(),
        CommandOutcome::Acknowledged(body) => Json(body).into_response(),
        CommandOutcome::Restart(body) => {
            // Restart runs from main after the configured delay
            state.restart.request();
            Json(body).into_response()
        }
    })
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusReport>> {
    let control = state.control.clone();
    let report = run_blocking(move || Ok(control.status())).await?;
    Ok(Json(report))
}

/// GET /xclk?xclk=<MHz>
pub async fn xclk(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let params = QueryParams::new(query)?;
    let mhz = params.required_int("xclk")?;

    let control = state.control.clone();
    run_blocking(move || control.set_xclk(mhz)).await?;
    Ok(StatusCode::OK)
}

/// GET /reg?reg=<addr>&mask=<mask>&val=<value>
pub async fn set_register(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let params = QueryParams::new(query)?;
    let reg = params.required_int("reg")?;
    let mask = params.required_int("mask")?;
    let value = params.required_int("val")?;

    let control = state.control.clone();
    run_blocking(move || control.set_register(reg, mask, value)).await?;
    Ok(StatusCode::OK)
}

/// GET /greg?reg=<addr>&mask=<mask> - register value as decimal text
pub async fn get_register(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    let params = QueryParams::new(query)?;
    let reg = params.required_int("reg")?;
    let mask = params.required_int("mask")?;

    let control = state.control.clone();
    let value = run_blocking(move || control.get_register(reg, mask)).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], value.to_string()).into_response())
}

/// GET /pll - every missing parameter defaults to 0
pub async fn pll(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let params = QueryParams::new(query)?;
    let pll = PllConfig {
        bypass: params.int_or_zero("bypass"),
        multiplier: params.int_or_zero("mul"),
        sys_div: params.int_or_zero("sys"),
        root_div: params.int_or_zero("root"),
        pre_div: params.int_or_zero("pre"),
        seld5: params.int_or_zero("seld5"),
        pclk_enable: params.int_or_zero("pclken"),
        pclk_div: params.int_or_zero("pclk"),
    };

    let control = state.control.clone();
    run_blocking(move || control.set_pll(&pll)).await?;
    Ok(StatusCode::OK)
}

/// GET /resolution - raw sensor window; missing parameters default to 0
pub async fn resolution(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode> {
    let params = QueryParams::new(query)?;
    let window = SensorWindow {
        start_x: params.int_or_zero("sx"),
        start_y: params.int_or_zero("sy"),
        end_x: params.int_or_zero("ex"),
        end_y: params.int_or_zero("ey"),
        offset_x: params.int_or_zero("offx"),
        offset_y: params.int_or_zero("offy"),
        total_x: params.int_or_zero("tx"),
        total_y: params.int_or_zero("ty"),
        output_x: params.int_or_zero("ox"),
        output_y: params.int_or_zero("oy"),
        scale: params.int_or_zero("scale") == 1,
        binning: params.int_or_zero("binning") == 1,
    };

    let control = state.control.clone();
    run_blocking(move || control.set_window(&window)).await?;
    Ok(StatusCode::OK)
}
