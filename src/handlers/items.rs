//! Item read handlers
//!
//! GET endpoints under /api/items. Nothing here writes; every response is
//! read straight from the tables the jobs maintain.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sea_orm::{ColumnTrait, DbErr, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect};
use tracing::{error, info, warn};

use crate::entities::{
    item_price_candle, item_price_history, live_stats,
    prelude::{ItemPriceCandle, ItemPriceHistory, LiveStats},
};
use crate::models::item::{
    CandleEntry, CandleQuery, CandlesResponse, ErrorResponse, HistoryEntry, HistoryQuery,
    HistoryResponse, ItemListResponse, ItemSummary, LiveStatsEntry,
};
use crate::services::candle_builder::CandleInterval;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn database_error(e: DbErr) -> ApiError {
    error!(error = %e, "Database error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(format!("Database error: {}", e), "DATABASE_ERROR")),
    )
}

fn require_known_item(state: &AppState, item_id: i32) -> Result<(), ApiError> {
    if state.catalog.get(item_id).is_none() {
        warn!(item_id = item_id, "Unknown item requested");
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Item not found", "ITEM_NOT_FOUND")),
        ));
    }
    Ok(())
}

/// GET /api/items
///
/// Every catalog item in catalog order, with its live stats when present.
pub async fn list_items(
    State(state): State<AppState>,
) -> Result<Json<ItemListResponse>, ApiError> {
    let mut stats: HashMap<i32, LiveStatsEntry> = LiveStats::find()
        .all(&*state.db)
        .await
        .map_err(database_error)?
        .into_iter()
        .map(|m| (m.item_id, LiveStatsEntry::from(m)))
        .collect();

    let items: Vec<ItemSummary> = state
        .catalog
        .items()
        .iter()
        .map(|item| ItemSummary {
            id: item.id,
            name: item.name.clone(),
            image_url: item.image_url.clone(),
            stats: stats.remove(&item.id),
        })
        .collect();

    info!(count = items.len(), "Item list query completed");

    Ok(Json(ItemListResponse { items }))
}

/// GET /api/items/{id}/stats
///
/// # Response
/// - 200: Today's stats
/// - 404: No stats written for this item yet
/// - 500: Database error
pub async fn get_item_stats(
    State(state): State<AppState>,
    Path(item_id): Path<i32>,
) -> Result<Json<LiveStatsEntry>, ApiError> {
    let row = LiveStats::find()
        .filter(live_stats::Column::ItemId.eq(item_id))
        .one(&*state.db)
        .await
        .map_err(database_error)?;

    match row {
        Some(row) => Ok(Json(LiveStatsEntry::from(row))),
        None => {
            warn!(item_id = item_id, "No live stats for item");
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("No stats for item", "STATS_NOT_FOUND")),
            ))
        }
    }
}

/// GET /api/items/{id}/candles
///
/// # Query Parameters
/// - `interval`: 1h, 1d (default: 1h)
/// - `from`, `to`: RFC 3339 bounds on the bucket start (default: last 24h)
///
/// # Response
/// - 200: Candles, oldest first
/// - 400: Invalid interval or range
/// - 404: Unknown item
/// - 500: Database error
pub async fn get_item_candles(
    State(state): State<AppState>,
    Path(item_id): Path<i32>,
    Query(query): Query<CandleQuery>,
) -> Result<Json<CandlesResponse>, ApiError> {
    info!(item_id = item_id, interval = %query.interval, "Fetching item candles");

    let interval: CandleInterval = query.interval.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                format!("Invalid interval '{}', expected 1h or 1d", query.interval),
                "INVALID_INTERVAL",
            )),
        )
    })?;

    let (from, to) = query.range(Utc::now()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e, "INVALID_RANGE")),
        )
    })?;

    require_known_item(&state, item_id)?;

    let candles = ItemPriceCandle::find()
        .filter(item_price_candle::Column::ItemId.eq(item_id))
        .filter(item_price_candle::Column::Interval.eq(interval.code()))
        .filter(item_price_candle::Column::Timestamp.gte(from.fixed_offset()))
        .filter(item_price_candle::Column::Timestamp.lte(to.fixed_offset()))
        .order_by(item_price_candle::Column::Timestamp, Order::Asc)
        .all(&*state.db)
        .await
        .map_err(database_error)?;

    Ok(Json(CandlesResponse {
        item_id,
        interval: interval.code().to_string(),
        data: candles.into_iter().map(CandleEntry::from).collect(),
    }))
}

/// GET /api/items/{id}/history
///
/// # Query Parameters
/// - `limit`: 1..=500 (default: 10)
///
/// # Response
/// - 200: Latest raw ticks, newest first
/// - 400: Invalid limit
/// - 404: Unknown item
/// - 500: Database error
pub async fn get_item_history(
    State(state): State<AppState>,
    Path(item_id): Path<i32>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e, "INVALID_LIMIT")),
        )
    })?;

    require_known_item(&state, item_id)?;

    let ticks = ItemPriceHistory::find()
        .filter(item_price_history::Column::ItemId.eq(item_id))
        .order_by(item_price_history::Column::Timestamp, Order::Desc)
        .limit(limit)
        .all(&*state.db)
        .await
        .map_err(database_error)?;

    Ok(Json(HistoryResponse {
        item_id,
        data: ticks.into_iter().map(HistoryEntry::from).collect(),
    }))
}
